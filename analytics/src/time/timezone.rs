//! Viewer timezone.

use super::{period, CalendarDelta, TimeError, TimeUnit};
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
}

/// A named zone used to bucket and display times.
///
/// Either an IANA zone such as `Europe/Paris`, whose offset follows its
/// daylight saving rules, or a fixed offset. The name is what the query
/// contract receives in `timezone(path, 'NAME')` selections: `UTC`, the
/// IANA name, or the `+HH:MM` form of the offset.
///
/// Calendar arithmetic on the window bounds goes through the zone so that
/// day and month boundaries land on local midnight on both sides of a DST
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timezone {
    name: String,
    zone: Zone,
}

impl Timezone {
    /// The UTC timezone.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            name: "UTC".to_string(),
            zone: Zone::Fixed(Utc.fix()),
        }
    }

    /// Builds a timezone from an offset.
    #[must_use]
    pub fn fixed(offset: FixedOffset) -> Self {
        if offset.local_minus_utc() == 0 {
            return Self::utc();
        }
        Self {
            name: offset.to_string(),
            zone: Zone::Fixed(offset),
        }
    }

    /// Builds a timezone from an IANA zone.
    #[must_use]
    pub fn named(tz: Tz) -> Self {
        Self {
            name: tz.name().to_string(),
            zone: Zone::Named(tz),
        }
    }

    /// Parses `UTC`, `Z`, an IANA name such as `Europe/Paris`, or an
    /// offset written `+HH:MM`, `-HH:MM` or `+HHMM`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidTimezone`] for anything else.
    pub fn parse(input: &str) -> Result<Self, TimeError> {
        let s = input.trim();
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::utc());
        }

        let invalid = || TimeError::InvalidTimezone(input.to_string());
        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return s.parse::<Tz>().map(Self::named).map_err(|_| invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::fixed)
            .ok_or_else(invalid)
    }

    /// The name handed to the query contract.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The offset from UTC in effect at `dt`.
    #[must_use]
    pub fn offset_at<T: TimeZone>(&self, dt: &DateTime<T>) -> FixedOffset {
        *self.localize(dt).offset()
    }

    /// Converts `dt` into this timezone.
    #[must_use]
    pub fn localize<T: TimeZone>(&self, dt: &DateTime<T>) -> DateTime<FixedOffset> {
        match self.zone {
            Zone::Fixed(offset) => dt.with_timezone(&offset),
            Zone::Named(tz) => dt.with_timezone(&tz).fixed_offset(),
        }
    }

    /// Floors `dt` to the start of its enclosing `unit`, in this zone.
    ///
    /// # Errors
    ///
    /// See [`period::truncate`].
    pub fn truncate<T: TimeZone>(&self, dt: &DateTime<T>, unit: TimeUnit) -> Result<DateTime<FixedOffset>, TimeError> {
        match self.zone {
            Zone::Fixed(offset) => period::truncate(&dt.with_timezone(&offset), unit),
            Zone::Named(tz) => period::truncate(&dt.with_timezone(&tz), unit).map(|d| d.fixed_offset()),
        }
    }

    /// The boundary of the unit after the one enclosing `dt`, in this zone.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] on calendar overflow.
    pub fn round_up<T: TimeZone>(&self, dt: &DateTime<T>, unit: TimeUnit) -> Result<DateTime<FixedOffset>, TimeError> {
        match self.zone {
            Zone::Fixed(offset) => period::round_up(&dt.with_timezone(&offset), unit),
            Zone::Named(tz) => period::round_up(&dt.with_timezone(&tz), unit).map(|d| d.fixed_offset()),
        }
    }

    /// `dt` moved forward by `delta` on this zone's calendar.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] on calendar overflow.
    pub fn add<T: TimeZone>(&self, dt: &DateTime<T>, delta: CalendarDelta) -> Result<DateTime<FixedOffset>, TimeError> {
        match self.zone {
            Zone::Fixed(offset) => delta.add_to(dt.with_timezone(&offset)),
            Zone::Named(tz) => delta.add_to(dt.with_timezone(&tz)).map(|d| d.fixed_offset()),
        }
    }

    /// `dt` moved back by `delta` on this zone's calendar.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] on calendar overflow.
    pub fn sub<T: TimeZone>(&self, dt: &DateTime<T>, delta: CalendarDelta) -> Result<DateTime<FixedOffset>, TimeError> {
        match self.zone {
            Zone::Fixed(offset) => delta.sub_from(dt.with_timezone(&offset)),
            Zone::Named(tz) => delta.sub_from(dt.with_timezone(&tz)).map(|d| d.fixed_offset()),
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for Timezone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc() {
        assert_eq!(Timezone::parse("UTC").unwrap(), Timezone::utc());
        assert_eq!(Timezone::parse("z").unwrap_err(), TimeError::InvalidTimezone("z".into()));
        assert_eq!(Timezone::parse("+00:00").unwrap().name(), "UTC");
    }

    #[test]
    fn test_parse_offsets() {
        let tz = Timezone::parse("+02:00").unwrap();
        assert_eq!(tz.offset_at(&Utc::now()).local_minus_utc(), 7200);
        assert_eq!(tz.name(), "+02:00");

        let tz = Timezone::parse("-0530").unwrap();
        assert_eq!(tz.offset_at(&Utc::now()).local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(tz.name(), "-05:30");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Timezone::parse("Europe/Nowhere").is_err());
        assert!(Timezone::parse("+2").is_err());
        assert!(Timezone::parse("+02:75").is_err());
    }

    #[test]
    fn test_localize() {
        let tz = Timezone::parse("+01:00").unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let local = tz.localize(&dt);
        assert_eq!(local.to_rfc3339(), "2024-01-02T00:30:00+01:00");
    }

    #[test]
    fn test_parse_named_zone() {
        let tz = Timezone::parse("Europe/Paris").unwrap();
        assert_eq!(tz.name(), "Europe/Paris");

        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(tz.offset_at(&winter).local_minus_utc(), 3600);
        assert_eq!(tz.offset_at(&summer).local_minus_utc(), 7200);
        assert_eq!(tz.localize(&summer).to_rfc3339(), "2024-07-15T14:00:00+02:00");
    }

    #[test]
    fn test_named_zone_truncates_to_local_midnight_across_dst() {
        let tz = Timezone::parse("Europe/Paris").unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 3, 31, 10, 0, 0).unwrap();

        let day = tz.truncate(&dt, TimeUnit::Day).unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-31T00:00:00+01:00");

        let next = tz.round_up(&dt, TimeUnit::Day).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-04-01T00:00:00+02:00");
        assert_eq!(next - day, chrono::TimeDelta::hours(23));

        let back = tz.sub(&next, CalendarDelta::of(TimeUnit::Month, 1)).unwrap();
        assert_eq!(back.to_rfc3339(), "2024-03-01T00:00:00+01:00");
    }
}
