//! Token parsers shared by the path, selection and filter grammars.

use nom::{
    bytes::complete::take_while1,
    error::{Error, ErrorKind},
    IResult, Parser,
};

/// A single- or double-quoted string with backslash escapes, unescaped.
pub(crate) fn quoted_string(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('\'' | '"'))) => c,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };

    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }

    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

/// A path element name: a letter or underscore, then letters, digits or
/// underscores.
pub(crate) fn word(input: &str) -> IResult<&str, &str> {
    let (rest, name) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)?;
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Alpha)));
    }
    Ok((rest, name))
}
