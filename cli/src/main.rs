//! Alertlens CLI
//!
//! Command-line front end of the analytics core: compiles queries, resolves
//! time periods and renders charts and alert listings over alerts loaded
//! from a JSON file.
//!
//! # Usage
//!
//! ```bash
//! alertlens --help
//! alertlens parse "alert.classification.text == 'ssh'"
//! alertlens period -p timeline_value=2 -p timeline_unit=hour
//! alertlens listing alerts.json -p aggregated_target=none
//! alertlens chart alerts.json alert.classification.text --chronology
//! ```

#![deny(unsafe_code)]

use analytics::config::AnalyticsConfig;
use analytics::context::{Environment, RequestContext, RequestParameters};
use analytics::criteria::{Path, QueryMode};
use analytics::listing::AlertListing;
use analytics::provider::{InMemoryDataProvider, Schema};
use analytics::statistics::{ChartOptions, ChronologyChart, DiagramChart, Query};
use analytics::time::Timezone;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Alertlens CLI - explore filters, time periods, charts and alert listings
#[derive(Parser)]
#[command(name = "alertlens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Viewer timezone: `UTC`, an IANA name such as `Europe/Paris`, or an offset such as `+02:00`
    #[arg(short, long, env = "ALERTLENS_TIMEZONE", default_value = "UTC", global = true)]
    timezone: String,

    /// Evaluate the request at this RFC 3339 instant instead of now
    #[arg(long, global = true)]
    now: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query into a criteria expression
    Parse {
        /// The query text
        query: String,

        /// Query syntax: criterion or lucene
        #[arg(short, long, default_value = "criterion")]
        mode: String,

        /// Datatype the query applies to
        #[arg(short, long, default_value = "alert")]
        datatype: String,
    },
    /// Resolve the time window and chart step of request parameters
    Period {
        /// Request parameters as name=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Render the alert listing
    Listing {
        /// JSON file holding an array of alerts
        alerts: PathBuf,

        /// Request parameters as name=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Render a chart over one or two paths
    Chart {
        /// JSON file holding an array of alerts
        alerts: PathBuf,

        /// Grouping paths; a second path splits the diagram into sub-charts
        #[arg(required = true, num_args = 1..=2)]
        paths: Vec<String>,

        /// Render a chronology instead of a diagram
        #[arg(long)]
        chronology: bool,

        /// Chart type, such as bar, pie, table or timeline
        #[arg(long)]
        chart_type: Option<String>,

        /// Maximum number of categories
        #[arg(long)]
        limit: Option<usize>,

        /// Request parameters as name=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[derive(Serialize)]
struct PeriodReport {
    criteria: String,
    start: Option<String>,
    end: Option<String>,
    step: Option<analytics::time::Step>,
    parameters: Vec<(&'static str, String)>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> Result<AnalyticsConfig> {
    let config = AnalyticsConfig::from_env().context("Failed to read the analytics configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn load_alerts(path: &std::path::Path) -> Result<InMemoryDataProvider> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let serde_json::Value::Array(alerts) = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?
    else {
        bail!("{} must hold a JSON array of alerts", path.display());
    };

    let provider = InMemoryDataProvider::new(Schema::alert());
    let count = alerts.len();
    provider.insert_batch("alert", alerts)?;
    tracing::info!(count, file = %path.display(), "Loaded alerts");
    Ok(provider)
}

struct Session {
    timezone: Timezone,
    now: DateTime<Utc>,
    config: AnalyticsConfig,
}

impl Session {
    fn new(cli: &Cli) -> Result<Self> {
        let timezone = Timezone::parse(&cli.timezone)
            .with_context(|| format!("Invalid timezone `{}`", cli.timezone))?;
        let now = match &cli.now {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("Invalid instant `{raw}`"))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };
        Ok(Self {
            timezone,
            now,
            config: load_config()?,
        })
    }

    fn request(&self, provider: InMemoryDataProvider, params: Vec<(String, String)>) -> Result<RequestContext> {
        let env = Arc::new(Environment::new(Arc::new(provider), self.config.clone()));
        let params: RequestParameters = params.into_iter().collect();
        Ok(RequestContext::new(env, params, self.timezone.clone(), self.now)?)
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli, command: &Commands) -> Result<()> {
    let session = Session::new(cli)?;

    match command {
        Commands::Parse { query, mode, datatype } => {
            let mode: QueryMode = mode
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown query mode `{mode}`"))?;
            let ctx = session.request(InMemoryDataProvider::new(Schema::alert()), Vec::new())?;
            let criterion = ctx.compile_query(datatype, query, mode)?;
            print_json(&criterion)?;
            println!("{criterion}");
        }
        Commands::Period { params } => {
            let ctx = session.request(InMemoryDataProvider::new(Schema::alert()), params.clone())?;
            let period = ctx.period();
            print_json(&PeriodReport {
                criteria: ctx.base_criteria("alert")?.to_string(),
                start: period.start().map(DateTime::to_rfc3339),
                end: period.end().map(DateTime::to_rfc3339),
                step: period.get_step(Some(session.config.chart_points)).ok(),
                parameters: period.get_parameters(),
            })?;
        }
        Commands::Listing { alerts, params } => {
            let ctx = session.request(load_alerts(alerts)?, params.clone())?;
            let page = AlertListing::new(&ctx)?.render()?;
            print_json(&page)?;
        }
        Commands::Chart {
            alerts,
            paths,
            chronology,
            chart_type,
            limit,
            params,
        } => {
            let ctx = session.request(load_alerts(alerts)?, params.clone())?;
            let queries: Vec<Query> = paths
                .iter()
                .map(|p| Path::parse(p).map(|path| Query::new("alert").path(path)))
                .collect::<Result<_, _>>()?;

            let mut options = ChartOptions::titled(paths.join(" / ")).with_limit(*limit);
            if let Some(chart_type) = chart_type {
                options = options.with_chart_type(chart_type.clone());
            }

            let output = if *chronology {
                ChronologyChart::new(&ctx, queries, options)?.render()?
            } else {
                DiagramChart::new(&ctx, queries, options)?.render()?
            };
            print_json(&output)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    match &cli.command {
        Some(command) => run(&cli, command),
        None => {
            println!("Alertlens CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["alertlens"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_parse_command() {
        let cli = Cli::try_parse_from(["alertlens", "parse", "alert.messageid == 'x'", "--mode", "lucene"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Parse { ref mode, .. }) if mode == "lucene"));
    }

    #[test]
    fn test_param_pairs() {
        let cli = Cli::try_parse_from([
            "alertlens",
            "listing",
            "alerts.json",
            "-p",
            "aggregated_target=none",
            "--param",
            "query=a=b",
        ])
        .unwrap();
        let Some(Commands::Listing { params, .. }) = cli.command else {
            panic!("Expected listing command");
        };
        assert_eq!(
            params,
            vec![
                ("aggregated_target".to_string(), "none".to_string()),
                ("query".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_param_without_value_is_rejected() {
        assert!(Cli::try_parse_from(["alertlens", "period", "-p", "timeline_unit"]).is_err());
    }

    #[test]
    fn test_chart_takes_at_most_two_paths() {
        assert!(Cli::try_parse_from(["alertlens", "chart", "a.json", "x", "y"]).is_ok());
        assert!(Cli::try_parse_from(["alertlens", "chart", "a.json", "x", "y", "z"]).is_err());
    }

    #[test]
    fn test_session_parses_instant_and_timezone() {
        let cli = Cli::try_parse_from([
            "alertlens",
            "--timezone",
            "+02:00",
            "--now",
            "2024-05-10T12:00:00Z",
            "period",
        ])
        .unwrap();
        let session = Session::new(&cli).unwrap();
        assert_eq!(session.now.to_rfc3339(), "2024-05-10T12:00:00+00:00");
        assert_eq!(session.timezone.offset_at(&session.now).local_minus_utc(), 7200);
    }
}
