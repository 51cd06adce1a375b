//! Binary entry point for `stale-bot`.
//!
//! This module provides the command-line interface for stale-bot with options
//! for configuration file paths, credentials and logging verbosity. It initializes
//! logging, loads the configuration, and runs a single sweep.

use chrono::{DateTime, Utc};
use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use stale_bot::{
    RunEnvironment,
    base::{
        config::{Config, ConfigInner},
        types::Void,
    },
};
use tracing_subscriber::{Layer, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Stale-bot – reminds, stales, and closes inactive issues.
///
/// Configuration can come from `.github/stale-bot.toml` or `STALE_BOT_*` environment
/// variables. Intended to be run once a day by a scheduler.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.github/stale-bot.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// The repository this invocation is running in, as `owner/name`.
    ///
    /// Nothing happens unless this matches the configured canonical repository.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: String,
    /// API token with issue write access.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,
    /// Evaluate as of this RFC 3339 timestamp instead of the current time.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    /// Log the actions that would be taken without applying them.
    #[arg(long)]
    dry_run: bool,
    /// Export spans over OTLP (configured through the standard `OTEL_*` variables).
    #[arg(long)]
    otlp: bool,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Main entry point for the stale-bot binary.
///
/// Sets up logging based on verbosity, loads configuration, and runs the sweep.
/// Any run-level error propagates out of `main`, producing a non-zero exit status.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let otel = if args.otlp {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("stale-bot");
        Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    let mut config = Config::load(args.config.as_deref())?;

    if args.dry_run {
        config = Config::from(ConfigInner {
            dry_run: true,
            ..(*config.inner).clone()
        });
    }

    let env = RunEnvironment {
        repository: args.repository,
        now: args.now.unwrap_or_else(Utc::now),
    };

    stale_bot::start(config, &args.token, env).await?;

    Ok(())
}
