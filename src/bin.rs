//! Binary entry point for `slack-gemini-bot`.
//!
//! This module provides the command-line interface for slack-gemini-bot. Each
//! stage runs as its own process: `publish` serves the Slack webhook and
//! `subscribe` answers queued events.

use clap::{Parser, Subcommand};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use slack_gemini_bot::base::{config::Config, types::Void};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Slack-gemini-bot – relays Slack conversations to Gemini through a queue.
///
/// Configuration can come from `config.toml` or `SLACK_GEMINI_BOT_*` environment variables.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// The stage to run.
    #[command(subcommand)]
    command: Command,
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level (DEBUG when `debug` is set in the config)
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Export spans over OTLP/HTTP (configured through the standard `OTEL_*` variables).
    #[arg(long, global = true)]
    otlp: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the Slack Events webhook and enqueue accepted events.
    Publish,
    /// Consume queued events and answer them with Gemini.
    Subscribe,
}

/// Main entry point for the slack-gemini-bot binary.
///
/// Loads configuration, sets up logging based on verbosity, and starts the selected stage.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;

    // Construct the level filter.

    let level = match (args.verbose, config.debug) {
        (0, false) => tracing::Level::INFO,
        (0, true) | (1, _) => tracing::Level::DEBUG,
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
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let otel = if args.otlp {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .build()
            .tracer("slack-gemini-bot");

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    match args.command {
        Command::Publish => slack_gemini_bot::publish(config).await,
        Command::Subscribe => slack_gemini_bot::subscribe(config).await,
    }
}
