//! Beacon Main Binary
//!
//! - `serve`: run the HTTP ingestion and insights service
//! - `insights`: run one insight query against the configured endpoint
//! - `inspect`: push a payload file through detection and transformation

use anyhow::{anyhow, Context, Result};
use beacon_api::prelude::*;
use beacon_core::config::Config;
use beacon_core::sanitize;
use beacon_ingestion::prelude::*;
use beacon_insights::prelude::*;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Beacon CLI arguments
#[derive(Debug, Parser)]
#[clap(
    name = "beacon",
    version,
    about = "Telemetry ingestion into a columnar analytics sink"
)]
struct Cli {
    /// Configuration file path; defaults apply when it does not exist
    #[clap(short, long, default_value = "config/beacon.yaml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "BEACON_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "BEACON_LOG_JSON", global = true)]
    log_json: bool,

    /// Validate configuration and exit
    #[clap(long, global = true)]
    dry_run: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the service (default if no subcommand given)
    Serve,
    /// Query insights for one dataset
    Insights {
        /// Dataset to query
        #[clap(long, default_value = "telemetry_events")]
        dataset: String,

        /// Restrict to one project
        #[clap(long)]
        project: Option<String>,

        /// Window length in hours
        #[clap(long)]
        hours: Option<f64>,

        /// Row limit
        #[clap(long)]
        limit: Option<u64>,

        /// Output as JSON
        #[clap(long)]
        json: bool,
    },
    /// Detect the format of a payload file and print the resulting record
    Inspect {
        /// Payload file (JSON)
        #[clap(long)]
        file: PathBuf,

        /// Force an adapter instead of detecting one (e.g. legacy, otlp_logs)
        #[clap(long)]
        format: Option<String>,

        /// Project scope for the record index
        #[clap(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli)?;

    info!("Starting Beacon v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Insights {
            ref dataset,
            ref project,
            hours,
            limit,
            json,
        }) => {
            let config = load_config(&cli.config)?;
            let params = InsightParams {
                dataset: Some(dataset.clone()),
                project_id: project.clone(),
                hours,
                limit: limit.map(Value::from),
                ..Default::default()
            };
            run_insights_command(&config, &params, json).await
        }
        Some(Commands::Inspect {
            ref file,
            ref format,
            ref project,
        }) => run_inspect_command(file, format.as_deref(), project.as_deref()),
        Some(Commands::Serve) | None => run_serve_command(&cli).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", path);
    Config::load_or_default(path).context("Failed to load configuration")
}

/// Run the serve subcommand (default behavior)
async fn run_serve_command(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    if cli.dry_run {
        info!("Dry run mode - configuration validated, exiting");
        return Ok(());
    }

    let api_config = ApiConfig::from_config(&config).context("Invalid server configuration")?;
    let state = AppState::from_config(&config).context("Failed to initialize service state")?;
    let addr = api_config.bind_addr;

    let app = create_router(api_config, state);

    info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            result.context("API server failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("API server shut down gracefully");
    Ok(())
}

/// Run the insights subcommand
async fn run_insights_command(config: &Config, params: &InsightParams, json: bool) -> Result<()> {
    let engine = InsightEngine::from_config(&config.query, &config.insights)
        .context("Failed to initialize insight engine")?;
    let result = engine
        .get_insights(params)
        .await
        .context("Insight query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(70));
    println!(
        "INSIGHTS: {} (last {}h, {} rows)",
        result.query.dataset, result.query.hours, result.query.rows
    );
    println!("{}", "=".repeat(70));
    println!("Total events:  {}", result.summary.total_events);
    println!();
    println!("TOP PROJECTS:");
    if result.summary.top_projects.is_empty() {
        println!("  (no scoped rows)");
    }
    for project in &result.summary.top_projects {
        println!("  {:<34} {:>12.0}", project.project, project.events);
    }
    println!();
    println!("TRENDS:");
    for trend in &result.insights.trends {
        match trend.change_percent {
            Some(pct) => println!("  {:<20} {:?} ({:+.1}%)", trend.metric, trend.direction, pct),
            None => println!("  {:<20} {:?}", trend.metric, trend.direction),
        }
    }
    println!();
    println!("ANOMALIES:");
    if result.insights.anomalies.is_empty() {
        println!("  (none)");
    }
    for anomaly in &result.insights.anomalies {
        println!(
            "  {:<22} value={:<10.2} expected={:<10.2} z={:<6.2} {:?}",
            anomaly.timestamp, anomaly.value, anomaly.expected, anomaly.z_score, anomaly.severity
        );
    }
    println!();
    println!("RECOMMENDATIONS:");
    for recommendation in &result.insights.recommendations {
        println!("  - {}", recommendation);
    }
    println!("{}", "=".repeat(70));

    Ok(())
}

/// Run the inspect subcommand
fn run_inspect_command(file: &Path, format: Option<&str>, project: Option<&str>) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload file {}", file.display()))?;
    let payload: Value = serde_json::from_str(&content).context("Payload is not valid JSON")?;

    let scope = project
        .map(sanitize::project_id)
        .transpose()
        .context("Invalid project scope")?;

    let registry = AdapterRegistry::new();
    let adapter = match format {
        Some(name) => registry.get(name.parse::<AdapterKind>().map_err(|e| anyhow!(e))?),
        None => registry
            .detect(&payload)
            .ok_or_else(|| anyhow!("No adapter recognizes this payload"))?,
    };

    let ctx = TransformContext::new(scope);
    let record = adapter
        .transform(&payload, &ctx)
        .with_context(|| format!("Payload rejected by the {} adapter", adapter.kind()))?;

    println!("Adapter: {} (dataset {})", adapter.kind(), adapter.kind().dataset());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down..."); },
        _ = terminate => { info!("Received SIGTERM, shutting down..."); },
    }
}

/// Initialize logging based on CLI arguments
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    }

    Ok(())
}
