use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cfstats_agent::config::Config;
use cfstats_agent::pipeline::{Pipeline, RunMode};

#[derive(Parser, Debug)]
#[command(name = "cfstats-agent", about = "Cloudflare Pages/Workers request tracker")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Fetch and analyse, print the report, skip delivery and history
    #[arg(long)]
    dry_run: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("cfstats-agent {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&cli.config)
        .with_context(|| format!("Invalid configuration in {}", cli.config))?;

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        targets = config.targets.len(),
        discover = config.cloudflare.discover,
        "Starting Cloudflare stats run"
    );

    let pipeline = Pipeline::from_config(&config).context("Failed to initialise pipeline")?;
    let mode = if cli.dry_run { RunMode::DryRun } else { RunMode::Full };
    let summary = pipeline.run(mode).await;

    if cli.dry_run {
        println!("{}", summary.report.render_text());
    }

    if summary.is_partial() {
        warn!(
            unavailable = summary.unavailable,
            persist_failures = summary.persist_failures.len(),
            delivered = summary.delivered(),
            "Run finished with partial failures"
        );
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.agent.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
