//! Warden daemon
//!
//! Runs the CPU self-protection loop against a process and, optionally,
//! replays a recorded class-load list through the server detectors.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use warden_agent::{init_tracing, replay_classes, Agent, AgentConfig, AgentResult};

/// Warden daemon CLI
#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Warden - server detection and CPU self-protection", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Process to protect; defaults to this process
    #[arg(short, long)]
    pid: Option<u32>,

    /// Class names to replay through the detectors, one per line
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        error!(error = %e, "wardend failed");
        eprintln!("wardend: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AgentResult<()> {
    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    init_tracing(&config.logging)?;

    let pid = cli.pid.unwrap_or_else(std::process::id);
    let mut agent = Agent::new(config, pid)?;

    if let Some(path) = cli.replay {
        let reader = BufReader::new(File::open(&path)?);
        let summary = replay_classes(reader, &agent.dispatcher())?;
        info!(
            file = %path.display(),
            classes = summary.classes,
            detections = summary.detections,
            failures = summary.failures,
            servers = ?agent.detected_servers().servers(),
            "class replay finished"
        );
    }

    agent.start();
    info!(pid, "wardend running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Some(stats) = agent.shutdown().await? {
        info!(
            ticks = stats.ticks,
            trips = stats.trips,
            recoveries = stats.recoveries,
            sample_failures = stats.sample_failures,
            "cpu self-protection summary"
        );
    }
    Ok(())
}
