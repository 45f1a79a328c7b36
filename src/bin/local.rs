//! glint-local - SOCKS5 frontend of the encrypted tunnel
//!
//! This is the entry point for the local agent.

use anyhow::{Context, Result};
use clap::Parser;
use glint::config::load_config;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Local agent: SOCKS5 endpoint tunneling through a remote glint agent
#[derive(Parser, Debug)]
#[command(name = "glint-local")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug)?;

    let config = load_config(&args.config)
        .with_context(|| format!("loading config from {:?}", args.config))?;
    config.validate_local()?;

    info!("glint-local v{}", glint::VERSION);

    tokio::select! {
        result = glint::local::run(config) => result,
        _ = signal::ctrl_c() => {
            info!("received interrupt, shutting down");
            Ok(())
        }
    }
}

/// Setup logging based on the debug flag
fn setup_logging(debug: bool) -> Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
