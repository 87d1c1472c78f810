//! SigV4 Relay - authenticating re-signing proxy for S3-compatible storage

use clap::Parser;
use sigv4_relay::{config::Config, server::ProxyServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SigV4 Relay - verifies SigV4 requests and forwards them re-signed
#[derive(Parser, Debug)]
#[command(name = "sigv4-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SigV4 Relay v{}", sigv4_relay::VERSION);

    let config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            config
        }
    };

    let server = ProxyServer::new(config).await?;
    server.run().await?;

    Ok(())
}
