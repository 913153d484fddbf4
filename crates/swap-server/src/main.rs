//! # skillswap
//!
//! Realtime chat and matching server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! skillswap
//!
//! # Run with custom config
//! skillswap --config /path/to/skillswap.toml
//!
//! # Run with environment variables
//! SKILLSWAP_PORT=8080 SKILLSWAP_HOST=0.0.0.0 skillswap
//! ```

use anyhow::{bail, Result};
use skillswap_server::{metrics, run_server, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillswap_server=debug,skillswap_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(config_arg()?.as_deref())?;

    tracing::info!("Starting skillswap server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    run_server(config).await
}

/// Value of `--config <path>`, if given.
fn config_arg() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config needs a path"),
            },
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    return Ok(Some(PathBuf::from(path)));
                }
                bail!("unknown argument: {other}");
            }
        }
    }
    Ok(None)
}
