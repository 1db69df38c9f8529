//! shellcache worker entry point.
//!
//! Boots one worker version and serves lifecycle and fetch events as JSON
//! lines on stdio. Logging goes to stderr so stdout carries only replies.
//!
//! Usage: `shellcache [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_client::{FetchClient, FetchConfig, Worker};
use shellcache_core::{AppConfig, CacheDb, SystemClock};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    tracing::info!(version = %config.version_tag, db = %config.db_path.display(), "starting shellcache worker on stdio");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(&FetchConfig::from_app(&config))?);
    let worker = Worker::from_config(&config, Arc::new(db), network, Arc::new(SystemClock))?;
    let handler = Arc::new(handler::EventHandler::new(worker, config.app_origin_url()?));

    handler::run(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
