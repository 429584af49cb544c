//! offcache server entry point.
//!
//! Boots the worker and serves its inbound events as MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offcache_client::{FetchClient, FetchConfig, Worker};
use offcache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "Starting offcache on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(Worker::new(&config, db, network).await?);
    log_events(&worker);

    if let Err(e) = worker.install().await {
        tracing::error!(error = %e, "install at startup failed; retry with worker_lifecycle");
    }

    let handler = handler::OffcacheServer::new(worker.clone());
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    worker.settle().await;
    tracing::info!("offcache stopped");

    Ok(())
}

/// Log lifecycle broadcasts; stands in for the pages that would receive them.
fn log_events(worker: &Worker) {
    let mut events = worker.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "worker event"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "worker events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
