//! framemux - frame-delimited backend connection pool
//!
//! Sends each query on a pooled backend connection and prints the response
//! frames as they stream back.

use clap::Parser;
use framemux_pool::{BufferPool, Config, ConnectionPool, TcpTransport};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framemux")]
#[command(about = "Run queries through a bounded pool of backend connections")]
#[command(version)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, env = "FRAMEMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Backend address (overrides config)
    #[arg(short, long)]
    backend: Option<SocketAddr>,

    /// Maximum concurrent backend connections (overrides config)
    #[arg(short = 'n', long)]
    max_connections: Option<usize>,

    /// Queries to run; each must start with 'Q'
    #[arg(required = true)]
    queries: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // File first, then env overrides, then command-line flags
    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load config: {}", e);
        e
    })?;
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }
    if let Some(addr) = cli.backend {
        config.backend.addr = addr;
    }
    if let Some(max) = cli.max_connections {
        config.pool.max_connections = max;
    }
    config.validate()?;

    tracing::info!("  Backend: {}", config.backend.addr);
    tracing::info!("  Max connections: {}", config.pool.max_connections);

    let buffers = Arc::new(BufferPool::new(config.pool.buffer_pool_size()));
    let pool = ConnectionPool::with_buffer_pool(
        TcpTransport::new(config.backend.tcp_config()),
        config.pool.max_connections,
        buffers,
    );

    let handles: Vec<_> = cli
        .queries
        .into_iter()
        .enumerate()
        .map(|(i, query)| {
            let pool = pool.clone();
            tokio::spawn(async move { run_query(&pool, i, query.as_bytes()).await })
        })
        .collect();

    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("{}", e);
                failed += 1;
            }
            Err(e) => {
                tracing::error!("query task panicked: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} query(s) failed", failed).into());
    }
    Ok(())
}

async fn run_query(
    pool: &ConnectionPool<TcpTransport>,
    index: usize,
    query: &[u8],
) -> Result<(), String> {
    let mut stream = pool
        .request(query)
        .await
        .map_err(|e| format!("query {}: {}", index, e))?;
    tracing::debug!(query = index, connection = %stream.connection_id(), "response started");

    let mut frames = 0usize;
    while let Some(frame) = stream
        .read()
        .await
        .map_err(|e| format!("query {}: {}", index, e))?
    {
        println!("[{}] {}", index, String::from_utf8_lossy(frame));
        frames += 1;
    }

    tracing::debug!(query = index, frames, "response complete");
    Ok(())
}
