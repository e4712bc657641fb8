//! Penny server binary
//!
//! Run with: cargo run --bin penny-server

use penny::{config::PennyConfig, server::PennyServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "penny=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; PENNY_CONFIG points at a TOML file
    let config = match std::env::var("PENNY_CONFIG") {
        Ok(path) => PennyConfig::from_file(&path)?,
        Err(_) => PennyConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Documents dir: {}", config.storage.documents_dir.display());
    tracing::info!("  - Job store: {}", config.database.path.display());
    tracing::info!("  - Vector store: {}", config.indexer.base_url);
    tracing::info!(
        "  - Max concurrent jobs: {}",
        config.processing.max_concurrent_jobs
    );

    // Check the vector store is reachable
    let client = reqwest::Client::new();
    match client
        .get(format!("{}/api/v1/heartbeat", config.indexer.base_url))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Chroma is running");
        }
        _ => {
            tracing::warn!("Chroma not available at {}", config.indexer.base_url);
            tracing::warn!("Indexing jobs will fail until it is reachable:");
            tracing::warn!("  docker run -p 8000:8000 chromadb/chroma");
        }
    }

    // Create and start server; scheduler init failures abort startup
    let server = PennyServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/documents/upload   - Upload a document");
    println!("  GET    /api/jobs/progress/:id  - Poll job progress");
    println!("  GET    /api/jobs/recent        - Recent jobs");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
