use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_proxy::{config, observability, EdgeProxy, HttpServer, MemoryStore};

#[derive(Parser)]
#[command(name = "edge-proxy")]
#[command(about = "First-party analytics edge proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    observability::logging::init(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        route_prefix = %config.settings.route_prefix,
        failure_policy = ?config.failure_policy,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let edge = Arc::new(
        EdgeProxy::builder(config.settings.clone())
            .features(config.features.clone())
            .failure_policy(config.failure_policy)
            .profile_storage(Arc::new(MemoryStore::new()))
            .build(),
    );

    let server = HttpServer::new(&config.listener, edge);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
