//! AgentCrew: multi-agent group chat server.

use std::path::PathBuf;
use std::sync::Arc;

use agentcrew_core::HostConfig;
use agentcrew_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1).map(String::as_str) {
        Some("--help" | "-h" | "help") => {
            println!("AgentCrew: multi-agent group chat server");
            println!();
            println!("Usage: agentcrew [config-file]");
            println!();
            println!("Configuration is read from the given JSON file, $AGENTCREW_CONFIG,");
            println!("or ./appsettings.json. API keys come from the environment:");
            println!("  AZURE_OPENAI_API_KEY, OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT, PORT");
            return Ok(());
        }
        Some(path) => PathBuf::from(path),
        None => HostConfig::default_path(),
    };

    info!("Configuration: {}", config_path.display());
    let config = HostConfig::load(&config_path)?;
    let port = config.port;

    let state = Arc::new(AppState::from_config(&config)?);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AgentCrew server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
