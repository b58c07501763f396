use tracing_subscriber::EnvFilter;

use pdf_chat::config::Config;
use pdf_chat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM: {} ({})", config.llm.model, config.llm.base_url);
    if config.llm.api_key.is_none() {
        tracing::warn!("No API_KEY configured; LLM requests will be sent unauthenticated");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let app = pdf_chat::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
