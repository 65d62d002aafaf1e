use std::net::SocketAddr;
use std::sync::Arc;
use altis_api::{app, AppState};
use altis_search::{ProviderRegistry, SearchOrchestrator};
use altis_supplier::ReqwestTransport;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "altis_api=debug,altis_search=info,altis_supplier=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = altis_store::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Altis search API on port {}", config.server.port);

    // One pooled client shared by every upstream
    let transport = Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);

    let registry = ProviderRegistry::build(&config, transport)
        .await
        .context("Failed to initialise providers")?;
    if registry.is_empty() {
        tracing::warn!("No providers enabled, every search will come back empty");
    }

    let orchestrator = SearchOrchestrator::from_registry(&registry, &config.search);
    let app = app(AppState { orchestrator: Arc::new(orchestrator) });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
