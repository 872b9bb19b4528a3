use fitcoach::api::create_routes;
use fitcoach::config::{AppConfig, DatabaseConfig, IntegrationsConfig};
use fitcoach::services::BackgroundJobService;
use fitcoach::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_config = DatabaseConfig::from_env()?;
    let integrations = IntegrationsConfig::from_env()?;

    let db = db_config.connect_and_migrate().await?;

    let jobs = BackgroundJobService::new(db.clone()).await?;
    if let Err(e) = jobs.start().await {
        warn!("Background jobs disabled: {}", e);
    }

    let address = config.server_address();
    let state = AppState::new(db, config, &integrations)?;
    let app = create_routes(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Fitcoach server starting on http://{}", address);
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app).await?;

    jobs.stop().await?;
    Ok(())
}
