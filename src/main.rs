use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_dashboard::auth::start_session_cleanup;
use news_dashboard::config::{Config, Secrets};
use news_dashboard::routes::{self, AppState};

const SESSION_CLEANUP_MINUTES: u64 = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_dashboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let secrets = Secrets::from_env();
    let config_path =
        std::env::var("NEWS_DASHBOARD_CONFIG").unwrap_or_else(|_| "news.toml".to_string());
    let config = Config::load_or_default(&config_path)?;
    info!(path = %config_path, page_size = config.page_size, "Configuration loaded");

    for key in secrets.missing_api_keys() {
        warn!("{} is not set; that source will fail until it is", key);
    }
    if secrets.oauth_credentials().is_none() {
        warn!("OAUTH_CLIENT_ID/OAUTH_CLIENT_SECRET not set; dashboard is open to everyone");
    }

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config, &secrets)?);
    info!(
        sources = ?state.aggregator.api_sources(),
        news_endpoint = %state.config.news_endpoint_url(),
        "News sources configured"
    );

    // Start background session cleanup
    let bg_state = state.clone();
    tokio::spawn(async move {
        start_session_cleanup(bg_state, SESSION_CLEANUP_MINUTES).await;
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Server starting on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
