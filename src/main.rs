// Entity Runtime Server - JSON-configured entities over HTTP

use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use ent_runtime::{app_state::AppState, config::Config, http::create_entity_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Loading entity definitions from {}", config.entities.dir.display());

    // Initialize application state
    let app_state = AppState::from_config(&config).await?;

    let app = Router::new()
        .nest("/api/v1", create_entity_router(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server_address();
    tracing::info!("Entity runtime listening on http://{}", addr);
    tracing::info!("  GET    /api/v1/{{entity}}         - Find documents");
    tracing::info!("  POST   /api/v1/{{entity}}         - Create document");
    tracing::info!("  GET    /api/v1/{{entity}}/{{id}}    - Get document");
    tracing::info!("  PATCH  /api/v1/{{entity}}/{{id}}    - Update document");
    tracing::info!("  DELETE /api/v1/{{entity}}/{{id}}    - Delete document");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
