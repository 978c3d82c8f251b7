//! The relay server: axum router and process entrypoint for `serve`.

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::config::Config;

pub mod error;
pub mod handlers;
pub mod prompt;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config, listen: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config)?;
    let addr = listen.unwrap_or_else(|| config.listen_addr().to_string());

    if config.api_key().is_none() {
        // Startup proceeds; each request re-checks and fails with the
        // configuration error until the key appears.
        tracing::warn!(
            "{} is not set; chat requests will fail until it is",
            crate::core::config::API_KEY_ENV
        );
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, mode = ?config.reply_mode(), "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
