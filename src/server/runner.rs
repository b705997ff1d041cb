//! Router assembly and server execution.

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use tower_http::trace::TraceLayer;

use super::{
    bridge::aggregate_handler, confirm::confirm_handler, signal::shutdown_signal, state::AppState,
    stay::stay_handler,
};

/// Build the application router. Exposed so tests can serve it on an
/// ephemeral port with injected collaborators.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(aggregate_handler))
        .route("/ws/stay", get(stay_handler))
        .route("/ws/confirm", get(confirm_handler))
        .route("/ws/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Run the room coordination server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `state` - Shared application state with the collaborators wired in
pub async fn run_server(
    host: String,
    port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    // Resolved address, not the bind string: port 0 resolves to a real port.
    let local_addr = listener.local_addr()?;

    tracing::info!("room coordination server listening on {}", local_addr);
    tracing::info!(
        "rooms: ws://{local_addr}/ws/stay  ws://{local_addr}/ws/confirm  ws://{local_addr}/ws"
    );
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
