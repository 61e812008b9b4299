use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use std::sync::Arc;

use crate::server::GameServer;

use super::connection::handle_socket;

/// Create the Axum router with WebSocket support.
pub fn create_router(cors_origins: &str) -> axum::Router<Arc<GameServer>> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    axum::Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<GameServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

/// Health check endpoint.
async fn health_check(
    State(server): State<Arc<GameServer>>,
) -> axum::response::Result<&'static str> {
    if server.health_check().await {
        Ok("OK")
    } else {
        Err(axum::http::StatusCode::SERVICE_UNAVAILABLE.into())
    }
}

async fn metrics_handler(State(server): State<Arc<GameServer>>) -> Response {
    Json(server.metrics().snapshot()).into_response()
}
