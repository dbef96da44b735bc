//! Axum server: call webhook, media-stream endpoint, health.

use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::connection::handle_media_connection;
use crate::state::GatewayState;
use crate::twiml;

/// Start the gateway HTTP/WebSocket server.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state
        .config
        .gateway
        .as_ref()
        .and_then(|g| g.bind.clone())
        .unwrap_or_else(|| "0.0.0.0".to_string());

    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the route set.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/voice", post(voice_handler))
        .route("/media-stream", get(media_stream_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Inbound-call webhook: answer with markup that connects the call to
/// our media-stream endpoint.
async fn voice_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let Some(public_url) = state.config.public_url() else {
        warn!("Inbound call but no public URL configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "gateway.public_url is not configured".to_string(),
        )
            .into_response();
    };

    match twiml::stream_url(public_url) {
        Ok(url) => {
            info!(stream_url = %url, "Answering inbound call");
            (
                [(header::CONTENT_TYPE, "text/xml")],
                twiml::connect_stream(&url),
            )
                .into_response()
        }
        Err(e) => {
            warn!(%e, "Invalid public URL");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_connection(state, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.active_calls().await,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to install CTRL+C handler");
        return;
    }
    info!("Shutdown signal received");
}
