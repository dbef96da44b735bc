//! Media-stream WebSocket connection lifecycle.
//!
//! One connection equals one call: accept the telephony socket, dial
//! the speech engine, run the bridge between them, and tear both down
//! together when either side ends.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use screenline_engine::{connect, EngineSettings};

use crate::bridge::CallBridge;
use crate::state::GatewayState;
use crate::transport::{parse_frame, TransportEvent};

/// Handle one media-stream connection end to end.
pub async fn handle_media_connection(state: Arc<GatewayState>, mut ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "New media-stream connection");

    let engine_config = state.config.engine.clone().unwrap_or_default();
    let settings = match EngineSettings::from_config(&engine_config) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(conn_id = %conn_id, %e, "Speech engine not configured, dropping call");
            let _ = ws.send(Message::Close(None)).await;
            return;
        }
    };

    let (engine, mut engine_rx) = match connect(settings).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(conn_id = %conn_id, %e, "Speech engine connection failed, dropping call");
            let _ = ws.send(Message::Close(None)).await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    // Outbound frames go through a channel so the bridge never blocks
    // on the socket.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut bridge = CallBridge::new(
        engine,
        frame_tx,
        state.call_control.clone(),
        Duration::from_millis(state.config.hangup_fallback_ms()),
    );
    let mut call_sid: Option<String> = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(event) = parse_frame(&text) else { continue };
                        match event {
                            TransportEvent::Stop => {
                                info!(conn_id = %conn_id, "Media stream stopped");
                                break;
                            }
                            TransportEvent::Start { ref start } => {
                                state.register_call(&start.call_sid, &start.stream_sid).await;
                                call_sid = Some(start.call_sid.clone());
                                bridge.handle_transport_event(event);
                            }
                            other => bridge.handle_transport_event(other),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(conn_id = %conn_id, "Media socket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(conn_id = %conn_id, %e, "Media socket error");
                        break;
                    }
                    _ => {}
                }
            }
            event = engine_rx.recv() => {
                match event {
                    Some(screenline_engine::EngineEvent::Closed) | None => {
                        debug!(conn_id = %conn_id, "Engine session ended");
                        break;
                    }
                    Some(event) => bridge.handle_engine_event(event),
                }
            }
        }
    }

    bridge.teardown();
    send_task.abort();
    if let Some(sid) = call_sid {
        state.unregister_call(&sid).await;
    }
    info!(conn_id = %conn_id, "Media-stream connection closed");
}
