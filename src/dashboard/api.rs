//! Dashboard HTTP API
//!
//! REST endpoints plus the `/ws` market-update stream.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::{Broadcaster, DashboardMemory};

type AppState = (Arc<DashboardMemory>, Broadcaster);

/// Create the API router with all endpoints
pub fn create_router(memory: Arc<DashboardMemory>, broadcaster: Broadcaster) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/health", get(get_health))
        .route("/api/stats", get(get_stats))
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state((memory, broadcaster))
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/state - Latest market update
async fn get_state(State((memory, _)): State<AppState>) -> impl IntoResponse {
    match memory.get_state().await {
        Some(update) => Json(ApiResponse::success(update)),
        None => Json(ApiResponse::<MarketUpdate>::error("no cycle completed yet")),
    }
}

/// GET /api/portfolio - Normalized allocation from the latest cycle
async fn get_portfolio(State((memory, _)): State<AppState>) -> impl IntoResponse {
    let portfolio: BTreeMap<String, f64> = memory
        .get_state()
        .await
        .map(|update| update.portfolio)
        .unwrap_or_default();
    Json(ApiResponse::success(portfolio))
}

/// GET /api/health - Engine state and failure counters
async fn get_health(State((memory, broadcaster)): State<AppState>) -> impl IntoResponse {
    #[derive(serde::Serialize)]
    struct HealthResponse {
        #[serde(flatten)]
        engine: crate::engine::HealthSnapshot,
        subscribers: usize,
    }

    Json(ApiResponse::success(HealthResponse {
        engine: memory.get_health().await,
        subscribers: broadcaster.subscriber_count(),
    }))
}

/// GET /api/stats - Per-symbol outcome statistics
async fn get_stats(State((memory, _)): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(memory.get_stats().await))
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Handler
// ─────────────────────────────────────────────────────────────────

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};

/// WebSocket upgrade handler
async fn websocket_handler(ws: WebSocketUpgrade, State((memory, broadcaster)): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, memory, broadcaster))
}

/// Outgoing message type for WebSocket
enum OutgoingMessage {
    Text(String),
    Pong(Vec<u8>),
    Close,
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, memory: Arc<DashboardMemory>, broadcaster: Broadcaster) {
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before sending the snapshot so no update is missed
    let mut subscription = broadcaster.subscribe();
    let id = subscription.id;
    tracing::info!(subscriber = id, "🖥️ New WebSocket connection");

    if let Some(update) = memory.get_state().await {
        if let Ok(json) = serde_json::to_string(&update) {
            if sender.send(Message::Text(json)).await.is_err() {
                broadcaster.unsubscribe(id);
                return;
            }
        }
    }

    // Channel for outgoing messages
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    // Spawn task to send outgoing messages
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
                OutgoingMessage::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            // Broadcast updates; None once the broadcaster drops us
            broadcast_msg = subscription.rx.recv() => {
                match broadcast_msg {
                    Some(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = out_tx.send(OutgoingMessage::Close).await;
                        break;
                    }
                }
            }
            // Incoming messages
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(subscriber = id, "Received WebSocket message: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    broadcaster.unsubscribe(id);
    drop(out_tx);
    // Let a pending Close frame flush before tearing the task down
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), send_task).await;
    tracing::info!(subscriber = id, "🖥️ WebSocket connection closed");
}

/// Start the dashboard server; returns once `shutdown` flips to true
pub async fn start_server(
    bind_addr: &str,
    memory: Arc<DashboardMemory>,
    broadcaster: Broadcaster,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = create_router(memory, broadcaster);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!("🖥️ Dashboard API starting on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
