//! Client-facing websocket endpoint.

use crate::connection::{ConnectionHandle, WsConnection};
use crate::manager::SessionManager;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Routes:
///
/// * `/` and `/ws` accept the client websocket
/// * `/health` reports the number of live sessions
pub fn router(manager: SessionManager) -> Router {
    // Browser frontends connect from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(manager)
}

/// Serves `listener` until `shutdown` resolves, then closes every live
/// session.
pub async fn serve<F>(listener: TcpListener, manager: SessionManager, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(manager.clone());
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutting down, {} live sessions", manager.len());
            manager.shutdown().await;
        })
        .await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<SessionManager>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    info!(peer = %addr, "websocket upgrade request");
    ws.on_upgrade(move |socket| handle_socket(socket, addr, manager))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, manager: SessionManager) {
    let id = uuid::Uuid::new_v4().to_string();
    let client: Arc<dyn ConnectionHandle> = Arc::new(WsConnection::new(id.clone(), socket));
    info!(session = %id, peer = %addr, "client connected");

    match manager.on_client_connect(client).await {
        Ok(exit) => info!(session = %id, "connection finished: {}", exit),
        Err(e) => tracing::warn!(session = %id, "connection refused: {}", e),
    }
}

async fn health(State(manager): State<SessionManager>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": manager.len(),
    }))
}
