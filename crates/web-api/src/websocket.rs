use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use position_guard_orchestrator::AccountRegistry;
use std::sync::Arc;
use tokio::time::{interval, Duration};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<AccountRegistry>>,
) -> Response {
    ws.on_upgrade(|socket| websocket_connection(socket, registry))
}

async fn websocket_connection(mut socket: WebSocket, registry: Arc<AccountRegistry>) {
    let mut tick = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // Push account statuses every second
                let statuses = registry.statuses().await;
                let json = match serde_json::to_string(&statuses) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!("Failed to encode account statuses: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::info!("Status stream connection closed");
}
