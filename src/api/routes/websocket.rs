use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade, Message},
        State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, error, debug, warn};
use crate::api::AppState;


pub async fn notifications_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_notifications_socket(socket, state))
}

async fn handle_notifications_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 New WebSocket client connected: notifications");

    let mut rx = state.notifier.subscribe();

    let welcome = serde_json::json!({
        "type": "connected",
        "channel": "notifications",
        "message": "Connected to large transaction alerts"
    });

    if sender.send(Message::Text(welcome.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {

            alert = rx.recv() => {
                match alert {
                    Ok(alert) => {
                        let payload = match serde_json::to_string(&alert) {
                            Ok(p) => p,
                            Err(e) => {
                                error!("Failed to serialize alert: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            debug!("Client disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged, {} alerts dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(ping))) => {
                        if sender.send(Message::Pong(ping)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected: notifications");
}
