use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{debug, info};

use super::AppState;

/// `GET /ws/live` — dashboards subscribe here for a best-effort stream of
/// request logs and alerts. The socket is otherwise read-only from the
/// client's perspective: incoming frames are drained only to detect
/// disconnects (matching the original's heartbeat-only client behaviour),
/// never interpreted as commands.
pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (subscriber_id, mut events) = state.live_bus.subscribe();
    info!(subscriber = %subscriber_id, "live bus subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let Ok(payload) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.live_bus.unsubscribe(subscriber_id);
    debug!(subscriber = %subscriber_id, "live bus subscriber disconnected");
}
