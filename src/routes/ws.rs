//! WebSocket upgrade + message loop. Clients subscribe to a room; question
//! batches published for that room are forwarded as they arrive.

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
  info!(target: "quizcast_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Await the next published batch, or park forever while unsubscribed.
async fn next_batch(sub: &mut Option<broadcast::Receiver<String>>) -> Option<String> {
  match sub {
    Some(rx) => loop {
      match rx.recv().await {
        Ok(payload) => return Some(payload),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          warn!(target: "quizcast_backend", skipped, "WS subscriber lagged; dropping old batches");
        }
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    },
    None => std::future::pending().await,
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: AppState) {
  info!(target: "quizcast_backend", "WebSocket connected");
  let mut sub: Option<broadcast::Receiver<String>> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(ClientWsMessage::Ping) => ServerWsMessage::Pong,
              Ok(ClientWsMessage::Subscribe { room_id }) => {
                let key = format!("room:{room_id}");
                sub = Some(state.notifier.subscribe(&key).await);
                info!(target: "quizcast_backend", %room_id, "WS subscribed to room");
                ServerWsMessage::Subscribed { room_id }
              }
              Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
            };
            let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
              serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
            });
            if let Err(e) = socket.send(Message::Text(out)).await {
              error!(target: "quizcast_backend", error = %e, "WS send error");
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      batch = next_batch(&mut sub) => {
        match batch {
          Some(payload) => {
            if let Err(e) = socket.send(Message::Text(payload)).await {
              error!(target: "quizcast_backend", error = %e, "WS batch forward error");
              break;
            }
          }
          // Channel closed; drop the dead subscription but keep the socket.
          None => sub = None,
        }
      }
    }
  }
  info!(target: "quizcast_backend", "WebSocket disconnected");
}
