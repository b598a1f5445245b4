//! WebSocket upgrade + message loop. Each connection owns one session.
//! Client messages are parsed as JSON and dispatched; every session change
//! (including responses that arrive later) is pushed as a `session` message.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::QuestionParams;
use crate::logic::dispatch;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::Event;
use crate::state::{AppState, SessionHandle};

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "evocode_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let handle = state.create_session().await;
  let mut updates = handle.subscribe();
  let id = updates.borrow().id;
  info!(target: "evocode_backend", %id, "WebSocket connected");

  // Initial snapshot.
  let initial = ServerWsMessage::Session { session: updates.borrow_and_update().clone() };
  if send(&mut socket, &initial).await.is_err() {
    state.remove_session(&id).await;
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(parsed) => {
                debug!(target: "evocode_backend", %id, "WS received: {:?}", &parsed);
                handle_client_ws(parsed, &state, &handle).await
              }
              Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
            };
            if let Some(reply) = reply {
              if let Err(e) = send(&mut socket, &reply).await {
                error!(target: "evocode_backend", %id, error = %e, "WS send error");
                break;
              }
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      changed = updates.changed() => {
        if changed.is_err() { break; }
        let view = updates.borrow_and_update().clone();
        if let Err(e) = send(&mut socket, &ServerWsMessage::Session { session: view }).await {
          error!(target: "evocode_backend", %id, error = %e, "WS send error");
          break;
        }
      }
    }
  }

  state.remove_session(&id).await;
  info!(target: "evocode_backend", %id, "WebSocket disconnected");
}

/// Session changes are delivered through the watch channel, so successful
/// actions need no direct reply; only pings and rejections answer here.
async fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, handle: &Arc<SessionHandle>) -> Option<ServerWsMessage> {
  let event = match msg {
    ClientWsMessage::Ping => return Some(ServerWsMessage::Pong),
    ClientWsMessage::Generate { topic, level, instruction } => {
      Event::Generate(QuestionParams { topic, level, instruction })
    }
    ClientWsMessage::UpdateCode { code } => Event::EditCode(code),
    ClientWsMessage::SetDifficulty { difficulty } => Event::SetDifficulty(difficulty),
    ClientWsMessage::Submit => Event::Submit,
    ClientWsMessage::TogglePanel => Event::TogglePanel,
  };
  match dispatch(state, handle, event).await {
    Ok(_) => None,
    Err(e) => Some(ServerWsMessage::Error { message: e.to_string() }),
  }
}
