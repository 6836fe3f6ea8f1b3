use axum::{
    extract::{ws::Message, Path, State, WebSocketUpgrade},
    response::Response,
};
use axum::extract::ws::WebSocket;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::events::{Event, EventSender, TransportError};
use crate::orchestrator::SessionOrchestrator;
use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    info!("WebSocket connection established for session {}", session_id);

    let (mut sink, mut stream) = socket.split();

    // One forwarding task per connection keeps outbound events ordered while
    // the session task and the pipeline task both produce them.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let events = EventSender::new(session_id.clone(), tx);
    let mut orchestrator = match SessionOrchestrator::from_state(session_id.clone(), &state, events.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("failed to initialize session {}: {}", session_id, e);
            let _ = events.send(Event::error(
                "Session initialization failed",
                e.to_string(),
                false,
            ));
            forward.abort();
            return;
        }
    };

    let _ = events.send(Event::status("connected"));

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = orchestrator.handle_message(&text).await {
                    if e.downcast_ref::<TransportError>().is_some() {
                        error!("event channel failed for session {}", session_id);
                        break;
                    }
                    error!("error handling message for {}: {}", session_id, e);
                }
            }
            Ok(Message::Close(_)) => {
                info!("client disconnected from session {}", session_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error on session {}: {}", session_id, e);
                break;
            }
            _ => {}
        }
    }

    // Cancel any response still in flight for this session.
    if let Some((_, handle)) = state.response_tasks.remove(&session_id) {
        handle.abort();
    }
    forward.abort();

    info!("Cleaned up session {}", session_id);
}
