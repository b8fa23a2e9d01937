//! WebSocket chat endpoint — the interactive entry into the agent loop.
//!
//! Flow:
//! 1. Client connects to `/chat/stream`
//! 2. Client sends `{projectId?, sessionId?, message, metadata?}` frames
//! 3. The gateway streams `AgentStreamEvent` JSON frames for the run
//! 4. One run per connection at a time; a second inbound message while
//!    a run is in progress gets `{type: "error", code: "BUSY"}`
//! 5. Client disconnect cancels the in-flight run; errors keep the
//!    connection open for the next message

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use nx_domain::id::{ProjectId, SessionId};
use nx_domain::stream::AgentStreamEvent;
use nx_sessions::SessionMetadata;

use crate::runtime::{run_agent, RunRequest};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    pub project_id: ProjectId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /chat/stream — upgrade to WebSocket.
pub async fn chat_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    event: &AgentStreamEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sink.send(WsMessage::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "chat event serialization failed");
            true
        }
    }
}

async fn send_error(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    code: &str,
    message: &str,
) -> bool {
    let frame = json!({ "type": "error", "code": code, "message": message });
    sink.send(WsMessage::Text(frame.to_string())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    'connection: while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue, // ping/pong/binary — ignore
        };

        let request: ChatStreamRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                if !send_error(&mut sink, "VALIDATION_ERROR", &e.to_string()).await {
                    break;
                }
                continue;
            }
        };
        if request.message.trim().is_empty() {
            if !send_error(&mut sink, "VALIDATION_ERROR", "message must not be empty").await {
                break;
            }
            continue;
        }

        let project = match state.projects.get(&request.project_id) {
            Ok(p) => p,
            Err(e) => {
                if !send_error(&mut sink, e.code(), &e.to_string()).await {
                    break;
                }
                continue;
            }
        };

        let session = match state.sessions.get_or_create(
            request.session_id.as_ref(),
            &project.id,
            request.metadata.unwrap_or_default(),
        ) {
            Ok(s) => s,
            Err(e) => {
                if !send_error(&mut sink, e.code(), &e.to_string()).await {
                    break;
                }
                continue;
            }
        };

        // One run per connection (and per session) at a time.
        let permit = match state.session_locks.try_acquire(&session.id) {
            Ok(p) => p,
            Err(busy) => {
                if !send_error(&mut sink, "BUSY", &busy.to_string()).await {
                    break;
                }
                continue;
            }
        };

        let variables = crate::config::default_prompt_vars(&project);
        let (trace_id, mut events) = run_agent(
            state.clone(),
            RunRequest {
                project,
                session_id: session.id.clone(),
                user_message: request.message,
                variables,
            },
        );

        // Relay run events while watching the socket: another message
        // mid-run is BUSY, a disconnect cancels the run.
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            if !send_event(&mut sink, &event).await {
                                state.cancel_map.cancel(&trace_id);
                                break 'connection;
                            }
                        }
                        None => break, // run finished
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(_))) => {
                            if !send_error(&mut sink, "BUSY", "a run is already in progress").await {
                                state.cancel_map.cancel(&trace_id);
                                break 'connection;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                            tracing::debug!(trace_id = %trace_id, "client disconnected, cancelling run");
                            state.cancel_map.cancel(&trace_id);
                            // Let the runner flush its aborted trace.
                            while events.recv().await.is_some() {}
                            break 'connection;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary
                    }
                }
            }
        }

        drop(permit);
    }
}
