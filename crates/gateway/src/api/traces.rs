//! Execution trace inspection.

use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;

use nx_domain::error::Error;
use nx_domain::id::{SessionId, TraceId};

use crate::api::envelope::{fail, ok};
use crate::state::AppState;

/// GET /sessions/:session_id/traces
pub async fn for_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId::from(session_id);
    if state.sessions.get(&session_id).is_none() {
        return fail(&Error::NotFound(format!("session {session_id}")));
    }
    let traces = state.traces.for_session(&session_id);
    ok(json!({ "traces": traces, "count": traces.len() }))
}

/// GET /traces/:id
pub async fn by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = TraceId::from(id);
    match state.traces.get(&id) {
        Some(trace) => ok(trace),
        None => fail(&Error::NotFound(format!("trace {id}"))),
    }
}
