//! Inbox — session listings and detail for the dashboard.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde_json::json;

use nx_domain::error::Error;
use nx_domain::id::{ProjectId, SessionId};
use nx_sessions::InboxFilter;

use crate::api::envelope::{fail, ok};
use crate::state::AppState;

/// GET /projects/:project_id/inbox
pub async fn list(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<InboxFilter>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    let sessions = state.sessions.inbox(&project_id, &filter);
    ok(json!({ "sessions": sessions, "count": sessions.len() }))
}

/// GET /projects/:project_id/inbox/:session_id
pub async fn detail(
    State(state): State<AppState>,
    Path((project_id, session_id)): Path<(String, String)>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    let session_id = SessionId::from(session_id);

    let Some(session) = state.sessions.get(&session_id) else {
        return fail(&Error::NotFound(format!("session {session_id}")));
    };
    if session.project_id != project_id {
        return fail(&Error::NotFound(format!("session {session_id}")));
    }

    let messages = state.sessions.messages(&session_id);
    ok(json!({ "session": session, "messages": messages }))
}
