//! Dashboard overview — aggregated counts across the deployment.

use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::api::envelope::ok;
use crate::state::AppState;

/// GET /dashboard/overview
pub async fn overview(State(state): State<AppState>) -> Response {
    ok(json!({
        "active_projects": state.projects.count_active(),
        "sessions": state.sessions.session_count(),
        "messages": state.sessions.message_count(),
        "traces": state.traces.count(),
        "usage_records": state.usage.record_count(),
        "scheduled_tasks": state.tasks.task_count(),
        "pending_proactive": state.proactive.pending_count(),
    }))
}
