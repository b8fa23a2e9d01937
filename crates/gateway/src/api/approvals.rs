//! Approval review endpoints — the out-of-band half of the approval
//! gate. A run parked in `human_approval_pending` is re-initiated by
//! the client after the reviewer decides here.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use nx_domain::error::Error;
use nx_domain::id::{ApprovalId, ProjectId};

use crate::api::envelope::{fail, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub approve: bool,
    pub resolver: String,
}

/// GET /projects/:project_id/approvals
pub async fn list_pending(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    ok(json!({ "pending": state.approvals.list_pending(&project_id) }))
}

/// POST /approvals/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let id = ApprovalId::from(id);
    if state.approvals.resolve(&id, body.approve, &body.resolver) {
        ok(json!({ "resolved": true, "approved": body.approve }))
    } else {
        fail(&Error::NotFound(format!(
            "approval {id} (unknown or already resolved)"
        )))
    }
}
