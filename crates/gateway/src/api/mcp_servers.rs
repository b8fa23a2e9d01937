//! Tool-server catalog: templates plus per-project instances.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde_json::json;

use nx_domain::id::ProjectId;

use crate::api::envelope::{created, fail, ok};
use crate::projects::{McpServerCreate, McpServerPatch};
use crate::state::AppState;

/// GET /projects/:project_id/mcp-servers
pub async fn list(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    ok(json!({
        "templates": state.mcp_servers.templates(),
        "instances": state.mcp_servers.list(&project_id),
    }))
}

/// POST /projects/:project_id/mcp-servers — 409 on duplicate name.
pub async fn create(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<McpServerCreate>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    match state.mcp_servers.create(&project_id, body) {
        Ok(instance) => created(instance),
        Err(e) => fail(&e),
    }
}

/// PATCH /projects/:project_id/mcp-servers/:id
pub async fn patch(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(body): Json<McpServerPatch>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    match state.mcp_servers.patch(&project_id, &id, body) {
        Ok(instance) => ok(instance),
        Err(e) => fail(&e),
    }
}

/// DELETE /projects/:project_id/mcp-servers/:id
pub async fn delete(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    match state.mcp_servers.delete(&project_id, &id) {
        Ok(()) => ok(json!({ "deleted": true })),
        Err(e) => fail(&e),
    }
}
