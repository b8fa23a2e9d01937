//! Secret vault endpoints. Values go in and never come back out — the
//! surface returns metadata and existence checks only.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use nx_domain::id::ProjectId;

use crate::api::envelope::{created, fail, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SecretUpsert {
    pub key: Option<String>,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// GET /projects/:project_id/secrets — metadata only.
pub async fn list(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    ok(json!({ "secrets": state.secrets.list(&project_id) }))
}

/// POST /projects/:project_id/secrets — create with `key` in the body.
pub async fn create(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<SecretUpsert>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    let key = body.key.unwrap_or_default();
    match state
        .secrets
        .set(&project_id, &key, &body.value, body.description)
    {
        Ok(()) => created(json!({ "key": key })),
        Err(e) => fail(&e),
    }
}

/// PUT /projects/:project_id/secrets/:key — upsert one key.
pub async fn put(
    State(state): State<AppState>,
    Path((project_id, key)): Path<(String, String)>,
    Json(body): Json<SecretUpsert>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    match state
        .secrets
        .set(&project_id, &key, &body.value, body.description)
    {
        Ok(()) => ok(json!({ "key": key })),
        Err(e) => fail(&e),
    }
}

/// DELETE /projects/:project_id/secrets/:key — absence is not an error.
pub async fn delete(
    State(state): State<AppState>,
    Path((project_id, key)): Path<(String, String)>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    let deleted = state.secrets.delete(&project_id, &key);
    ok(json!({ "deleted": deleted }))
}

/// GET /projects/:project_id/secrets/:key/exists
pub async fn exists(
    State(state): State<AppState>,
    Path((project_id, key)): Path<(String, String)>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    ok(json!({ "exists": state.secrets.exists(&project_id, &key) }))
}
