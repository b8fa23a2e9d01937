//! Proactive outbound messaging endpoints.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use nx_domain::error::Error;
use nx_domain::id::ProjectId;

use crate::api::envelope::{fail, ok};
use crate::runtime::proactive::ProactiveRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveBody {
    pub channel: String,
    pub recipient_identifier: String,
    pub content: String,
    #[serde(default)]
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
}

/// POST /projects/:project_id/proactive
///
/// Due-now messages are sent inline (`{sent: true}`); future ones are
/// queued (`{scheduled: true, job_id}`).
pub async fn send(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<ProactiveBody>,
) -> Response {
    let project_id = ProjectId::from(project_id);
    if let Err(e) = state.projects.get(&project_id) {
        return fail(&e);
    }
    if body.content.trim().is_empty() {
        return fail(&Error::validation("content", "must not be empty"));
    }

    let due_now = body.scheduled_for.is_none_or(|t| t <= Utc::now());
    if due_now {
        let Some(adapter) = state.adapters.resolve(&project_id, &body.channel) else {
            return fail(&Error::NotFound(format!(
                "no channel adapter for '{}'",
                body.channel
            )));
        };
        return match adapter.send(&body.recipient_identifier, &body.content).await {
            Ok(()) => ok(json!({ "sent": true })),
            Err(e) => fail(&e),
        };
    }

    let job_id = state.proactive.schedule(ProactiveRequest {
        project_id,
        channel: body.channel,
        recipient_identifier: body.recipient_identifier,
        content: body.content,
        scheduled_for: body.scheduled_for,
    });
    ok(json!({ "scheduled": true, "job_id": job_id }))
}

/// DELETE /projects/:project_id/proactive/:job_id
pub async fn cancel(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
) -> Response {
    ok(json!({ "cancelled": state.proactive.cancel(&job_id) }))
}
