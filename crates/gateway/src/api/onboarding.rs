//! Onboarding — provision a project, its three active prompt layers,
//! a channel integration, and an agent identity in one call.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use nx_domain::config::{AgentConfig, Environment, Project, ProjectStatus};
use nx_domain::error::Error;
use nx_domain::id::{AgentId, ProjectId};

use crate::api::envelope::{created, fail};
use crate::runtime::prompt::LayerType;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    /// Explicit project id; minted when absent.
    #[serde(default)]
    pub id: Option<ProjectId>,
    pub name: String,
    pub environment: Environment,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub agent_config: AgentConfig,
    pub prompts: ProvisionPrompts,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionPrompts {
    pub identity: String,
    pub instructions: String,
    pub safety: String,
}

/// POST /onboarding/provision
pub async fn provision(
    State(state): State<AppState>,
    Json(body): Json<ProvisionRequest>,
) -> Response {
    if body.name.trim().is_empty() {
        return fail(&Error::validation("name", "must not be empty"));
    }

    let project_id = body.id.unwrap_or_default();
    if state.projects.get(&project_id).is_ok() {
        return fail(&Error::Conflict(format!(
            "project {project_id} already exists"
        )));
    }

    let project = Project {
        id: project_id.clone(),
        name: body.name,
        environment: body.environment,
        owner: body.owner.clone(),
        tags: body.tags,
        config: body.agent_config,
        status: ProjectStatus::Active,
    };
    state.projects.insert(project);

    let identity =
        state
            .prompts
            .add_active(&project_id, LayerType::Identity, body.prompts.identity, &body.owner);
    let instructions = state.prompts.add_active(
        &project_id,
        LayerType::Instructions,
        body.prompts.instructions,
        &body.owner,
    );
    let safety =
        state
            .prompts
            .add_active(&project_id, LayerType::Safety, body.prompts.safety, &body.owner);

    // Wire the requested channel through the console stand-in adapter;
    // real channel integrations replace it at their own startup.
    if let Some(channel) = &body.channel {
        state
            .adapters
            .register(&project_id, Arc::new(crate::bootstrap::ConsoleAdapter::new(channel)));
    }

    let agent_id = AgentId::new();

    tracing::info!(project_id = %project_id, "project provisioned");

    created(json!({
        "project_id": project_id,
        "agent_id": agent_id,
        "channel": body.channel,
        "prompt_layers": {
            "identity": { "id": identity.id, "version": identity.version },
            "instructions": { "id": instructions.id, "version": instructions.version },
            "safety": { "id": safety.id, "version": safety.version },
        }
    }))
    .into_response()
}
