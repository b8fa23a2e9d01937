//! HTTP and WebSocket surface.

pub mod approvals;
pub mod chat;
pub mod dashboard;
pub mod envelope;
pub mod inbox;
pub mod mcp_servers;
pub mod onboarding;
pub mod proactive;
pub mod secrets;
pub mod traces;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Onboarding
        .route("/onboarding/provision", post(onboarding::provision))
        // Inbox
        .route("/projects/:project_id/inbox", get(inbox::list))
        .route("/projects/:project_id/inbox/:session_id", get(inbox::detail))
        // Traces
        .route("/sessions/:session_id/traces", get(traces::for_session))
        .route("/traces/:id", get(traces::by_id))
        // Tool servers
        .route(
            "/projects/:project_id/mcp-servers",
            get(mcp_servers::list).post(mcp_servers::create),
        )
        .route(
            "/projects/:project_id/mcp-servers/:id",
            patch(mcp_servers::patch).delete(mcp_servers::delete),
        )
        // Secrets
        .route(
            "/projects/:project_id/secrets",
            get(secrets::list).post(secrets::create),
        )
        .route(
            "/projects/:project_id/secrets/:key",
            put(secrets::put).delete(secrets::delete),
        )
        .route(
            "/projects/:project_id/secrets/:key/exists",
            get(secrets::exists),
        )
        // Proactive
        .route("/projects/:project_id/proactive", post(proactive::send))
        .route(
            "/projects/:project_id/proactive/:job_id",
            delete(proactive::cancel),
        )
        // Approvals
        .route("/projects/:project_id/approvals", get(approvals::list_pending))
        .route("/approvals/:id/resolve", post(approvals::resolve))
        // Dashboard
        .route("/dashboard/overview", get(dashboard::overview))
        // Chat
        .route("/chat/stream", get(chat::chat_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
