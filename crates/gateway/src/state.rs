use std::sync::Arc;

use nx_memory::MemoryManager;
use nx_secrets::SecretStore;
use nx_sessions::SessionStore;

use crate::config::GatewayConfig;
use crate::projects::{McpServerStore, ProjectStore};
use crate::runtime::approval::ApprovalGate;
use crate::runtime::cancel::CancelMap;
use crate::runtime::comms::AgentBus;
use crate::runtime::cost::CostGuard;
use crate::runtime::proactive::{AdapterRegistry, ProactiveQueue};
use crate::runtime::prompt::PromptLayerStore;
use crate::runtime::registry::ToolRegistry;
use crate::runtime::schedule::TaskStore;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::trace::TraceStore;
use crate::runtime::usage::UsageStore;

/// Shared application state passed to all API handlers and the runner.
///
/// Fields are grouped by concern:
/// - **Core services** — config, projects, tool registry
/// - **Run state** — sessions, traces, usage, cost guard, cancellation
/// - **Prompting & memory** — prompt layers, long-term memory
/// - **Coordination** — approvals, inter-agent bus, session locks
/// - **Outbound** — scheduled tasks, proactive queue, channel adapters
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<GatewayConfig>,
    pub projects: Arc<ProjectStore>,
    pub mcp_servers: Arc<McpServerStore>,
    pub tools: Arc<ToolRegistry>,
    pub secrets: Arc<SecretStore>,

    // ── Run state ─────────────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub traces: Arc<TraceStore>,
    pub usage: Arc<UsageStore>,
    pub cost_guard: Arc<CostGuard>,
    pub cancel_map: Arc<CancelMap>,

    // ── Prompting & memory ────────────────────────────────────────────
    pub prompts: Arc<PromptLayerStore>,
    pub memory: Arc<MemoryManager>,

    // ── Coordination ──────────────────────────────────────────────────
    pub approvals: Arc<ApprovalGate>,
    pub bus: Arc<AgentBus>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Outbound ──────────────────────────────────────────────────────
    pub tasks: Arc<TaskStore>,
    pub proactive: Arc<ProactiveQueue>,
    pub adapters: Arc<AdapterRegistry>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
