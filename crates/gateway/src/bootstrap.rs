//! Server bootstrap: build the application state, start background
//! workers, and serve the API.

use std::sync::Arc;

use anyhow::Context;

use nx_domain::error::Result;
use nx_domain::id::ProjectId;
use nx_memory::MemoryManager;
use nx_secrets::{MasterKey, SecretCipher, SecretStore};
use nx_sessions::SessionStore;

use crate::config::{load_project_file, GatewayConfig};
use crate::projects::{McpServerStore, ProjectStore};
use crate::runtime::approval::ApprovalGate;
use crate::runtime::cancel::CancelMap;
use crate::runtime::comms::AgentBus;
use crate::runtime::cost::CostGuard;
use crate::runtime::proactive::{AdapterRegistry, ChannelAdapter, ProactiveQueue};
use crate::runtime::prompt::PromptLayerStore;
use crate::runtime::registry::ToolRegistry;
use crate::runtime::schedule::TaskStore;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::trace::TraceStore;
use crate::runtime::usage::UsageStore;
use crate::state::AppState;
use crate::tools::register_builtin_tools;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Console adapter — the development stand-in channel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logs outbound messages instead of delivering them. Real channel
/// adapters (WhatsApp, Telegram, …) are wired in by their integrations.
pub struct ConsoleAdapter {
    channel: String,
}

impl ConsoleAdapter {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for ConsoleAdapter {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn send(&self, recipient: &str, content: &str) -> Result<()> {
        tracing::info!(channel = %self.channel, recipient, chars = content.len(), "outbound message");
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full application state. Fails loudly when the secrets
/// master key is missing or malformed.
pub fn build_state(config: GatewayConfig) -> Result<AppState> {
    let master_key = MasterKey::from_env()?;
    let secrets = Arc::new(SecretStore::new(SecretCipher::new(&master_key)));

    let trace_path = config.data_dir.as_ref().map(|d| d.join("traces.jsonl"));
    let usage_path = config.data_dir.as_ref().map(|d| d.join("usage.jsonl"));

    let usage = Arc::new(UsageStore::new(usage_path));
    let cost_guard = Arc::new(CostGuard::new(usage.clone()));

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools);

    let projects = Arc::new(ProjectStore::new());
    let adapters = Arc::new(AdapterRegistry::new());
    for path in &config.project_files {
        let project = load_project_file(path)?;
        tracing::info!(project_id = %project.id, path = %path.display(), "project loaded");
        register_default_adapter(&adapters, &project.id);
        projects.insert(project);
    }

    Ok(AppState {
        config: Arc::new(config),
        projects,
        mcp_servers: Arc::new(McpServerStore::new()),
        tools,
        secrets,
        sessions: Arc::new(SessionStore::new()),
        traces: Arc::new(TraceStore::new(trace_path)),
        usage,
        cost_guard,
        cancel_map: Arc::new(CancelMap::new()),
        prompts: Arc::new(PromptLayerStore::new()),
        // No embedding provider configured at bootstrap: retrieval
        // returns empty context until one is wired in.
        memory: Arc::new(MemoryManager::new(None)),
        approvals: Arc::new(ApprovalGate::new()),
        bus: Arc::new(AgentBus::new()),
        session_locks: Arc::new(SessionLockMap::new()),
        tasks: Arc::new(TaskStore::new()),
        proactive: Arc::new(ProactiveQueue::new()),
        adapters,
    })
}

/// Register the console stand-in for a project's default channel.
pub fn register_default_adapter(adapters: &AdapterRegistry, project: &ProjectId) {
    adapters.register(project, Arc::new(ConsoleAdapter::new("console")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start the gateway: background workers plus the HTTP listener.
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;

    let state = build_state(config).context("building application state")?;

    // Background workers.
    tokio::spawn(crate::runtime::schedule::run_scheduler(state.clone()));
    tokio::spawn(crate::runtime::proactive::run_worker(
        state.proactive.clone(),
        state.adapters.clone(),
    ));

    let router = crate::api::router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "nexus gateway listening");
    axum::serve(listener, router).await.context("serving")?;
    Ok(())
}
