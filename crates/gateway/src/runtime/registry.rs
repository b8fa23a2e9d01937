//! Tool registry — schema-validated dispatch behind a per-run allow-list.
//!
//! Registries are plain per-process instances (tests build their own).
//! `resolve` runs the full pipeline: lookup, RBAC, input validation,
//! approval gate, execution. Validation and RBAC failures emit
//! `tool_blocked` trace events; execution failures are captured in the
//! returned [`ToolResult`] rather than aborting the run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use nx_domain::config::MemoryConfig;
use nx_domain::error::{Error, Result};
use nx_domain::id::{ProjectId, SessionId, TraceId};
use nx_domain::message::ToolDefinition;
use nx_domain::trace::TraceEventKind;
use nx_memory::MemoryManager;
use nx_secrets::SecretStore;

use super::approval::ApprovalGate;
use super::comms::AgentBus;
use super::schema::validate_input;
use super::trace::TraceRecorder;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// The contract every executable tool implements.
#[async_trait]
pub trait ExecutableTool: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    fn risk_level(&self) -> RiskLevel;
    fn requires_approval(&self) -> bool {
        false
    }
    fn side_effects(&self) -> bool {
        false
    }
    fn supports_dry_run(&self) -> bool {
        false
    }
    /// JSON Schema the raw input is validated against.
    fn input_schema(&self) -> Value;
    fn output_schema(&self) -> Value {
        json!({ "type": "object" })
    }
    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<Value>;
    /// Validation-and-planning path without external side effects.
    async fn dry_run(&self, _input: &Value, _ctx: &ToolContext) -> Result<Value> {
        Err(Error::ToolExecution {
            tool_id: self.id().to_owned(),
            message: "dry run not supported".into(),
        })
    }

    /// The definition exposed to the LLM.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id().to_owned(),
            description: self.description().to_owned(),
            parameters: self.input_schema(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct ToolPermissions {
    pub allowed_tools: HashSet<String>,
}

impl ToolPermissions {
    pub fn from_ids<I: IntoIterator<Item = S>, S: Into<String>>(ids: I) -> Self {
        Self {
            allowed_tools: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything a tool (and the resolve pipeline) can reach at dispatch
/// time. Service handles are optional so tests stay lightweight.
#[derive(Clone)]
pub struct ToolContext {
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub trace_id: TraceId,
    pub permissions: ToolPermissions,
    pub memory_config: MemoryConfig,
    pub secrets: Option<Arc<SecretStore>>,
    pub memory: Option<Arc<MemoryManager>>,
    pub approvals: Option<Arc<ApprovalGate>>,
    pub bus: Option<Arc<AgentBus>>,
    pub recorder: Option<Arc<TraceRecorder>>,
    /// The `tool_call` event this dispatch belongs to, for pairing.
    pub parent_event_id: Option<u32>,
}

impl ToolContext {
    pub fn new(project_id: ProjectId, session_id: SessionId, trace_id: TraceId) -> Self {
        Self {
            project_id,
            session_id,
            trace_id,
            permissions: ToolPermissions::default(),
            memory_config: MemoryConfig::default(),
            secrets: None,
            memory: None,
            approvals: None,
            bus: None,
            recorder: None,
            parent_event_id: None,
        }
    }

    pub fn with_allowed<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.permissions = ToolPermissions::from_ids(ids);
        self
    }

    fn record_blocked(&self, tool_id: &str, reason: &str, detail: Value) {
        if let Some(recorder) = &self.recorder {
            let data = json!({
                "tool_id": tool_id,
                "reason": reason,
                "detail": detail,
            });
            match self.parent_event_id {
                Some(parent) => {
                    recorder.append_child(TraceEventKind::ToolBlocked, data, 0, parent);
                }
                None => {
                    recorder.append(TraceEventKind::ToolBlocked, data);
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one dispatched tool call. `duration_ms` is always
/// populated, including on execution failure.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn ExecutableTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by id; the last registration wins.
    pub fn register(&self, tool: Arc<dyn ExecutableTool>) {
        self.tools.write().insert(tool.id().to_owned(), tool);
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.tools.write().remove(id).is_some()
    }

    pub fn has(&self, id: &str) -> bool {
        self.tools.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ExecutableTool>> {
        self.tools.read().get(id).cloned()
    }

    pub fn list_all(&self) -> Vec<Arc<dyn ExecutableTool>> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.id().cmp(b.id()));
        tools
    }

    /// Definitions for the tools a run may invoke, in stable order.
    pub fn definitions_for(&self, permissions: &ToolPermissions) -> Vec<ToolDefinition> {
        self.list_all()
            .into_iter()
            .filter(|t| permissions.allowed_tools.contains(t.id()))
            .map(|t| t.definition())
            .collect()
    }

    /// Full dispatch pipeline.
    pub async fn resolve(
        &self,
        id: &str,
        raw_input: &Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        self.resolve_inner(id, raw_input, ctx, false).await
    }

    /// Same pipeline, invoking the tool's dry-run path. RBAC and
    /// validation are still enforced.
    pub async fn resolve_dry_run(
        &self,
        id: &str,
        raw_input: &Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        self.resolve_inner(id, raw_input, ctx, true).await
    }

    async fn resolve_inner(
        &self,
        id: &str,
        raw_input: &Value,
        ctx: &ToolContext,
        dry_run: bool,
    ) -> Result<ToolResult> {
        // 1. Lookup.
        let tool = self
            .get(id)
            .ok_or_else(|| Error::ToolNotFound(id.to_owned()))?;

        // 2. RBAC before anything observable.
        if !ctx.permissions.allowed_tools.contains(id) {
            ctx.record_blocked(id, "TOOL_NOT_ALLOWED", Value::Null);
            return Err(Error::ToolNotAllowed {
                tool_id: id.to_owned(),
            });
        }

        // 3. Input validation.
        let errors = validate_input(&tool.input_schema(), raw_input);
        if !errors.is_empty() {
            ctx.record_blocked(id, "VALIDATION_ERROR", json!(errors));
            return Err(Error::Validation { fields: errors });
        }

        // 4. Approval gate (skipped when already approved for this trace).
        if tool.requires_approval() && !dry_run {
            let approved = ctx
                .approvals
                .as_ref()
                .map(|gate| gate.is_approved(&ctx.trace_id, id))
                .unwrap_or(false);
            if approved {
                if let Some(recorder) = &ctx.recorder {
                    recorder.append(
                        TraceEventKind::ApprovalResolved,
                        json!({ "tool_id": id, "decision": "approved" }),
                    );
                }
            } else {
                let approval_id = match &ctx.approvals {
                    Some(gate) => gate.request(
                        ctx.project_id.clone(),
                        ctx.session_id.clone(),
                        ctx.trace_id.clone(),
                        id,
                        raw_input.clone(),
                    ),
                    None => nx_domain::id::ApprovalId::new(),
                };
                if let Some(recorder) = &ctx.recorder {
                    recorder.append(
                        TraceEventKind::ApprovalRequested,
                        json!({ "tool_id": id, "approval_id": approval_id }),
                    );
                }
                return Err(Error::ApprovalPending { approval_id });
            }
        }

        // 5. Execute (or dry-run); wrap failures into the result.
        let start = Instant::now();
        let outcome = if dry_run {
            tool.dry_run(raw_input, ctx).await
        } else {
            tool.execute(raw_input, ctx).await
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(match outcome {
            Ok(output) => ToolResult {
                success: true,
                output,
                duration_ms,
                error: None,
            },
            Err(e) => {
                tracing::warn!(tool_id = id, error = %e, "tool execution failed");
                ToolResult {
                    success: false,
                    output: Value::Null,
                    duration_ms,
                    error: Some(format!("TOOL_EXECUTION_ERROR: {e}")),
                }
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
