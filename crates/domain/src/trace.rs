//! Execution-trace data model.
//!
//! One [`ExecutionTrace`] per agent run: an append-only list of
//! [`TraceEvent`]s plus run-level totals, immutable once flushed. The
//! event list is the audit surface — adding kinds is backward
//! compatible, renaming is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ProjectId, PromptLayerId, SessionId, TraceId};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    BudgetExceeded,
    MaxTurns,
    HumanApprovalPending,
    Aborted,
}

impl TraceStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    LlmRequest,
    LlmResponse,
    ToolCall,
    ToolResult,
    ToolBlocked,
    ToolHallucination,
    ApprovalRequested,
    ApprovalResolved,
    MemoryRetrieval,
    MemoryStore,
    Compaction,
    Error,
    CostCheck,
    CostAlert,
    Failover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: u32,
    pub kind: TraceEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which prompt layer versions a run was assembled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    pub layer_id: PromptLayerId,
    pub version: u32,
}

/// Uniquely identifies the assembled system prompt for audit and
/// regression analysis: three layer refs plus digests of the two
/// runtime-synthesized sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSnapshot {
    pub identity: LayerRef,
    pub instructions: LayerRef,
    pub safety: LayerRef,
    /// SHA-256 (hex) of the Available Tools section.
    pub tools_sha256: String,
    /// SHA-256 (hex) of the Relevant Context section.
    pub context_sha256: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: TraceId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_snapshot: Option<PromptSnapshot>,
    pub events: Vec<TraceEvent>,
    pub total_duration_ms: u64,
    pub total_tokens_used: u64,
    pub total_cost_usd: f64,
    pub turn_count: u32,
    pub status: TraceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionTrace {
    pub fn count_events(&self, kind: TraceEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}
