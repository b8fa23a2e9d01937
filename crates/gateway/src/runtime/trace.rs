//! Execution-trace recording — the append-only audit record of one run.
//!
//! A [`TraceRecorder`] lives for the duration of a run, appending events
//! in occurrence order from a single clock source. `flush` computes the
//! run-level totals, seals the record, and hands it to the
//! [`TraceStore`] (bounded in-memory ring + JSONL file). Flushed traces
//! are immutable.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use nx_domain::id::{ProjectId, SessionId, TraceId};
use nx_domain::stream::Usage;
use nx_domain::trace::{
    ExecutionTrace, PromptSnapshot, TraceEvent, TraceEventKind, TraceStatus,
};
use nx_providers::cost_for;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recorder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TraceRecorder {
    trace_id: TraceId,
    project_id: ProjectId,
    session_id: SessionId,
    created_at: DateTime<Utc>,
    next_event_id: AtomicU32,
    events: Mutex<Vec<TraceEvent>>,
    snapshot: Mutex<Option<PromptSnapshot>>,
    flushed: AtomicBool,
}

impl TraceRecorder {
    pub fn new(project_id: ProjectId, session_id: SessionId) -> Self {
        Self {
            trace_id: TraceId::new(),
            project_id,
            session_id,
            created_at: Utc::now(),
            next_event_id: AtomicU32::new(1),
            events: Mutex::new(Vec::new()),
            snapshot: Mutex::new(None),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn set_snapshot(&self, snapshot: PromptSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }

    /// Append an event; returns its id for parent linking.
    pub fn append(&self, kind: TraceEventKind, data: serde_json::Value) -> u32 {
        self.append_inner(kind, data, None, None)
    }

    /// Append an event with a duration but no parent.
    pub fn append_with_duration(
        &self,
        kind: TraceEventKind,
        data: serde_json::Value,
        duration_ms: u64,
    ) -> u32 {
        self.append_inner(kind, data, Some(duration_ms), None)
    }

    /// Append an event with a duration and parent event.
    pub fn append_child(
        &self,
        kind: TraceEventKind,
        data: serde_json::Value,
        duration_ms: u64,
        parent_event_id: u32,
    ) -> u32 {
        self.append_inner(kind, data, Some(duration_ms), Some(parent_event_id))
    }

    fn append_inner(
        &self,
        kind: TraceEventKind,
        data: serde_json::Value,
        duration_ms: Option<u64>,
        parent_event_id: Option<u32>,
    ) -> u32 {
        // A flushed trace is immutable: late appends (e.g. from a
        // cancelled run's stragglers) are dropped.
        if self.flushed.load(Ordering::Acquire) {
            tracing::warn!(trace_id = %self.trace_id, ?kind, "event after flush dropped");
            return 0;
        }
        let id = self.next_event_id.fetch_add(1, Ordering::Relaxed);
        let event = TraceEvent {
            id,
            kind,
            timestamp: Utc::now(),
            duration_ms,
            data,
            parent_event_id,
        };
        self.events.lock().push(event);
        id
    }

    pub fn event_count(&self, kind: TraceEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Seal the trace: compute totals, mark immutable, return the record.
    ///
    /// - `turn_count` = number of `llm_request` events
    /// - `total_tokens_used` = Σ usage across `llm_response` events
    /// - `total_cost_usd` from the per-model pricing table
    /// - every `tool_call` pairs with one `tool_result` or `tool_blocked`
    pub fn flush(&self, status: TraceStatus) -> ExecutionTrace {
        self.flushed.store(true, Ordering::Release);
        let completed_at = Utc::now();
        let events = self.events.lock().clone();

        let turn_count = events
            .iter()
            .filter(|e| e.kind == TraceEventKind::LlmRequest)
            .count() as u32;

        let mut total_tokens: u64 = 0;
        let mut total_cost: f64 = 0.0;
        for event in events
            .iter()
            .filter(|e| e.kind == TraceEventKind::LlmResponse)
        {
            if let Ok(usage) =
                serde_json::from_value::<Usage>(event.data["usage"].clone())
            {
                total_tokens += usage.total() as u64;
                if let Some(model) = event.data["model"].as_str() {
                    total_cost += cost_for(model, &usage);
                }
            }
        }

        debug_assert_eq!(
            events
                .iter()
                .filter(|e| e.kind == TraceEventKind::ToolCall)
                .count(),
            events
                .iter()
                .filter(|e| {
                    matches!(
                        e.kind,
                        TraceEventKind::ToolResult | TraceEventKind::ToolBlocked
                    )
                })
                .count(),
            "every tool_call must pair with a tool_result or tool_blocked"
        );

        ExecutionTrace {
            id: self.trace_id.clone(),
            project_id: self.project_id.clone(),
            session_id: self.session_id.clone(),
            prompt_snapshot: self.snapshot.lock().clone(),
            events,
            total_duration_ms: (completed_at - self.created_at).num_milliseconds().max(0)
                as u64,
            total_tokens_used: total_tokens,
            total_cost_usd: total_cost,
            turn_count,
            status,
            created_at: self.created_at,
            completed_at: Some(completed_at),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum flushed traces kept in the in-memory ring.
const MAX_IN_MEMORY: usize = 512;

/// Flushed traces: bounded in-memory ring plus optional JSONL file.
pub struct TraceStore {
    ring: RwLock<VecDeque<TraceId>>,
    by_id: RwLock<HashMap<TraceId, ExecutionTrace>>,
    persist_path: Option<PathBuf>,
}

impl TraceStore {
    pub fn new(persist_path: Option<PathBuf>) -> Self {
        Self {
            ring: RwLock::new(VecDeque::new()),
            by_id: RwLock::new(HashMap::new()),
            persist_path,
        }
    }

    pub fn insert(&self, trace: ExecutionTrace) {
        if let Some(path) = &self.persist_path {
            if let Err(e) = append_jsonl(path, &trace) {
                tracing::warn!(error = %e, "trace persistence failed");
            }
        }

        let mut ring = self.ring.write();
        let mut by_id = self.by_id.write();
        ring.push_back(trace.id.clone());
        by_id.insert(trace.id.clone(), trace);
        while ring.len() > MAX_IN_MEMORY {
            if let Some(evicted) = ring.pop_front() {
                by_id.remove(&evicted);
            }
        }
    }

    pub fn get(&self, id: &TraceId) -> Option<ExecutionTrace> {
        self.by_id.read().get(id).cloned()
    }

    /// All traces for a session, oldest first.
    pub fn for_session(&self, session_id: &SessionId) -> Vec<ExecutionTrace> {
        let mut out: Vec<ExecutionTrace> = self
            .by_id
            .read()
            .values()
            .filter(|t| &t.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn count(&self) -> usize {
        self.by_id.read().len()
    }
}

fn append_jsonl(path: &PathBuf, trace: &ExecutionTrace) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(trace)?;
    writeln!(file, "{line}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
