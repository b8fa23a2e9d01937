//! Approval gate — human review for high-risk tool calls.
//!
//! A run that hits a tool marked `requires_approval` terminates in the
//! `human_approval_pending` state; the pending entry is resolved
//! out-of-band via the REST API. Resolution is recorded so a
//! re-initiated run for the same (trace, tool) passes the gate.
//! Expiry is policy-driven elsewhere — the gate itself never expires
//! entries.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use nx_domain::id::{ApprovalId, ProjectId, SessionId, TraceId};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub trace_id: TraceId,
    pub tool_id: String,
    pub input: serde_json::Value,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ApprovalGate {
    requests: RwLock<HashMap<ApprovalId, ApprovalRequest>>,
    /// (trace, tool) pairs approved for re-initiated runs.
    approved: RwLock<HashSet<(TraceId, String)>>,
    notifier: broadcast::Sender<ApprovalRequest>,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(32);
        Self {
            requests: RwLock::new(HashMap::new()),
            approved: RwLock::new(HashSet::new()),
            notifier,
        }
    }

    /// Open a pending request and fire the notifier.
    pub fn request(
        &self,
        project_id: ProjectId,
        session_id: SessionId,
        trace_id: TraceId,
        tool_id: &str,
        input: serde_json::Value,
    ) -> ApprovalId {
        let request = ApprovalRequest {
            id: ApprovalId::new(),
            project_id,
            session_id,
            trace_id,
            tool_id: tool_id.to_owned(),
            input,
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        let id = request.id.clone();
        self.requests.write().insert(id.clone(), request.clone());
        let _ = self.notifier.send(request);
        tracing::info!(approval_id = %id, tool_id, "approval requested");
        id
    }

    /// Resolve a pending request. A second resolve is a no-op and
    /// returns `false`.
    pub fn resolve(&self, id: &ApprovalId, approve: bool, resolver: &str) -> bool {
        let mut requests = self.requests.write();
        let Some(request) = requests.get_mut(id) else {
            return false;
        };
        if request.status != ApprovalStatus::Pending {
            return false;
        }
        request.status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(resolver.to_owned());

        if approve {
            self.approved
                .write()
                .insert((request.trace_id.clone(), request.tool_id.clone()));
        }
        true
    }

    /// Whether a (trace, tool) pair has been approved — consulted by the
    /// tool registry when a run is re-initiated after approval.
    pub fn is_approved(&self, trace_id: &TraceId, tool_id: &str) -> bool {
        self.approved
            .read()
            .contains(&(trace_id.clone(), tool_id.to_owned()))
    }

    pub fn get(&self, id: &ApprovalId) -> Option<ApprovalRequest> {
        self.requests.read().get(id).cloned()
    }

    /// Read-only list of a project's pending requests.
    pub fn list_pending(&self, project_id: &ProjectId) -> Vec<ApprovalRequest> {
        let mut out: Vec<ApprovalRequest> = self
            .requests
            .read()
            .values()
            .filter(|r| &r.project_id == project_id && r.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        out
    }

    /// Subscribe to new approval requests (dashboard notification hook).
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalRequest> {
        self.notifier.subscribe()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open(gate: &ApprovalGate) -> ApprovalId {
        gate.request(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
            "http_request",
            json!({"url": "https://example.com"}),
        )
    }

    #[test]
    fn request_and_list_pending() {
        let gate = ApprovalGate::new();
        let id = open(&gate);
        let pending = gate.list_pending(&ProjectId::from("p1"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert!(gate.list_pending(&ProjectId::from("p2")).is_empty());
    }

    #[test]
    fn approve_marks_pair_approved() {
        let gate = ApprovalGate::new();
        let id = open(&gate);
        assert!(!gate.is_approved(&TraceId::from("t1"), "http_request"));

        assert!(gate.resolve(&id, true, "admin"));
        assert!(gate.is_approved(&TraceId::from("t1"), "http_request"));
        assert_eq!(gate.get(&id).unwrap().status, ApprovalStatus::Approved);
        assert!(gate.list_pending(&ProjectId::from("p1")).is_empty());
    }

    #[test]
    fn reject_does_not_approve_pair() {
        let gate = ApprovalGate::new();
        let id = open(&gate);
        assert!(gate.resolve(&id, false, "admin"));
        assert!(!gate.is_approved(&TraceId::from("t1"), "http_request"));
        assert_eq!(gate.get(&id).unwrap().status, ApprovalStatus::Rejected);
    }

    #[test]
    fn second_resolve_is_noop() {
        let gate = ApprovalGate::new();
        let id = open(&gate);
        assert!(gate.resolve(&id, false, "admin"));
        // Flipping a rejected request to approved must not work.
        assert!(!gate.resolve(&id, true, "admin"));
        assert_eq!(gate.get(&id).unwrap().status, ApprovalStatus::Rejected);
        assert!(!gate.is_approved(&TraceId::from("t1"), "http_request"));
    }

    #[test]
    fn resolve_unknown_returns_false() {
        let gate = ApprovalGate::new();
        assert!(!gate.resolve(&ApprovalId::from("ghost"), true, "admin"));
    }

    #[tokio::test]
    async fn notifier_fires_on_request() {
        let gate = ApprovalGate::new();
        let mut rx = gate.subscribe();
        let id = open(&gate);
        let notified = rx.recv().await.unwrap();
        assert_eq!(notified.id, id);
        assert_eq!(notified.tool_id, "http_request");
    }
}
