//! Scheduled tasks — periodic or one-shot agent runs.
//!
//! A task fires on a cron expression (timezone-aware) or at a fixed
//! instant. The executor opens a synthetic session when none is
//! configured, drives the same agent loop as the interactive path with
//! a cancellation token armed at `timeout_ms`, and records a
//! [`TaskRun`] with the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nx_domain::id::{ProjectId, SessionId, TraceId};
use nx_domain::stream::AgentStreamEvent;
use nx_domain::trace::TraceStatus;
use nx_sessions::SessionMetadata;

use crate::state::AppState;

use super::cron::{cron_next_tz, parse_tz};
use super::runner::{run_agent, RunRequest};

/// Scheduler tick interval.
const TICK_SECONDS: u64 = 60;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTrigger {
    /// 5-field cron, evaluated in `tz` (IANA name, UTC fallback).
    Cron { expr: String, tz: String },
    /// Fire once at the given instant.
    RunAt { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub project_id: ProjectId,
    pub name: String,
    pub payload: TaskPayload,
    pub timeout_ms: u64,
    pub trigger: TaskTrigger,
    pub status: TaskStatus,
    /// Session the task posts into; a synthetic one is created when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Outcome of one task firing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub task_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    pub tokens_used: u64,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, ScheduledTask>>,
    runs: RwLock<Vec<TaskRun>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, computing its first due time.
    pub fn insert(&self, mut task: ScheduledTask) -> ScheduledTask {
        task.next_run_at = next_fire(&task.trigger, &Utc::now());
        self.tasks.write().insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.tasks.write().remove(id).is_some()
    }

    pub fn list(&self, project: &ProjectId) -> Vec<ScheduledTask> {
        let mut out: Vec<ScheduledTask> = self
            .tasks
            .read()
            .values()
            .filter(|t| &t.project_id == project)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn set_status(&self, id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.write().get_mut(id) {
            task.status = status;
        }
    }

    /// Tasks due at `now`, atomically advanced to their next fire time
    /// so a slow run cannot double-fire.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.write();
        let mut due = Vec::new();
        for task in tasks.values_mut() {
            if task.status != TaskStatus::Active {
                continue;
            }
            let Some(next) = task.next_run_at else {
                continue;
            };
            if next <= now {
                due.push(task.clone());
                task.last_run_at = Some(now);
                task.next_run_at = next_fire(&task.trigger, &now);
                if task.next_run_at.is_none() {
                    task.status = TaskStatus::Completed;
                }
            }
        }
        due
    }

    pub fn record_run(&self, run: TaskRun) {
        self.runs.write().push(run);
    }

    pub fn runs_for(&self, task_id: &str) -> Vec<TaskRun> {
        self.runs
            .read()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }
}

fn next_fire(trigger: &TaskTrigger, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger {
        TaskTrigger::Cron { expr, tz } => cron_next_tz(expr, after, parse_tz(tz)),
        TaskTrigger::RunAt { at } => (at > after).then_some(*at),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fire one task: resolve the session, run the agent loop with a
/// timeout-armed cancellation, drain the event stream, record the run.
pub async fn execute_task(state: &AppState, task: &ScheduledTask) -> TaskRun {
    let started_at = Utc::now();

    let project = match state.projects.get(&task.project_id) {
        Ok(p) => p,
        Err(e) => {
            return TaskRun {
                task_id: task.id.clone(),
                success: false,
                trace_id: None,
                tokens_used: 0,
                cost_usd: 0.0,
                error_message: Some(e.to_string()),
                started_at,
                finished_at: Utc::now(),
            };
        }
    };

    let session = match state.sessions.get_or_create(
        task.session_id.as_ref(),
        &task.project_id,
        SessionMetadata {
            channel: Some("scheduled".into()),
            contact_id: None,
            agent_id: None,
        },
    ) {
        Ok(s) => s,
        Err(e) => {
            return TaskRun {
                task_id: task.id.clone(),
                success: false,
                trace_id: None,
                tokens_used: 0,
                cost_usd: 0.0,
                error_message: Some(e.to_string()),
                started_at,
                finished_at: Utc::now(),
            };
        }
    };

    let (trace_id, mut rx) = run_agent(
        state.clone(),
        RunRequest {
            project,
            session_id: session.id.clone(),
            user_message: task.payload.message.clone(),
            variables: HashMap::new(),
        },
    );

    // Arm the task timeout: it cancels the run, which then terminates
    // through the normal Aborted path.
    {
        let cancel_map = state.cancel_map.clone();
        let armed_trace = trace_id.clone();
        let timeout = std::time::Duration::from_millis(task.timeout_ms);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if cancel_map.cancel(&armed_trace) {
                tracing::warn!(trace_id = %armed_trace, "scheduled task timed out");
            }
        });
    }

    // Drain events to completion.
    let mut status = TraceStatus::Failed;
    let mut error_message = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::AgentComplete { status: s, .. } => status = s,
            AgentStreamEvent::Error { message, .. } => error_message = Some(message),
            _ => {}
        }
    }

    let trace = state.traces.get(&trace_id);
    let (tokens_used, cost_usd) = trace
        .as_ref()
        .map(|t| (t.total_tokens_used, t.total_cost_usd))
        .unwrap_or((0, 0.0));

    TaskRun {
        task_id: task.id.clone(),
        success: status == TraceStatus::Completed,
        trace_id: Some(trace_id),
        tokens_used,
        cost_usd,
        error_message,
        started_at,
        finished_at: Utc::now(),
    }
}

/// The scheduler loop: every tick, fire whatever came due.
pub async fn run_scheduler(state: AppState) {
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(TICK_SECONDS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        state.session_locks.prune_idle();
        let due = state.tasks.take_due(Utc::now());
        for task in due {
            tracing::info!(task_id = %task.id, name = %task.name, "scheduled task firing");
            let run = execute_task(&state, &task).await;
            if !run.success {
                tracing::warn!(
                    task_id = %task.id,
                    error = run.error_message.as_deref().unwrap_or("unknown"),
                    "scheduled task run failed"
                );
            }
            state.tasks.record_run(run);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn task(trigger: TaskTrigger) -> ScheduledTask {
        ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: ProjectId::from("p1"),
            name: "daily-digest".into(),
            payload: TaskPayload {
                message: "Summarize yesterday's sessions".into(),
                metadata: HashMap::new(),
            },
            timeout_ms: 30_000,
            trigger,
            status: TaskStatus::Active,
            session_id: None,
            next_run_at: None,
            last_run_at: None,
        }
    }

    #[test]
    fn insert_computes_next_fire() {
        let store = TaskStore::new();
        let inserted = store.insert(task(TaskTrigger::Cron {
            expr: "0 9 * * *".into(),
            tz: "UTC".into(),
        }));
        assert!(inserted.next_run_at.is_some());
    }

    #[test]
    fn run_at_in_past_never_fires() {
        let store = TaskStore::new();
        let inserted = store.insert(task(TaskTrigger::RunAt {
            at: Utc::now() - chrono::Duration::hours(1),
        }));
        assert!(inserted.next_run_at.is_none());
    }

    #[test]
    fn take_due_advances_and_completes_one_shots() {
        let store = TaskStore::new();
        let at = Utc::now() + chrono::Duration::seconds(1);
        let inserted = store.insert(task(TaskTrigger::RunAt { at }));

        // Not due yet.
        assert!(store.take_due(Utc::now()).is_empty());

        // Due; one-shot completes after firing.
        let due = store.take_due(at + chrono::Duration::seconds(1));
        assert_eq!(due.len(), 1);
        let after = store.get(&inserted.id).unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert!(after.next_run_at.is_none());

        // A second sweep finds nothing.
        assert!(store.take_due(Utc::now() + chrono::Duration::hours(1)).is_empty());
    }

    #[test]
    fn paused_tasks_do_not_fire() {
        let store = TaskStore::new();
        let inserted = store.insert(task(TaskTrigger::Cron {
            expr: "* * * * *".into(),
            tz: "UTC".into(),
        }));
        store.set_status(&inserted.id, TaskStatus::Paused);
        assert!(store
            .take_due(Utc::now() + chrono::Duration::minutes(2))
            .is_empty());
    }

    #[test]
    fn cron_task_keeps_firing() {
        let store = TaskStore::new();
        let inserted = store.insert(task(TaskTrigger::Cron {
            expr: "* * * * *".into(),
            tz: "UTC".into(),
        }));
        let first_due = store.get(&inserted.id).unwrap().next_run_at.unwrap();
        let due = store.take_due(first_due);
        assert_eq!(due.len(), 1);
        let after = store.get(&inserted.id).unwrap();
        assert_eq!(after.status, TaskStatus::Active);
        assert!(after.next_run_at.unwrap() > first_due);
    }

    #[test]
    fn runs_are_recorded_per_task() {
        let store = TaskStore::new();
        store.record_run(TaskRun {
            task_id: "t1".into(),
            success: true,
            trace_id: Some(TraceId::from("tr1")),
            tokens_used: 120,
            cost_usd: 0.002,
            error_message: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        });
        assert_eq!(store.runs_for("t1").len(), 1);
        assert!(store.runs_for("t2").is_empty());
    }
}
