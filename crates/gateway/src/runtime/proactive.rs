//! Proactive messenger — delayed outbound sends through channel adapters.
//!
//! `schedule` enqueues a job with `delay = max(0, scheduled_for − now)`
//! and returns a job id; `cancel` removes it while still pending. A
//! worker task pulls due jobs and invokes the adapter registered for
//! `(project, channel)`. Retry and dead-letter belong to the queue's
//! consumer, not the messenger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use nx_domain::error::{Error, Result};
use nx_domain::id::ProjectId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel adapter contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The send half of a channel integration (WhatsApp, Telegram, Slack…).
/// Channel-specific wiring lives outside the core.
#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> &str;
    async fn send(&self, recipient: &str, content: &str) -> Result<()>;
}

/// Adapters registered per (project, channel).
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Mutex<HashMap<(ProjectId, String), Arc<dyn ChannelAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: &ProjectId, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters
            .lock()
            .insert((project.clone(), adapter.channel().to_owned()), adapter);
    }

    pub fn resolve(&self, project: &ProjectId, channel: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters
            .lock()
            .get(&(project.clone(), channel.to_owned()))
            .cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct ProactiveRequest {
    pub project_id: ProjectId,
    pub channel: String,
    pub recipient_identifier: String,
    pub content: String,
    /// When absent, the job is due immediately.
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProactiveJob {
    pub job_id: String,
    pub project_id: ProjectId,
    pub channel: String,
    pub recipient_identifier: String,
    pub content: String,
    pub due_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

pub struct ProactiveQueue {
    jobs: Mutex<HashMap<String, ProactiveJob>>,
    wakeup: Notify,
}

impl Default for ProactiveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ProactiveQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
        }
    }

    /// Enqueue with `delay = max(0, scheduled_for − now)`.
    pub fn schedule(&self, req: ProactiveRequest) -> String {
        let now = Utc::now();
        let due_at = req.scheduled_for.filter(|t| *t > now).unwrap_or(now);
        let job = ProactiveJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            project_id: req.project_id,
            channel: req.channel,
            recipient_identifier: req.recipient_identifier,
            content: req.content,
            due_at,
            enqueued_at: now,
        };
        let id = job.job_id.clone();
        self.jobs.lock().insert(id.clone(), job);
        self.wakeup.notify_one();
        id
    }

    /// Remove a pending job. Returns `false` when already sent or unknown.
    pub fn cancel(&self, job_id: &str) -> bool {
        self.jobs.lock().remove(job_id).is_some()
    }

    pub fn pending(&self, project: &ProjectId) -> Vec<ProactiveJob> {
        let mut out: Vec<ProactiveJob> = self
            .jobs
            .lock()
            .values()
            .filter(|j| &j.project_id == project)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        out
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Pop every job whose due time has passed.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<ProactiveJob> {
        let mut jobs = self.jobs.lock();
        let due_ids: Vec<String> = jobs
            .values()
            .filter(|j| j.due_at <= now)
            .map(|j| j.job_id.clone())
            .collect();
        due_ids
            .into_iter()
            .filter_map(|id| jobs.remove(&id))
            .collect()
    }

    /// Time until the next job is due, if any.
    fn next_due_in(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.jobs
            .lock()
            .values()
            .map(|j| j.due_at)
            .min()
            .map(|due| (due - now).to_std().unwrap_or_default())
    }
}

/// Dispatch a single job through the adapter registry.
async fn dispatch_job(adapters: &AdapterRegistry, job: ProactiveJob) -> Result<()> {
    let adapter = adapters
        .resolve(&job.project_id, &job.channel)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no channel adapter for ({}, {})",
                job.project_id, job.channel
            ))
        })?;
    adapter.send(&job.recipient_identifier, &job.content).await
}

/// The queue worker: sleeps until the next job is due, then dispatches
/// everything that came due. Runs until the process exits.
pub async fn run_worker(queue: Arc<ProactiveQueue>, adapters: Arc<AdapterRegistry>) {
    loop {
        let now = Utc::now();
        for job in queue.take_due(now) {
            let job_id = job.job_id.clone();
            match dispatch_job(&adapters, job).await {
                Ok(()) => tracing::info!(job_id, "proactive message sent"),
                Err(e) => tracing::warn!(job_id, error = %e, "proactive send failed"),
            }
        }

        match queue.next_due_in(Utc::now()) {
            Some(wait) if !wait.is_zero() => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = queue.wakeup.notified() => {}
                }
            }
            Some(_) => { /* something is already due — loop again */ }
            None => queue.wakeup.notified().await,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        sends: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChannelAdapter for CountingAdapter {
        fn channel(&self) -> &str {
            "whatsapp"
        }
        async fn send(&self, _recipient: &str, _content: &str) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(delay_secs: i64) -> ProactiveRequest {
        ProactiveRequest {
            project_id: ProjectId::from("p1"),
            channel: "whatsapp".into(),
            recipient_identifier: "+5491100000000".into(),
            content: "your booking is confirmed".into(),
            scheduled_for: Some(Utc::now() + chrono::Duration::seconds(delay_secs)),
        }
    }

    #[test]
    fn schedule_then_cancel_removes_job() {
        let queue = ProactiveQueue::new();
        let job_id = queue.schedule(request(60));
        assert_eq!(queue.pending_count(), 1);
        assert!(queue.cancel(&job_id));
        assert_eq!(queue.pending_count(), 0);
        assert!(!queue.cancel(&job_id));
    }

    #[test]
    fn past_scheduled_for_is_due_immediately() {
        let queue = ProactiveQueue::new();
        queue.schedule(request(-30));
        let due = queue.take_due(Utc::now());
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn future_job_is_not_due_yet() {
        let queue = ProactiveQueue::new();
        queue.schedule(request(60));
        assert!(queue.take_due(Utc::now()).is_empty());
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_job_never_reaches_adapter() {
        let queue = Arc::new(ProactiveQueue::new());
        let adapters = Arc::new(AdapterRegistry::new());
        let adapter = Arc::new(CountingAdapter {
            sends: AtomicUsize::new(0),
        });
        adapters.register(&ProjectId::from("p1"), adapter.clone());

        let job_id = queue.schedule(request(60));
        assert!(queue.cancel(&job_id));

        // Even a worker pass after the due time finds nothing.
        for job in queue.take_due(Utc::now() + chrono::Duration::seconds(120)) {
            dispatch_job(&adapters, job).await.unwrap();
        }
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn due_job_dispatches_through_adapter() {
        let queue = ProactiveQueue::new();
        let adapters = AdapterRegistry::new();
        let adapter = Arc::new(CountingAdapter {
            sends: AtomicUsize::new(0),
        });
        adapters.register(&ProjectId::from("p1"), adapter.clone());

        queue.schedule(request(-1));
        for job in queue.take_due(Utc::now()) {
            dispatch_job(&adapters, job).await.unwrap();
        }
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_adapter_is_not_found() {
        let adapters = AdapterRegistry::new();
        let job = ProactiveJob {
            job_id: "j1".into(),
            project_id: ProjectId::from("p1"),
            channel: "telegram".into(),
            recipient_identifier: "@guest".into(),
            content: "hi".into(),
            due_at: Utc::now(),
            enqueued_at: Utc::now(),
        };
        let err = dispatch_job(&adapters, job).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
