//! Usage records and spend aggregation.
//!
//! Every `llm_response` produces one [`UsageRecord`]. Records are kept
//! in memory for aggregation and appended to a JSONL file for
//! durability; daily and monthly windows are computed over UTC.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nx_domain::id::{ProjectId, SessionId, TraceId, UsageRecordId};
use nx_domain::stream::Usage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: UsageRecordId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub trace_id: TraceId,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        project_id: ProjectId,
        session_id: SessionId,
        trace_id: TraceId,
        provider: &str,
        model: &str,
        usage: &Usage,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: UsageRecordId::new(),
            project_id,
            session_id,
            trace_id,
            provider: provider.to_owned(),
            model: model.to_owned(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_tokens,
            cache_write_tokens: usage.cache_write_tokens,
            cost_usd,
            timestamp: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UsageStore {
    records: RwLock<Vec<UsageRecord>>,
    persist_path: Option<PathBuf>,
}

impl UsageStore {
    pub fn new(persist_path: Option<PathBuf>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            persist_path,
        }
    }

    pub fn record(&self, record: UsageRecord) {
        if let Some(path) = &self.persist_path {
            if let Err(e) = append_jsonl(path, &record) {
                tracing::warn!(error = %e, "usage persistence failed");
            }
        }
        self.records.write().push(record);
    }

    /// USD spent by a project today (UTC day).
    pub fn daily_spend(&self, project: &ProjectId) -> f64 {
        let today = Utc::now().date_naive();
        self.records
            .read()
            .iter()
            .filter(|r| &r.project_id == project && r.timestamp.date_naive() == today)
            .map(|r| r.cost_usd)
            .sum()
    }

    /// USD spent by a project this month (UTC calendar month).
    pub fn monthly_spend(&self, project: &ProjectId) -> f64 {
        let now = Utc::now();
        self.records
            .read()
            .iter()
            .filter(|r| {
                &r.project_id == project
                    && r.timestamp.year() == now.year()
                    && r.timestamp.month() == now.month()
            })
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn total_tokens(&self, project: &ProjectId) -> u64 {
        self.records
            .read()
            .iter()
            .filter(|r| &r.project_id == project)
            .map(|r| (r.input_tokens + r.output_tokens) as u64)
            .sum()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Test/bootstrap hook: inject a record with an explicit timestamp.
    pub fn record_raw(&self, record: UsageRecord) {
        self.records.write().push(record);
    }
}

fn append_jsonl(path: &PathBuf, record: &UsageRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project: &str, cost: f64) -> UsageRecord {
        UsageRecord::new(
            ProjectId::from(project),
            SessionId::from("s1"),
            TraceId::from("t1"),
            "anthropic",
            "claude-sonnet-4",
            &Usage {
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            },
            cost,
        )
    }

    #[test]
    fn daily_spend_sums_per_project() {
        let store = UsageStore::new(None);
        store.record(record("p1", 0.5));
        store.record(record("p1", 0.25));
        store.record(record("p2", 9.0));
        assert!((store.daily_spend(&ProjectId::from("p1")) - 0.75).abs() < 1e-9);
        assert!((store.daily_spend(&ProjectId::from("p2")) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn old_records_fall_out_of_daily_window() {
        let store = UsageStore::new(None);
        let mut old = record("p1", 3.0);
        old.timestamp = Utc::now() - chrono::Duration::days(2);
        store.record_raw(old);
        store.record(record("p1", 0.5));
        assert!((store.daily_spend(&ProjectId::from("p1")) - 0.5).abs() < 1e-9);
        // Still in this month unless the month rolled over too; monthly
        // spend must be at least today's.
        assert!(store.monthly_spend(&ProjectId::from("p1")) >= 0.5);
    }

    #[test]
    fn token_totals() {
        let store = UsageStore::new(None);
        store.record(record("p1", 0.0));
        store.record(record("p1", 0.0));
        assert_eq!(store.total_tokens(&ProjectId::from("p1")), 300);
    }

    #[test]
    fn persists_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let store = UsageStore::new(Some(path.clone()));
        store.record(record("p1", 0.1));
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: UsageRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed.model, "claude-sonnet-4");
        assert!((parsed.cost_usd - 0.1).abs() < 1e-12);
    }
}
