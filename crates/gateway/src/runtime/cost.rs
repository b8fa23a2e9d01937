//! Cost guard — per-project budget and rate-limit enforcement.
//!
//! `precheck` runs once per turn before the LLM call and may veto it;
//! `record` runs after. Budgets veto at the hard-limit percent (which
//! may exceed 100, giving a grace band above the nominal budget);
//! alerts fire at the soft threshold without blocking. RPM/RPH counters
//! are in-memory per process; spend aggregation is the durable
//! [`UsageStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use nx_domain::config::CostConfig;
use nx_domain::error::{Error, Result};
use nx_domain::id::ProjectId;

use super::usage::{UsageRecord, UsageStore};

/// Request timestamps older than this are pruned on every record.
fn rate_window_retention() -> Duration {
    Duration::hours(2)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Proof that a precheck passed; carries the consumed rate slot.
#[derive(Debug, Clone)]
pub struct Permit {
    pub project_id: ProjectId,
    pub slot: DateTime<Utc>,
    pub estimated_input_tokens: u32,
}

/// Soft-threshold alert info, emitted as a `cost_alert` trace event.
#[derive(Debug, Clone, Serialize)]
pub struct CostAlert {
    pub daily_spend_usd: f64,
    pub daily_budget_usd: f64,
    pub threshold_pct: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CostGuard {
    usage: Arc<UsageStore>,
    /// Per-project request timestamps for RPM/RPH, newest last.
    requests: Mutex<HashMap<ProjectId, Vec<DateTime<Utc>>>>,
}

impl CostGuard {
    pub fn new(usage: Arc<UsageStore>) -> Self {
        Self {
            usage,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-turn check. Order: daily budget, monthly budget, RPM, RPH.
    /// On success the rate slot is consumed immediately.
    pub fn precheck(
        &self,
        project: &ProjectId,
        config: &CostConfig,
        estimated_input_tokens: u32,
    ) -> Result<Permit> {
        let hard = config.hard_limit_pct / 100.0;

        let daily = self.usage.daily_spend(project);
        if daily >= config.daily_budget_usd * hard {
            return Err(Error::DailyBudgetExceeded {
                spent: daily,
                limit: config.daily_budget_usd,
            });
        }

        let monthly = self.usage.monthly_spend(project);
        if monthly >= config.monthly_budget_usd * hard {
            return Err(Error::MonthlyBudgetExceeded {
                spent: monthly,
                limit: config.monthly_budget_usd,
            });
        }

        let now = Utc::now();
        let mut requests = self.requests.lock();
        let window = requests.entry(project.clone()).or_default();

        let minute_ago = now - Duration::minutes(1);
        let rpm = window.iter().filter(|t| **t > minute_ago).count() as u32;
        if rpm >= config.max_requests_per_minute {
            return Err(Error::RpmExceeded {
                count: rpm + 1,
                limit: config.max_requests_per_minute,
            });
        }

        let hour_ago = now - Duration::hours(1);
        let rph = window.iter().filter(|t| **t > hour_ago).count() as u32;
        if rph >= config.max_requests_per_hour {
            return Err(Error::RphExceeded {
                count: rph + 1,
                limit: config.max_requests_per_hour,
            });
        }

        window.push(now);

        Ok(Permit {
            project_id: project.clone(),
            slot: now,
            estimated_input_tokens,
        })
    }

    /// Post-turn recording. Also prunes the rate window.
    pub fn record(&self, record: UsageRecord) {
        let project = record.project_id.clone();
        self.usage.record(record);

        let cutoff = Utc::now() - rate_window_retention();
        let mut requests = self.requests.lock();
        if let Some(window) = requests.get_mut(&project) {
            window.retain(|t| *t > cutoff);
        }
    }

    /// Non-blocking: reports when daily spend crossed the alert
    /// threshold so the caller can emit a `cost_alert` event.
    pub fn alert_status(&self, project: &ProjectId, config: &CostConfig) -> Option<CostAlert> {
        let daily = self.usage.daily_spend(project);
        if config.daily_budget_usd <= 0.0 {
            return None;
        }
        if daily / config.daily_budget_usd >= config.alert_threshold_pct / 100.0 {
            Some(CostAlert {
                daily_spend_usd: daily,
                daily_budget_usd: config.daily_budget_usd,
                threshold_pct: config.alert_threshold_pct,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    fn pending_slots(&self, project: &ProjectId) -> usize {
        self.requests
            .lock()
            .get(project)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
