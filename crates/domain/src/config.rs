use serde::{Deserialize, Serialize};

use crate::id::ProjectId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Paused,
    Deleted,
}

/// A tenant project. Owns its prompt layers, sessions, secrets, memory
/// entries, and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub environment: Environment,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub config: AgentConfig,
    #[serde(default = "d_active")]
    pub status: ProjectStatus,
}

fn d_active() -> ProjectStatus {
    ProjectStatus::Active
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider spec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
}

/// Configuration for one LLM provider endpoint. The API key itself
/// lives in the environment variable named by `api_key_env` and is
/// resolved by the provider factory; it never appears in config files
/// or persisted records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ProviderSpec {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".into(),
            temperature: None,
            max_output_tokens: None,
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failover
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverPolicy {
    #[serde(default = "d_true")]
    pub on_rate_limit: bool,
    #[serde(default = "d_true")]
    pub on_server_error: bool,
    #[serde(default)]
    pub on_timeout: bool,
    /// Per-network-call timeout, applied to every LLM request.
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
    #[serde(default = "d_1")]
    pub max_retries: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            on_rate_limit: true,
            on_server_error: true,
            on_timeout: false,
            timeout_ms: 60_000,
            max_retries: 1,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruningStrategy {
    TurnBased,
    TokenBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "d_true")]
    pub long_term_enabled: bool,
    #[serde(default = "d_5u")]
    pub top_k: usize,
    /// Half-life for importance decay, in days. 0 disables decay.
    #[serde(default = "d_30f")]
    pub decay_half_life_days: f64,
    #[serde(default = "d_turn_based")]
    pub pruning: PruningStrategy,
    #[serde(default = "d_20")]
    pub max_turns_in_context: usize,
    #[serde(default = "d_true")]
    pub compaction_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            long_term_enabled: true,
            top_k: 5,
            decay_half_life_days: 30.0,
            pruning: PruningStrategy::TurnBased,
            max_turns_in_context: 20,
            compaction_enabled: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "d_10f")]
    pub daily_budget_usd: f64,
    #[serde(default = "d_200f")]
    pub monthly_budget_usd: f64,
    #[serde(default = "d_16000")]
    pub max_tokens_per_turn: u32,
    #[serde(default = "d_25")]
    pub max_turns_per_session: u32,
    #[serde(default = "d_8")]
    pub max_tool_calls_per_turn: u32,
    /// Percentage of the daily budget at which a `cost_alert` fires.
    #[serde(default = "d_80f")]
    pub alert_threshold_pct: f64,
    /// Percentage of the nominal budget at which the guard vetoes.
    /// May exceed 100 to give a small grace band.
    #[serde(default = "d_110f")]
    pub hard_limit_pct: f64,
    #[serde(default = "d_60")]
    pub max_requests_per_minute: u32,
    #[serde(default = "d_600")]
    pub max_requests_per_hour: u32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: 10.0,
            monthly_budget_usd: 200.0,
            max_tokens_per_turn: 16_000,
            max_turns_per_session: 25,
            max_tool_calls_per_turn: 8,
            alert_threshold_pct: 80.0,
            hard_limit_pct: 110.0,
            max_requests_per_minute: 60,
            max_requests_per_hour: 600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-project agent configuration, embedded in [`Project`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub primary_provider: ProviderSpec,
    #[serde(default)]
    pub fallback_provider: Option<ProviderSpec>,
    #[serde(default)]
    pub failover: FailoverPolicy,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cost: CostConfig,
    /// Tool ids this project's runs may invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

// ── serde default helpers ──────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_1() -> u32 {
    1
}
fn d_8() -> u32 {
    8
}
fn d_20() -> usize {
    20
}
fn d_25() -> u32 {
    25
}
fn d_60() -> u32 {
    60
}
fn d_600() -> u32 {
    600
}
fn d_5u() -> usize {
    5
}
fn d_16000() -> u32 {
    16_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_10f() -> f64 {
    10.0
}
fn d_30f() -> f64 {
    30.0
}
fn d_80f() -> f64 {
    80.0
}
fn d_110f() -> f64 {
    110.0
}
fn d_200f() -> f64 {
    200.0
}
fn d_turn_based() -> PruningStrategy {
    PruningStrategy::TurnBased
}
