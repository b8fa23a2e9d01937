//! Shared error type used across all Nexus Core crates.
//!
//! Every operational failure carries a stable code from the error
//! taxonomy; the code is what crosses the wire (HTTP envelope, WS error
//! frames) and what tests assert on. Panics are reserved for
//! programmer-error invariants.

use crate::id::ApprovalId;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {}", format_fields(.fields))]
    Validation {
        /// Per-field messages, `(field_path, message)`.
        fields: Vec<(String, String)>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tool '{tool_id}' is not in the allow-list")]
    ToolNotAllowed { tool_id: String },

    #[error("daily budget exceeded: ${spent:.4} of ${limit:.4}")]
    DailyBudgetExceeded { spent: f64, limit: f64 },

    #[error("monthly budget exceeded: ${spent:.4} of ${limit:.4}")]
    MonthlyBudgetExceeded { spent: f64, limit: f64 },

    #[error("request rate exceeded: {count} requests in the last minute (limit {limit})")]
    RpmExceeded { count: u32, limit: u32 },

    #[error("request rate exceeded: {count} requests in the last hour (limit {limit})")]
    RphExceeded { count: u32, limit: u32 },

    #[error("config: {0}")]
    Config(String),

    #[error("prompt layers not configured: {0}")]
    PromptNotConfigured(String),

    #[error("provider {provider} rate-limited: {message}")]
    ProviderRateLimit { provider: String, message: String },

    #[error("provider {provider} server error: {message}")]
    ProviderServerError { provider: String, message: String },

    #[error("provider {provider} timed out: {message}")]
    ProviderTimeout { provider: String, message: String },

    #[error("provider {provider}: {message}")]
    ProviderUnknown { provider: String, message: String },

    #[error("tool '{tool_id}' failed: {message}")]
    ToolExecution { tool_id: String, message: String },

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    /// Not a failure: the run must pause until a human resolves the
    /// approval. The runner maps this to a terminal "pending" state.
    #[error("tool requires human approval (request {approval_id})")]
    ApprovalPending { approval_id: ApprovalId },

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("secret decryption failed")]
    SecretDecrypt,

    #[error("no reply from agent '{agent_id}' within {timeout_ms}ms")]
    AgentTimeout { agent_id: String, timeout_ms: u64 },

    #[error("run aborted")]
    Aborted,

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The stable wire code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::ToolNotAllowed { .. } => "TOOL_NOT_ALLOWED",
            Error::DailyBudgetExceeded { .. } => "DAILY_BUDGET_EXCEEDED",
            Error::MonthlyBudgetExceeded { .. } => "MONTHLY_BUDGET_EXCEEDED",
            Error::RpmExceeded { .. } => "RPM_EXCEEDED",
            Error::RphExceeded { .. } => "RPH_EXCEEDED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::PromptNotConfigured(_) => "PROMPT_NOT_CONFIGURED",
            Error::ProviderRateLimit { .. } => "PROVIDER_RATE_LIMIT",
            Error::ProviderServerError { .. } => "PROVIDER_SERVER_ERROR",
            Error::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Error::ProviderUnknown { .. } => "PROVIDER_UNKNOWN",
            Error::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            Error::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Error::ApprovalPending { .. } => "HUMAN_APPROVAL_PENDING",
            Error::SecretNotFound(_) => "SECRET_NOT_FOUND",
            Error::SecretDecrypt => "SECRET_DECRYPT_FAILED",
            Error::AgentTimeout { .. } => "AGENT_TIMEOUT",
            Error::Aborted => "ABORTED",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the REST envelope.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::Config(_) | Error::PromptNotConfigured(_) => 400,
            Error::ToolNotAllowed { .. } => 403,
            Error::NotFound(_) | Error::ToolNotFound(_) | Error::SecretNotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::DailyBudgetExceeded { .. }
            | Error::MonthlyBudgetExceeded { .. }
            | Error::RpmExceeded { .. }
            | Error::RphExceeded { .. }
            | Error::ProviderRateLimit { .. } => 429,
            Error::ProviderServerError { .. }
            | Error::ProviderTimeout { .. }
            | Error::ProviderUnknown { .. } => 503,
            _ => 500,
        }
    }

    /// Convenience constructor for a single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            fields: vec![(field.into(), message.into())],
        }
    }

    /// True when the error is a classified provider failure that the
    /// failover policy may act on.
    pub fn is_classified_provider_error(&self) -> bool {
        matches!(
            self,
            Error::ProviderRateLimit { .. }
                | Error::ProviderServerError { .. }
                | Error::ProviderTimeout { .. }
        )
    }
}

fn format_fields(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(f, m)| format!("{f}: {m}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            Error::ToolNotAllowed {
                tool_id: "x".into()
            }
            .code(),
            "TOOL_NOT_ALLOWED"
        );
        assert_eq!(
            Error::DailyBudgetExceeded {
                spent: 1.2,
                limit: 1.0
            }
            .code(),
            "DAILY_BUDGET_EXCEEDED"
        );
        assert_eq!(Error::SecretDecrypt.code(), "SECRET_DECRYPT_FAILED");
        assert_eq!(Error::Aborted.code(), "ABORTED");
        assert_eq!(Error::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn approval_pending_is_not_a_provider_error() {
        let err = Error::ApprovalPending {
            approval_id: ApprovalId::from("a1"),
        };
        assert_eq!(err.code(), "HUMAN_APPROVAL_PENDING");
        assert!(!err.is_classified_provider_error());
    }

    #[test]
    fn classified_provider_errors() {
        let timeout = Error::ProviderTimeout {
            provider: "anthropic".into(),
            message: "deadline".into(),
        };
        assert!(timeout.is_classified_provider_error());
        let unknown = Error::ProviderUnknown {
            provider: "anthropic".into(),
            message: "???".into(),
        };
        assert!(!unknown.is_classified_provider_error());
    }

    #[test]
    fn validation_formats_fields() {
        let err = Error::Validation {
            fields: vec![
                ("expression".into(), "required".into()),
                ("depth".into(), "must be a number".into()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("expression: required"));
        assert!(msg.contains("depth: must be a number"));
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(Error::NotFound("trace".into()).http_status(), 404);
        assert_eq!(
            Error::RpmExceeded {
                count: 61,
                limit: 60
            }
            .http_status(),
            429
        );
        assert_eq!(
            Error::ProviderServerError {
                provider: "p".into(),
                message: "m".into()
            }
            .http_status(),
            503
        );
    }
}
