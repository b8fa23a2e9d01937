//! Provider error classification.
//!
//! The failover policy only acts on classified reasons (rate limit,
//! server error, timeout). Everything else maps to `PROVIDER_UNKNOWN`
//! and is never retried.

use nx_domain::error::Error;

/// Convert a [`reqwest::Error`] into a classified provider error.
pub fn classify_reqwest_error(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ProviderTimeout {
            provider: provider.to_owned(),
            message: e.to_string(),
        }
    } else if e.is_connect() {
        Error::ProviderServerError {
            provider: provider.to_owned(),
            message: e.to_string(),
        }
    } else {
        Error::ProviderUnknown {
            provider: provider.to_owned(),
            message: e.to_string(),
        }
    }
}

/// Classify a non-success HTTP status from a provider endpoint.
pub fn classify_http_status(provider: &str, status: u16, body: &str) -> Error {
    let message = format!("HTTP {status} - {body}");
    match status {
        429 => Error::ProviderRateLimit {
            provider: provider.to_owned(),
            message,
        },
        408 | 504 => Error::ProviderTimeout {
            provider: provider.to_owned(),
            message,
        },
        500..=599 => Error::ProviderServerError {
            provider: provider.to_owned(),
            message,
        },
        _ => Error::ProviderUnknown {
            provider: provider.to_owned(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limit() {
        let err = classify_http_status("anthropic", 429, "overloaded");
        assert_eq!(err.code(), "PROVIDER_RATE_LIMIT");
        assert!(err.is_classified_provider_error());
    }

    #[test]
    fn status_5xx_is_server_error() {
        assert_eq!(
            classify_http_status("openai", 500, "oops").code(),
            "PROVIDER_SERVER_ERROR"
        );
        assert_eq!(
            classify_http_status("openai", 503, "oops").code(),
            "PROVIDER_SERVER_ERROR"
        );
    }

    #[test]
    fn gateway_timeout_is_timeout() {
        assert_eq!(
            classify_http_status("anthropic", 504, "slow").code(),
            "PROVIDER_TIMEOUT"
        );
    }

    #[test]
    fn status_4xx_is_unknown() {
        let err = classify_http_status("anthropic", 400, "bad request");
        assert_eq!(err.code(), "PROVIDER_UNKNOWN");
        assert!(!err.is_classified_provider_error());
    }
}
