//! Secret redaction for logged and traced payloads.
//!
//! Values under keys named `apiKey`, `authorization`, `password`, or
//! `secret` — or any nested path ending in one of those — are replaced
//! before the payload reaches a log line or a trace event.

use serde_json::Value;

const SENSITIVE_SUFFIXES: &[&str] = &["apikey", "api_key", "authorization", "password", "secret"];

const PLACEHOLDER: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_SUFFIXES
        .iter()
        .any(|suffix| lower == *suffix || lower.ends_with(suffix))
}

/// Return a copy of `value` with every sensitive field replaced.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String(PLACEHOLDER.into()))
                    } else {
                        (key.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_exact_and_suffix_keys() {
        let input = json!({
            "apiKey": "sk-123",
            "user_password": "hunter2",
            "client_secret": "shh",
            "Authorization": "Bearer abc",
            "note": "visible"
        });
        let out = redact(&input);
        assert_eq!(out["apiKey"], PLACEHOLDER);
        assert_eq!(out["user_password"], PLACEHOLDER);
        assert_eq!(out["client_secret"], PLACEHOLDER);
        assert_eq!(out["Authorization"], PLACEHOLDER);
        assert_eq!(out["note"], "visible");
    }

    #[test]
    fn redacts_nested_paths() {
        let input = json!({
            "config": {
                "auth": { "password": "deep" },
                "items": [{ "api_key": "k" }, { "plain": "ok" }]
            }
        });
        let out = redact(&input);
        assert_eq!(out["config"]["auth"]["password"], PLACEHOLDER);
        assert_eq!(out["config"]["items"][0]["api_key"], PLACEHOLDER);
        assert_eq!(out["config"]["items"][1]["plain"], "ok");
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(redact(&json!("text")), json!("text"));
        assert_eq!(redact(&json!(42)), json!(42));
        assert_eq!(redact(&json!(null)), json!(null));
    }
}
