//! Outbound HTTP tool.
//!
//! High-risk, approval-gated, side-effecting. Header values of the form
//! `secret://KEY` resolve through the project's secret vault at dispatch
//! time so credentials never appear in tool inputs or traces. The dry
//! run returns the planned request without sending anything.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use nx_domain::error::{Error, Result};

use crate::runtime::registry::{ExecutableTool, RiskLevel, ToolContext};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RESPONSE_CHARS: usize = 20_000;

pub struct HttpRequestTool;

impl HttpRequestTool {
    /// Resolve `secret://KEY` header values through the vault.
    fn resolve_headers(
        &self,
        input: &Value,
        ctx: &ToolContext,
    ) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        let Some(headers) = input["headers"].as_object() else {
            return Ok(out);
        };
        for (name, value) in headers {
            let raw = value.as_str().unwrap_or_default();
            let resolved = match raw.strip_prefix("secret://") {
                Some(key) => {
                    let secrets = ctx.secrets.as_ref().ok_or_else(|| Error::ToolExecution {
                        tool_id: self.id().to_owned(),
                        message: "secret store is not configured".into(),
                    })?;
                    secrets.get(&ctx.project_id, key)?
                }
                None => raw.to_owned(),
            };
            out.push((name.clone(), resolved));
        }
        Ok(out)
    }
}

#[async_trait]
impl ExecutableTool for HttpRequestTool {
    fn id(&self) -> &str {
        "http_request"
    }
    fn name(&self) -> &str {
        "HTTP Request"
    }
    fn description(&self) -> &str {
        "Make an outbound HTTP request (GET or POST). Requires approval."
    }
    fn category(&self) -> &str {
        "network"
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }
    fn requires_approval(&self) -> bool {
        true
    }
    fn side_effects(&self) -> bool {
        true
    }
    fn supports_dry_run(&self) -> bool {
        true
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute URL" },
                "method": { "type": "string", "enum": ["GET", "POST"] },
                "headers": {
                    "type": "object",
                    "description": "Header map; values may use secret://KEY"
                },
                "body": { "description": "JSON body for POST" }
            },
            "required": ["url", "method"]
        })
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<Value> {
        let url = input["url"].as_str().unwrap_or_default();
        let method = input["method"].as_str().unwrap_or("GET");
        let headers = self.resolve_headers(input, ctx)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::ToolExecution {
                tool_id: self.id().to_owned(),
                message: e.to_string(),
            })?;

        let mut request = match method {
            "POST" => client.post(url),
            _ => client.get(url),
        };
        for (name, value) in headers {
            request = request.header(&name, &value);
        }
        if method == "POST" && !input["body"].is_null() {
            request = request.json(&input["body"]);
        }

        let response = request.send().await.map_err(|e| Error::ToolExecution {
            tool_id: self.id().to_owned(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_RESPONSE_CHARS {
            body.truncate(MAX_RESPONSE_CHARS);
            body.push_str("… [truncated]");
        }

        Ok(json!({ "status": status, "body": body }))
    }

    /// Plan only: echo what would be sent, with secret refs unresolved.
    async fn dry_run(&self, input: &Value, _ctx: &ToolContext) -> Result<Value> {
        let mut planned = Map::new();
        planned.insert("url".into(), input["url"].clone());
        planned.insert("method".into(), input["method"].clone());
        if let Some(headers) = input["headers"].as_object() {
            planned.insert(
                "header_names".into(),
                json!(headers.keys().collect::<Vec<_>>()),
            );
        }
        planned.insert("has_body".into(), json!(!input["body"].is_null()));
        Ok(json!({ "planned_request": Value::Object(planned), "sent": false }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_domain::id::{ProjectId, SessionId, TraceId};
    use nx_secrets::{MasterKey, SecretCipher, SecretStore};
    use std::sync::Arc;

    fn ctx_with_secret() -> ToolContext {
        let store = Arc::new(SecretStore::new(SecretCipher::new(
            &MasterKey::from_hex(&"22".repeat(32)).unwrap(),
        )));
        store
            .set(&ProjectId::from("p1"), "API_TOKEN", "tvly-123", None)
            .unwrap();
        let mut ctx = ToolContext::new(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
        );
        ctx.secrets = Some(store);
        ctx
    }

    #[test]
    fn secret_headers_resolve_through_vault() {
        let ctx = ctx_with_secret();
        let input = json!({
            "url": "https://api.example.com",
            "method": "GET",
            "headers": {
                "Authorization": "secret://API_TOKEN",
                "Accept": "application/json"
            }
        });
        let headers = HttpRequestTool.resolve_headers(&input, &ctx).unwrap();
        assert!(headers.contains(&("Authorization".into(), "tvly-123".into())));
        assert!(headers.contains(&("Accept".into(), "application/json".into())));
    }

    #[test]
    fn unknown_secret_ref_fails() {
        let ctx = ctx_with_secret();
        let input = json!({
            "url": "https://api.example.com",
            "method": "GET",
            "headers": { "Authorization": "secret://MISSING" }
        });
        let err = HttpRequestTool.resolve_headers(&input, &ctx).unwrap_err();
        assert_eq!(err.code(), "SECRET_NOT_FOUND");
    }

    #[tokio::test]
    async fn dry_run_never_sends_and_never_leaks_values() {
        let ctx = ctx_with_secret();
        let input = json!({
            "url": "https://api.example.com/charge",
            "method": "POST",
            "headers": { "Authorization": "secret://API_TOKEN" },
            "body": { "amount": 100 }
        });
        let output = HttpRequestTool.dry_run(&input, &ctx).await.unwrap();
        assert_eq!(output["sent"], false);
        assert_eq!(output["planned_request"]["method"], "POST");
        assert_eq!(output["planned_request"]["has_body"], true);
        // Only names are echoed, never resolved values.
        let rendered = output.to_string();
        assert!(!rendered.contains("tvly-123"));
    }

    #[test]
    fn tool_is_gated_and_high_risk() {
        assert!(HttpRequestTool.requires_approval());
        assert!(HttpRequestTool.side_effects());
        assert_eq!(HttpRequestTool.risk_level(), RiskLevel::High);
    }
}
