//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use and
//! streaming. System messages travel in the separate top-level `system`
//! field; tool results are user messages with `tool_result` content
//! blocks.

use serde_json::Value;

use nx_domain::config::ProviderSpec;
use nx_domain::error::{Error, Result};
use nx_domain::message::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use nx_domain::stream::{BoxStream, ChatEvent, StopReason, Usage};

use crate::classify::{classify_http_status, classify_reqwest_error};
use crate::traits::{estimate_tokens, ChatParams, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const CONTEXT_WINDOW_TOKENS: u32 = 200_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicProvider {
    /// Create a new adapter. `api_key` has already been resolved from
    /// the environment by the factory.
    pub fn new(spec: &ProviderSpec, api_key: String) -> Result<Self> {
        let base_url = spec
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| classify_reqwest_error("anthropic", e))?;

        Ok(Self {
            id: format!("anthropic/{}", spec.model),
            base_url,
            api_key,
            model: spec.model.clone(),
            temperature: spec.temperature,
            max_output_tokens: spec.max_output_tokens,
            client,
        })
    }

    fn build_messages_body(&self, params: &ChatParams, stream: bool) -> Value {
        // Separate out system messages.
        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &params.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => api_messages.push(user_msg_to_anthropic(msg)),
                Role::Assistant => api_messages.push(assistant_msg_to_anthropic(msg)),
                // Anthropic expects tool results as user messages with
                // tool_result content blocks.
                Role::Tool => api_messages.push(tool_result_msg_to_anthropic(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "stream": stream,
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }

        if !params.tools.is_empty() {
            body["tools"] = self.format_tools(&params.tools);
        }

        if let Some(temp) = params.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(temp);
        }
        let max_tokens = params
            .max_tokens
            .or(self.max_output_tokens)
            .unwrap_or(4096);
        body["max_tokens"] = serde_json::json!(max_tokens);

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "user",
            "content": t,
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(serde_json::json!({
                        "type": "text",
                        "text": text,
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({
                "role": "user",
                "content": content,
            })
        }
    }
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": [{"type": "text", "text": t}],
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(serde_json::json!({
                        "type": "text",
                        "text": text,
                    })),
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": content,
            })
        }
    }
}

fn tool_result_msg_to_anthropic(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => {
            vec![serde_json::json!({
                "type": "tool_result",
                "tool_use_id": "",
                "content": t,
            })]
        }
    };
    serde_json::json!({
        "role": "user",
        "content": content,
    })
}

fn parse_stop_reason(s: &str) -> StopReason {
    match s {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

fn parse_anthropic_usage(v: &Value) -> Usage {
    let get = |key: &str| v.get(key).and_then(|x| x.as_u64()).unwrap_or(0) as u32;
    Usage {
        input_tokens: get("input_tokens"),
        output_tokens: get("output_tokens"),
        cache_read_tokens: get("cache_read_input_tokens"),
        cache_write_tokens: get("cache_creation_input_tokens"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE parser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Internal state for assembling tool calls from streaming content blocks.
struct StreamState {
    /// Active tool call per block index -> (call_id, name, args_buffer).
    active_tool_calls: std::collections::HashMap<u64, (String, String, String)>,
    /// Usage accumulated from message_start, updated by message_delta.
    usage: Usage,
    stop_reason: StopReason,
    end_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            active_tool_calls: std::collections::HashMap::new(),
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
            end_emitted: false,
        }
    }
}

/// Parse a single Anthropic SSE data payload into zero or more events.
fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<ChatEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match event_type {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                if let Some(u) = msg.get("usage") {
                    state.usage = parse_anthropic_usage(u);
                }
                let message_id = msg
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                events.push(Ok(ChatEvent::MessageStart { message_id }));
            }
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    events.push(Ok(ChatEvent::ToolUseStart {
                        id: id.clone(),
                        name: name.clone(),
                    }));
                    state.active_tool_calls.insert(idx, (id, name, String::new()));
                }
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(delta) = v.get("delta") {
                match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                            if !text.is_empty() {
                                events.push(Ok(ChatEvent::ContentDelta {
                                    text: text.to_string(),
                                }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) =
                            delta.get("partial_json").and_then(|v| v.as_str())
                        {
                            if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                                tc.2.push_str(partial);
                                events.push(Ok(ChatEvent::ToolUseDelta {
                                    id: tc.0.clone(),
                                    partial_json: partial.to_string(),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some((id, name, args_str)) = state.active_tool_calls.remove(&idx) {
                let input: Value =
                    serde_json::from_str(&args_str).unwrap_or(Value::Object(Default::default()));
                events.push(Ok(ChatEvent::ToolUseEnd { id, name, input }));
            }
        }

        "message_delta" => {
            if let Some(u) = v.get("usage") {
                if let Some(output) = u.get("output_tokens").and_then(|v| v.as_u64()) {
                    state.usage.output_tokens = output as u32;
                }
            }
            if let Some(reason) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
            {
                state.stop_reason = parse_stop_reason(reason);
            }
        }

        "message_stop" => {
            if !state.end_emitted {
                state.end_emitted = true;
                events.push(Ok(ChatEvent::MessageEnd {
                    stop_reason: state.stop_reason,
                    usage: state.usage.clone(),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(ChatEvent::Error {
                message: msg.to_string(),
            }));
        }

        _ => {
            // ping or unknown event types -- ignore.
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, params: ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&params, true);
        let provider_id = self.id.clone();

        tracing::debug!(provider = %self.id, model = %self.model, "anthropic stream request");

        let mut req = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(timeout_ms) = params.timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&provider_id, e))?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(classify_http_status(&provider_id, status.as_u16(), &err_text));
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(provider_id, resp, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    fn count_tokens(&self, messages: &[Message]) -> u32 {
        estimate_tokens(messages)
    }

    fn context_window(&self) -> u32 {
        CONTEXT_WINDOW_TOKENS
    }

    fn supports_tool_use(&self) -> bool {
        true
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Value {
        Value::Array(
            tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect(),
        )
    }

    fn format_tool_result(&self, tool_use_id: &str, content: &str, is_error: bool) -> Value {
        serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(&ProviderSpec::default(), "test-key".into()).unwrap()
    }

    #[test]
    fn system_messages_lift_into_system_field() {
        let p = provider();
        let params = ChatParams {
            messages: vec![Message::system("be helpful"), Message::user("hi")],
            ..Default::default()
        };
        let body = p.build_messages_body(&params, true);
        assert_eq!(body["system"], "be helpful");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn tool_results_become_user_messages() {
        let p = provider();
        let params = ChatParams {
            messages: vec![Message::tool_result("tc_1", "42", false)],
            ..Default::default()
        };
        let body = p.build_messages_body(&params, false);
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"][0]["type"], "tool_result");
        assert_eq!(msgs[0]["content"][0]["tool_use_id"], "tc_1");
    }

    #[test]
    fn sse_text_delta_becomes_content_delta() {
        let mut state = StreamState::new();
        let events = parse_anthropic_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hello"}}"#,
            &mut state,
        );
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            ChatEvent::ContentDelta { text } => assert_eq!(text, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn sse_tool_use_assembly() {
        let mut state = StreamState::new();
        parse_anthropic_sse(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"tc_9","name":"calculator"}}"#,
            &mut state,
        );
        parse_anthropic_sse(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"expression\":"}}"#,
            &mut state,
        );
        parse_anthropic_sse(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"2+2\"}"}}"#,
            &mut state,
        );
        let events = parse_anthropic_sse(
            r#"{"type":"content_block_stop","index":1}"#,
            &mut state,
        );
        match events[0].as_ref().unwrap() {
            ChatEvent::ToolUseEnd { id, name, input } => {
                assert_eq!(id, "tc_9");
                assert_eq!(name, "calculator");
                assert_eq!(input["expression"], "2+2");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn sse_message_lifecycle_emits_single_end() {
        let mut state = StreamState::new();
        parse_anthropic_sse(
            r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":12,"output_tokens":0}}}"#,
            &mut state,
        );
        parse_anthropic_sse(
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":7}}"#,
            &mut state,
        );
        let events = parse_anthropic_sse(r#"{"type":"message_stop"}"#, &mut state);
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            ChatEvent::MessageEnd { stop_reason, usage } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
                assert_eq!(usage.input_tokens, 12);
                assert_eq!(usage.output_tokens, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // A second message_stop must not emit another end.
        let again = parse_anthropic_sse(r#"{"type":"message_stop"}"#, &mut state);
        assert!(again.is_empty());
    }

    #[test]
    fn format_tools_uses_input_schema_key() {
        let p = provider();
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "math".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let formatted = p.format_tools(&tools);
        assert_eq!(formatted[0]["input_schema"]["type"], "object");
    }
}
