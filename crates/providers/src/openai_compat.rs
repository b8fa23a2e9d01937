//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract. Tool
//! calls arrive as indexed argument fragments; the stream state
//! assembles them and flushes complete invocations when the finish
//! reason arrives.

use serde_json::Value;

use nx_domain::config::ProviderSpec;
use nx_domain::error::{Error, Result};
use nx_domain::message::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use nx_domain::stream::{BoxStream, ChatEvent, StopReason, Usage};

use crate::classify::{classify_http_status, classify_reqwest_error};
use crate::traits::{estimate_tokens, ChatParams, LlmProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CONTEXT_WINDOW_TOKENS: u32 = 128_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatProvider {
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
            .map_err(|e| classify_reqwest_error("openai_compat", e))?;

        Ok(Self {
            id: format!("openai/{}", spec.model),
            base_url,
            api_key,
            model: spec.model.clone(),
            temperature: spec.temperature,
            max_output_tokens: spec.max_output_tokens,
            client,
        })
    }

    fn build_chat_body(&self, params: &ChatParams, stream: bool) -> Value {
        let messages: Vec<Value> = params.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if !params.tools.is_empty() {
            body["tools"] = self.format_tools(&params.tools);
        }
        if let Some(temp) = params.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = params.max_tokens.or(self.max_output_tokens) {
            body["max_tokens"] = serde_json::json!(max);
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::System => serde_json::json!({
            "role": "system",
            "content": msg.content.extract_all_text(),
        }),
        Role::User => serde_json::json!({
            "role": "user",
            "content": msg.content.extract_all_text(),
        }),
        Role::Assistant => assistant_to_openai(msg),
        Role::Tool => tool_result_to_openai(msg),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": t,
        }),
        MessageContent::Parts(parts) => {
            let text = msg.content.extract_all_text();
            let tool_calls: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": input.to_string(),
                        }
                    })),
                    _ => None,
                })
                .collect();

            let mut obj = serde_json::json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            });
            if !tool_calls.is_empty() {
                obj["tool_calls"] = Value::Array(tool_calls);
            }
            obj
        }
    }
}

fn tool_result_to_openai(msg: &Message) -> Value {
    // OpenAI: one `tool` role message per result, keyed by tool_call_id.
    if let MessageContent::Parts(parts) = &msg.content {
        for p in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = p
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        input_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        output_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        cache_read_tokens: v
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        cache_write_tokens: 0,
    })
}

fn parse_finish_reason(s: &str) -> StopReason {
    match s {
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming parser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assembly state: tool calls keyed by chunk index, plus the usage and
/// stop reason observed so far. OpenAI sends `finish_reason` before the
/// optional usage-only chunk, so the final `MessageEnd` is held back
/// until `[DONE]`.
struct StreamState {
    tool_calls: std::collections::BTreeMap<u64, (String, String, String)>,
    usage: Usage,
    stop_reason: Option<StopReason>,
    started: bool,
    end_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            tool_calls: std::collections::BTreeMap::new(),
            usage: Usage::default(),
            stop_reason: None,
            started: false,
            end_emitted: false,
        }
    }

    /// Flush assembled tool calls as `ToolUseEnd` events, in index order.
    fn flush_tool_calls(&mut self) -> Vec<Result<ChatEvent>> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|(id, name, args)| {
                let input: Value =
                    serde_json::from_str(&args).unwrap_or(Value::Object(Default::default()));
                Ok(ChatEvent::ToolUseEnd { id, name, input })
            })
            .collect()
    }
}

fn parse_openai_sse(data: &str, state: &mut StreamState) -> Vec<Result<ChatEvent>> {
    if data.trim() == "[DONE]" {
        if state.end_emitted {
            return Vec::new();
        }
        state.end_emitted = true;
        let mut events = state.flush_tool_calls();
        events.push(Ok(ChatEvent::MessageEnd {
            stop_reason: state.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: state.usage.clone(),
        }));
        return events;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let mut events = Vec::new();

    if !state.started {
        state.started = true;
        let message_id = v
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        events.push(Ok(ChatEvent::MessageStart { message_id }));
    }

    // Usage-only chunk (stream_options.include_usage).
    if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
        state.usage = usage;
    }

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return events;
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        state.stop_reason = Some(parse_finish_reason(fr));
    }

    let delta = choice.get("delta").unwrap_or(&Value::Null);

    // Tool call deltas.
    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                events.push(Ok(ChatEvent::ToolUseStart {
                    id: id.to_string(),
                    name: name.clone(),
                }));
                state
                    .tool_calls
                    .insert(idx, (id.to_string(), name, String::new()));
            }

            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                if !args.is_empty() {
                    if let Some(entry) = state.tool_calls.get_mut(&idx) {
                        entry.2.push_str(args);
                        events.push(Ok(ChatEvent::ToolUseDelta {
                            id: entry.0.clone(),
                            partial_json: args.to_string(),
                        }));
                    }
                }
            }
        }
    }

    // Text content delta.
    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(ChatEvent::ContentDelta {
                text: text.to_string(),
            }));
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, params: ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&params, true);
        let provider_id = self.id.clone();

        tracing::debug!(provider = %self.id, model = %self.model, "openai stream request");

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            parse_openai_sse(data, &mut state)
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
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        )
    }

    fn format_tool_result(&self, tool_use_id: &str, content: &str, is_error: bool) -> Value {
        // OpenAI has no error flag on tool messages; errors are conveyed
        // in the content.
        let content = if is_error {
            format!("ERROR: {content}")
        } else {
            content.to_owned()
        };
        serde_json::json!({
            "role": "tool",
            "tool_call_id": tool_use_id,
            "content": content,
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

    #[test]
    fn text_delta_chunks() {
        let mut state = StreamState::new();
        let events = parse_openai_sse(
            r#"{"id":"cmpl_1","choices":[{"delta":{"content":"hel"}}]}"#,
            &mut state,
        );
        // First chunk also produces MessageStart.
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            ChatEvent::MessageStart { .. }
        ));
        match events[1].as_ref().unwrap() {
            ChatEvent::ContentDelta { text } => assert_eq!(text, "hel"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_calls_assemble_and_flush_on_done() {
        let mut state = StreamState::new();
        parse_openai_sse(
            r#"{"id":"c","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"calculator","arguments":""}}]}}]}"#,
            &mut state,
        );
        parse_openai_sse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"expression\":\"2+2\"}"}}]}}]}"#,
            &mut state,
        );
        parse_openai_sse(
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            &mut state,
        );
        let events = parse_openai_sse("[DONE]", &mut state);
        assert_eq!(events.len(), 2);
        match events[0].as_ref().unwrap() {
            ChatEvent::ToolUseEnd { id, name, input } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "calculator");
                assert_eq!(input["expression"], "2+2");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match events[1].as_ref().unwrap() {
            ChatEvent::MessageEnd { stop_reason, .. } => {
                assert_eq!(*stop_reason, StopReason::ToolUse)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn usage_chunk_feeds_message_end() {
        let mut state = StreamState::new();
        parse_openai_sse(
            r#"{"id":"c","choices":[{"delta":{"content":"x"},"finish_reason":null}]}"#,
            &mut state,
        );
        parse_openai_sse(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            &mut state,
        );
        parse_openai_sse(
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
            &mut state,
        );
        let events = parse_openai_sse("[DONE]", &mut state);
        match events[0].as_ref().unwrap() {
            ChatEvent::MessageEnd { stop_reason, usage } => {
                assert_eq!(*stop_reason, StopReason::EndTurn);
                assert_eq!(usage.input_tokens, 9);
                assert_eq!(usage.output_tokens, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn done_is_idempotent() {
        let mut state = StreamState::new();
        let first = parse_openai_sse("[DONE]", &mut state);
        assert_eq!(first.len(), 1);
        let second = parse_openai_sse("[DONE]", &mut state);
        assert!(second.is_empty());
    }

    #[test]
    fn assistant_tool_calls_round_trip_to_wire() {
        let msg = Message::assistant_with_tool_calls(
            "checking",
            &[nx_domain::message::ToolCall {
                call_id: nx_domain::id::ToolCallId::from("call_7"),
                tool_name: "http_request".into(),
                arguments: serde_json::json!({"url": "https://example.com"}),
            }],
        );
        let wire = msg_to_openai(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["id"], "call_7");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "http_request");
    }

    #[test]
    fn tool_result_message_keys_by_call_id() {
        let msg = Message::tool_result("call_7", "200 OK", false);
        let wire = msg_to_openai(&msg);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_7");
        assert_eq!(wire["content"], "200 OK");
    }
}
