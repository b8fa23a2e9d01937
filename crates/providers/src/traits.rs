use nx_domain::error::Result;
use nx_domain::message::{Message, ToolDefinition};
use nx_domain::stream::{BoxStream, ChatEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Per-call network timeout in milliseconds. `None` uses the
    /// adapter's default.
    pub timeout_ms: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// `chat` returns a finite, single-consumer stream that emits exactly
/// one `MessageEnd` on success. Errors before the stream opens surface
/// as classified provider errors so the failover policy can act on
/// them.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Open a streaming chat completion.
    async fn chat(&self, params: ChatParams) -> Result<BoxStream<'static, Result<ChatEvent>>>;

    /// Estimate the token count of a message list. Adapters without an
    /// exact counting endpoint use the ~4-chars-per-token estimate.
    fn count_tokens(&self, messages: &[Message]) -> u32;

    /// The model's context window, in tokens.
    fn context_window(&self) -> u32;

    /// Whether the provider/model combination supports tool use.
    fn supports_tool_use(&self) -> bool;

    /// Render tool definitions into the provider's wire payload.
    fn format_tools(&self, tools: &[ToolDefinition]) -> serde_json::Value;

    /// Render one tool result into the provider's wire payload.
    fn format_tool_result(
        &self,
        tool_use_id: &str,
        content: &str,
        is_error: bool,
    ) -> serde_json::Value;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// The model this instance targets.
    fn model(&self) -> &str;
}

/// Shared ~4-chars-per-token estimate used when no exact counter exists.
pub(crate) fn estimate_tokens(messages: &[Message]) -> u32 {
    let chars: usize = messages
        .iter()
        .map(|m| m.content.extract_all_text().len())
        .sum();
    (chars / 4) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_four_chars_per_token() {
        let messages = vec![Message::user("a".repeat(400))];
        assert_eq!(estimate_tokens(&messages), 100);
    }

    #[test]
    fn estimate_tokens_empty() {
        assert_eq!(estimate_tokens(&[]), 0);
    }
}
