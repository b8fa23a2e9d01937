use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Error;
use crate::id::TraceId;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_write_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
    }
}

/// Events emitted by a provider while streaming one chat completion.
///
/// The stream is finite and single-consumer; a successful stream emits
/// exactly one `MessageEnd`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// A text token chunk.
    #[serde(rename = "content_delta")]
    ContentDelta { text: String },

    /// The model started a tool invocation.
    #[serde(rename = "tool_use_start")]
    ToolUseStart { id: String, name: String },

    /// Incremental tool-input JSON for an open invocation.
    #[serde(rename = "tool_use_delta")]
    ToolUseDelta { id: String, partial_json: String },

    /// A tool invocation is complete with its full input.
    #[serde(rename = "tool_use_end")]
    ToolUseEnd {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The provider assigned a message id.
    #[serde(rename = "message_start")]
    MessageStart { message_id: String },

    /// Stream is finished.
    #[serde(rename = "message_end")]
    MessageEnd {
        stop_reason: StopReason,
        usage: Usage,
    },

    /// An in-band provider error.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Client-facing events for one agent run, delivered over the caller's
/// channel in append order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentStreamEvent {
    #[serde(rename = "agent_start")]
    AgentStart { trace_id: TraceId },

    #[serde(rename = "content_delta")]
    ContentDelta { text: String },

    #[serde(rename = "tool_use_start")]
    ToolUseStart { call_id: String, tool_name: String },

    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    #[serde(rename = "turn_complete")]
    TurnComplete { turn: u32 },

    #[serde(rename = "agent_complete")]
    AgentComplete {
        trace_id: TraceId,
        content: String,
        status: crate::trace::TraceStatus,
    },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl AgentStreamEvent {
    pub fn from_error(err: &Error) -> Self {
        AgentStreamEvent::Error {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_event_serializes_with_type_tag() {
        let event = ChatEvent::ContentDelta {
            text: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_delta");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn message_end_carries_stop_reason() {
        let event = ChatEvent::MessageEnd {
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stop_reason"], "tool_use");
        assert_eq!(json["usage"]["input_tokens"], 10);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage {
            input_tokens: 100,
            output_tokens: 20,
            cache_read_tokens: 50,
            cache_write_tokens: 0,
        });
        total.add(&Usage {
            input_tokens: 40,
            output_tokens: 10,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 140);
        assert_eq!(total.output_tokens, 30);
        assert_eq!(total.total(), 170);
        assert_eq!(total.cache_read_tokens, 50);
    }

    #[test]
    fn agent_event_error_uses_stable_code() {
        let err = Error::ToolNotFound("ghost".into());
        let event = AgentStreamEvent::from_error(&err);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "TOOL_NOT_FOUND");
    }

    #[test]
    fn tool_result_skips_false_error_flag() {
        let event = AgentStreamEvent::ToolResult {
            call_id: "c1".into(),
            tool_name: "calculator".into(),
            content: "4".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("is_error").is_none());
    }
}
