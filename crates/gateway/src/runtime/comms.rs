//! Inter-agent comms bus — in-process pub/sub with request/reply.
//!
//! Each agent id owns a broadcast channel. A send is delivered to all
//! subscribers registered at the moment of the send; later subscribers
//! do not see earlier messages. A reply is any message whose
//! `reply_to_id` equals the original message id, sent in the reverse
//! direction.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use nx_domain::error::{Error, Result};
use nx_domain::id::{AgentId, MessageId};

/// Default reply timeout for `send_and_wait`.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 30_000;

/// Per-channel buffered capacity before lagging subscribers drop.
const CHANNEL_CAPACITY: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct AgentMessage {
    pub id: MessageId,
    pub from_agent_id: AgentId,
    pub to_agent_id: AgentId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: AgentId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            from_agent_id: from,
            to_agent_id: to,
            content: content.into(),
            context: None,
            reply_to_id: None,
            created_at: Utc::now(),
        }
    }

    /// Build a reply addressed back to the sender of `original`.
    pub fn reply_to(original: &AgentMessage, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            from_agent_id: original.to_agent_id.clone(),
            to_agent_id: original.from_agent_id.clone(),
            content: content.into(),
            context: None,
            reply_to_id: Some(original.id.clone()),
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct AgentBus {
    channels: Mutex<HashMap<AgentId, broadcast::Sender<AgentMessage>>>,
}

impl AgentBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, agent: &AgentId) -> broadcast::Sender<AgentMessage> {
        self.channels
            .lock()
            .entry(agent.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Register a receiver for an agent's channel. Dropping the
    /// receiver removes the subscription.
    pub fn subscribe(&self, agent: &AgentId) -> broadcast::Receiver<AgentMessage> {
        self.channel(agent).subscribe()
    }

    /// Fire-and-forget send. Returns the assigned message id.
    pub fn send(&self, msg: AgentMessage) -> MessageId {
        let id = msg.id.clone();
        let target = self.channel(&msg.to_agent_id);
        // No subscribers is fine for fire-and-forget.
        let delivered = target.send(msg).unwrap_or(0);
        tracing::debug!(message_id = %id, delivered, "agent message sent");
        id
    }

    /// Send and await a reply whose `reply_to_id` matches, failing with
    /// `AGENT_TIMEOUT` after `timeout_ms` (default 30 s).
    pub async fn send_and_wait(
        &self,
        msg: AgentMessage,
        timeout_ms: Option<u64>,
    ) -> Result<AgentMessage> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_REPLY_TIMEOUT_MS));
        let target_agent = msg.to_agent_id.clone();

        // Subscribe to our own channel before sending so the reply
        // cannot race past us.
        let mut replies = self.subscribe(&msg.from_agent_id);
        let sent_id = self.send(msg);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, replies.recv()).await {
                Ok(Ok(candidate)) => {
                    if candidate.reply_to_id.as_ref() == Some(&sent_id) {
                        return Ok(candidate);
                    }
                    // Unrelated traffic on our channel; keep waiting.
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "agent bus subscriber lagged");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
            }
        }

        Err(Error::AgentTimeout {
            agent_id: target_agent.as_str().to_owned(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn agent(id: &str) -> AgentId {
        AgentId::from(id)
    }

    #[tokio::test]
    async fn send_delivers_to_subscriber() {
        let bus = AgentBus::new();
        let mut rx = bus.subscribe(&agent("support"));
        let sent = bus.send(AgentMessage::new(
            agent("concierge"),
            agent("support"),
            "can you take this guest?",
        ));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, sent);
        assert_eq!(received.content, "can you take this guest?");
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_messages() {
        let bus = AgentBus::new();
        bus.send(AgentMessage::new(agent("a"), agent("b"), "early"));
        let mut rx = bus.subscribe(&agent("b"));
        bus.send(AgentMessage::new(agent("a"), agent("b"), "late"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.content, "late");
    }

    #[tokio::test]
    async fn send_and_wait_round_trip() {
        let bus = Arc::new(AgentBus::new());

        // The responder echoes any request back as a reply.
        let responder_bus = bus.clone();
        let mut inbox = bus.subscribe(&agent("escalation"));
        tokio::spawn(async move {
            let request = inbox.recv().await.unwrap();
            responder_bus.send(AgentMessage::reply_to(&request, "handled"));
        });

        let reply = bus
            .send_and_wait(
                AgentMessage::new(agent("concierge"), agent("escalation"), "please handle"),
                Some(1_000),
            )
            .await
            .unwrap();
        assert_eq!(reply.content, "handled");
        assert_eq!(reply.to_agent_id, agent("concierge"));
    }

    #[tokio::test]
    async fn send_and_wait_ignores_unrelated_replies() {
        let bus = Arc::new(AgentBus::new());

        let responder_bus = bus.clone();
        let mut inbox = bus.subscribe(&agent("b"));
        tokio::spawn(async move {
            let request = inbox.recv().await.unwrap();
            // Noise first, then the real reply.
            responder_bus.send(AgentMessage::new(agent("b"), agent("a"), "noise"));
            responder_bus.send(AgentMessage::reply_to(&request, "real answer"));
        });

        let reply = bus
            .send_and_wait(AgentMessage::new(agent("a"), agent("b"), "?"), Some(1_000))
            .await
            .unwrap();
        assert_eq!(reply.content, "real answer");
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_wait_times_out_without_subscriber() {
        let bus = AgentBus::new();
        let err = bus
            .send_and_wait(
                AgentMessage::new(agent("a"), agent("nobody"), "hello?"),
                Some(250),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AGENT_TIMEOUT");
        assert!(err.to_string().contains("nobody"));
    }
}
