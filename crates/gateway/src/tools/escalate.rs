//! Escalation tool — one agent hands a question to another over the
//! inter-agent bus and waits for the reply.

use async_trait::async_trait;
use serde_json::{json, Value};

use nx_domain::error::{Error, Result};
use nx_domain::id::AgentId;

use crate::runtime::comms::AgentMessage;
use crate::runtime::registry::{ExecutableTool, RiskLevel, ToolContext};

pub struct EscalateTool;

#[async_trait]
impl ExecutableTool for EscalateTool {
    fn id(&self) -> &str {
        "agent_escalate"
    }
    fn name(&self) -> &str {
        "Escalate to Agent"
    }
    fn description(&self) -> &str {
        "Ask another agent for help and wait for its reply."
    }
    fn category(&self) -> &str {
        "coordination"
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from_agent_id": { "type": "string", "description": "Calling agent id" },
                "to_agent_id": { "type": "string", "description": "Target agent id" },
                "message": { "type": "string", "description": "What to ask" },
                "timeout_ms": { "type": "integer", "description": "Reply timeout (default 30000)" }
            },
            "required": ["from_agent_id", "to_agent_id", "message"]
        })
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<Value> {
        let bus = ctx.bus.as_ref().ok_or_else(|| Error::ToolExecution {
            tool_id: self.id().to_owned(),
            message: "agent bus is not configured".into(),
        })?;

        let msg = AgentMessage::new(
            AgentId::from(input["from_agent_id"].as_str().unwrap_or_default()),
            AgentId::from(input["to_agent_id"].as_str().unwrap_or_default()),
            input["message"].as_str().unwrap_or_default(),
        );
        let timeout_ms = input["timeout_ms"].as_u64();

        let reply = bus.send_and_wait(msg, timeout_ms).await?;
        Ok(json!({
            "reply": reply.content,
            "from_agent_id": reply.from_agent_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::comms::AgentBus;
    use nx_domain::id::{ProjectId, SessionId, TraceId};
    use std::sync::Arc;

    fn ctx_with_bus(bus: Arc<AgentBus>) -> ToolContext {
        let mut ctx = ToolContext::new(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
        );
        ctx.bus = Some(bus);
        ctx
    }

    #[tokio::test]
    async fn escalation_round_trip() {
        let bus = Arc::new(AgentBus::new());
        let mut inbox = bus.subscribe(&AgentId::from("supervisor"));
        let responder = bus.clone();
        tokio::spawn(async move {
            let request = inbox.recv().await.unwrap();
            responder.send(AgentMessage::reply_to(&request, "approved, offer the discount"));
        });

        let output = EscalateTool
            .execute(
                &json!({
                    "from_agent_id": "concierge",
                    "to_agent_id": "supervisor",
                    "message": "guest asks for a late checkout discount",
                    "timeout_ms": 1000
                }),
                &ctx_with_bus(bus),
            )
            .await
            .unwrap();
        assert_eq!(output["reply"], "approved, offer the discount");
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_times_out() {
        let bus = Arc::new(AgentBus::new());
        let err = EscalateTool
            .execute(
                &json!({
                    "from_agent_id": "concierge",
                    "to_agent_id": "nobody",
                    "message": "hello?",
                    "timeout_ms": 200
                }),
                &ctx_with_bus(bus),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AGENT_TIMEOUT");
    }
}
