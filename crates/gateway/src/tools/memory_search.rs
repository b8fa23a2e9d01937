//! Long-term memory search surfaced as a tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use nx_domain::error::{Error, Result};

use crate::runtime::registry::{ExecutableTool, RiskLevel, ToolContext};

pub struct MemorySearchTool;

#[async_trait]
impl ExecutableTool for MemorySearchTool {
    fn id(&self) -> &str {
        "memory_search"
    }
    fn name(&self) -> &str {
        "Memory Search"
    }
    fn description(&self) -> &str {
        "Search the project's long-term memory for relevant facts and notes."
    }
    fn category(&self) -> &str {
        "memory"
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for" },
                "limit": { "type": "integer", "description": "Max results (default 5)" },
                "category": { "type": "string", "description": "Restrict to one category" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<Value> {
        let memory = ctx.memory.as_ref().ok_or_else(|| Error::ToolExecution {
            tool_id: self.id().to_owned(),
            message: "memory manager is not configured".into(),
        })?;

        let query = input["query"].as_str().unwrap_or_default();
        let mut config = ctx.memory_config.clone();
        if let Some(limit) = input["limit"].as_u64() {
            config.top_k = limit as usize;
        }
        let categories: Option<Vec<String>> = input["category"]
            .as_str()
            .map(|c| vec![c.to_owned()]);

        let hits = memory
            .retrieve(
                &ctx.project_id,
                query,
                &config,
                None,
                categories.as_deref(),
            )
            .await?;

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "content": hit.entry.content,
                    "category": hit.entry.category,
                    "similarity": hit.similarity,
                    "importance": hit.effective_importance,
                })
            })
            .collect();
        Ok(json!({ "results": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_domain::id::{ProjectId, SessionId, TraceId};
    use nx_memory::{EmbeddingProvider, MemoryEntry, MemoryManager};
    use std::sync::Arc;

    struct FlatEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn ctx_with_memory() -> ToolContext {
        let memory = Arc::new(MemoryManager::new(Some(Arc::new(FlatEmbedder))));
        memory.store(MemoryEntry::new(
            ProjectId::from("p1"),
            "facts",
            "breakfast is served 07:00-10:30",
            vec![1.0, 0.0],
            0.8,
        ));
        let mut ctx = ToolContext::new(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
        );
        ctx.memory = Some(memory);
        ctx
    }

    #[tokio::test]
    async fn finds_stored_entries() {
        let ctx = ctx_with_memory();
        let output = MemorySearchTool
            .execute(&json!({"query": "breakfast hours"}), &ctx)
            .await
            .unwrap();
        let results = output["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0]["content"]
            .as_str()
            .unwrap()
            .contains("breakfast"));
    }

    #[tokio::test]
    async fn category_filter_applies() {
        let ctx = ctx_with_memory();
        let output = MemorySearchTool
            .execute(&json!({"query": "anything", "category": "notes"}), &ctx)
            .await
            .unwrap();
        assert!(output["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_memory_manager_is_execution_error() {
        let ctx = ToolContext::new(
            ProjectId::from("p1"),
            SessionId::from("s1"),
            TraceId::from("t1"),
        );
        let err = MemorySearchTool
            .execute(&json!({"query": "x"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_EXECUTION_ERROR");
    }
}
