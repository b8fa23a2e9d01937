//! History compaction — folds a long conversation into a summary
//! memory entry after a run.
//!
//! Runs when compaction is enabled and the run's turn count reached the
//! context cap. The summary is produced by the run's own provider and
//! ingested into long-term memory under the `session_summary` category.

use std::sync::Arc;

use futures_util::StreamExt;

use nx_domain::config::MemoryConfig;
use nx_domain::error::Result;
use nx_domain::id::ProjectId;
use nx_domain::message::Message;
use nx_domain::stream::ChatEvent;
use nx_memory::MemoryManager;
use nx_providers::{ChatParams, LlmProvider};

/// Importance assigned to compaction summaries.
const SUMMARY_IMPORTANCE: f64 = 0.7;

/// Whether this run's history has grown enough to compact.
pub fn should_compact(turn_count: u32, config: &MemoryConfig) -> bool {
    config.compaction_enabled && turn_count as usize >= config.max_turns_in_context
}

/// Summarize the conversation and store the result. Returns the
/// summary text (empty when the model produced nothing).
pub async fn run_compaction(
    provider: &dyn LlmProvider,
    memory: &Arc<MemoryManager>,
    project: &ProjectId,
    history: &[Message],
) -> Result<String> {
    let mut messages = vec![Message::system(
        "Summarize the conversation below for long-term memory. Keep facts, \
         decisions, open questions, and user preferences. Be concise.",
    )];
    messages.extend_from_slice(history);
    messages.push(Message::user("Summarize the conversation so far."));

    let mut stream = provider
        .chat(ChatParams {
            messages,
            max_tokens: Some(1024),
            ..Default::default()
        })
        .await?;

    let mut summary = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ChatEvent::ContentDelta { text } => summary.push_str(&text),
            ChatEvent::MessageEnd { .. } => break,
            _ => {}
        }
    }

    if !summary.is_empty() {
        memory
            .store_text(project, "session_summary", &summary, SUMMARY_IMPORTANCE)
            .await?;
        tracing::info!(project = %project, chars = summary.len(), "compaction summary stored");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_gated_by_config() {
        let config = MemoryConfig {
            compaction_enabled: true,
            max_turns_in_context: 20,
            ..Default::default()
        };
        assert!(!should_compact(19, &config));
        assert!(should_compact(20, &config));
        assert!(should_compact(25, &config));

        let disabled = MemoryConfig {
            compaction_enabled: false,
            ..config
        };
        assert!(!should_compact(25, &disabled));
    }
}
