//! Conversation-history pruning.
//!
//! Two strategies, chosen by the project's memory config:
//! - **Turn-based**: keep the last N turns (a turn = one user message
//!   and everything after it up to the next user message).
//! - **Token-based**: drop oldest turns until the estimated token count
//!   plus a reserve fits the provider's context window.
//!
//! Pruning always drops whole turns from the front so the model never
//! sees an orphaned assistant or tool message.

use nx_domain::message::{Message, Role};

/// Indices where each turn starts (every user message opens a turn).
fn turn_starts(history: &[Message]) -> Vec<usize> {
    history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::User)
        .map(|(i, _)| i)
        .collect()
}

/// Keep only the last `max_turns` turns.
pub fn prune_turn_based(history: &[Message], max_turns: usize) -> Vec<Message> {
    let starts = turn_starts(history);
    if starts.len() <= max_turns {
        return history.to_vec();
    }
    let cut = starts[starts.len() - max_turns];
    history[cut..].to_vec()
}

/// Drop oldest turns until `estimate(kept) + reserve_tokens <= window`.
///
/// `estimate` is the provider's token counter. The newest turn is always
/// kept even if it alone exceeds the window — the provider surfaces that
/// as its own error.
pub fn prune_token_based<F>(
    history: &[Message],
    estimate: F,
    reserve_tokens: u32,
    context_window: u32,
) -> Vec<Message>
where
    F: Fn(&[Message]) -> u32,
{
    let starts = turn_starts(history);
    if starts.is_empty() {
        return history.to_vec();
    }

    let budget = context_window.saturating_sub(reserve_tokens);
    for (idx, &cut) in starts.iter().enumerate() {
        let kept = &history[cut..];
        if estimate(kept) <= budget || idx == starts.len() - 1 {
            return kept.to_vec();
        }
    }
    history.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(user: &str, assistant: &str) -> Vec<Message> {
        vec![Message::user(user), Message::assistant(assistant)]
    }

    fn history(turns: usize) -> Vec<Message> {
        (0..turns)
            .flat_map(|i| turn(&format!("question {i}"), &format!("answer {i}")))
            .collect()
    }

    #[test]
    fn turn_based_keeps_last_n() {
        let h = history(5);
        let pruned = prune_turn_based(&h, 2);
        assert_eq!(pruned.len(), 4);
        assert_eq!(pruned[0].content.extract_all_text(), "question 3");
    }

    #[test]
    fn turn_based_noop_when_under_limit() {
        let h = history(3);
        assert_eq!(prune_turn_based(&h, 5).len(), h.len());
    }

    #[test]
    fn turn_based_never_orphans_tool_messages() {
        let mut h = history(2);
        // Tool traffic belongs to the second turn.
        h.push(Message::tool_result("tc_1", "data", false));
        h.push(Message::assistant("final"));
        let pruned = prune_turn_based(&h, 1);
        assert_eq!(pruned[0].role, Role::User);
        assert_eq!(pruned.len(), 4);
    }

    #[test]
    fn token_based_drops_until_fit() {
        let h = history(10);
        // Each message estimates to 100 tokens.
        let estimate = |msgs: &[Message]| (msgs.len() as u32) * 100;
        // Window 1000, reserve 200 → budget 800 → 8 messages = 4 turns.
        let pruned = prune_token_based(&h, estimate, 200, 1000);
        assert_eq!(pruned.len(), 8);
        assert_eq!(pruned[0].role, Role::User);
        assert_eq!(pruned[0].content.extract_all_text(), "question 6");
    }

    #[test]
    fn token_based_keeps_newest_turn_even_if_oversized() {
        let h = history(3);
        let estimate = |msgs: &[Message]| (msgs.len() as u32) * 10_000;
        let pruned = prune_token_based(&h, estimate, 0, 100);
        // Only the last turn survives.
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned[0].content.extract_all_text(), "question 2");
    }

    #[test]
    fn token_based_noop_when_it_fits() {
        let h = history(2);
        let estimate = |msgs: &[Message]| msgs.len() as u32;
        assert_eq!(prune_token_based(&h, estimate, 0, 1000).len(), 4);
    }

    #[test]
    fn empty_history_is_fine() {
        assert!(prune_turn_based(&[], 5).is_empty());
        assert!(prune_token_based(&[], |_| 0, 0, 100).is_empty());
    }
}
