//! Per-million-token pricing tables.
//!
//! Used by the trace recorder and cost guard to derive USD cost from
//! `llm_response` usage. Unknown models fall back to a conservative
//! default so cost tracking never silently reports zero.

use nx_domain::stream::Usage;

/// (input USD, output USD) per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const FALLBACK: ModelPrice = ModelPrice {
    input_per_million: 5.0,
    output_per_million: 15.0,
};

/// Look up pricing for a model id. Matching is by prefix so dated
/// snapshot suffixes (`-20250514`) resolve to their family.
pub fn price_per_million(model: &str) -> ModelPrice {
    const TABLE: &[(&str, ModelPrice)] = &[
        (
            "claude-opus-4",
            ModelPrice {
                input_per_million: 15.0,
                output_per_million: 75.0,
            },
        ),
        (
            "claude-sonnet-4",
            ModelPrice {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
        ),
        (
            "claude-haiku-3-5",
            ModelPrice {
                input_per_million: 0.8,
                output_per_million: 4.0,
            },
        ),
        (
            "gpt-4o-mini",
            ModelPrice {
                input_per_million: 0.15,
                output_per_million: 0.6,
            },
        ),
        (
            "gpt-4o",
            ModelPrice {
                input_per_million: 2.5,
                output_per_million: 10.0,
            },
        ),
        (
            "gpt-4.1",
            ModelPrice {
                input_per_million: 2.0,
                output_per_million: 8.0,
            },
        ),
    ];

    TABLE
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, price)| *price)
        .unwrap_or(FALLBACK)
}

/// Cost in USD for one response's usage against a model's pricing.
pub fn cost_for(model: &str, usage: &Usage) -> f64 {
    let price = price_per_million(model);
    (usage.input_tokens as f64 * price.input_per_million
        + usage.output_tokens as f64 * price.output_per_million)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_snapshot_resolves_to_family() {
        assert_eq!(
            price_per_million("claude-sonnet-4-20250514"),
            price_per_million("claude-sonnet-4")
        );
    }

    #[test]
    fn mini_matches_before_base_gpt4o() {
        let mini = price_per_million("gpt-4o-mini-2024-07-18");
        assert_eq!(mini.input_per_million, 0.15);
    }

    #[test]
    fn unknown_model_uses_fallback() {
        assert_eq!(price_per_million("mystery-model"), FALLBACK);
    }

    #[test]
    fn cost_math() {
        // 1M input + 1M output on sonnet = 3 + 15 = 18 USD.
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            ..Default::default()
        };
        let cost = cost_for("claude-sonnet-4", &usage);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn zero_usage_is_free() {
        assert_eq!(cost_for("gpt-4o", &Usage::default()), 0.0);
    }
}
