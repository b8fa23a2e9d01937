//! LLM provider adapters for Nexus Core.
//!
//! Each adapter translates between the provider-agnostic domain types
//! and one vendor's HTTP wire format, exposing a streaming
//! [`ChatEvent`](nx_domain::stream::ChatEvent) interface. The factory
//! resolves API keys from the environment; raw keys live only inside
//! adapter structs and never reach persistent records.

mod anthropic;
mod classify;
mod factory;
mod openai_compat;
mod pricing;
mod sse;
mod traits;

pub use anthropic::AnthropicProvider;
pub use classify::{classify_http_status, classify_reqwest_error};
pub use factory::build_provider;
pub use openai_compat::OpenAiCompatProvider;
pub use pricing::{cost_for, price_per_million};
pub use traits::{ChatParams, LlmProvider};
