//! Provider factory.
//!
//! Builds an adapter from a [`ProviderSpec`], resolving the API key
//! from the environment variable the spec names. The raw key goes
//! straight into the adapter struct; it is never logged or placed in
//! any persistent record.

use std::sync::Arc;

use nx_domain::config::{ProviderKind, ProviderSpec};
use nx_domain::error::{Error, Result};

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// Build a provider instance for the given spec.
pub fn build_provider(spec: &ProviderSpec) -> Result<Arc<dyn LlmProvider>> {
    let api_key = resolve_api_key(&spec.api_key_env)?;
    match spec.provider {
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(spec, api_key)?)),
        ProviderKind::OpenaiCompat => Ok(Arc::new(OpenAiCompatProvider::new(spec, api_key)?)),
    }
}

/// Read an API key from the named environment variable.
fn resolve_api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var).map_err(|_| {
        Error::Config(format!(
            "environment variable '{env_var}' not set or not valid UTF-8"
        ))
    })
}
