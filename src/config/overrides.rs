//! Environment overrides.
//!
//! Applied after the config file is loaded; the environment wins.

use super::global::RouterConfig;

/// Replaces `llm.model`
pub const MODEL_ID_ENV: &str = "MODEL_ID";

/// Replaces `llm.base-url`
pub const LLM_BASE_URL_ENV: &str = "LLM_BASE_URL";

/// Apply model overrides from the environment.
///
/// Prompt overrides are per tag and resolved later against the selected
/// profile (see `RouterConfig::prompt_overrides`).
pub fn apply_env<F>(config: &mut RouterConfig, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();
    if let Some(model) = lookup(MODEL_ID_ENV).filter(|v| !v.trim().is_empty()) {
        config.llm.model = model;
        applied.push(MODEL_ID_ENV);
    }
    if let Some(url) = lookup(LLM_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.llm.base_url = url;
        applied.push(LLM_BASE_URL_ENV);
    }
    applied
}
