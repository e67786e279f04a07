//! Configuration system for arr-router.
//!
//! 1. Config file (--config, .arr-router.yml or ~/.config/arr-router/arr-router.yml)
//! 2. Environment overrides (MODEL_ID, LLM_BASE_URL, prompt variables)

use eyre::{Context, Result};
use std::path::PathBuf;

pub use self::catalogs::{CatalogSource, build_catalogs};
pub use self::global::RouterConfig;

mod catalogs;
mod global;
mod overrides;

/// Load, apply environment overrides, then validate.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<RouterConfig> {
    let mut config = RouterConfig::load(explicit_path)?;
    for var in overrides::apply_env(&mut config, |key| std::env::var(key).ok()) {
        log::info!("Applied {} from environment", var);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
