//! Router configuration file.
//!
//! Loaded from --config, ./.arr-router.yml or ~/.config/arr-router/arr-router.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arr_router::context::UsageLimits;
use arr_router::llm::{AnthropicConfig, ModelSettings};
use arr_router::registry::{PromptOverrides, ServiceProfile, require_profile};
use arr_router::runner::{DispatchMode, RunnerConfig};
use arr_router::service::ServiceOptions;

use super::catalogs::CatalogSource;

/// Project config file name
pub const PROJECT_CONFIG: &str = ".arr-router.yml";

/// Top-level configuration for arr-router.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RouterConfig {
    /// Model settings shared by the coordinator and every worker.
    pub llm: LlmConfig,

    /// Routing behaviour.
    pub router: RouterSection,

    /// Where operations come from.
    pub catalogs: Vec<CatalogSource>,

    /// Instruction overrides.
    pub prompts: PromptsConfig,
}

impl RouterConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .arr-router.yml in current directory
    /// 3. ~/.config/arr-router/arr-router.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(PROJECT_CONFIG);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", PROJECT_CONFIG);
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", PROJECT_CONFIG, e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("arr-router").join("arr-router.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.llm.timeout_ms == 0 {
            eyre::bail!("llm.timeout-ms must be > 0");
        }
        if self.llm.max_tokens == 0 {
            eyre::bail!("llm.max-tokens must be > 0");
        }
        if self.router.worker_timeout_ms == 0 {
            eyre::bail!("router.worker-timeout-ms must be > 0");
        }
        if self.router.tool_timeout_ms == 0 {
            eyre::bail!("router.tool-timeout-ms must be > 0");
        }
        if self.router.max_steps == 0 {
            eyre::bail!("router.max-steps must be > 0");
        }
        if self.router.request_timeout_ms == Some(0) {
            eyre::bail!("router.request-timeout-ms must be > 0 when set");
        }
        self.profile()?;
        Ok(())
    }

    /// Built-in profile named by `router.service`
    pub fn profile(&self) -> Result<&'static ServiceProfile> {
        Ok(require_profile(&self.router.service)?)
    }

    /// Config prompts, then environment on top
    pub fn prompt_overrides<F>(&self, profile: &ServiceProfile, lookup: F) -> PromptOverrides
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overrides = PromptOverrides::new(self.prompts.supervisor.clone(), self.prompts.agents.clone());
        overrides.apply_env(profile.tags.iter().copied(), lookup);
        overrides
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            worker_timeout: Duration::from_millis(self.router.worker_timeout_ms),
            tool_timeout: Some(Duration::from_millis(self.router.tool_timeout_ms)),
            limits: UsageLimits {
                request_limit: self.router.usage_limits.request_limit,
                total_tokens_limit: self.router.usage_limits.total_tokens_limit,
            },
            deadline: self.router.request_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_steps: self.router.max_steps,
            dispatch_mode: self.router.dispatch_mode,
        }
    }
}

/// Model settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LlmConfig {
    pub model: String,

    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    pub max_tokens: u32,

    pub temperature: f32,

    pub top_p: f32,

    /// Timeout per model call in milliseconds.
    pub timeout_ms: u64,

    pub stop_sequences: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: arr_router::llm::anthropic::DEFAULT_MODEL.to_string(),
            base_url: arr_router::llm::anthropic::DEFAULT_BASE_URL.to_string(),
            api_key_env: arr_router::llm::anthropic::DEFAULT_API_KEY_ENV.to_string(),
            max_tokens: 16384,
            temperature: 0.7,
            top_p: 1.0,
            timeout_ms: 300_000, // 5 minutes
            stop_sequences: Vec::new(),
        }
    }
}

impl LlmConfig {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: Some(self.top_p),
            stop_sequences: self.stop_sequences.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
            api_key_env: self.api_key_env.clone(),
        }
    }
}

/// Routing behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RouterSection {
    /// Built-in service profile (radarr, sonarr, prowlarr, chaptarr).
    pub service: String,

    /// How same-turn dispatches run.
    pub dispatch_mode: DispatchMode,

    /// Per dispatch, in milliseconds.
    pub worker_timeout_ms: u64,

    /// Per backend call, in milliseconds.
    pub tool_timeout_ms: u64,

    /// Model turns per agent run.
    pub max_steps: u32,

    /// Overall deadline per request, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    pub usage_limits: UsageLimitsConfig,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            service: "radarr".to_string(),
            dispatch_mode: DispatchMode::Sequential,
            worker_timeout_ms: 120_000,
            tool_timeout_ms: 30_000,
            max_steps: 25,
            request_timeout_ms: None,
            usage_limits: UsageLimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UsageLimitsConfig {
    pub request_limit: Option<u64>,
    pub total_tokens_limit: Option<u64>,
}

/// Instruction overrides, keyed by capability tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub supervisor: Option<String>,
    pub agents: HashMap<String, String>,
}
