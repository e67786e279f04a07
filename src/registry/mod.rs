//! Capability registry: entries, built-in service profiles and prompts

mod entry;
mod profiles;
mod prompts;

pub use entry::{Registry, RegistryEntry};
pub use profiles::{CHAPTARR, PROFILES, PROWLARR, RADARR, SONARR, ServiceProfile, profile, require_profile};
pub use prompts::{
    PromptOverrides, SUPERVISOR_PROMPT_ENV, agent_prompt_env, default_agent_instructions, default_identity,
    default_supervisor_instructions, humanize,
};
