//! Instruction text for workers and the coordinator

use std::collections::HashMap;

/// Env var that replaces the coordinator instructions
pub const SUPERVISOR_PROMPT_ENV: &str = "SUPERVISOR_SYSTEM_PROMPT";

/// Split a CamelCase tag into lower-case words: `QueueStatus` -> `queue status`
pub fn humanize(tag: &str) -> String {
    let chars: Vec<char> = tag.chars().collect();
    let mut out = String::with_capacity(tag.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// `Radarr_Queue_Agent`
pub fn default_identity(service: &str, tag: &str) -> String {
    format!("{}_{}_Agent", service, tag)
}

pub fn default_agent_instructions(service: &str, tag: &str) -> String {
    format!(
        "You are the {service} {tag} Agent.\n\
         Your goal is to manage {domain} resources.\n\
         You have access to tools specifically tagged with '{tag}'.\n\
         Use these tools to fulfill the user's request.",
        domain = humanize(tag)
    )
}

/// Coordinator policy: route, never invent, keep every domain's result,
/// say what is missing.
pub fn default_supervisor_instructions(service: &str) -> String {
    format!(
        "You are the {service} Supervisor Agent.\n\
         Your goal is to help the user by assigning tasks to specialized child agents, \
         one per {service} capability domain, through your dispatch tools.\n\
         1. Decide which capability domain or domains the request touches.\n\
         2. Call the matching dispatch tool for each, with a precise, self-contained task description.\n\
         3. Never invent information. Use only what the dispatch tools return.\n\
         4. When several domains are involved, the final answer must include all of the information \
         returned by every dispatch. Never drop a domain's result or leave it to the user to find.\n\
         5. If information needed to answer is missing from every dispatch, state clearly that it is \
         missing instead of guessing. If a dispatch failed or timed out, say that the <domain> lookup \
         did not complete.\n\
         Present the final answer logically and concisely, using headers, lists and tables where they help."
    )
}

/// Env var that replaces one worker's instructions: `QUEUESTATUS_AGENT_PROMPT`
pub fn agent_prompt_env(tag: &str) -> String {
    format!("{}_AGENT_PROMPT", tag.to_uppercase())
}

/// Instruction overrides from config and environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOverrides {
    supervisor: Option<String>,
    agents: HashMap<String, String>,
}

impl PromptOverrides {
    pub fn new(supervisor: Option<String>, agents: HashMap<String, String>) -> Self {
        Self { supervisor, agents }
    }

    pub fn set_supervisor(&mut self, text: impl Into<String>) {
        self.supervisor = Some(text.into());
    }

    pub fn set_agent(&mut self, tag: impl Into<String>, text: impl Into<String>) {
        self.agents.insert(tag.into(), text.into());
    }

    pub fn supervisor(&self) -> Option<&str> {
        self.supervisor.as_deref()
    }

    pub fn agent(&self, tag: &str) -> Option<&str> {
        self.agents.get(tag).map(String::as_str)
    }

    /// Layer environment overrides on top; environment wins.
    ///
    /// `lookup` is `std::env::var` in the binary and a map in tests.
    pub fn apply_env<'a, F>(&mut self, tags: impl IntoIterator<Item = &'a str>, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(text) = lookup(SUPERVISOR_PROMPT_ENV) {
            self.supervisor = Some(text);
        }
        for tag in tags {
            if let Some(text) = lookup(&agent_prompt_env(tag)) {
                self.agents.insert(tag.to_string(), text);
            }
        }
    }
}
