//! Capability registry
//!
//! A fixed, ordered table of capability domains. Validated once at startup;
//! read-only afterwards.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, RouterError};
use crate::tools::CapabilityTag;

/// One capability domain and the worker identity that serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    tag: CapabilityTag,
    identity: String,
    instructions: String,
}

impl RegistryEntry {
    /// Fails on an empty or malformed tag, or an empty identity
    pub fn new(tag: impl Into<String>, identity: impl Into<String>, instructions: impl Into<String>) -> Result<Self> {
        let tag = CapabilityTag::parse(tag)?;
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(RouterError::RegistryConfig(format!(
                "entry '{}' has an empty identity",
                tag
            )));
        }
        Ok(Self {
            tag,
            identity,
            instructions: instructions.into(),
        })
    }

    pub fn tag(&self) -> &CapabilityTag {
        &self.tag
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    index: HashMap<CapabilityTag, usize>,
}

impl Registry {
    /// Validate and freeze the table. Duplicate tags are fatal.
    pub fn new(entries: Vec<RegistryEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(RouterError::RegistryConfig("registry has no entries".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.tag.clone()) {
                return Err(RouterError::RegistryConfig(format!(
                    "duplicate capability tag '{}'",
                    entry.tag
                )));
            }
        }

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.tag.clone(), i))
            .collect();
        log::info!("Capability registry built with {} entries", entries.len());
        Ok(Self { entries, index })
    }

    /// Build from `(tag, identity, instructions)` triples
    pub fn from_specs<I, A, B, C>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, B, C)>,
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
    {
        let entries = specs
            .into_iter()
            .map(|(tag, identity, instructions)| RegistryEntry::new(tag, identity, instructions))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, tag: &str) -> Option<&RegistryEntry> {
        CapabilityTag::parse(tag)
            .ok()
            .and_then(|t| self.index.get(&t))
            .map(|&i| &self.entries[i])
    }

    pub fn tags(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.tag.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
