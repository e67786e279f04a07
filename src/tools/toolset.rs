//! Toolsets and the capability filter
//!
//! A `Toolset` is an ordered list of shared descriptor references. It never
//! owns a descriptor; two toolsets are equal when they reference the same
//! descriptors in the same order.

use std::fmt;
use std::sync::Arc;

use crate::llm::ToolDefinition;

use super::catalog::ToolCatalog;
use super::definition::ToolDescriptor;

#[derive(Debug, Clone, Default)]
pub struct Toolset {
    tools: Vec<Arc<ToolDescriptor>>,
}

impl Toolset {
    pub fn new(tools: Vec<Arc<ToolDescriptor>>) -> Self {
        Self { tools }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.iter()
    }

    /// First tool with this name
    pub fn get(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Definitions sent to the model, in toolset order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_llm_definition()).collect()
    }

    /// Append the tools of `other` whose names are not taken yet.
    ///
    /// Returns the names that were skipped; the earlier tool keeps the name.
    pub fn merge(&mut self, other: Toolset) -> Vec<String> {
        let mut skipped = Vec::new();
        for tool in other.tools {
            if self.get(tool.name()).is_some() {
                skipped.push(tool.name().to_string());
            } else {
                self.tools.push(tool);
            }
        }
        skipped
    }
}

impl PartialEq for Toolset {
    fn eq(&self, other: &Self) -> bool {
        self.tools.len() == other.tools.len()
            && self.tools.iter().zip(&other.tools).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for Toolset {}

/// Non-fatal notice that a catalog contributed less than it holds for a tag:
/// it declined enumeration, or a tool name was already taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogWarning {
    pub catalog: String,
    pub tag: String,
    pub reason: String,
}

impl fmt::Display for CatalogWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "catalog '{}' contributed no tools for '{}': {}",
            self.catalog, self.tag, self.reason
        )
    }
}

/// Result of filtering one catalog by one tag
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub toolset: Toolset,
    pub warning: Option<CatalogWarning>,
}

/// Select every descriptor in `catalog` carrying `tag`, in catalog order.
///
/// A catalog that declines enumeration yields an empty toolset plus a
/// warning instead of an error.
pub fn filter(catalog: &dyn ToolCatalog, tag: &str) -> FilterOutcome {
    match catalog.enumerate() {
        Ok(tools) => FilterOutcome {
            toolset: Toolset::new(tools.into_iter().filter(|t| t.has_tag(tag)).collect()),
            warning: None,
        },
        Err(e) => FilterOutcome {
            toolset: Toolset::empty(),
            warning: Some(CatalogWarning {
                catalog: catalog.name().to_string(),
                tag: tag.to_string(),
                reason: e.to_string(),
            }),
        },
    }
}
