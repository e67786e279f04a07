//! Tool catalogs
//!
//! A catalog owns the full set of invocable operations for one backend. It
//! either enumerates them in a stable order or declines, in which case the
//! toolset filter degrades to an empty toolset for that catalog.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{Result, RouterError};

use super::definition::ToolDescriptor;

/// Source of tool descriptors
pub trait ToolCatalog: Send + Sync {
    /// Name used in logs and warnings
    fn name(&self) -> &str;

    /// All descriptors in catalog order, or `CatalogUnavailable` if this
    /// catalog cannot enumerate itself
    fn enumerate(&self) -> Result<Vec<Arc<ToolDescriptor>>>;
}

/// In-memory catalog, immutable once handed to the router
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    name: String,
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Create an empty catalog
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a catalog from descriptors, rejecting duplicate names
    pub fn from_tools(name: impl Into<String>, tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut catalog = Self::new(name);
        for tool in tools {
            catalog.add(tool)?;
        }
        Ok(catalog)
    }

    /// Append a tool; names are unique within a catalog
    pub fn add(&mut self, tool: ToolDescriptor) -> Result<()> {
        if self.index.contains_key(tool.name()) {
            return Err(RouterError::Tool(format!(
                "duplicate tool '{}' in catalog '{}'",
                tool.name(),
                self.name
            )));
        }
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// List all tool names in catalog order
    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Every tag used by at least one tool
    pub fn tags(&self) -> BTreeSet<&str> {
        self.tools
            .iter()
            .flat_map(|t| t.tags().iter().map(|s| s.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

impl ToolCatalog for StaticCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn enumerate(&self) -> Result<Vec<Arc<ToolDescriptor>>> {
        Ok(self.tools.clone())
    }
}

/// Black-box catalog served by a remote tool server.
///
/// It can be called but not partitioned, so it always declines enumeration.
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    name: String,
    url: String,
}

impl RemoteCatalog {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl ToolCatalog for RemoteCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn enumerate(&self) -> Result<Vec<Arc<ToolDescriptor>>> {
        Err(RouterError::CatalogUnavailable {
            catalog: self.name.clone(),
            reason: format!("remote catalog at {} does not support structural filtering", self.url),
        })
    }
}
