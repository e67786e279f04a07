//! Tool system: descriptors, catalogs, the capability filter, and routing

mod catalog;
mod definition;
mod http;
mod manifest;
mod router;
mod toolset;

pub use catalog::{RemoteCatalog, StaticCatalog, ToolCatalog};
pub use definition::{CapabilityTag, FnHandler, StaticHandler, ToolDescriptor, ToolHandler};
pub use http::{HttpOperation, HttpTarget, ParamLocation};
pub use manifest::{load_manifest, load_manifest_file};
pub use router::{ToolRouter, ToolsetRouter};
pub use toolset::{CatalogWarning, FilterOutcome, Toolset, filter};
