//! Catalog sources.
//!
//! Turns the `catalogs` section into live catalogs: YAML operation manifests
//! backed by HTTP, or remote catalogs that decline enumeration.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arr_router::tools::{HttpTarget, RemoteCatalog, ToolCatalog, load_manifest_file};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CatalogSource {
    /// One or more manifest files; `path` may be a glob.
    Manifest {
        path: String,
        #[serde(rename = "base-url")]
        base_url: String,
        #[serde(rename = "api-key-env", default, skip_serializing_if = "Option::is_none")]
        api_key_env: Option<String>,
    },
    /// Tool server that can be called but not partitioned.
    Remote { name: String, url: String },
}

/// Expand a manifest path or glob, sorted for a stable catalog order.
pub fn expand_manifest_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = glob::glob(pattern)
        .context(format!("Invalid manifest pattern '{}'", pattern))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(format!("Failed to read manifests matching '{}'", pattern))?;
    paths.sort();
    if paths.is_empty() {
        eyre::bail!("No manifest matches '{}'", pattern);
    }
    Ok(paths)
}

/// Build every configured catalog.
///
/// `lookup` resolves API key variables; the binary passes `std::env::var`.
pub fn build_catalogs<F>(sources: &[CatalogSource], tool_timeout: Duration, lookup: F) -> Result<Vec<Arc<dyn ToolCatalog>>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut catalogs: Vec<Arc<dyn ToolCatalog>> = Vec::new();
    for source in sources {
        match source {
            CatalogSource::Manifest {
                path,
                base_url,
                api_key_env,
            } => {
                let api_key = match api_key_env {
                    Some(var) => {
                        let key = lookup(var);
                        if key.is_none() {
                            log::warn!("{} is not set; calls to {} go out without an API key", var, base_url);
                        }
                        key
                    }
                    None => None,
                };
                let target = Arc::new(HttpTarget::new(base_url.clone(), api_key, tool_timeout)?);
                for manifest in expand_manifest_paths(path)? {
                    let catalog = load_manifest_file(&manifest, Arc::clone(&target))
                        .context(format!("Failed to load manifest {}", manifest.display()))?;
                    log::info!(
                        "Loaded catalog '{}' with {} operation(s) from {}",
                        catalog.name(),
                        catalog.len(),
                        manifest.display()
                    );
                    catalogs.push(Arc::new(catalog));
                }
            }
            CatalogSource::Remote { name, url } => {
                log::info!("Registered remote catalog '{}' at {}", name, url);
                catalogs.push(Arc::new(RemoteCatalog::new(name.clone(), url.clone())));
            }
        }
    }
    Ok(catalogs)
}
