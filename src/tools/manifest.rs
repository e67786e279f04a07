//! Operation manifests
//!
//! Loads REST operation descriptions from YAML and turns each into a tagged
//! `ToolDescriptor` backed by an `HttpOperation`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, RouterError};

use super::catalog::StaticCatalog;
use super::definition::ToolDescriptor;
use super::http::{HttpOperation, HttpTarget, ParamLocation, parse_method};

/// YAML representation of an operation parameter
#[derive(Debug, Deserialize)]
struct ManifestParam {
    #[serde(rename = "type")]
    param_type: String,
    description: Option<String>,
    #[serde(rename = "in", default)]
    location: ParamLocation,
}

/// YAML representation of one operation
#[derive(Debug, Deserialize)]
struct ManifestOperation {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    method: String,
    path: String,
    #[serde(default)]
    params: BTreeMap<String, ManifestParam>,
    #[serde(default)]
    required: Vec<String>,
}

/// Load a manifest file into a catalog named after the file stem
pub fn load_manifest_file(path: impl AsRef<Path>, target: Arc<HttpTarget>) -> Result<StaticCatalog> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    load_manifest(name, &content, target)
}

/// Load a manifest from a YAML string
pub fn load_manifest(name: impl Into<String>, content: &str, target: Arc<HttpTarget>) -> Result<StaticCatalog> {
    let name = name.into();
    let operations: Vec<ManifestOperation> = serde_yaml::from_str(content)?;

    let mut seen = HashSet::new();
    let mut catalog = StaticCatalog::new(name.clone());
    for op in operations {
        if !seen.insert(op.name.clone()) {
            return Err(RouterError::Config(format!(
                "duplicate operation '{}' in manifest '{}'",
                op.name, name
            )));
        }
        catalog.add(convert_operation(op, Arc::clone(&target))?)?;
    }
    Ok(catalog)
}

/// Convert a manifest operation to a descriptor with a JSON schema
fn convert_operation(op: ManifestOperation, target: Arc<HttpTarget>) -> Result<ToolDescriptor> {
    let method = parse_method(&op.method)
        .ok_or_else(|| RouterError::Config(format!("unknown method '{}' for operation '{}'", op.method, op.name)))?;

    if let Some(missing) = op.required.iter().find(|r| !op.params.contains_key(*r)) {
        return Err(RouterError::Config(format!(
            "operation '{}' requires undeclared parameter '{}'",
            op.name, missing
        )));
    }

    let mut properties = serde_json::Map::new();
    let mut locations = BTreeMap::new();
    for (param_name, param) in op.params {
        let mut prop = serde_json::Map::new();
        prop.insert("type".to_string(), Value::String(param.param_type));
        if let Some(desc) = param.description {
            prop.insert("description".to_string(), Value::String(desc));
        }
        properties.insert(param_name.clone(), Value::Object(prop));
        locations.insert(param_name, param.location);
    }

    let schema = serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": op.required
    });

    let handler = HttpOperation::new(method, op.path, locations, target);
    Ok(ToolDescriptor::new(op.name, op.description, Arc::new(handler))
        .with_schema(schema)
        .with_tags(op.tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE_YAML: &str = r#"
- name: get_queue
  description: List items in the download queue
  tags: [Queue]
  method: GET
  path: /api/v3/queue
  params:
    page:
      type: integer
      description: Page number
    pageSize:
      type: integer
- name: delete_queue_item
  description: Remove an item from the queue
  tags: [Queue, QueueAction]
  method: delete
  path: /api/v3/queue/{id}
  params:
    id:
      type: integer
      in: path
    blocklist:
      type: boolean
  required: [id]
- name: add_indexer
  description: Add an indexer
  tags: [Indexer]
  method: POST
  path: /api/v3/indexer
  params:
    name:
      type: string
      in: body
"#;

    fn target() -> Arc<HttpTarget> {
        Arc::new(HttpTarget::new("http://localhost:7878", None, Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_load_manifest() {
        let catalog = load_manifest("radarr", SAMPLE_YAML, target()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.list(), vec!["get_queue", "delete_queue_item", "add_indexer"]);

        let delete = catalog.get("delete_queue_item").unwrap();
        assert!(delete.has_tag("Queue"));
        assert!(delete.has_tag("QueueAction"));
        assert_eq!(delete.input_schema()["required"], serde_json::json!(["id"]));
        assert_eq!(delete.input_schema()["properties"]["id"]["type"], "integer");
    }

    #[test]
    fn test_schema_includes_descriptions() {
        let catalog = load_manifest("radarr", SAMPLE_YAML, target()).unwrap();
        let queue = catalog.get("get_queue").unwrap();
        assert_eq!(queue.input_schema()["properties"]["page"]["description"], "Page number");
        assert!(queue.input_schema()["properties"]["pageSize"].get("description").is_none());
    }

    #[test]
    fn test_duplicate_operation_is_error() {
        let yaml = r#"
- {name: ping, method: GET, path: /ping}
- {name: ping, method: GET, path: /ping}
"#;
        let err = load_manifest("radarr", yaml, target()).unwrap_err();
        assert!(err.to_string().contains("duplicate operation 'ping'"));
    }

    #[test]
    fn test_unknown_method_is_error() {
        let yaml = "- {name: ping, method: FETCH, path: /ping}";
        let err = load_manifest("radarr", yaml, target()).unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
        assert!(err.to_string().contains("unknown method 'FETCH'"));
    }

    #[test]
    fn test_required_must_be_declared() {
        let yaml = "- {name: get_movie, method: GET, path: '/movie/{id}', required: [id]}";
        assert!(load_manifest("radarr", yaml, target()).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let err = load_manifest("radarr", "- name: [", target()).unwrap_err();
        assert!(matches!(err, RouterError::Yaml(_)));
    }

    #[test]
    fn test_load_manifest_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sonarr.yml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();
        let catalog = load_manifest_file(&path, target()).unwrap();
        assert_eq!(crate::tools::ToolCatalog::name(&catalog), "sonarr");
    }
}
