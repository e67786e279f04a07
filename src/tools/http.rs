//! HTTP invocation for manifest operations

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::{Result, RouterError};

use super::definition::ToolHandler;

const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

/// Where a parameter goes in the HTTP request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    #[default]
    Query,
    Body,
}

/// One managed service instance
pub struct HttpTarget {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    max_output_bytes: usize,
}

impl HttpTarget {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Debug for HttpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTarget")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

/// Parse an HTTP method name from a manifest
pub fn parse_method(method: &str) -> Option<Method> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "DELETE" => Some(Method::DELETE),
        "PATCH" => Some(Method::PATCH),
        "HEAD" => Some(Method::HEAD),
        _ => None,
    }
}

/// One REST operation bound to a target
#[derive(Debug)]
pub struct HttpOperation {
    method: Method,
    path: String,
    params: BTreeMap<String, ParamLocation>,
    target: Arc<HttpTarget>,
}

impl HttpOperation {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        params: BTreeMap<String, ParamLocation>,
        target: Arc<HttpTarget>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            params,
            target,
        }
    }

    /// Substitute `{name}` placeholders from `params`, percent-encoding each
    /// value so it stays within its path segment
    fn render_path(&self, params: &Value) -> Result<String> {
        let mut rendered = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let end = rest[start..]
                .find('}')
                .map(|e| start + e)
                .ok_or_else(|| RouterError::Tool(format!("unterminated placeholder in path '{}'", self.path)))?;
            let name = &rest[start + 1..end];
            let value = params
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| RouterError::Tool(format!("missing path parameter '{}'", name)))?;
            rendered.push_str(&rest[..start]);
            rendered.push_str(&urlencoding::encode(&value_to_string(value)));
            rest = &rest[end + 1..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }

    fn query_pairs(&self, params: &Value) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, location) in &self.params {
            if *location != ParamLocation::Query {
                continue;
            }
            match params.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    pairs.extend(items.iter().map(|v| (name.clone(), value_to_string(v))));
                }
                Some(v) => pairs.push((name.clone(), value_to_string(v))),
            }
        }
        pairs
    }

    fn body(&self, params: &Value) -> Option<Value> {
        let body: Map<String, Value> = self
            .params
            .iter()
            .filter(|(_, location)| **location == ParamLocation::Body)
            .filter_map(|(name, _)| params.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        (!body.is_empty()).then_some(Value::Object(body))
    }
}

#[async_trait]
impl ToolHandler for HttpOperation {
    async fn invoke(&self, params: Value, _ctx: &ExecutionContext) -> Result<String> {
        let path = self.render_path(&params)?;
        let url = format!("{}{}", self.target.base_url, path);
        debug!("{} {}", self.method, url);

        let mut request = self
            .target
            .client
            .request(self.method.clone(), &url)
            .query(&self.query_pairs(&params));
        if let Some(key) = &self.target.api_key {
            request = request.header("X-Api-Key", key);
        }
        if let Some(body) = self.body(&params) {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RouterError::Tool(format!("{} {} failed: {}", self.method, path, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RouterError::Tool(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(RouterError::Tool(format!(
                "{} {} returned {}: {}",
                self.method,
                path,
                status,
                truncate(text, 2_000)
            )));
        }
        Ok(truncate(text, self.target.max_output_bytes))
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut `text` to at most `max_bytes` on a char boundary
fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut cut = max_bytes;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... [output truncated]");
    }
    text
}
