//! Worker factory
//!
//! Builds one worker per registry entry. Every worker shares the same runner
//! (model and settings); only instructions and toolset differ.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::registry::{Registry, RegistryEntry};
use crate::runner::AgentRunner;
use crate::tools::{CatalogWarning, ToolCatalog, Toolset, filter};

use super::agent::Worker;

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(120);

pub struct WorkerFactory {
    catalogs: Vec<Arc<dyn ToolCatalog>>,
    runner: Arc<AgentRunner>,
    worker_timeout: Duration,
    tool_timeout: Option<Duration>,
}

impl WorkerFactory {
    pub fn new(catalogs: Vec<Arc<dyn ToolCatalog>>, runner: Arc<AgentRunner>) -> Self {
        Self {
            catalogs,
            runner,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            tool_timeout: None,
        }
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn catalogs(&self) -> &[Arc<dyn ToolCatalog>] {
        &self.catalogs
    }

    /// Build the worker for one entry.
    ///
    /// The toolset is the concatenation, in catalog order, of each catalog
    /// filtered by the entry's tag. Declining catalogs contribute nothing and
    /// a warning. A tool whose name an earlier catalog already supplied is
    /// skipped with a warning, so names stay unique for the model.
    pub fn build(&self, entry: &RegistryEntry) -> (Worker, Vec<CatalogWarning>) {
        let mut toolset = Toolset::empty();
        let mut warnings = Vec::new();

        for catalog in &self.catalogs {
            let outcome = filter(catalog.as_ref(), entry.tag().as_str());
            if let Some(warning) = outcome.warning {
                debug!("{}", warning);
                warnings.push(warning);
            }
            for name in toolset.merge(outcome.toolset) {
                let warning = CatalogWarning {
                    catalog: catalog.name().to_string(),
                    tag: entry.tag().to_string(),
                    reason: format!("tool '{}' is already provided by an earlier catalog", name),
                };
                debug!("{}", warning);
                warnings.push(warning);
            }
        }

        debug!("Built worker {} with {} tool(s)", entry.identity(), toolset.len());
        let mut worker = Worker::new(entry, toolset, Arc::clone(&self.runner), self.worker_timeout);
        if let Some(timeout) = self.tool_timeout {
            worker = worker.with_tool_timeout(timeout);
        }
        (worker, warnings)
    }

    /// Build every worker in registry order
    pub fn build_all(&self, registry: &Registry) -> (Vec<Worker>, Vec<CatalogWarning>) {
        let mut workers = Vec::with_capacity(registry.len());
        let mut warnings = Vec::new();
        for entry in registry.iter() {
            let (worker, entry_warnings) = self.build(entry);
            workers.push(worker);
            warnings.extend(entry_warnings);
        }

        // one line per catalog and cause rather than one per tag
        let mut grouped: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for w in &warnings {
            *grouped.entry((w.catalog.as_str(), w.reason.as_str())).or_default() += 1;
        }
        for ((catalog, reason), count) in grouped {
            warn!("Catalog '{}' short for {} worker(s): {}", catalog, count, reason);
        }

        let empty = workers.iter().filter(|w| w.toolset().is_empty()).count();
        if empty > 0 {
            debug!("{} of {} workers have an empty toolset", empty, workers.len());
        }
        (workers, warnings)
    }
}

impl std::fmt::Debug for WorkerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerFactory")
            .field("catalogs", &self.catalogs.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("worker_timeout", &self.worker_timeout)
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelSettings};
    use crate::tools::{RemoteCatalog, StaticCatalog, StaticHandler, ToolDescriptor};

    fn catalog(name: &str, specs: &[(&str, &str)]) -> Arc<dyn ToolCatalog> {
        let tools = specs
            .iter()
            .map(|(op, tag)| ToolDescriptor::new(*op, "op", Arc::new(StaticHandler(String::new()))).with_tag(*tag))
            .collect();
        Arc::new(StaticCatalog::from_tools(name, tools).unwrap())
    }

    fn factory(catalogs: Vec<Arc<dyn ToolCatalog>>) -> WorkerFactory {
        let runner = Arc::new(AgentRunner::new(Arc::new(MockLlmClient::new()), ModelSettings::default()));
        WorkerFactory::new(catalogs, runner)
    }

    fn registry() -> Registry {
        Registry::from_specs([
            ("Queue", "Radarr_Queue_Agent", "queue"),
            ("Indexer", "Radarr_Indexer_Agent", "indexer"),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_concatenates_catalogs_in_order() {
        let factory = factory(vec![
            catalog("a", &[("get_queue", "Queue"), ("get_indexer", "Indexer")]),
            catalog("b", &[("delete_queue", "Queue")]),
        ]);
        let registry = registry();

        let (worker, warnings) = factory.build(registry.get("Queue").unwrap());

        assert!(warnings.is_empty());
        assert_eq!(worker.toolset().names(), vec!["get_queue", "delete_queue"]);
        assert_eq!(worker.identity(), "Radarr_Queue_Agent");
        assert_eq!(worker.instructions(), "queue");
        assert_eq!(worker.timeout(), DEFAULT_WORKER_TIMEOUT);
    }

    #[test]
    fn test_declining_catalog_degrades_to_warning() {
        let factory = factory(vec![
            catalog("local", &[("get_queue", "Queue")]),
            Arc::new(RemoteCatalog::new("remote", "http://localhost:9/mcp")),
        ])
        .with_worker_timeout(Duration::from_secs(7));

        let (workers, warnings) = factory.build_all(&registry());

        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].toolset().names(), vec!["get_queue"]);
        assert!(workers[1].toolset().is_empty());
        assert_eq!(workers[1].timeout(), Duration::from_secs(7));
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.catalog == "remote"));
        assert_eq!(warnings[0].tag, "Queue");
        assert_eq!(warnings[1].tag, "Indexer");
    }

    #[test]
    fn test_duplicate_names_across_catalogs_keep_first() {
        let factory = factory(vec![
            catalog("movies", &[("get_queue", "Queue")]),
            catalog("movies-extra", &[("get_queue", "Queue"), ("delete_queue", "Queue")]),
        ]);
        let registry = registry();

        let (worker, warnings) = factory.build(registry.get("Queue").unwrap());

        assert_eq!(worker.toolset().names(), vec!["get_queue", "delete_queue"]);
        let definitions: Vec<String> = worker.toolset().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(definitions, vec!["get_queue", "delete_queue"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].catalog, "movies-extra");
        assert_eq!(warnings[0].tag, "Queue");
        assert!(warnings[0].reason.contains("'get_queue'"));
    }

    #[test]
    fn test_workers_follow_registry_order() {
        let factory = factory(Vec::new());
        let (workers, warnings) = factory.build_all(&registry());
        let tags: Vec<&str> = workers.iter().map(|w| w.tag().as_str()).collect();
        assert_eq!(tags, vec!["Queue", "Indexer"]);
        assert!(warnings.is_empty());
    }
}
