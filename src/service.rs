//! Router assembly and the request entry surface
//!
//! Registry -> workers -> delegation table -> coordinator, built once at
//! startup and shared read-only by every request.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::context::{Deps, UsageLimits};
use crate::coordinator::{Answer, Coordinator, DelegationTable};
use crate::error::Result;
use crate::registry::{PromptOverrides, Registry, ServiceProfile};
use crate::runner::AgentRunner;
use crate::tools::{CatalogWarning, ToolCatalog};
use crate::worker::{DEFAULT_WORKER_TIMEOUT, WorkerFactory};

/// Per-process knobs for assembling a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    pub worker_timeout: Duration,
    pub tool_timeout: Option<Duration>,
    pub limits: UsageLimits,
    /// Overall deadline per request
    pub deadline: Option<Duration>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            tool_timeout: None,
            limits: UsageLimits::default(),
            deadline: None,
        }
    }
}

pub struct RouterService {
    registry: Registry,
    catalogs: Vec<Arc<dyn ToolCatalog>>,
    coordinator: Coordinator,
    warnings: Vec<CatalogWarning>,
}

impl RouterService {
    /// Build workers, the delegation table and the coordinator.
    ///
    /// The registry is already validated, so a misconfigured table never
    /// reaches this point. Declining catalogs are reported in `warnings()`.
    pub fn assemble(
        registry: Registry,
        supervisor_instructions: impl Into<String>,
        catalogs: Vec<Arc<dyn ToolCatalog>>,
        runner: Arc<AgentRunner>,
        options: &ServiceOptions,
    ) -> Result<Self> {
        let mut factory =
            WorkerFactory::new(catalogs.clone(), Arc::clone(&runner)).with_worker_timeout(options.worker_timeout);
        if let Some(timeout) = options.tool_timeout {
            factory = factory.with_tool_timeout(timeout);
        }

        let (workers, warnings) = factory.build_all(&registry);
        let table = DelegationTable::build(workers)?;

        let mut coordinator = Coordinator::new(supervisor_instructions, table, runner).with_limits(options.limits);
        if let Some(deadline) = options.deadline {
            coordinator = coordinator.with_deadline(deadline);
        }

        info!(
            "Router ready: {} dispatch operations over {} catalog(s), {} warning(s)",
            coordinator.table().len(),
            catalogs.len(),
            warnings.len()
        );
        Ok(Self {
            registry,
            catalogs,
            coordinator,
            warnings,
        })
    }

    /// Assemble from a built-in service profile
    pub fn from_profile(
        profile: &ServiceProfile,
        prompts: &PromptOverrides,
        catalogs: Vec<Arc<dyn ToolCatalog>>,
        runner: Arc<AgentRunner>,
        options: &ServiceOptions,
    ) -> Result<Self> {
        let registry = profile.registry(prompts)?;
        Self::assemble(registry, profile.supervisor_instructions(prompts), catalogs, runner, options)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn catalogs(&self) -> &[Arc<dyn ToolCatalog>] {
        &self.catalogs
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn warnings(&self) -> &[CatalogWarning] {
        &self.warnings
    }

    /// `(userText, deps) -> Answer`
    pub async fn ask(&self, text: &str, deps: Deps) -> Result<Answer> {
        self.coordinator.handle(text, deps).await
    }

    pub async fn ask_with_cancel(&self, text: &str, deps: Deps, cancel: CancellationToken) -> Result<Answer> {
        self.coordinator.handle_with_cancel(text, deps, cancel).await
    }
}

impl std::fmt::Debug for RouterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterService")
            .field("entries", &self.registry.len())
            .field("catalogs", &self.catalogs.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}
