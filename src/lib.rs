//! arr-router - capability-scoped task routing for media-service agents
//!
//! One coordinator agent receives a request, dispatches sub-tasks to
//! workers that can each only see the operations tagged with their
//! capability domain, and combines what they return into one answer.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod id;
pub mod llm;
pub mod registry;
pub mod runner;
pub mod service;
pub mod tools;
pub mod worker;

pub use context::{Deps, ExecutionContext, UsageLimits};
pub use coordinator::{Answer, Coordinator, DelegationTable, RequestTrace};
pub use error::{Result, RouterError};
pub use registry::{PromptOverrides, Registry, RegistryEntry, ServiceProfile};
pub use service::{RouterService, ServiceOptions};
pub use worker::{Worker, WorkerFactory};
