//! Workers: capability-restricted agents and the factory that builds them

mod agent;
mod factory;

pub use agent::{TaskResult, Worker};
pub use factory::{DEFAULT_WORKER_TIMEOUT, WorkerFactory};
