//! Agent runner module - the model/tool loop shared by workers and the
//! coordinator.

mod agent_runner;

pub use agent_runner::{AgentRunner, DispatchMode, RunOutput, RunnerConfig};
