//! Coordinator: delegation table, request lifecycle and aggregation

mod aggregate;
mod delegation;
mod supervisor;
mod trace;

pub use aggregate::surface_failures;
pub use delegation::{DISPATCH_PREFIX, DelegationHandler, DelegationOperation, DelegationTable, dispatch_name};
pub use supervisor::{Answer, Coordinator};
pub use trace::{DispatchOutcome, DispatchRecord, PhaseEntry, RequestPhase, RequestTrace, TraceHandle};
