//! Request trace
//!
//! Records the lifecycle of one top-level request:
//! `Received -> Decomposing -> Dispatching(k) -> Aggregating -> Completed`,
//! with `Cancelled` and `Failed` reachable from any non-terminal phase.
//! There is no path from `Aggregating` back to `Dispatching`.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, RouterError};
use crate::llm::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Decomposing,
    /// `k` dispatches issued so far
    Dispatching(usize),
    Aggregating,
    Completed,
    Cancelled,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn can_advance_to(&self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        match (*self, next) {
            (from, Cancelled | Failed) => !from.is_terminal(),
            (Received, Decomposing) => true,
            (Decomposing, Dispatching(1)) => true,
            (Dispatching(k), Dispatching(n)) => n == k + 1,
            (Decomposing | Dispatching(_), Aggregating) => true,
            (Aggregating, Completed) => true,
            _ => false,
        }
    }
}

impl Serialize for RequestPhase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Decomposing => write!(f, "decomposing"),
            Self::Dispatching(k) => write!(f, "dispatching({})", k),
            Self::Aggregating => write!(f, "aggregating"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Completed,
    Failed(String),
    TimedOut(String),
    Cancelled,
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut(_))
    }

    /// Short reason shown to the end user
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed(r) | Self::TimedOut(r) => Some(r),
            _ => None,
        }
    }
}

/// One dispatch to one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    /// 1-based order in which the dispatch was issued
    pub index: usize,
    pub tag: String,
    pub task: String,
    pub outcome: DispatchOutcome,
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl DispatchRecord {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseEntry {
    pub phase: RequestPhase,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestTrace {
    pub request_id: String,
    pub phases: Vec<PhaseEntry>,
    pub dispatches: Vec<DispatchRecord>,
}

impl RequestTrace {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            phases: vec![PhaseEntry {
                phase: RequestPhase::Received,
                at: Utc::now(),
            }],
            dispatches: Vec::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> RequestPhase {
        self.phases
            .last()
            .map(|p| p.phase)
            .unwrap_or(RequestPhase::Received)
    }

    pub fn advance(&mut self, next: RequestPhase) -> Result<()> {
        let current = self.phase();
        if !current.can_advance_to(next) {
            return Err(RouterError::InvalidState(format!(
                "request {} cannot move from {} to {}",
                self.request_id, current, next
            )));
        }
        self.phases.push(PhaseEntry { phase: next, at: Utc::now() });
        Ok(())
    }

    /// Enter `Dispatching(k + 1)` and return `k + 1`
    pub fn begin_dispatch(&mut self) -> Result<usize> {
        let next = match self.phase() {
            RequestPhase::Decomposing => 1,
            RequestPhase::Dispatching(k) => k + 1,
            other => {
                return Err(RouterError::InvalidState(format!(
                    "request {} cannot dispatch while {}",
                    self.request_id, other
                )));
            }
        };
        self.advance(RequestPhase::Dispatching(next))?;
        Ok(next)
    }

    pub fn record(&mut self, record: DispatchRecord) {
        self.dispatches.push(record);
    }

    pub fn failed_dispatches(&self) -> impl Iterator<Item = &DispatchRecord> {
        self.dispatches.iter().filter(|d| d.outcome.is_failure())
    }

    /// Sum of every recorded dispatch's usage delta
    pub fn dispatch_usage(&self) -> Usage {
        self.dispatches.iter().map(|d| d.usage).sum()
    }

    pub fn dispatched_tags(&self) -> Vec<&str> {
        self.dispatches.iter().map(|d| d.tag.as_str()).collect()
    }
}

/// Shared, lockable trace for one in-flight request
#[derive(Debug, Clone)]
pub struct TraceHandle(Arc<Mutex<RequestTrace>>);

impl TraceHandle {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(RequestTrace::new(request_id))))
    }

    fn with<R>(&self, f: impl FnOnce(&mut RequestTrace) -> Result<R>) -> Result<R> {
        let mut trace = self
            .0
            .lock()
            .map_err(|_| RouterError::InvalidState("request trace lock poisoned".to_string()))?;
        f(&mut trace)
    }

    pub fn advance(&self, next: RequestPhase) -> Result<()> {
        self.with(|t| t.advance(next))
    }

    pub fn begin_dispatch(&self) -> Result<usize> {
        self.with(|t| t.begin_dispatch())
    }

    pub fn record(&self, record: DispatchRecord) -> Result<()> {
        self.with(|t| {
            t.record(record);
            Ok(())
        })
    }

    pub fn phase(&self) -> Result<RequestPhase> {
        self.with(|t| Ok(t.phase()))
    }

    pub fn snapshot(&self) -> Result<RequestTrace> {
        self.with(|t| Ok(t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, tag: &str, outcome: DispatchOutcome, usage: Usage) -> DispatchRecord {
        DispatchRecord {
            index,
            tag: tag.to_string(),
            task: "t".to_string(),
            outcome,
            usage,
            started_at: Utc::now(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut trace = RequestTrace::new("req-1");
        assert_eq!(trace.phase(), RequestPhase::Received);
        trace.advance(RequestPhase::Decomposing).unwrap();
        assert_eq!(trace.begin_dispatch().unwrap(), 1);
        assert_eq!(trace.begin_dispatch().unwrap(), 2);
        trace.advance(RequestPhase::Aggregating).unwrap();
        trace.advance(RequestPhase::Completed).unwrap();

        let phases: Vec<String> = trace.phases.iter().map(|p| p.phase.to_string()).collect();
        assert_eq!(
            phases,
            vec!["received", "decomposing", "dispatching(1)", "dispatching(2)", "aggregating", "completed"]
        );
    }

    #[test]
    fn test_zero_dispatches_allowed() {
        let mut trace = RequestTrace::new("req-1");
        trace.advance(RequestPhase::Decomposing).unwrap();
        trace.advance(RequestPhase::Aggregating).unwrap();
        trace.advance(RequestPhase::Completed).unwrap();
    }

    #[test]
    fn test_no_dispatch_after_aggregating() {
        let mut trace = RequestTrace::new("req-1");
        trace.advance(RequestPhase::Decomposing).unwrap();
        trace.advance(RequestPhase::Aggregating).unwrap();
        let err = trace.begin_dispatch().unwrap_err();
        assert!(matches!(err, RouterError::InvalidState(_)));
        assert!(err.to_string().contains("cannot dispatch while aggregating"));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut trace = RequestTrace::new("req-1");
        assert!(trace.advance(RequestPhase::Completed).is_err());
        assert!(trace.advance(RequestPhase::Dispatching(1)).is_err());
        assert!(!RequestPhase::Dispatching(1).can_advance_to(RequestPhase::Dispatching(3)));
        assert!(!RequestPhase::Aggregating.can_advance_to(RequestPhase::Dispatching(1)));
    }

    #[test]
    fn test_terminal_phases() {
        let mut trace = RequestTrace::new("req-1");
        trace.advance(RequestPhase::Decomposing).unwrap();
        trace.advance(RequestPhase::Cancelled).unwrap();
        assert!(trace.phase().is_terminal());
        assert!(trace.advance(RequestPhase::Failed).is_err());
        assert!(trace.advance(RequestPhase::Aggregating).is_err());
    }

    #[test]
    fn test_failed_dispatches_and_usage() {
        let mut trace = RequestTrace::new("req-1");
        trace.record(record(1, "Queue", DispatchOutcome::Completed, Usage::new(10, 5)));
        trace.record(record(
            2,
            "Indexer",
            DispatchOutcome::TimedOut("timed out after 50ms".into()),
            Usage::new(3, 1),
        ));
        let failed: Vec<&str> = trace.failed_dispatches().map(|d| d.tag.as_str()).collect();
        assert_eq!(failed, vec!["Indexer"]);
        assert_eq!(trace.dispatch_usage(), Usage::new(13, 6));
        assert_eq!(trace.dispatched_tags(), vec!["Queue", "Indexer"]);
    }

    #[test]
    fn test_dispatch_outcome_reason() {
        assert_eq!(DispatchOutcome::Failed("500".into()).reason(), Some("500"));
        assert_eq!(DispatchOutcome::Completed.reason(), None);
        assert!(!DispatchOutcome::Cancelled.is_failure());
    }

    #[test]
    fn test_trace_serializes() {
        let mut trace = RequestTrace::new("req-1");
        trace.advance(RequestPhase::Decomposing).unwrap();
        trace.begin_dispatch().unwrap();
        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["phases"][2]["phase"], "dispatching(1)");
        assert!(value["phases"][2]["at"].is_string());
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = TraceHandle::new("req-1");
        let clone = handle.clone();
        handle.advance(RequestPhase::Decomposing).unwrap();
        assert_eq!(clone.begin_dispatch().unwrap(), 1);
        assert_eq!(handle.phase().unwrap(), RequestPhase::Dispatching(1));
        assert_eq!(handle.snapshot().unwrap().phases.len(), 3);
    }
}
