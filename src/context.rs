//! Per-request execution context
//!
//! One `ExecutionContext` is created per top-level request and threaded by
//! reference through every nested dispatch. Usage only ever grows; the
//! dependency bag is passed through untouched.
//!
//! Two tallies are kept. Each scope has its own `UsageCounter`, committed to
//! its parent when the scope settles. The whole request also shares one
//! `RequestBudget` that every model call reserves against up front, so limits
//! hold even while sibling scopes run concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::coordinator::TraceHandle;
use crate::error::{Result, RouterError};
use crate::id::generate_request_id;
use crate::llm::Usage;

/// Lock-free additive usage accumulator
#[derive(Debug, Default)]
pub struct UsageCounter {
    requests: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl UsageCounter {
    pub fn add(&self, usage: &Usage) {
        self.requests.fetch_add(usage.requests, Ordering::SeqCst);
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::SeqCst);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Usage {
        Usage {
            requests: self.requests.load(Ordering::SeqCst),
            input_tokens: self.input_tokens.load(Ordering::SeqCst),
            output_tokens: self.output_tokens.load(Ordering::SeqCst),
        }
    }
}

/// Caps checked before every model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageLimits {
    pub request_limit: Option<u64>,
    pub total_tokens_limit: Option<u64>,
}

impl UsageLimits {
    /// Error if `usage` leaves no room for another model request
    pub fn check_before_request(&self, usage: &Usage) -> Result<()> {
        if let Some(limit) = self.request_limit.filter(|l| usage.requests >= *l) {
            return Err(RouterError::UsageLimitExceeded(format!(
                "next request would exceed request_limit of {}",
                limit
            )));
        }
        if let Some(limit) = self.total_tokens_limit.filter(|l| usage.total() > *l) {
            return Err(RouterError::UsageLimitExceeded(format!(
                "total tokens {} exceed total_tokens_limit of {}",
                usage.total(),
                limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BudgetState {
    used: Usage,
    in_flight: u64,
}

/// Live usage of a whole request, shared by all of its scopes.
///
/// Includes usage from scopes that were later cancelled; it only feeds limit
/// checks and is never reported as the request's usage.
#[derive(Debug, Default)]
pub struct RequestBudget {
    state: Mutex<BudgetState>,
}

impl RequestBudget {
    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded usage, with reserved but unfinished calls counted as requests
    pub fn projected(&self) -> Usage {
        let state = self.lock();
        Usage {
            requests: state.used.requests + state.in_flight,
            ..state.used
        }
    }

    fn reserve(self: &Arc<Self>, limits: &UsageLimits) -> Result<RequestSlot> {
        let mut state = self.lock();
        let projected = Usage {
            requests: state.used.requests + state.in_flight,
            ..state.used
        };
        limits.check_before_request(&projected)?;
        state.in_flight += 1;
        Ok(RequestSlot {
            budget: Arc::clone(self),
            open: true,
        })
    }

    fn add(&self, usage: &Usage) {
        self.lock().used.add(usage);
    }
}

/// A model request reserved against the request budget.
///
/// Settled with `ExecutionContext::record_request`; dropping it unsettled
/// (failed or cancelled call) releases the reservation.
#[derive(Debug)]
pub struct RequestSlot {
    budget: Arc<RequestBudget>,
    open: bool,
}

impl RequestSlot {
    fn settle(mut self, usage: &Usage) {
        let mut state = self.budget.lock();
        state.used.add(usage);
        state.in_flight = state.in_flight.saturating_sub(1);
        self.open = false;
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        if self.open {
            let mut state = self.budget.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

/// Opaque caller-supplied dependency bag, shared by reference
#[derive(Debug, Clone)]
pub struct Deps(Arc<Value>);

impl Deps {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        match self.0.as_ref() {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// True when both handles point at the same bag
    pub fn same_bag(&self, other: &Deps) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Deps {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

/// Per top-level request state
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    request_id: Arc<str>,
    usage: Arc<UsageCounter>,
    budget: Arc<RequestBudget>,
    limits: UsageLimits,
    deps: Deps,
    cancel: CancellationToken,
    trace: Option<TraceHandle>,
}

impl ExecutionContext {
    /// Fresh context for one top-level request
    pub fn new(deps: Deps) -> Self {
        Self {
            request_id: generate_request_id().into(),
            usage: Arc::new(UsageCounter::default()),
            budget: Arc::new(RequestBudget::default()),
            limits: UsageLimits::default(),
            deps,
            cancel: CancellationToken::new(),
            trace: None,
        }
    }

    pub fn with_limits(mut self, limits: UsageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Tie this request to an externally owned token (Ctrl-C, client disconnect)
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Usage recorded in this scope so far
    pub fn usage(&self) -> Usage {
        self.usage.snapshot()
    }

    /// Usage seen by limit checks: everything the request has consumed or
    /// reserved, across all scopes
    pub fn budget_usage(&self) -> Usage {
        self.budget.projected()
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    pub fn deps(&self) -> &Deps {
        &self.deps
    }

    pub fn trace(&self) -> Option<&TraceHandle> {
        self.trace.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Add usage made outside a reserved slot to this scope and the request
    /// budget. There is no way to subtract or reset.
    pub fn record_usage(&self, usage: &Usage) {
        self.usage.add(usage);
        self.budget.add(usage);
    }

    /// Claim room for one model request, or fail with `UsageLimitExceeded`.
    pub fn reserve_request(&self) -> Result<RequestSlot> {
        self.budget.reserve(&self.limits)
    }

    /// Record the usage of a call made under `slot`
    pub fn record_request(&self, slot: RequestSlot, usage: &Usage) {
        self.usage.add(usage);
        slot.settle(usage);
    }

    /// Fold a settled child scope's usage into this scope. The request
    /// budget already saw it.
    pub fn commit(&self, usage: &Usage) {
        self.usage.add(usage);
    }

    /// Nested scope for one dispatch.
    ///
    /// Same request id, deps, limits and budget; a fresh usage counter whose
    /// total the caller folds back with `commit` once the dispatch settles; a
    /// child cancellation token; no trace.
    pub fn scope(&self) -> ExecutionContext {
        ExecutionContext {
            request_id: Arc::clone(&self.request_id),
            usage: Arc::new(UsageCounter::default()),
            budget: Arc::clone(&self.budget),
            limits: self.limits,
            deps: self.deps.clone(),
            cancel: self.cancel.child_token(),
            trace: None,
        }
    }
}
