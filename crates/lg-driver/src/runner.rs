//! `OperationCell`: drives one operation slot through its steps.
//!
//! # Run loop
//!
//! ```text
//! schedule(delay) ──sleep or stop──▶ run(gen)
//!                                       │  stale generation → drop
//!                                       │  stop requested   → op_stopped
//!                                       │  step 0           → record start
//!                                       │  otherwise        → validate response
//!                                       │                      abort code  → user reset
//!                                       │                      embedded    → next GET, wait
//!                                       ▼
//!                              execute(step) → requests → transport
//!                                       │                      │
//!                              complete / failed        callback → run(gen)
//!                                       ▼
//!                            stats, then behavior callback
//! ```
//!
//! # Generations
//!
//! Every scheduled run and every transport callback carries the generation
//! that was current when it was issued.  Scheduling, resetting and failing
//! bump the generation, so late callbacks from an earlier use of the slot (or
//! the remaining GETs of a failed fan-out) are dropped on arrival.
//!
//! # Locking
//!
//! `logic` is always taken before `state`.  Neither lock is held while the
//! user's critical section is entered or while the transport is called.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use lg_core::{BehaviorId, BehaviorRng, OpIndex, UserId};
use lg_data::{Bindings, Capabilities};
use lg_stats::OperationStats;
use lg_transport::{Request, Response, ResponseCallback, TransportError};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::context::DriverContext;
use crate::links::{self, EmbeddedLink};
use crate::operation::{Expect, OperationLogic, StepContext, StepOutcome};
use crate::user::User;

// ── State ─────────────────────────────────────────────────────────────────────

/// A response waiting to be validated by the next run.
struct Received {
    response: Response,
    expect:   Arc<Expect>,
    uri:      String,
}

/// Mutable per-use state of one operation slot.
struct OpState {
    generation:  u64,
    started:     bool,
    step:        u32,
    /// Steps that issued requests.  Embedded fetches are not counted.
    total_steps: u32,
    awaiting:    bool,
    gets:        usize,
    received:    Option<Received>,
    /// Last validated non-embedded response, handed to the step logic.
    last:        Option<Response>,
    failure:     Option<String>,
    complete:    bool,
    ignore:      bool,
    started_at:  Option<Instant>,
    cycle_time:  Duration,
    bindings:    Bindings,
    worklist:    VecDeque<EmbeddedLink>,
    rng:         BehaviorRng,
}

impl OpState {
    fn new(rng: BehaviorRng) -> Self {
        Self {
            generation:  0,
            started:     false,
            step:        0,
            total_steps: 0,
            awaiting:    false,
            gets:        0,
            received:    None,
            last:        None,
            failure:     None,
            complete:    false,
            ignore:      false,
            started_at:  None,
            cycle_time:  Duration::ZERO,
            bindings:    Bindings::empty(),
            worklist:    VecDeque::new(),
            rng,
        }
    }

    /// Forget the previous use and move to a fresh generation.
    fn clear(&mut self) {
        self.generation += 1;
        self.started = false;
        self.step = 0;
        self.total_steps = 0;
        self.awaiting = false;
        self.gets = 0;
        self.received = None;
        self.last = None;
        self.failure = None;
        self.complete = false;
        self.ignore = false;
        self.started_at = None;
        self.worklist.clear();
    }

    /// Mark `requests` as in flight.
    fn arm(&mut self, requests: &[(Request, Expect)]) {
        self.awaiting = true;
        self.gets = requests.iter().filter(|(r, _)| r.is_get()).count();
    }
}

/// What a run decided, acted on after every lock is released.
enum Next {
    Stale,
    Stopped,
    Abort(u16),
    Dispatch(Vec<(Request, Expect)>),
    Finished { failed: bool, stats: Option<OperationStats> },
}

/// Outcome of validating the pending response.
enum Checked {
    Passed,
    Abort(u16),
    Failed(String),
    Embedded(EmbeddedLink),
}

// ── OperationCell ─────────────────────────────────────────────────────────────

/// Construction inputs for an [`OperationCell`].
pub(crate) struct CellSetup {
    pub index:    OpIndex,
    pub name:     String,
    pub user:     Weak<User>,
    pub user_id:  UserId,
    pub behavior: BehaviorId,
    pub stop:     CancellationToken,
    pub rt_limit: Option<Duration>,
    pub logic:    Box<dyn OperationLogic>,
    pub caps:     Capabilities,
    pub rng:      BehaviorRng,
    pub handle:   Handle,
}

/// One operation slot of a behavior.
pub(crate) struct OperationCell {
    index:    OpIndex,
    name:     String,
    user:     Weak<User>,
    user_id:  UserId,
    behavior: BehaviorId,
    stop:     CancellationToken,
    rt_limit: Option<Duration>,
    caps:     Capabilities,
    handle:   Handle,
    logic:    Mutex<Box<dyn OperationLogic>>,
    state:    Mutex<OpState>,
}

impl OperationCell {
    pub(crate) fn new(setup: CellSetup) -> Arc<Self> {
        Arc::new(Self {
            index:    setup.index,
            name:     setup.name,
            user:     setup.user,
            user_id:  setup.user_id,
            behavior: setup.behavior,
            stop:     setup.stop,
            rt_limit: setup.rt_limit,
            caps:     setup.caps,
            handle:   setup.handle,
            logic:    Mutex::new(setup.logic),
            state:    Mutex::new(OpState::new(setup.rng)),
        })
    }

    pub(crate) fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Start a fresh use of this slot after `delay`.
    pub(crate) fn schedule(self: &Arc<Self>, delay: Duration, cycle_time: Duration, bindings: Bindings) {
        let generation = {
            let mut st = self.state.lock();
            st.clear();
            st.cycle_time = cycle_time;
            st.bindings = bindings;
            st.generation
        };
        let cell = Arc::clone(self);
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cell.stop.cancelled() => {}
            }
            cell.run(generation);
        });
    }

    /// Drop per-use state so the slot can be selected again.
    pub(crate) fn reset(&self) {
        let mut logic = self.logic.lock();
        logic.reset();
        self.state.lock().clear();
    }

    fn spawn_run(self: &Arc<Self>, generation: u64) {
        let cell = Arc::clone(self);
        self.handle.spawn(async move { cell.run(generation) });
    }

    // ── Run ───────────────────────────────────────────────────────────────

    fn run(self: &Arc<Self>, generation: u64) {
        let Some(user) = self.user.upgrade() else {
            return;
        };
        let ctx = user.context();

        match self.advance(ctx, user.page_cache(), generation) {
            Next::Stale => {
                debug!(user = %self.user_id, behavior = %self.behavior, op = %self.name, "stale run dropped");
            }
            Next::Stopped => {
                debug!(user = %self.user_id, behavior = %self.behavior, op = %self.name, "operation stopped");
                user.op_stopped(self.behavior);
            }
            Next::Abort(status) => {
                info!(user = %self.user_id, behavior = %self.behavior, op = %self.name, status, "abort status, resetting user");
                user.reset_and_ack(self.behavior, "abort status received");
            }
            Next::Dispatch(requests) => {
                for (request, expect) in requests {
                    let uri = request.resolved_uri().unwrap_or_else(|_| request.uri.clone());
                    let callback = Arc::new(StepCallback {
                        cell: Arc::clone(self),
                        generation,
                        expect: Arc::new(expect),
                        uri,
                    });
                    ctx.transport.execute(request, callback);
                }
            }
            Next::Finished { failed, stats } => {
                if let Some(row) = stats {
                    ctx.stats.submit(row);
                }
                ctx.observer.on_operation_finished(self.user_id, self.behavior, self.index, failed);
                if failed {
                    user.reset_and_ack(self.behavior, "operation failed");
                } else {
                    user.operation_complete(self.behavior, self.index);
                }
            }
        }
    }

    fn advance(&self, ctx: &DriverContext, cache: &dyn PageCache, generation: u64) -> Next {
        let mut logic = self.logic.lock();
        let mut guard = self.state.lock();
        let st = &mut *guard;

        if st.generation != generation {
            return Next::Stale;
        }
        if self.stop.is_cancelled() {
            return Next::Stopped;
        }

        if !st.started {
            st.started = true;
            st.started_at = Some(Instant::now());
            st.failure = None;
            debug!(user = %self.user_id, behavior = %self.behavior, op = %self.name, "operation started");
        } else if st.failure.is_none() {
            match self.validate(st, cache) {
                Checked::Passed => {}
                Checked::Abort(status) => return Next::Abort(status),
                Checked::Failed(cause) => st.failure = Some(cause),
                Checked::Embedded(link) => {
                    debug!(user = %self.user_id, op = %self.name, uri = %link.uri, "fetching embedded resource");
                    let request = Request::get(link.uri).drop_response_body(!link.recursive);
                    let batch = vec![(request, Expect::embedded(link.recursive))];
                    st.arm(&batch);
                    return Next::Dispatch(batch);
                }
            }
        }

        if st.failure.is_none() {
            let mut step_ctx = StepContext::new(
                self.user_id,
                self.behavior,
                &st.bindings,
                st.last.as_ref(),
                &mut st.rng,
            );
            let result = logic.execute(st.step, &mut step_ctx);
            let (requests, ignore) = step_ctx.finish();
            st.ignore |= ignore;
            st.step += 1;

            match result {
                Err(e) => st.failure = Some(e.0),
                Ok(StepOutcome::Complete) if requests.is_empty() => st.complete = true,
                Ok(StepOutcome::Complete) => {
                    st.failure = Some(self.violation("step completed the operation but issued requests"));
                }
                Ok(StepOutcome::Continue) if requests.is_empty() => {
                    st.failure = Some(self.violation("step neither completed nor issued a request"));
                }
                Ok(StepOutcome::Continue) if requests.len() > 1 && !requests.iter().all(|(r, _)| r.is_get()) => {
                    st.failure = Some(self.violation("a step issuing several requests may only issue GETs"));
                }
                Ok(StepOutcome::Continue) => {
                    st.total_steps += 1;
                    st.arm(&requests);
                    return Next::Dispatch(requests);
                }
            }
        }

        if self.stop.is_cancelled() {
            return Next::Stopped;
        }
        let failed = st.failure.is_some();
        if let Some(cause) = &st.failure {
            warn!(user = %self.user_id, behavior = %self.behavior, op = %self.name, step = st.step, %cause, "operation failed");
        }
        let stats = (!st.ignore).then(|| self.stats_row(st, ctx));
        Next::Finished { failed, stats }
    }

    /// Check the pending response and pick the next embedded fetch, if any.
    fn validate(&self, st: &mut OpState, cache: &dyn PageCache) -> Checked {
        let Some(Received { response, expect, uri }) = st.received.take() else {
            return Checked::Failed(self.violation("resumed without a response"));
        };

        if expect.is_abort(response.status) {
            return Checked::Abort(response.status);
        }
        if !expect.is_valid(response.status) {
            return Checked::Failed(format!("{uri}: unexpected status {}", response.status));
        }

        if expect.needs_parsing() {
            if response.body.is_empty() && !expect.is_embedded() {
                return Checked::Failed(format!("{uri}: empty response body"));
            }
            for listener in expect.listeners() {
                if let Err(e) = listener.on_body(&response.body, &st.bindings) {
                    return Checked::Failed(format!("{uri}: {e}"));
                }
            }
            for listener in expect.listeners() {
                if let Err(e) = listener.on_headers(&response.headers, &st.bindings) {
                    return Checked::Failed(format!("{uri}: {e}"));
                }
            }
            if let Some(text) = expect.required_text().iter().find(|t| !response.body.contains(t.as_str())) {
                return Checked::Failed(format!("{uri}: response does not contain {text:?}"));
            }
            if expect.is_recursive() {
                for link in links::embedded_links(&uri, &response.body) {
                    let queued = st.worklist.iter().any(|l| l.uri == link.uri);
                    if !queued && !cache.contains(&link.uri) {
                        st.worklist.push_back(link);
                    }
                }
            }
        }

        if !expect.is_embedded() {
            st.last = Some(response);
        }

        while let Some(link) = st.worklist.pop_front() {
            if cache.add(&link.uri) {
                return Checked::Embedded(link);
            }
        }
        Checked::Passed
    }

    fn stats_row(&self, st: &OpState, ctx: &DriverContext) -> OperationStats {
        let now = Instant::now();
        let started = st.started_at.unwrap_or(now);
        OperationStats {
            target:              ctx.config.target_name.clone(),
            user:                self.user_id,
            behavior:            self.behavior,
            op_index:            self.index,
            op_name:             self.name.clone(),
            failed:              st.failure.is_some(),
            failure:             st.failure.clone(),
            start_offset:        ctx.offset(started),
            end_offset:          ctx.offset(now),
            cycle_time:          st.cycle_time,
            total_steps:         st.total_steps,
            response_time_limit: self.rt_limit,
        }
    }

    fn violation(&self, what: &str) -> String {
        warn!(user = %self.user_id, behavior = %self.behavior, op = %self.name, "protocol violation: {what}");
        format!("protocol violation: {what}")
    }

    // ── Callbacks ─────────────────────────────────────────────────────────

    fn on_completed(self: &Arc<Self>, generation: u64, response: Response, is_get: bool, expect: &Arc<Expect>, uri: &str) {
        {
            let mut st = self.state.lock();
            if st.generation != generation {
                debug!(user = %self.user_id, op = %self.name, %uri, "late completion dropped");
                return;
            }
            if !st.awaiting {
                let cause = self.violation("completion with no request outstanding");
                st.failure.get_or_insert(cause);
                return;
            }
            if is_get {
                match st.gets.checked_sub(1) {
                    None => {
                        st.failure = Some(self.violation("GET completion with no GET outstanding"));
                    }
                    Some(0) => st.gets = 0,
                    Some(left) => {
                        st.gets = left;
                        if expect.is_abort(response.status) {
                            debug!(user = %self.user_id, op = %self.name, %uri, status = response.status, left, "abort status inside a fan-out ignored");
                        } else if !expect.is_valid(response.status) {
                            st.failure.get_or_insert(format!("{uri}: unexpected status {}", response.status));
                        }
                        return;
                    }
                }
            }
            st.awaiting = false;
            st.received = Some(Received { response, expect: Arc::clone(expect), uri: uri.to_owned() });
        }
        self.spawn_run(generation);
    }

    fn on_failed(self: &Arc<Self>, generation: u64, error: TransportError, uri: &str) {
        let next = {
            let mut st = self.state.lock();
            if st.generation != generation {
                debug!(user = %self.user_id, op = %self.name, %uri, %error, "late failure dropped");
                return;
            }
            if !st.awaiting {
                let cause = self.violation("failure with no request outstanding");
                st.failure.get_or_insert(cause);
                return;
            }
            st.awaiting = false;
            st.gets = 0;
            st.received = None;
            st.failure = Some(format!("{uri}: {error}"));
            // Drop the rest of a fan-out.
            st.generation += 1;
            st.generation
        };
        self.spawn_run(next);
    }
}

// ── Callback adapter ──────────────────────────────────────────────────────────

struct StepCallback {
    cell:       Arc<OperationCell>,
    generation: u64,
    expect:     Arc<Expect>,
    uri:        String,
}

impl ResponseCallback for StepCallback {
    fn completed(&self, response: Response, is_get: bool) {
        self.cell.on_completed(self.generation, response, is_get, &self.expect, &self.uri);
    }

    fn failed(&self, error: TransportError, _is_get: bool) {
        self.cell.on_failed(self.generation, error, &self.uri);
    }
}
