//! The `OperationLogic` trait, the main extension point for workload code.
//!
//! An operation is a small state machine driven one step at a time.  Each
//! call to [`OperationLogic::execute`] either issues network calls through
//! the [`StepContext`] and returns [`StepOutcome::Continue`], or issues
//! nothing and returns [`StepOutcome::Complete`].  The runner validates every
//! response against the step's [`Expect`] before the next step runs, so step
//! logic only ever sees responses that passed.

use std::sync::Arc;

use lg_core::{BehaviorId, BehaviorRng, OpIndex, UserId};
use lg_data::{Bindings, Capabilities, Channel, ChannelKey, DataError, ResponseListener};
use lg_spec::BehaviorSpec;
use lg_transport::{Request, Response};
use thiserror::Error;

use crate::DriverResult;

// ── Failure ───────────────────────────────────────────────────────────────────

/// A recoverable operation fault.  Resolves into one failed statistics row
/// and a reset of the owning user.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OperationFailed(pub String);

impl OperationFailed {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

impl From<DataError> for OperationFailed {
    fn from(e: DataError) -> Self {
        Self(e.to_string())
    }
}

/// What a step asks the runner to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Wait for the requests this step issued, then run the next step.
    Continue,
    /// The operation is finished.  The step must not have issued requests.
    Complete,
}

// ── Expect ────────────────────────────────────────────────────────────────────

/// Checks applied to the response of one request before the next step runs.
///
/// Order: abort codes, valid codes, then (only when parsing is needed)
/// listeners on the body, listeners on the headers, required substrings, and
/// embedded link discovery.
#[derive(Clone, Debug)]
pub struct Expect {
    valid:        Vec<u16>,
    abort:        Vec<u16>,
    must_contain: Vec<String>,
    listeners:    Vec<Arc<dyn ResponseListener>>,
    recursive:    bool,
    embedded:     bool,
}

impl Default for Expect {
    fn default() -> Self {
        Self {
            valid:        vec![200],
            abort:        Vec::new(),
            must_contain: Vec::new(),
            listeners:    Vec::new(),
            recursive:    false,
            embedded:     false,
        }
    }
}

impl Expect {
    /// Status 200, nothing else checked.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Replace the accepted status codes.
    pub fn status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.valid = codes.into_iter().collect();
        self
    }

    /// Status codes that reset the user instead of failing the operation.
    pub fn abort_on(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.abort.extend(codes);
        self
    }

    /// Require `text` somewhere in the body.
    pub fn must_contain(mut self, text: impl Into<String>) -> Self {
        self.must_contain.push(text.into());
        self
    }

    pub fn listen(mut self, listener: impl ResponseListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Fetch the embedded resources the body links to before the next step.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Checks for an embedded resource fetched on the operation's behalf.
    pub(crate) fn embedded(recursive: bool) -> Self {
        Self { recursive, embedded: true, ..Self::default() }
    }

    pub fn needs_parsing(&self) -> bool {
        self.recursive || !self.must_contain.is_empty() || !self.listeners.is_empty()
    }

    pub fn is_valid(&self, status: u16) -> bool {
        self.valid.contains(&status)
    }

    pub fn is_abort(&self, status: u16) -> bool {
        self.abort.contains(&status)
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub(crate) fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub(crate) fn listeners(&self) -> &[Arc<dyn ResponseListener>] {
        &self.listeners
    }

    pub(crate) fn required_text(&self) -> &[String] {
        &self.must_contain
    }
}

// ── StepContext ───────────────────────────────────────────────────────────────

/// Everything one step may read, plus the outbox for the requests it issues.
pub struct StepContext<'a> {
    user:      UserId,
    behavior:  BehaviorId,
    bindings:  &'a Bindings,
    response:  Option<&'a Response>,
    rng:       &'a mut BehaviorRng,
    requests:  Vec<(Request, Expect)>,
    ignore:    bool,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        user:     UserId,
        behavior: BehaviorId,
        bindings: &'a Bindings,
        response: Option<&'a Response>,
        rng:      &'a mut BehaviorRng,
    ) -> Self {
        Self { user, behavior, bindings, response, rng, requests: Vec::new(), ignore: false }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn behavior(&self) -> BehaviorId {
        self.behavior
    }

    /// The validated response to the previous step's request, if any.
    ///
    /// After a fan-out of several GETs this is the last one to arrive.
    pub fn response(&self) -> Option<&Response> {
        self.response
    }

    pub fn bindings(&self) -> &Bindings {
        self.bindings
    }

    /// Typed handle to read a channel this operation declared.
    ///
    /// A channel both needed and contained reads the needed copy, which is
    /// not the one written when the output is routed to a new child.
    pub fn channel<C: Channel>(&self, key: &ChannelKey<C>) -> Result<C, OperationFailed> {
        Ok(self.bindings.get(key)?)
    }

    /// Typed handle to write a channel this operation contains.
    pub fn output<C: Channel>(&self, key: &ChannelKey<C>) -> Result<C, OperationFailed> {
        Ok(self.bindings.output(key)?)
    }

    pub fn rng(&mut self) -> &mut BehaviorRng {
        self.rng
    }

    /// Issue `request`; the next step runs once its response passes `expect`.
    pub fn send(&mut self, request: Request, expect: Expect) {
        self.requests.push((request, expect));
    }

    /// Shorthand for a GET expecting status 200.
    pub fn get(&mut self, uri: impl Into<String>) {
        self.send(Request::get(uri), Expect::ok());
    }

    /// Do not record statistics for this operation.
    pub fn ignore_result(&mut self) {
        self.ignore = true;
    }

    pub(crate) fn finish(self) -> (Vec<(Request, Expect)>, bool) {
        (self.requests, self.ignore)
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Per-operation step logic.
///
/// One instance exists per operation slot of a behavior and is reused every
/// time the behavior selects that slot; [`reset`][Self::reset] runs between
/// uses.  Instances are driven by one task at a time, so `&mut self` state is
/// safe without locking.
///
/// # Example
///
/// ```rust,ignore
/// struct Home;
///
/// impl OperationLogic for Home {
///     fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
///         match step {
///             0 => {
///                 ctx.send(Request::get("/"), Expect::ok().recursive());
///                 Ok(StepOutcome::Continue)
///             }
///             _ => Ok(StepOutcome::Complete),
///         }
///     }
/// }
/// ```
pub trait OperationLogic: Send + 'static {
    /// Channels this operation reads and writes.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    fn execute(
        &mut self,
        step: u32,
        ctx:  &mut StepContext<'_>,
    ) -> Result<StepOutcome, OperationFailed>;

    /// Drop per-run state before the slot is selected again.
    fn reset(&mut self) {}
}

/// Builds the logic for every operation slot of a behavior.
///
/// Any `Fn(&BehaviorSpec, OpIndex) -> DriverResult<Box<dyn OperationLogic>>`
/// closure is a factory.
pub trait OperationFactory: Send + Sync {
    fn create(&self, spec: &BehaviorSpec, op: OpIndex) -> DriverResult<Box<dyn OperationLogic>>;
}

impl<F> OperationFactory for F
where
    F: Fn(&BehaviorSpec, OpIndex) -> DriverResult<Box<dyn OperationLogic>> + Send + Sync,
{
    fn create(&self, spec: &BehaviorSpec, op: OpIndex) -> DriverResult<Box<dyn OperationLogic>> {
        self(spec, op)
    }
}
