//! Behavior trees: operation selection, sub-behaviors and the stop cascade.
//!
//! A behavior is a plain [`BehaviorNode`] stored in its user's arena.  All of
//! the transition logic below runs inside the user's critical section, so
//! the functions take the locked [`UserState`] explicitly.
//!
//! # Selecting the next operation
//!
//! ```text
//! operation_complete(op)
//!   ① op is a reset state         → user reset begins
//!   ② not stopping                → stop "at end" children, start pending child
//!   ③ op stopped                  → start_next
//!
//! start_next
//!   ① stopping                    → fully-stopped check, done
//!   ② chooser(op) → variant, stop-at-start, stop-at-end, data source
//!   ③ next_start from the previous op's cycle time; draw the next cycle
//!   ④ next = first bucket of row(op, variant) above r ∈ [0, 1)
//!   ⑤ next spawns a child and active children < max → build pending child
//!   ⑥ next is a reset state       → stop every child
//!   ⑦ wire data (source → sink) and schedule
//! ```
//!
//! # Stop cascade
//!
//! Stopping cancels the node's token (which cancels every descendant's
//! token) and stops each child.  A node is fully stopped once it is stopping,
//! its operation has acknowledged, and it has no children left; it is then
//! removed and its parent (or, for the root, the user) is told.

use std::sync::Arc;
use std::time::Duration;

use lg_core::{BehaviorId, BehaviorRng, OpIndex, cycle_time_from_mean};
use lg_data::{Bindings, Capabilities};
use lg_spec::{BehaviorSpec, ChooserInput, SpecResult, TransitionChoice, TransitionChooser};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::runner::{CellSetup, OperationCell};
use crate::user::{User, UserState};
use crate::{DriverError, DriverResult};

// ── BehaviorNode ──────────────────────────────────────────────────────────────

pub(crate) struct BehaviorNode {
    pub id:               BehaviorId,
    pub parent:           Option<BehaviorId>,
    pub spec:             Arc<BehaviorSpec>,
    pub stop:             CancellationToken,
    /// Started children that have not fully stopped, oldest first.
    pub children:         Vec<BehaviorId>,
    /// Built for the scheduled operation; started when it completes.
    pub pending_child:    Option<Box<BehaviorNode>>,
    pub operations:       Vec<Arc<OperationCell>>,
    pub choosers:         Vec<Arc<dyn TransitionChooser>>,
    pub chooser_bindings: Vec<Bindings>,
    pub current:          Option<OpIndex>,
    /// `true` whenever no operation of this behavior is scheduled or running.
    pub op_stopped:       bool,
    pub next_start:       Option<Instant>,
    /// Cycle time drawn for `current`.
    pub cycle_time:       Duration,
    pub stop_on_complete: Vec<BehaviorId>,
    pub rng:              BehaviorRng,
}

impl BehaviorNode {
    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_fully_stopped(&self) -> bool {
        self.is_stopping() && self.op_stopped && self.children.is_empty()
    }

    fn choose(&mut self, completed: OpIndex) -> SpecResult<TransitionChoice> {
        let chooser = Arc::clone(&self.choosers[completed.index()]);
        let mut input = ChooserInput {
            behavior:  self.id,
            completed,
            children:  &self.children,
            bindings:  &self.chooser_bindings[completed.index()],
            rng:       &mut self.rng,
            spec:      &self.spec,
        };
        chooser.choose(&mut input)
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

impl User {
    /// Build (but do not start) a behavior running `spec`.
    ///
    /// Every operation's contained channels are declared before any needs
    /// are checked, so an operation may read what a later one writes.  On
    /// error the half-built scope is dropped.
    ///
    /// `routed` is the capability set of the operation that spawns the
    /// behavior: its contained channels are declared in the new scope first,
    /// since that operation's output lands there.
    pub(crate) fn build_behavior(
        &self,
        spec:   Arc<BehaviorSpec>,
        parent: Option<BehaviorId>,
        token:  &CancellationToken,
        routed: Option<&Capabilities>,
    ) -> DriverResult<BehaviorNode> {
        let id = self.ctx.next_behavior_id();
        let declared = match routed {
            Some(caps) => self.data.declare(caps, id).map_err(DriverError::from),
            None => Ok(()),
        };
        declared
            .and_then(|()| self.assemble(id, spec, parent, token))
            .inspect_err(|_| self.data.clear_scope(id))
    }

    fn assemble(
        &self,
        id:     BehaviorId,
        spec:   Arc<BehaviorSpec>,
        parent: Option<BehaviorId>,
        token:  &CancellationToken,
    ) -> DriverResult<BehaviorNode> {
        let stop = token.child_token();
        let seed = self.ctx.config.seed;
        let ops: Vec<OpIndex> = (0..spec.num_operations()).map(|i| OpIndex(i as u16)).collect();

        let mut logics = Vec::with_capacity(ops.len());
        for &op in &ops {
            let logic = self.ctx.factory.create(&spec, op)?;
            let caps = logic.capabilities();
            self.data.declare(&caps, id)?;
            logics.push((op, logic, caps));
        }

        let mut operations = Vec::with_capacity(ops.len());
        for (op, logic, caps) in logics {
            self.data.wire(&caps, id, id)?;
            let limit_ms = spec.response_time_limit(op);
            let rt_limit = (spec.uses_response_time(op) && limit_ms > 0.0)
                .then(|| Duration::from_secs_f64(limit_ms / 1_000.0));
            operations.push(OperationCell::new(CellSetup {
                index:    op,
                name:     spec.operation_name(op).to_owned(),
                user:     self.me.clone(),
                user_id:  self.id,
                behavior: id,
                stop:     stop.clone(),
                rt_limit,
                logic,
                caps,
                rng:      BehaviorRng::with_salt(seed, id, u64::from(op.0) + 1),
                handle:   self.ctx.handle.clone(),
            }));
        }

        let mut choosers = Vec::with_capacity(ops.len());
        let mut chooser_bindings = Vec::with_capacity(ops.len());
        for &op in &ops {
            let chooser = self.ctx.registry.chooser(spec.transition_chooser(op))?;
            chooser_bindings.push(self.data.wire(&chooser.capabilities(), id, id)?);
            choosers.push(chooser);
        }

        debug!(user = %self.id, behavior = %id, spec = spec.name(), "behavior built");
        Ok(BehaviorNode {
            id,
            parent,
            spec,
            stop,
            children: Vec::new(),
            pending_child: None,
            operations,
            choosers,
            chooser_bindings,
            current: None,
            op_stopped: true,
            next_start: None,
            cycle_time: Duration::ZERO,
            stop_on_complete: Vec::new(),
            rng: BehaviorRng::new(seed, id),
        })
    }

    // ── Transitions ───────────────────────────────────────────────────────

    pub(crate) fn on_operation_complete(&self, st: &mut UserState, bid: BehaviorId, op: OpIndex) {
        let Some(node) = st.behaviors.get(&bid) else {
            debug!(user = %self.id, behavior = %bid, "completion for a discarded behavior");
            return;
        };
        if node.spec.is_reset_state(op) {
            self.start_reset(st, "reset state completed");
        }

        let Some(node) = st.behaviors.get_mut(&bid) else {
            return;
        };
        if !node.is_stopping() {
            let to_stop: Vec<BehaviorId> = std::mem::take(&mut node.stop_on_complete)
                .into_iter()
                .filter(|c| node.children.contains(c))
                .collect();
            let pending = node.pending_child.take();
            for child in to_stop {
                self.stop_behavior(st, child);
            }
            if let Some(child) = pending {
                self.activate_child(st, bid, *child);
            }
        }

        if let Some(node) = st.behaviors.get_mut(&bid) {
            node.op_stopped = true;
        }
        self.start_next(st, bid);
    }

    fn activate_child(&self, st: &mut UserState, parent: BehaviorId, child: BehaviorNode) {
        let id = child.id;
        match st.behaviors.get_mut(&parent) {
            Some(p) => p.children.push(id),
            None => {
                self.data.clear_scope(id);
                return;
            }
        }
        debug!(user = %self.id, behavior = %id, %parent, spec = child.spec.name(), "child behavior started");
        st.behaviors.insert(id, child);
        self.start_next(st, id);
    }

    pub(crate) fn start_next(&self, st: &mut UserState, bid: BehaviorId) {
        let Some(node) = st.behaviors.get_mut(&bid) else {
            return;
        };
        if node.is_stopping() {
            self.check_if_fully_stopped(st, bid);
            return;
        }

        // ── Transition decision ───────────────────────────────────────────
        let completed = node.current;
        let decision = match completed {
            None => Ok(TransitionChoice::default()),
            Some(op) => node.choose(op),
        };
        let choice = match decision {
            Ok(choice) => choice,
            Err(e) => {
                warn!(user = %self.id, behavior = %bid, error = %e, "transition chooser failed");
                self.start_reset(st, "transition chooser failed");
                self.check_if_fully_stopped(st, bid);
                return;
            }
        };
        if let Some(op) = completed {
            node.operations[op.index()].reset();
        }

        let children = node.children.clone();
        node.stop_on_complete = choice
            .stop_at_end
            .iter()
            .copied()
            .filter(|c| children.contains(c))
            .collect();
        for &child in choice.stop_at_start.iter().filter(|c| children.contains(c)) {
            self.stop_behavior(st, child);
        }

        // ── Select and time the next operation ────────────────────────────
        let Some(node) = st.behaviors.get_mut(&bid) else {
            return;
        };
        let selected = match completed {
            None => Ok(node.spec.initial_state()),
            Some(op) => {
                let r = node.rng.unit();
                node.spec.select_next(op, choice.variant, r)
            }
        };
        let next = match selected {
            Ok(next) => next,
            Err(e) => {
                warn!(user = %self.id, behavior = %bid, error = %e, "could not select next operation");
                self.start_reset(st, "operation selection failed");
                self.check_if_fully_stopped(st, bid);
                return;
            }
        };

        let now = Instant::now();
        let start = self.ctx.cadence.next_start(node.next_start, now, node.cycle_time);
        node.next_start = Some(start);
        node.cycle_time = cycle_time_from_mean(&mut node.rng, node.spec.mean_cycle_time(next));
        node.current = Some(next);

        // ── Sub-behaviors ─────────────────────────────────────────────────
        let spawn = node.spec.async_behavior(next).map(str::to_owned);
        let max_children = node.spec.max_async_behaviors();
        let reset_state = node.spec.is_reset_state(next);
        let has_pending = node.pending_child.is_some();
        let token = node.stop.clone();
        let children = node.children.clone();
        let next_cell = Arc::clone(&node.operations[next.index()]);

        if let Some(name) = spawn {
            let active = children
                .iter()
                .filter(|c| st.behaviors.get(*c).is_some_and(|n| !n.is_stopping()))
                .count();
            if !has_pending && active < max_children {
                match self.build_child(&name, bid, &token, next_cell.capabilities()) {
                    Ok(child) => {
                        if let Some(node) = st.behaviors.get_mut(&bid) {
                            node.pending_child = Some(Box::new(child));
                        }
                    }
                    Err(e) => {
                        error!(user = %self.id, behavior = %bid, spec = %name, error = %e, "could not build child behavior");
                    }
                }
            } else {
                debug!(user = %self.id, behavior = %bid, active, max_children, "child limit reached");
            }
        }

        if reset_state {
            for &child in &children {
                self.stop_behavior(st, child);
            }
        }

        // ── Wire and schedule ─────────────────────────────────────────────
        let Some(node) = st.behaviors.get_mut(&bid) else {
            return;
        };
        let source = choice.data_source.unwrap_or(bid);
        let sink = node.pending_child.as_ref().map_or(source, |c| c.id);
        let cell = next_cell;
        let bindings = match self.data.wire(cell.capabilities(), source, sink) {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(user = %self.id, behavior = %bid, op = next.0, error = %e, "could not wire operation data");
                self.start_reset(st, "data wiring failed");
                self.check_if_fully_stopped(st, bid);
                return;
            }
        };

        node.op_stopped = false;
        let delay = start.saturating_duration_since(now);
        cell.schedule(delay, node.cycle_time, bindings);
        debug!(
            user = %self.id,
            behavior = %bid,
            op = node.spec.operation_name(next),
            delay_ms = delay.as_millis() as u64,
            "operation scheduled"
        );
        self.ctx.observer.on_operation_scheduled(self.id, bid, next, delay);
    }

    fn build_child(
        &self,
        name:   &str,
        parent: BehaviorId,
        token:  &CancellationToken,
        routed: &Capabilities,
    ) -> DriverResult<BehaviorNode> {
        let spec = self.ctx.registry.require(name)?;
        self.build_behavior(spec, Some(parent), token, Some(routed))
    }

    // ── Stop cascade ──────────────────────────────────────────────────────

    pub(crate) fn stop_behavior(&self, st: &mut UserState, bid: BehaviorId) {
        let Some(node) = st.behaviors.get_mut(&bid) else {
            return;
        };
        node.stop.cancel();
        let children = node.children.clone();
        for child in children {
            self.stop_behavior(st, child);
        }
        self.check_if_fully_stopped(st, bid);
    }

    pub(crate) fn ack_op_stopped(&self, st: &mut UserState, bid: BehaviorId) {
        match st.behaviors.get_mut(&bid) {
            Some(node) => node.op_stopped = true,
            None => {
                debug!(user = %self.id, behavior = %bid, "stop acknowledgement for a discarded behavior");
                return;
            }
        }
        self.check_if_fully_stopped(st, bid);
    }

    fn check_if_fully_stopped(&self, st: &mut UserState, bid: BehaviorId) {
        if !st.behaviors.get(&bid).is_some_and(BehaviorNode::is_fully_stopped) {
            return;
        }
        let Some(node) = st.behaviors.remove(&bid) else {
            return;
        };
        self.data.clear_scope(bid);
        if let Some(pending) = node.pending_child {
            self.data.clear_scope(pending.id);
        }
        debug!(user = %self.id, behavior = %bid, "behavior fully stopped");
        self.ctx.observer.on_behavior_stopped(self.id, bid);

        match node.parent {
            Some(parent) => {
                if let Some(p) = st.behaviors.get_mut(&parent) {
                    p.children.retain(|c| *c != bid);
                }
                self.check_if_fully_stopped(st, parent);
            }
            None if st.root == Some(bid) => self.complete_reset(st),
            None => {}
        }
    }
}
