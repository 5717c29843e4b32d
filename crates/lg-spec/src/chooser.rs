//! `TransitionChooser`: picks which transition-matrix variant follows a
//! completed operation.
//!
//! The behavior consults the chooser named by
//! [`BehaviorSpec::transition_chooser`] for the operation that just finished.
//! Besides the variant, a chooser may name child behaviors to stop before the
//! next operation starts or when it completes, and may route the next
//! operation's data reads to one of the children.
//!
//! Choosers are shared by every user of a run, so they hold no per-user state.
//! Anything they need to read comes in through [`ChooserInput::bindings`],
//! wired from [`TransitionChooser::capabilities`] in the behavior's own scope.

use lg_core::{BehaviorId, BehaviorRng, OpIndex};
use lg_data::{Bindings, Capabilities, ChannelKey, Slot};

use crate::{BehaviorSpec, SpecError, SpecResult};

// ── Input / output ────────────────────────────────────────────────────────────

/// Everything a chooser may look at.
pub struct ChooserInput<'a> {
    pub behavior:  BehaviorId,
    pub completed: OpIndex,
    /// Active children, oldest first.
    pub children:  &'a [BehaviorId],
    pub bindings:  &'a Bindings,
    pub rng:       &'a mut BehaviorRng,
    pub spec:      &'a BehaviorSpec,
}

/// A chooser's decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionChoice {
    pub variant:       usize,
    pub stop_at_start: Vec<BehaviorId>,
    pub stop_at_end:   Vec<BehaviorId>,
    /// Behavior whose data scope the next operation reads from; `None` means
    /// the deciding behavior itself.
    pub data_source:   Option<BehaviorId>,
}

impl TransitionChoice {
    pub fn variant(variant: usize) -> Self {
        Self { variant, ..Self::default() }
    }

    pub fn stop_at_start(mut self, children: impl IntoIterator<Item = BehaviorId>) -> Self {
        self.stop_at_start.extend(children);
        self
    }

    pub fn stop_at_end(mut self, children: impl IntoIterator<Item = BehaviorId>) -> Self {
        self.stop_at_end.extend(children);
        self
    }

    pub fn data_source(mut self, behavior: BehaviorId) -> Self {
        self.data_source = Some(behavior);
        self
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Hook called after an operation completes and before the next one is
/// selected.
///
/// # Contract
///
/// - Runs inside the owning user's critical section: must not block or
///   perform I/O.
/// - Must be deterministic given the same `rng` state and channel contents.
/// - The returned variant must exist for `input.completed`; the behavior
///   treats an out-of-range variant like any other chooser error and resets
///   the user.
pub trait TransitionChooser: Send + Sync {
    /// Channels this chooser reads.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    fn choose(&self, input: &mut ChooserInput<'_>) -> SpecResult<TransitionChoice>;
}

// ── Default ───────────────────────────────────────────────────────────────────

/// Always variant 0, stops nothing, reads from the deciding behavior.
pub struct DefaultChooser;

impl TransitionChooser for DefaultChooser {
    #[inline]
    fn choose(&self, _input: &mut ChooserInput<'_>) -> SpecResult<TransitionChoice> {
        Ok(TransitionChoice::default())
    }
}

// ── Data driven ───────────────────────────────────────────────────────────────

/// Reads the variant from a `Slot<usize>` that an earlier operation filled.
///
/// An empty slot yields `fallback`.  A value past the last variant is an
/// error.
pub struct DataDrivenChooser {
    key:      ChannelKey<Slot<usize>>,
    fallback: usize,
    consume:  bool,
}

impl DataDrivenChooser {
    pub fn new(key: ChannelKey<Slot<usize>>) -> Self {
        Self { key, fallback: 0, consume: false }
    }

    pub fn with_fallback(mut self, variant: usize) -> Self {
        self.fallback = variant;
        self
    }

    /// Empty the slot after reading so each value steers one transition.
    pub fn consuming(mut self) -> Self {
        self.consume = true;
        self
    }
}

impl TransitionChooser for DataDrivenChooser {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().needs(self.key)
    }

    fn choose(&self, input: &mut ChooserInput<'_>) -> SpecResult<TransitionChoice> {
        let slot = input
            .bindings
            .get(&self.key)
            .map_err(|e| SpecError::Chooser(e.to_string()))?;
        let value = if self.consume { slot.take() } else { slot.get() };
        let variant = value.unwrap_or(self.fallback);

        let available = input.spec.variant_count(input.completed);
        if variant >= available {
            return Err(SpecError::VariantOutOfRange {
                spec:    input.spec.name().to_owned(),
                op:      input.completed.index(),
                variant,
            });
        }
        Ok(TransitionChoice::variant(variant))
    }
}
