//! Lock evaluation: may an output move to the requested state?
//!
//! An output's Lo locks guard moves to Lo and its Hi locks guard moves to
//! Hi. A move is permitted only when every enabled slot of the guarding
//! kind is satisfied, that is, when the referenced output is currently in
//! the slot's required state. An output with no enabled slots of that kind
//! is always free to move.
//!
//! Prerequisite states come from a [`StateView`]. A view that cannot
//! determine a state (node absent, read failed) returns `None`, which
//! counts as unsatisfied.
//!
//! Locks express prerequisites in one direction only. Nothing stops an
//! operator configuring a cycle, in which case every output on the cycle is
//! blocked until one lock is removed.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::{NodeId, OutputRef, PinId};
//! use rs_signalbox::interlock::{evaluate, StateOutcome};
//! use rs_signalbox::output::{LockKind, LockSlot, OutputDef, OutputType};
//!
//! let signal = OutputRef::new(NodeId::new(1), PinId::new(0));
//! let points = OutputRef::new(NodeId::new(2), PinId::new(5));
//!
//! let mut def = OutputDef::new(OutputType::Signal);
//! def.set_lock(LockKind::Hi, 0, LockSlot::new(points, true)).unwrap();
//!
//! // Points Lo: the signal may not clear.
//! let mut view = |r: OutputRef| Some(r != points);
//! assert!(matches!(evaluate(signal, &def, true, &mut view), StateOutcome::Blocked(_)));
//!
//! // Moving to Lo is unguarded.
//! assert_eq!(evaluate(signal, &def, false, &mut view), StateOutcome::Applied);
//! ```

use core::fmt;

use crate::address::OutputRef;
use crate::error::{Error, Result};
use crate::output::{LockKind, OutputDef};

/// Source of prerequisite states.
pub trait StateView {
    /// Current commanded state of `output`, or `None` if it cannot be
    /// determined.
    fn output_state(&mut self, output: OutputRef) -> Option<bool>;
}

impl<F> StateView for F
where
    F: FnMut(OutputRef) -> Option<bool>,
{
    fn output_state(&mut self, output: OutputRef) -> Option<bool> {
        self(output)
    }
}

/// Why a move was refused: the first unsatisfied slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockBlock {
    /// Output that was asked to move.
    pub output: OutputRef,
    /// Kind of the guarding slot.
    pub kind: LockKind,
    /// Slot index within its kind.
    pub slot: u8,
    /// The prerequisite output.
    pub prerequisite: OutputRef,
    /// State the prerequisite must hold.
    pub required: bool,
    /// State it actually holds, `None` if unknown.
    pub actual: Option<bool>,
}

impl fmt::Display for LockBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LockKind::Lo => "Lo",
            LockKind::Hi => "Hi",
        };
        let name = |state: bool| if state { "Hi" } else { "Lo" };
        write!(
            f,
            "output {} locked by {} (slot {} {}): needs {}, ",
            self.output,
            self.prerequisite,
            kind,
            self.slot,
            name(self.required)
        )?;
        match self.actual {
            Some(actual) => write!(f, "is {}", name(actual)),
            None => f.write_str("state unknown"),
        }
    }
}

/// Result of a state request that reached the interlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateOutcome {
    /// The interlock permitted the move.
    Applied,
    /// The interlock refused the move.
    Blocked(LockBlock),
}

impl StateOutcome {
    /// Whether the move was permitted.
    pub fn is_applied(&self) -> bool {
        matches!(self, StateOutcome::Applied)
    }

    /// The refusal, if any.
    pub fn blocked(&self) -> Option<&LockBlock> {
        match self {
            StateOutcome::Blocked(block) => Some(block),
            StateOutcome::Applied => None,
        }
    }

    /// Turn a refusal into [`Error::LockBlocked`].
    pub fn into_result(self) -> Result<()> {
        match self {
            StateOutcome::Applied => Ok(()),
            StateOutcome::Blocked(block) => Err(Error::LockBlocked(block)),
        }
    }
}

/// Decide whether `output`, defined by `def`, may move to `state`.
///
/// Slots are checked in index order and evaluation stops at the first
/// unsatisfied one.
pub fn evaluate<V>(output: OutputRef, def: &OutputDef, state: bool, view: &mut V) -> StateOutcome
where
    V: StateView + ?Sized,
{
    let kind = LockKind::for_state(state);
    for (index, slot) in def.enabled_locks(kind) {
        let actual = view.output_state(slot.target);
        if actual != Some(slot.required) {
            let block = LockBlock {
                output,
                kind,
                slot: index as u8,
                prerequisite: slot.target,
                required: slot.required,
                actual,
            };
            tracing::info!(target: "signalbox::lock", %block, "move refused");
            return StateOutcome::Blocked(block);
        }
    }
    tracing::trace!(target: "signalbox::lock", %output, state, "move permitted");
    StateOutcome::Applied
}
