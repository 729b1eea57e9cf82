//! Turning input transitions into output state requests.
//!
//! An input's [`InputType`] decides which state its transition asks for,
//! then the input's mapping slots are walked in order: enabled output slots
//! request that state, delay slots pause, disabled slots are skipped.
//!
//! | Type | Press | Release |
//! |------|-------|---------|
//! | Toggle | Opposite of the first enabled output's state | ignored |
//! | OnOff | Hi | Lo |
//! | On | Hi | ignored |
//! | Off | Lo | ignored |
//!
//! Every request goes through the interlock, so one slot being blocked or
//! failing does not stop the rest. The [`DispatchReport`] records what
//! happened at each step.

use heapless::Vec;

use crate::address::{InputRef, OutputRef};
use crate::error::{Error, Result};
use crate::input::{InputDef, InputEvent, InputType, Mapping, INPUT_OUTPUT_MAX};
use crate::interlock::StateOutcome;
use crate::traits::Delay;

/// Where the dispatcher sends its requests.
pub trait OutputRequester {
    /// Current commanded state of `output`.
    fn output_state(&mut self, output: OutputRef) -> Result<bool>;

    /// Ask for `output` to move to `state`, subject to its locks.
    fn request_state(&mut self, output: OutputRef, state: bool) -> Result<StateOutcome>;
}

/// One executed mapping slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStep {
    /// An output request was made.
    Requested {
        /// Slot index.
        slot: u8,
        /// Output requested.
        output: OutputRef,
        /// State requested.
        state: bool,
        /// What the request returned.
        outcome: core::result::Result<StateOutcome, Error>,
    },
    /// The sequence paused.
    Delayed {
        /// Slot index.
        slot: u8,
        /// Pause length.
        ms: u32,
    },
}

impl DispatchStep {
    /// Whether this step was a request that did not apply.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DispatchStep::Requested {
                outcome: Err(_) | Ok(StateOutcome::Blocked(_)),
                ..
            }
        )
    }
}

/// What one input transition did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    /// The input that changed.
    pub input: InputRef,
    /// State the transition asked for, `None` if it was ignored.
    pub state: Option<bool>,
    /// Executed slots in order.
    pub steps: Vec<DispatchStep, INPUT_OUTPUT_MAX>,
    /// Failure that prevented the sequence from starting.
    pub error: Option<Error>,
}

impl DispatchReport {
    fn new(input: InputRef) -> Self {
        Self {
            input,
            state: None,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Whether the transition was ignored (release of a press-only type,
    /// or nothing to drive).
    pub fn is_ignored(&self) -> bool {
        self.state.is_none() && self.error.is_none()
    }

    /// Whether every request applied.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && !self.steps.iter().any(DispatchStep::is_failure)
    }

    /// Requests that were blocked or failed.
    pub fn failures(&self) -> impl Iterator<Item = &DispatchStep> {
        self.steps.iter().filter(|s| s.is_failure())
    }
}

/// Work out the requested state for `event` on an input defined by `def`.
fn requested_state<R>(def: &InputDef, event: InputEvent, requester: &mut R) -> Result<Option<bool>>
where
    R: OutputRequester + ?Sized,
{
    Ok(match (def.input_type(), event.pressed) {
        (InputType::Toggle, true) => match def.first_output() {
            Some(first) => Some(!requester.output_state(first)?),
            None => None,
        },
        (InputType::OnOff, pressed) => Some(pressed),
        (InputType::On, true) => Some(true),
        (InputType::Off, true) => Some(false),
        (_, false) => None,
    })
}

/// Run the mapping sequence of `def` for `event`.
///
/// Delay slots block through `delay` for `units * delay_unit_ms`.
pub fn dispatch<R, D>(
    def: &InputDef,
    event: InputEvent,
    requester: &mut R,
    delay: &mut D,
    delay_unit_ms: u32,
) -> DispatchReport
where
    R: OutputRequester + ?Sized,
    D: Delay + ?Sized,
{
    let mut report = DispatchReport::new(event.input);
    let state = match requested_state(def, event, requester) {
        Ok(Some(state)) => state,
        Ok(None) => return report,
        Err(e) => {
            tracing::warn!(target: "signalbox::bus", input = %event.input, %e, "toggle state unknown");
            report.error = Some(e);
            return report;
        }
    };
    report.state = Some(state);
    tracing::debug!(
        target: "signalbox::bus",
        input = %event.input,
        kind = def.input_type().as_str(),
        state,
        "dispatch"
    );

    for (slot, mapping) in def.mappings().iter().enumerate() {
        let slot = slot as u8;
        let step = match *mapping {
            Mapping::Output {
                enabled: false, ..
            } => continue,
            Mapping::Output { target, .. } => {
                let outcome = requester.request_state(target, state);
                if let Err(e) = &outcome {
                    tracing::warn!(target: "signalbox::bus", output = %target, %e, "request failed");
                }
                DispatchStep::Requested {
                    slot,
                    output: target,
                    state,
                    outcome,
                }
            }
            Mapping::Delay(units) => {
                let ms = units as u32 * delay_unit_ms;
                delay.delay_ms(ms);
                DispatchStep::Delayed { slot, ms }
            }
        };
        let pushed = report.steps.push(step).is_ok();
        debug_assert!(pushed, "one step per mapping slot");
    }
    report
}
