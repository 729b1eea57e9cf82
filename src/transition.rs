//! Per-pin output state machine: movement, flashing and auto-reset.
//!
//! An [`OutputMachine`] owns the live value of one output pin (servo angle
//! or LED brightness) and moves it toward the target of the commanded
//! state. How it moves is chosen once from the output type:
//!
//! | [`Motion`] | Types | Behaviour |
//! |------------|-------|-----------|
//! | `Angle` | Servo, Signal | One unit per step interval, derived from pace |
//! | `Led` | LED, LED4, RoadUK, RoadRW | Jumps to the target |
//! | `Flasher` | Flash, Blink, Random | Oscillates between Lo and Hi while Hi |
//! | `Inert` | None | Tracks the commanded state only |
//!
//! # Auto-reset
//!
//! A Hi command on an output with a non-zero reset interval arms a timer.
//! When it expires the caller-supplied gate decides whether the output may
//! return to Lo. A Lo command disarms the timer, and it fires at most once
//! per Hi command.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::Pace;
//! use rs_signalbox::config::TimingConfig;
//! use rs_signalbox::output::{OutputDef, OutputType};
//! use rs_signalbox::transition::{MachineEvent, OutputMachine, Phase};
//!
//! let def = OutputDef::new(OutputType::Servo)
//!     .with_lo(80)
//!     .with_hi(90)
//!     .with_pace(Pace::new(0xc)); // 48ms per degree
//! let mut machine = OutputMachine::new(&def, &TimingConfig::default());
//! assert_eq!(machine.value(), 80);
//!
//! machine.command(true, None, 0);
//! assert_eq!(machine.phase(), Phase::Moving { target: 90 });
//!
//! machine.update(240, || true);
//! assert_eq!(machine.value(), 85);
//!
//! assert_eq!(machine.update(480, || true), MachineEvent::Arrived);
//! assert_eq!(machine.phase(), Phase::IdleHi);
//! ```

use crate::address::{Pace, ResetInterval};
use crate::config::TimingConfig;
use crate::output::{OutputDef, OutputType};

const SEED_DEFAULT: u32 = 0x2545_f491;

/// Oscillation pattern of a flashing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashPattern {
    /// Short on, long off.
    Flash,
    /// Equal on and off.
    Blink,
    /// Random on and off periods.
    Random,
}

/// How an output reaches its target value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    /// Stepped movement at a pace-derived rate.
    Angle,
    /// Immediate change.
    Led,
    /// Oscillation while Hi.
    Flasher(FlashPattern),
    /// Nothing attached.
    Inert,
}

impl Motion {
    /// Motion for an output type.
    pub const fn for_type(output_type: OutputType) -> Self {
        match output_type {
            OutputType::Servo | OutputType::Signal => Motion::Angle,
            OutputType::Led | OutputType::Led4 | OutputType::RoadUk | OutputType::RoadRw => {
                Motion::Led
            }
            OutputType::Flash => Motion::Flasher(FlashPattern::Flash),
            OutputType::Blink => Motion::Flasher(FlashPattern::Blink),
            OutputType::Random => Motion::Flasher(FlashPattern::Random),
            OutputType::None => Motion::Inert,
        }
    }
}

/// Observable phase of an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// At rest in the Lo state.
    IdleLo,
    /// At rest in the Hi state, no reset pending.
    IdleHi,
    /// Stepping toward `target`.
    Moving {
        /// Value being moved to.
        target: u8,
    },
    /// Hi and oscillating.
    Flashing {
        /// Whether the output is currently at its Hi value.
        lit: bool,
    },
    /// At rest Hi with the auto-reset timer armed.
    ResetPending,
}

/// Something an [`OutputMachine::update`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    /// Nothing worth reporting.
    None,
    /// A movement reached its target.
    Arrived,
    /// The reset timer fired and the output went back to Lo.
    AutoReset,
    /// The reset timer fired but the gate refused; the output stays Hi.
    ResetBlocked,
}

/// State machine for one output pin.
#[derive(Clone, Debug)]
pub struct OutputMachine {
    motion: Motion,
    lo: u8,
    hi: u8,
    pace: Pace,
    reset: ResetInterval,
    reset_unit_ms: u32,
    flash_unit_ms: u32,

    state: bool,
    value: u8,
    target: u8,
    moving: bool,
    arrival_pending: bool,
    active_pace: Pace,
    last_step_ms: u64,

    lit: bool,
    next_toggle_ms: u64,
    rng: u32,

    reset_at_ms: Option<u64>,
}

impl OutputMachine {
    /// A machine at rest in the definition's commanded state.
    pub fn new(def: &OutputDef, timing: &TimingConfig) -> Self {
        let value = def.target_value(def.state());
        Self {
            motion: Motion::for_type(def.output_type()),
            lo: def.lo(),
            hi: def.hi(),
            pace: def.pace(),
            reset: def.reset(),
            reset_unit_ms: timing.reset_unit_ms,
            flash_unit_ms: timing.flash_unit_ms.max(1),
            state: def.state(),
            value,
            target: value,
            moving: false,
            arrival_pending: false,
            active_pace: def.pace(),
            last_step_ms: 0,
            lit: def.state(),
            next_toggle_ms: 0,
            rng: SEED_DEFAULT,
            reset_at_ms: None,
        }
    }

    /// Seed the random flash generator. Zero is replaced by a fixed seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.rng = if seed == 0 { SEED_DEFAULT } else { seed };
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// How this output moves.
    pub fn motion(&self) -> Motion {
        self.motion
    }

    /// Commanded state (true = Hi).
    pub fn state(&self) -> bool {
        self.state
    }

    /// Live output value: angle or brightness.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Value the current movement is heading for.
    pub fn target(&self) -> u8 {
        self.target
    }

    /// When the auto-reset timer fires, if armed.
    pub fn reset_deadline(&self) -> Option<u64> {
        self.reset_at_ms
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if self.moving {
            return Phase::Moving {
                target: self.target,
            };
        }
        if let Motion::Flasher(_) = self.motion {
            if self.state {
                return Phase::Flashing { lit: self.lit };
            }
        }
        match (self.state, self.reset_at_ms) {
            (false, _) => Phase::IdleLo,
            (true, Some(_)) => Phase::ResetPending,
            (true, None) => Phase::IdleHi,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Take a new definition, moving from the current value toward the new
    /// target.
    pub fn apply_def(&mut self, def: &OutputDef, now_ms: u64) {
        self.motion = Motion::for_type(def.output_type());
        self.lo = def.lo();
        self.hi = def.hi();
        self.pace = def.pace();
        self.reset = def.reset();
        if def.state() != self.state {
            self.command(def.state(), None, now_ms);
        } else {
            self.target = def.target_value(self.state);
            self.start(self.pace, now_ms);
        }
    }

    /// Command Hi or Lo. `pace` overrides the definition's pace for this
    /// movement only.
    pub fn command(&mut self, state: bool, pace: Option<Pace>, now_ms: u64) {
        self.state = state;
        self.target = if state { self.hi } else { self.lo };
        self.reset_at_ms = if state && !self.reset.is_never() {
            Some(now_ms.saturating_add(self.reset.as_ms(self.reset_unit_ms)))
        } else {
            None
        };
        self.start(pace.unwrap_or(self.pace), now_ms);
    }

    fn start(&mut self, pace: Pace, now_ms: u64) {
        self.active_pace = pace;
        self.last_step_ms = now_ms;
        self.moving = false;
        self.arrival_pending = false;
        match self.motion {
            Motion::Angle if pace.step_interval_ms() > 0 && self.value != self.target => {
                self.moving = true;
            }
            Motion::Angle | Motion::Led => {
                self.value = self.target;
                self.arrival_pending = true;
            }
            Motion::Flasher(_) => {
                self.lit = self.state;
                self.value = self.target;
                if self.state {
                    self.next_toggle_ms = now_ms.saturating_add(self.period_ms(true));
                }
                self.arrival_pending = true;
            }
            Motion::Inert => {
                self.arrival_pending = true;
            }
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance to `now_ms`.
    ///
    /// `reset_permitted` is consulted only when the auto-reset timer fires.
    pub fn update<F>(&mut self, now_ms: u64, reset_permitted: F) -> MachineEvent
    where
        F: FnOnce() -> bool,
    {
        if let Some(at) = self.reset_at_ms {
            if now_ms >= at {
                self.reset_at_ms = None;
                if self.state {
                    if reset_permitted() {
                        self.command(false, None, now_ms);
                        return MachineEvent::AutoReset;
                    }
                    return MachineEvent::ResetBlocked;
                }
            }
        }

        match self.motion {
            Motion::Angle if self.moving => self.step(now_ms),
            Motion::Flasher(_) if self.state && now_ms >= self.next_toggle_ms => {
                self.lit = !self.lit;
                self.value = if self.lit { self.hi } else { self.lo };
                self.next_toggle_ms = now_ms.saturating_add(self.period_ms(self.lit));
            }
            _ => {}
        }

        if !self.moving && self.arrival_pending {
            self.arrival_pending = false;
            return MachineEvent::Arrived;
        }
        MachineEvent::None
    }

    fn step(&mut self, now_ms: u64) {
        let interval = self.active_pace.step_interval_ms() as u64;
        if interval == 0 {
            self.value = self.target;
        } else {
            let steps = now_ms.saturating_sub(self.last_step_ms) / interval;
            if steps == 0 {
                return;
            }
            self.last_step_ms += steps * interval;
            let distance = self.value.abs_diff(self.target) as u64;
            let n = steps.min(distance) as u8;
            self.value = if self.target > self.value {
                self.value + n
            } else {
                self.value - n
            };
        }
        if self.value == self.target {
            self.moving = false;
            self.arrival_pending = true;
        }
    }

    /// Length of the next lit (`true`) or dark period.
    fn period_ms(&mut self, lit: bool) -> u64 {
        let unit = self.flash_unit_ms as u64;
        let u = (16 - self.active_pace.get() as u64) * unit;
        match self.motion {
            Motion::Flasher(FlashPattern::Blink) => u,
            Motion::Flasher(FlashPattern::Flash) => {
                if lit {
                    u
                } else {
                    3 * u
                }
            }
            Motion::Flasher(FlashPattern::Random) => {
                let span = 4 * u - unit + 1;
                unit + self.next_random() as u64 % span
            }
            _ => u,
        }
    }

    fn next_random(&mut self) -> u32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        x
    }
}
