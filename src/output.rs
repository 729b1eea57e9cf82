//! Output definitions: type, commanded state, targets, pacing and locks.
//!
//! An [`OutputDef`] describes one physical output pin. It is materialized
//! on demand (read from a node over the bus, or loaded from storage on the
//! node itself), mutated in place, and written back explicitly.
//!
//! # Locks
//!
//! Each output has four Lo-lock and four Hi-lock slots. A slot names
//! another output and the state it must hold before this output may enter
//! the slot's state. See [`crate::interlock`] for how they are evaluated.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::{NodeId, OutputRef, PinId};
//! use rs_signalbox::output::{LockKind, LockSlot, OutputDef, OutputType};
//!
//! let mut def = OutputDef::new(OutputType::Servo).with_lo(45).with_hi(200);
//! assert_eq!(def.hi(), 180); // clamped to the angle maximum
//!
//! let points = OutputRef::new(NodeId::new(1), PinId::new(0));
//! def.set_lock(LockKind::Hi, 0, LockSlot::new(points, true)).unwrap();
//! assert_eq!(def.lock_count(LockKind::Hi), 1);
//! ```

use crate::address::{NodeId, OutputRef, Pace, ResetInterval};
use crate::error::{Error, Result};

/// Largest value an angle output's Lo/Hi can take.
pub const ANGLE_MAX: u8 = 180;
/// Largest value a brightness output's Lo/Hi can take.
pub const BRIGHTNESS_MAX: u8 = 255;
/// Lock slots of each kind (Lo/Hi).
pub const LOCK_MAX: usize = 4;
/// Default Lo target for a freshly initialised output.
pub const DEFAULT_LO: u8 = 90;
/// Default Hi target for a freshly initialised output.
pub const DEFAULT_HI: u8 = 90;

/// Mask of the type code within the type/state byte.
pub const OUTPUT_TYPE_MASK: u8 = 0x0f;
/// Mask of the commanded state within the type/state byte.
pub const OUTPUT_STATE_MASK: u8 = 0x80;

/// Kind of output attached to a pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum OutputType {
    /// Nothing attached.
    #[default]
    None = 0,
    /// Point motor servo.
    Servo = 1,
    /// Semaphore signal servo.
    Signal = 2,
    /// Single LED or other on/off device.
    Led = 3,
    /// Four-aspect LED, paired with the previous pin.
    Led4 = 4,
    /// Three-aspect UK road signal.
    RoadUk = 5,
    /// Three-aspect road signal, rest of world sequence.
    RoadRw = 6,
    /// Flashing LED (short on, long off).
    Flash = 7,
    /// Blinking LED (equal on and off).
    Blink = 8,
    /// LED with random on/off periods.
    Random = 9,
}

impl OutputType {
    /// Every type in code order.
    pub const ALL: [OutputType; 10] = [
        OutputType::None,
        OutputType::Servo,
        OutputType::Signal,
        OutputType::Led,
        OutputType::Led4,
        OutputType::RoadUk,
        OutputType::RoadRw,
        OutputType::Flash,
        OutputType::Blink,
        OutputType::Random,
    ];

    /// Look up a type by its wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        if (code as usize) < Self::ALL.len() {
            Some(Self::ALL[code as usize])
        } else {
            None
        }
    }

    /// Wire code of this type.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Servo and Signal drive an angle rather than a brightness.
    #[inline]
    pub const fn is_angle(self) -> bool {
        matches!(self, OutputType::Servo | OutputType::Signal)
    }

    /// Steady LED types.
    #[inline]
    pub const fn is_led(self) -> bool {
        matches!(
            self,
            OutputType::Led | OutputType::Led4 | OutputType::RoadUk | OutputType::RoadRw
        )
    }

    /// Types that oscillate while Hi.
    #[inline]
    pub const fn is_flasher(self) -> bool {
        matches!(
            self,
            OutputType::Flash | OutputType::Blink | OutputType::Random
        )
    }

    /// Largest legal Lo/Hi value for this type.
    #[inline]
    pub const fn max_value(self) -> u8 {
        if self.is_angle() {
            ANGLE_MAX
        } else {
            BRIGHTNESS_MAX
        }
    }

    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputType::None => "none",
            OutputType::Servo => "servo",
            OutputType::Signal => "signal",
            OutputType::Led => "led",
            OutputType::Led4 => "led4",
            OutputType::RoadUk => "road_uk",
            OutputType::RoadRw => "road_rw",
            OutputType::Flash => "flash",
            OutputType::Blink => "blink",
            OutputType::Random => "random",
        }
    }
}

/// Which commanded state a lock slot guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LockKind {
    /// Guards moves to Lo.
    Lo,
    /// Guards moves to Hi.
    Hi,
}

impl LockKind {
    /// The lock kind guarding a move to `state` (true = Hi).
    #[inline]
    pub const fn for_state(state: bool) -> Self {
        if state {
            LockKind::Hi
        } else {
            LockKind::Lo
        }
    }

    /// Bit offset of this kind's slots in the enable/state bitmaps.
    #[inline]
    pub(crate) const fn bit_offset(self) -> usize {
        match self {
            LockKind::Lo => 0,
            LockKind::Hi => LOCK_MAX,
        }
    }
}

/// One lock slot.
///
/// A disabled slot keeps its reference so that toggling it back on
/// restores the previous prerequisite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LockSlot {
    /// Whether the slot is evaluated.
    pub enabled: bool,
    /// The prerequisite output.
    pub target: OutputRef,
    /// State the prerequisite must hold (true = Hi).
    pub required: bool,
}

impl LockSlot {
    /// An enabled slot requiring `target` to be in `required` state.
    pub const fn new(target: OutputRef, required: bool) -> Self {
        Self {
            enabled: true,
            target,
            required,
        }
    }
}

/// Definition of one output pin.
///
/// Fields are private: every setter truncates or clamps, so a value of
/// this type always encodes losslessly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputDef {
    output_type: OutputType,
    state: bool,
    lo: u8,
    hi: u8,
    pace: Pace,
    reset: ResetInterval,
    lo_locks: [LockSlot; LOCK_MAX],
    hi_locks: [LockSlot; LOCK_MAX],
}

impl Default for OutputDef {
    fn default() -> Self {
        Self {
            output_type: OutputType::None,
            state: false,
            lo: DEFAULT_LO,
            hi: DEFAULT_HI,
            pace: Pace::DEFAULT,
            reset: ResetInterval::NEVER,
            lo_locks: [LockSlot::default(); LOCK_MAX],
            hi_locks: [LockSlot::default(); LOCK_MAX],
        }
    }
}

impl OutputDef {
    /// Default definition of the given type.
    pub fn new(output_type: OutputType) -> Self {
        Self::default().with_type(output_type)
    }

    /// Set the type, builder style.
    pub fn with_type(mut self, output_type: OutputType) -> Self {
        self.set_type(output_type);
        self
    }

    /// Set the commanded state, builder style.
    pub fn with_state(mut self, state: bool) -> Self {
        self.state = state;
        self
    }

    /// Set the Lo target, builder style.
    pub fn with_lo(mut self, lo: u8) -> Self {
        self.set_lo(lo);
        self
    }

    /// Set the Hi target, builder style.
    pub fn with_hi(mut self, hi: u8) -> Self {
        self.set_hi(hi);
        self
    }

    /// Set the pace, builder style.
    pub fn with_pace(mut self, pace: Pace) -> Self {
        self.pace = pace;
        self
    }

    /// Set the reset interval, builder style.
    pub fn with_reset(mut self, reset: ResetInterval) -> Self {
        self.reset = reset;
        self
    }

    /// Output type.
    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// Change the type. Lo and Hi are re-clamped to the new maximum.
    pub fn set_type(&mut self, output_type: OutputType) {
        self.output_type = output_type;
        let max = output_type.max_value();
        self.lo = self.lo.min(max);
        self.hi = self.hi.min(max);
    }

    /// Commanded state (true = Hi).
    pub fn state(&self) -> bool {
        self.state
    }

    /// Set the commanded state.
    pub fn set_state(&mut self, state: bool) {
        self.state = state;
    }

    /// Lo target value.
    pub fn lo(&self) -> u8 {
        self.lo
    }

    /// Set the Lo target, clamped to the type maximum.
    pub fn set_lo(&mut self, lo: u8) {
        self.lo = lo.min(self.output_type.max_value());
    }

    /// Hi target value.
    pub fn hi(&self) -> u8 {
        self.hi
    }

    /// Set the Hi target, clamped to the type maximum.
    pub fn set_hi(&mut self, hi: u8) {
        self.hi = hi.min(self.output_type.max_value());
    }

    /// Target value for a commanded state.
    pub fn target_value(&self, state: bool) -> u8 {
        if state {
            self.hi
        } else {
            self.lo
        }
    }

    /// Movement pace.
    pub fn pace(&self) -> Pace {
        self.pace
    }

    /// Set the pace.
    pub fn set_pace(&mut self, pace: Pace) {
        self.pace = pace;
    }

    /// Auto-reset interval.
    pub fn reset(&self) -> ResetInterval {
        self.reset
    }

    /// Set the auto-reset interval.
    pub fn set_reset(&mut self, reset: ResetInterval) {
        self.reset = reset;
    }

    /// All four slots of one kind.
    pub fn locks(&self, kind: LockKind) -> &[LockSlot; LOCK_MAX] {
        match kind {
            LockKind::Lo => &self.lo_locks,
            LockKind::Hi => &self.hi_locks,
        }
    }

    fn locks_mut(&mut self, kind: LockKind) -> &mut [LockSlot; LOCK_MAX] {
        match kind {
            LockKind::Lo => &mut self.lo_locks,
            LockKind::Hi => &mut self.hi_locks,
        }
    }

    /// One lock slot, or `None` if `index` is not below [`LOCK_MAX`].
    pub fn lock(&self, kind: LockKind, index: usize) -> Option<&LockSlot> {
        self.locks(kind).get(index)
    }

    /// Replace one lock slot.
    pub fn set_lock(&mut self, kind: LockKind, index: usize, slot: LockSlot) -> Result<()> {
        let entry = self
            .locks_mut(kind)
            .get_mut(index)
            .ok_or(Error::OutOfRange {
                what: "lock index",
                value: index as u8,
            })?;
        *entry = slot;
        Ok(())
    }

    /// Enable or disable one lock slot, keeping its reference.
    pub fn set_lock_enabled(&mut self, kind: LockKind, index: usize, enabled: bool) -> Result<()> {
        let entry = self
            .locks_mut(kind)
            .get_mut(index)
            .ok_or(Error::OutOfRange {
                what: "lock index",
                value: index as u8,
            })?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Disable every lock slot.
    pub fn clear_locks(&mut self) {
        for slot in self.lo_locks.iter_mut().chain(self.hi_locks.iter_mut()) {
            slot.enabled = false;
        }
    }

    /// Number of enabled slots of one kind.
    pub fn lock_count(&self, kind: LockKind) -> usize {
        self.locks(kind).iter().filter(|s| s.enabled).count()
    }

    /// Enabled slots of one kind, with their slot index.
    pub fn enabled_locks(&self, kind: LockKind) -> impl Iterator<Item = (usize, &LockSlot)> {
        self.locks(kind).iter().enumerate().filter(|(_, s)| s.enabled)
    }

    /// Whether any slot, enabled or not, references `node`.
    pub fn references_node(&self, node: NodeId) -> bool {
        self.lo_locks
            .iter()
            .chain(self.hi_locks.iter())
            .any(|s| s.target.node == node)
    }

    /// Point every slot that references `old` at `new` instead.
    ///
    /// Returns true if anything changed.
    pub fn move_locks(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut changed = false;
        for slot in self.lo_locks.iter_mut().chain(self.hi_locks.iter_mut()) {
            if slot.target.node == old {
                slot.target = slot.target.with_node(new);
                changed = true;
            }
        }
        changed
    }

    /// Lock-enable bitmap: Lo slot `i` is bit `i`, Hi slot `i` is bit `4 + i`.
    pub(crate) fn lock_enable_bits(&self) -> u8 {
        self.lock_bits(|s| s.enabled)
    }

    /// Required-state bitmap, same layout as [`Self::lock_enable_bits`].
    pub(crate) fn lock_state_bits(&self) -> u8 {
        self.lock_bits(|s| s.required)
    }

    fn lock_bits(&self, f: impl Fn(&LockSlot) -> bool) -> u8 {
        let mut bits = 0u8;
        for kind in [LockKind::Lo, LockKind::Hi] {
            for (index, slot) in self.locks(kind).iter().enumerate() {
                if f(slot) {
                    bits |= 1 << (index + kind.bit_offset());
                }
            }
        }
        bits
    }
}
