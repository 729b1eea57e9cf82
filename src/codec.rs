//! Fixed-layout encoding of definitions for the bus and for storage.
//!
//! The same byte sequence is used in both places, so a record read from a
//! node can be written to storage verbatim and vice versa. There are no
//! length prefixes or checksums.
//!
//! # OutputDef layout ([`OUTPUT_DEF_LEN`] bytes)
//!
//! ```text
//! ┌────┬────┬──────┬───────┬────────────┬────────┬─────────────────────────┬───────────┐
//! │ lo │ hi │ pace │ reset │ state|type │ enable │ lo0 hi0 lo1 hi1 … hi3   │ required  │
//! │ 1B │ 1B │ 1B   │ 1B    │ 1B         │ 1B     │ 8B, node<<3|pin each    │ 1B        │
//! └────┴────┴──────┴───────┴────────────┴────────┴─────────────────────────┴───────────┘
//! ```
//!
//! # InputDef layout ([`INPUT_DEF_LEN`] bytes)
//!
//! Three `[control, reference]` pairs. Control bit 7 marks a disabled
//! slot, bit 6 a delay slot (reference = delay units). Bits 0-1 of the
//! first control byte hold the input type.
//!
//! # Decoding
//!
//! [`OutputDef::from_bytes`] and [`InputDef::from_bytes`] never trust a
//! field verbatim: anything over its legal maximum is clamped and a
//! warning is emitted on the `signalbox::codec` target. The `try_` variants
//! reject such records with [`Error::RangeViolation`] instead.
//!
//! ```rust
//! use rs_signalbox::output::{OutputDef, OutputType};
//!
//! let def = OutputDef::new(OutputType::Signal).with_lo(20).with_hi(160);
//! let bytes = def.to_bytes();
//! assert_eq!(OutputDef::from_bytes(&bytes), def);
//! ```

use crate::address::{InputRef, OutputRef, Pace, PinId, ResetInterval, PACE_MASK, RESET_MASK};
use crate::error::{Error, Result};
use crate::input::{InputDef, InputType, Mapping, INPUT_OUTPUT_MAX};
use crate::output::{
    LockKind, LockSlot, OutputDef, OutputType, LOCK_MAX, OUTPUT_STATE_MASK, OUTPUT_TYPE_MASK,
};
use crate::traits::DefinitionStore;

/// Encoded size of an [`OutputDef`].
pub const OUTPUT_DEF_LEN: usize = 15;
/// Encoded size of an [`InputDef`].
pub const INPUT_DEF_LEN: usize = 6;

/// Storage offset of a node's persisted node number.
pub const NODE_NUMBER_OFFSET: usize = 0;
/// Stored node number meaning "use the jumper setting".
pub const NODE_NUMBER_UNSET: u8 = 0xff;
/// Storage offset of the first output record on a node.
pub const OUTPUT_STORE_BASE: usize = 0x10;
/// Storage offset of the first input record on the controller.
pub const INPUT_STORE_BASE: usize = 0x10;

const INPUT_DISABLED_MASK: u8 = 0x80;
const INPUT_DELAY_MASK: u8 = 0x40;

const OFF_LO: usize = 0;
const OFF_HI: usize = 1;
const OFF_PACE: usize = 2;
const OFF_RESET: usize = 3;
const OFF_TYPE: usize = 4;
const OFF_ENABLE: usize = 5;
const OFF_LOCKS: usize = 6;
const OFF_REQUIRED: usize = OFF_LOCKS + 2 * LOCK_MAX;

/// Storage offset of an output record.
pub const fn output_record_offset(pin: PinId) -> usize {
    OUTPUT_STORE_BASE + pin.index() * OUTPUT_DEF_LEN
}

/// Storage offset of an input record.
pub const fn input_record_offset(input: InputRef) -> usize {
    INPUT_STORE_BASE + input.index() * INPUT_DEF_LEN
}

/// Either clamp-and-warn or reject, depending on the decode mode.
struct Checker {
    strict: bool,
}

impl Checker {
    fn check(&self, field: &'static str, value: u8, max: u8) -> Result<u8> {
        if value <= max {
            return Ok(value);
        }
        if self.strict {
            return Err(Error::RangeViolation { field, value, max });
        }
        tracing::warn!(
            target: "signalbox::codec",
            field,
            value,
            max,
            "range violation clamped"
        );
        Ok(max)
    }

    fn flag(&self, field: &'static str, value: u8) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        if self.strict {
            return Err(Error::RangeViolation {
                field,
                value,
                max: 0,
            });
        }
        tracing::warn!(target: "signalbox::codec", field, value, "unexpected bits ignored");
        Ok(())
    }
}

// ============================================================================
// OutputDef
// ============================================================================

impl OutputDef {
    /// Encode in bus/storage order.
    pub fn to_bytes(&self) -> [u8; OUTPUT_DEF_LEN] {
        let mut bytes = [0u8; OUTPUT_DEF_LEN];
        bytes[OFF_LO] = self.lo();
        bytes[OFF_HI] = self.hi();
        bytes[OFF_PACE] = self.pace().get();
        bytes[OFF_RESET] = self.reset().get();
        bytes[OFF_TYPE] =
            self.output_type().code() | if self.state() { OUTPUT_STATE_MASK } else { 0 };
        bytes[OFF_ENABLE] = self.lock_enable_bits();
        for index in 0..LOCK_MAX {
            bytes[OFF_LOCKS + 2 * index] = self.locks(LockKind::Lo)[index].target.to_byte();
            bytes[OFF_LOCKS + 2 * index + 1] = self.locks(LockKind::Hi)[index].target.to_byte();
        }
        bytes[OFF_REQUIRED] = self.lock_state_bits();
        bytes
    }

    /// Decode, clamping any out-of-range field.
    pub fn from_bytes(bytes: &[u8; OUTPUT_DEF_LEN]) -> Self {
        match decode_output(bytes, &Checker { strict: false }) {
            Ok(def) => def,
            // Lenient decoding only clamps.
            Err(_) => OutputDef::default(),
        }
    }

    /// Decode, rejecting any out-of-range field.
    pub fn try_from_bytes(bytes: &[u8; OUTPUT_DEF_LEN]) -> Result<Self> {
        decode_output(bytes, &Checker { strict: true })
    }
}

fn decode_output(bytes: &[u8; OUTPUT_DEF_LEN], checker: &Checker) -> Result<OutputDef> {
    let type_byte = bytes[OFF_TYPE];
    let code = checker.check(
        "type",
        type_byte & OUTPUT_TYPE_MASK,
        OutputType::Random.code(),
    )?;
    checker.flag(
        "type reserved bits",
        type_byte & !(OUTPUT_TYPE_MASK | OUTPUT_STATE_MASK),
    )?;
    // A clamped code lands on Random; an unknown type is safer as None.
    let output_type = if code == type_byte & OUTPUT_TYPE_MASK {
        OutputType::from_code(code).unwrap_or_default()
    } else {
        OutputType::None
    };
    let max = output_type.max_value();

    let lo = checker.check("lo", bytes[OFF_LO], max)?;
    let hi = checker.check("hi", bytes[OFF_HI], max)?;
    let pace = checker.check("pace", bytes[OFF_PACE], PACE_MASK)?;
    let reset = checker.check("reset", bytes[OFF_RESET], RESET_MASK)?;

    let mut def = OutputDef::new(output_type)
        .with_state(type_byte & OUTPUT_STATE_MASK != 0)
        .with_lo(lo)
        .with_hi(hi)
        .with_pace(Pace::new(pace))
        .with_reset(ResetInterval::new(reset));

    let enable = bytes[OFF_ENABLE];
    let required = bytes[OFF_REQUIRED];
    for kind in [LockKind::Lo, LockKind::Hi] {
        for index in 0..LOCK_MAX {
            let bit = 1u8 << (index + kind.bit_offset());
            let byte = match kind {
                LockKind::Lo => bytes[OFF_LOCKS + 2 * index],
                LockKind::Hi => bytes[OFF_LOCKS + 2 * index + 1],
            };
            let slot = LockSlot {
                enabled: enable & bit != 0,
                target: OutputRef::from_byte(byte),
                required: required & bit != 0,
            };
            def.set_lock(kind, index, slot)?;
        }
    }

    Ok(def)
}

// ============================================================================
// InputDef
// ============================================================================

impl InputDef {
    /// Encode in bus/storage order.
    pub fn to_bytes(&self) -> [u8; INPUT_DEF_LEN] {
        let mut bytes = [0u8; INPUT_DEF_LEN];
        for (index, mapping) in self.mappings().iter().enumerate() {
            let (control, reference) = match *mapping {
                Mapping::Output { target, enabled } => {
                    (if enabled { 0 } else { INPUT_DISABLED_MASK }, target.to_byte())
                }
                Mapping::Delay(units) => (INPUT_DELAY_MASK, units),
            };
            bytes[2 * index] = control;
            bytes[2 * index + 1] = reference;
        }
        bytes[0] |= self.input_type().bits();
        bytes
    }

    /// Decode, ignoring stray bits and resolving conflicting flags.
    pub fn from_bytes(bytes: &[u8; INPUT_DEF_LEN]) -> Self {
        match decode_input(bytes, &Checker { strict: false }) {
            Ok(def) => def,
            Err(_) => InputDef::default(),
        }
    }

    /// Decode, rejecting stray bits and conflicting flags.
    pub fn try_from_bytes(bytes: &[u8; INPUT_DEF_LEN]) -> Result<Self> {
        decode_input(bytes, &Checker { strict: true })
    }
}

fn decode_input(bytes: &[u8; INPUT_DEF_LEN], checker: &Checker) -> Result<InputDef> {
    let mut def = InputDef::new(InputType::from_bits(bytes[0]));

    for index in 0..INPUT_OUTPUT_MAX {
        let control = bytes[2 * index];
        let reference = bytes[2 * index + 1];

        let stray = if index == 0 {
            control & !(INPUT_DISABLED_MASK | INPUT_DELAY_MASK | InputType::MASK)
        } else {
            control & !(INPUT_DISABLED_MASK | INPUT_DELAY_MASK)
        };
        checker.flag("mapping control bits", stray)?;

        let disabled = control & INPUT_DISABLED_MASK != 0;
        let delay = control & INPUT_DELAY_MASK != 0;
        if delay && disabled {
            // Delay wins: a delay slot has no output to disable.
            checker.flag("mapping delay+disabled", control & INPUT_DISABLED_MASK)?;
        }

        let mapping = if delay {
            Mapping::Delay(reference)
        } else {
            Mapping::Output {
                target: OutputRef::from_byte(reference),
                enabled: !disabled,
            }
        };
        def.set_mapping(index, mapping)?;
    }

    Ok(def)
}

// ============================================================================
// Input records
// ============================================================================

/// Load an input's definition from the controller's store.
///
/// A record that fails strict decoding (erased or corrupt) reads as the
/// default definition.
pub fn load_input_def<S>(store: &mut S, input: InputRef) -> Result<InputDef>
where
    S: DefinitionStore + ?Sized,
{
    let offset = input_record_offset(input);
    let mut bytes = [0u8; INPUT_DEF_LEN];
    store
        .get(offset, &mut bytes)
        .map_err(|_| Error::Storage { offset })?;
    Ok(InputDef::try_from_bytes(&bytes).unwrap_or_else(|e| {
        tracing::debug!(target: "signalbox::codec", %input, %e, "input record invalid, using default");
        InputDef::default()
    }))
}

/// Persist an input's definition to the controller's store.
pub fn store_input_def<S>(store: &mut S, input: InputRef, def: &InputDef) -> Result<()>
where
    S: DefinitionStore + ?Sized,
{
    let offset = input_record_offset(input);
    store
        .put(offset, &def.to_bytes())
        .map_err(|_| Error::Storage { offset })
}
