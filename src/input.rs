//! Input definitions: which outputs an input drives, and how.
//!
//! An [`InputDef`] holds up to [`INPUT_OUTPUT_MAX`] mapping slots. A slot
//! either references an output (enabled or disabled), or is a delay step
//! that pauses the dispatch sequence before the next slot.

use crate::address::{InputRef, NodeId, OutputRef};
use crate::error::{Error, Result};

/// Mapping slots per input.
pub const INPUT_OUTPUT_MAX: usize = 3;

/// How an input turns its transitions into output commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum InputType {
    /// Each press flips the driven outputs.
    #[default]
    Toggle = 0,
    /// Momentary: press drives Hi, release drives Lo.
    OnOff = 1,
    /// Press drives Hi.
    On = 2,
    /// Press drives Lo.
    Off = 3,
}

impl InputType {
    /// Mask of the type bits in slot 0's control byte.
    pub const MASK: u8 = 0x03;

    /// Decode from the two type bits. Never fails; extra bits are masked.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & Self::MASK {
            0 => InputType::Toggle,
            1 => InputType::OnOff,
            2 => InputType::On,
            _ => InputType::Off,
        }
    }

    /// The two type bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            InputType::Toggle => "toggle",
            InputType::OnOff => "on_off",
            InputType::On => "on",
            InputType::Off => "off",
        }
    }
}

/// One mapping slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mapping {
    /// Drive an output.
    Output {
        /// Output to drive.
        target: OutputRef,
        /// Disabled slots are skipped but keep their reference.
        enabled: bool,
    },
    /// Pause for this many delay units before the next slot.
    Delay(u8),
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping::Output {
            target: OutputRef::default(),
            enabled: false,
        }
    }
}

impl Mapping {
    /// An enabled output mapping.
    pub const fn output(target: OutputRef) -> Self {
        Mapping::Output {
            target,
            enabled: true,
        }
    }

    /// The output referenced by this slot, enabled or not.
    pub const fn target(&self) -> Option<OutputRef> {
        match self {
            Mapping::Output { target, .. } => Some(*target),
            Mapping::Delay(_) => None,
        }
    }

    /// The output this slot drives, if it is an enabled output slot.
    pub const fn enabled_target(&self) -> Option<OutputRef> {
        match self {
            Mapping::Output {
                target,
                enabled: true,
            } => Some(*target),
            _ => None,
        }
    }
}

/// Definition of one input pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputDef {
    input_type: InputType,
    mappings: [Mapping; INPUT_OUTPUT_MAX],
}

impl InputDef {
    /// An input of the given type with every slot disabled.
    pub fn new(input_type: InputType) -> Self {
        Self {
            input_type,
            mappings: [Mapping::default(); INPUT_OUTPUT_MAX],
        }
    }

    /// Set one slot, builder style. Indexes past the last slot are ignored.
    pub fn with_mapping(mut self, index: usize, mapping: Mapping) -> Self {
        if let Some(slot) = self.mappings.get_mut(index) {
            *slot = mapping;
        }
        self
    }

    /// Behaviour type.
    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    /// Change the behaviour type.
    pub fn set_input_type(&mut self, input_type: InputType) {
        self.input_type = input_type;
    }

    /// All slots in activation order.
    pub fn mappings(&self) -> &[Mapping; INPUT_OUTPUT_MAX] {
        &self.mappings
    }

    /// One slot.
    pub fn mapping(&self, index: usize) -> Option<&Mapping> {
        self.mappings.get(index)
    }

    /// Replace one slot.
    pub fn set_mapping(&mut self, index: usize, mapping: Mapping) -> Result<()> {
        let slot = self.mappings.get_mut(index).ok_or(Error::OutOfRange {
            what: "mapping index",
            value: index as u8,
        })?;
        *slot = mapping;
        Ok(())
    }

    /// First enabled output slot, used to decide a toggle's next state.
    pub fn first_output(&self) -> Option<OutputRef> {
        self.mappings.iter().find_map(Mapping::enabled_target)
    }

    /// Rewrite every output slot on node `old` to node `new`.
    ///
    /// Returns true if anything changed.
    pub fn move_outputs(&mut self, old: NodeId, new: NodeId) -> bool {
        let mut changed = false;
        for slot in self.mappings.iter_mut() {
            if let Mapping::Output { target, .. } = slot {
                if target.node == old {
                    *target = target.with_node(new);
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A physical input transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputEvent {
    /// Input that changed.
    pub input: InputRef,
    /// True for press, false for release.
    pub pressed: bool,
}

impl InputEvent {
    /// A press of `input`.
    pub const fn press(input: InputRef) -> Self {
        Self {
            input,
            pressed: true,
        }
    }

    /// A release of `input`.
    pub const fn release(input: InputRef) -> Self {
        Self {
            input,
            pressed: false,
        }
    }
}
