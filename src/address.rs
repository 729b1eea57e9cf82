//! Fixed-width address and parameter types.
//!
//! Every value that ends up in a packed bus or storage byte has its own
//! newtype here. Constructors mask to the legal bit width, so a value that
//! exists is always in range and no call site needs to re-mask it.
//!
//! | Type | Width | Range |
//! |------|-------|-------|
//! | [`NodeId`] | 5 bits | output node `0..32` |
//! | [`PinId`] | 3 bits | output pin `0..8` |
//! | [`InputNodeId`] | 5 bits | input node `0..32` (generation may limit to 8) |
//! | [`InputPin`] | 4 bits | input pin `0..16` |
//! | [`Pace`] | 4 bits | `0..16`, higher is faster |
//! | [`ResetInterval`] | 4 bits | `0..16` time units, 0 = never |
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::{NodeId, OutputRef, PinId, Pace};
//!
//! let target = OutputRef::new(NodeId::new(2), PinId::new(5));
//! assert_eq!(target.to_byte(), 0x15);
//! assert_eq!(OutputRef::from_byte(0x15), target);
//!
//! // Out-of-range values are truncated, not rejected.
//! assert_eq!(NodeId::new(0x23).get(), 0x03);
//! assert_eq!(Pace::new(0xc).step_interval_ms(), 48);
//! ```

use core::fmt;

/// Number of addressable output nodes.
pub const OUTPUT_NODE_MAX: u8 = 32;
/// Mask for an output node number (5 bits).
pub const OUTPUT_NODE_MASK: u8 = 0x1f;
/// Shift of the node number within a packed output reference.
pub const OUTPUT_NODE_SHIFT: u8 = 3;
/// Outputs on each output node.
pub const OUTPUT_PIN_MAX: u8 = 8;
/// Mask for an output pin (3 bits).
pub const OUTPUT_PIN_MASK: u8 = 0x07;

/// Largest number of input nodes any generation supports.
pub const INPUT_NODE_MAX: u8 = 32;
/// Mask for an input node number.
pub const INPUT_NODE_MASK: u8 = 0x1f;
/// Inputs on each input node.
pub const INPUT_PIN_MAX: u8 = 16;
/// Mask for an input pin (4 bits).
pub const INPUT_PIN_MASK: u8 = 0x0f;

/// Mask for the pace nibble.
pub const PACE_MASK: u8 = 0x0f;
/// Pace is scaled by 16 (shifted left 4 bits) to get a step interval.
pub const PACE_SHIFT: u8 = 4;
/// Mask for the reset nibble.
pub const RESET_MASK: u8 = 0x0f;

// ============================================================================
// Output addressing
// ============================================================================

/// Output node number (5 bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node number, truncating to 5 bits.
    #[inline]
    pub const fn new(node: u8) -> Self {
        Self(node & OUTPUT_NODE_MASK)
    }

    /// Create a node number, rejecting anything out of range.
    pub const fn try_new(node: u8) -> Option<Self> {
        if node < OUTPUT_NODE_MAX {
            Some(Self(node))
        } else {
            None
        }
    }

    /// The raw node number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Bit for this node in a presence bitmap.
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self.0
    }

    /// Iterate all output node numbers in address order.
    pub fn all() -> impl Iterator<Item = NodeId> {
        (0..OUTPUT_NODE_MAX).map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Output pin within a node (3 bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PinId(u8);

impl PinId {
    /// Create a pin number, truncating to 3 bits.
    #[inline]
    pub const fn new(pin: u8) -> Self {
        Self(pin & OUTPUT_PIN_MASK)
    }

    /// Create a pin number, rejecting anything out of range.
    pub const fn try_new(pin: u8) -> Option<Self> {
        if pin < OUTPUT_PIN_MAX {
            Some(Self(pin))
        } else {
            None
        }
    }

    /// The raw pin number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Pin number as an array index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Bit for this pin in a node's state byte.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self.0
    }

    /// Iterate all pins of a node.
    pub fn all() -> impl Iterator<Item = PinId> {
        (0..OUTPUT_PIN_MAX).map(PinId)
    }
}

/// A reference to one output: node and pin.
///
/// Packs into a single byte as `node << 3 | pin`, which is the form used
/// by lock slots and input mappings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputRef {
    /// Node hosting the output.
    pub node: NodeId,
    /// Pin within the node.
    pub pin: PinId,
}

impl OutputRef {
    /// Create a reference from its parts.
    #[inline]
    pub const fn new(node: NodeId, pin: PinId) -> Self {
        Self { node, pin }
    }

    /// Unpack a reference byte.
    #[inline]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            node: NodeId::new(byte >> OUTPUT_NODE_SHIFT),
            pin: PinId::new(byte),
        }
    }

    /// Pack into a reference byte.
    #[inline]
    pub const fn to_byte(self) -> u8 {
        (self.node.get() << OUTPUT_NODE_SHIFT) | self.pin.get()
    }

    /// The same pin on another node.
    #[inline]
    pub const fn with_node(self, node: NodeId) -> Self {
        Self { node, pin: self.pin }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}{:X}", self.node.get(), self.pin.get())
    }
}

// ============================================================================
// Input addressing
// ============================================================================

/// Input node number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputNodeId(u8);

impl InputNodeId {
    /// Create an input node number, truncating to 5 bits.
    #[inline]
    pub const fn new(node: u8) -> Self {
        Self(node & INPUT_NODE_MASK)
    }

    /// The raw node number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Bit for this node in a presence bitmap.
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

/// Input pin within an input node (4 bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputPin(u8);

impl InputPin {
    /// Create an input pin, truncating to 4 bits.
    #[inline]
    pub const fn new(pin: u8) -> Self {
        Self(pin & INPUT_PIN_MASK)
    }

    /// The raw pin number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Iterate all pins of an input node.
    pub fn all() -> impl Iterator<Item = InputPin> {
        (0..INPUT_PIN_MAX).map(InputPin)
    }
}

/// A reference to one input: node and pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputRef {
    /// Input node.
    pub node: InputNodeId,
    /// Pin within the node.
    pub pin: InputPin,
}

impl InputRef {
    /// Create a reference from its parts.
    #[inline]
    pub const fn new(node: InputNodeId, pin: InputPin) -> Self {
        Self { node, pin }
    }

    /// Position of this input in a flat per-controller table.
    #[inline]
    pub const fn index(self) -> usize {
        self.node.get() as usize * INPUT_PIN_MAX as usize + self.pin.get() as usize
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}{:X}", self.node.get(), self.pin.get())
    }
}

// ============================================================================
// Timing parameters
// ============================================================================

/// Movement pace (4 bits). Higher is faster; 0 is the slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pace(u8);

impl Pace {
    /// Mid-range pace used for freshly initialised outputs.
    pub const DEFAULT: Pace = Pace(0xc);
    /// Fastest pace: movement jumps straight to its target.
    pub const FASTEST: Pace = Pace(PACE_MASK);

    /// Create a pace, truncating to 4 bits.
    #[inline]
    pub const fn new(pace: u8) -> Self {
        Self(pace & PACE_MASK)
    }

    /// The raw pace nibble.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Milliseconds between single-unit movement steps.
    ///
    /// `(15 - pace) << 4`, so pace 0 is 240ms per step and pace 15 is 0.
    #[inline]
    pub const fn step_interval_ms(self) -> u32 {
        ((PACE_MASK - self.0) as u32) << PACE_SHIFT
    }
}

impl Default for Pace {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Auto-reset interval (4 bits) in reset time units. Zero means never.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResetInterval(u8);

impl ResetInterval {
    /// No automatic reset.
    pub const NEVER: ResetInterval = ResetInterval(0);

    /// Create a reset interval, truncating to 4 bits.
    #[inline]
    pub const fn new(units: u8) -> Self {
        Self(units & RESET_MASK)
    }

    /// The raw number of units.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Whether the output never resets by itself.
    #[inline]
    pub const fn is_never(self) -> bool {
        self.0 == 0
    }

    /// Interval in milliseconds for a given unit length.
    #[inline]
    pub const fn as_ms(self, unit_ms: u32) -> u64 {
        self.0 as u64 * unit_ms as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_masks_to_five_bits() {
        assert_eq!(NodeId::new(31).get(), 31);
        assert_eq!(NodeId::new(32).get(), 0);
        assert_eq!(NodeId::new(0xff).get(), 31);
        assert!(NodeId::try_new(32).is_none());
        assert_eq!(NodeId::try_new(7), Some(NodeId::new(7)));
    }

    #[test]
    fn pin_id_masks_to_three_bits() {
        assert_eq!(PinId::new(9).get(), 1);
        assert!(PinId::try_new(8).is_none());
        assert_eq!(PinId::new(5).bit(), 0x20);
    }

    #[test]
    fn output_ref_packs_node_and_pin() {
        let r = OutputRef::new(NodeId::new(0x1f), PinId::new(7));
        assert_eq!(r.to_byte(), 0xff);
        assert_eq!(OutputRef::from_byte(0xff), r);

        let r = OutputRef::from_byte(0x3b);
        assert_eq!(r.node.get(), 7);
        assert_eq!(r.pin.get(), 3);
    }

    #[test]
    fn output_ref_with_node_keeps_pin() {
        let r = OutputRef::new(NodeId::new(3), PinId::new(6));
        let moved = r.with_node(NodeId::new(7));
        assert_eq!(moved.node.get(), 7);
        assert_eq!(moved.pin.get(), 6);
    }

    #[test]
    fn input_ref_index_is_flat() {
        let r = InputRef::new(InputNodeId::new(2), InputPin::new(3));
        assert_eq!(r.index(), 35);
        assert_eq!(InputPin::new(0x13).get(), 3);
    }

    #[test]
    fn pace_step_interval() {
        assert_eq!(Pace::new(0).step_interval_ms(), 240);
        assert_eq!(Pace::new(0xc).step_interval_ms(), 48);
        assert_eq!(Pace::new(0xf).step_interval_ms(), 0);
        assert_eq!(Pace::new(0x1f).get(), 0xf);
    }

    #[test]
    fn pace_is_monotonic() {
        for p1 in 0..16u8 {
            for p2 in p1..16u8 {
                assert!(Pace::new(p1).step_interval_ms() >= Pace::new(p2).step_interval_ms());
            }
        }
    }

    #[test]
    fn reset_interval_truncates() {
        assert_eq!(ResetInterval::new(0x13).get(), 3);
        assert!(ResetInterval::new(0x10).is_never());
        assert_eq!(ResetInterval::new(3).as_ms(1000), 3000);
    }
}
