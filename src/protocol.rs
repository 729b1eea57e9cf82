//! Bus wire protocol: command frames and the master-side driver.
//!
//! Every frame starts with a command byte. The high nibble is the opcode,
//! the low nibble the pin or system sub-command:
//!
//! | Byte | Command | Payload | Response |
//! |------|---------|---------|----------|
//! | `0x10` | [`Command::ReadStates`] | - | 1 byte, bit per pin |
//! | `0x2p` | [`Command::WriteState`] | state, pace override | - |
//! | `0x3p` | [`Command::ReadDef`] | - | [`OUTPUT_DEF_LEN`] bytes |
//! | `0x4p` | [`Command::WriteDef`] | [`OUTPUT_DEF_LEN`] bytes | - |
//! | `0x5p` | [`Command::SaveDef`] | [`OUTPUT_DEF_LEN`] bytes | - |
//! | `0x6p` | [`Command::ResetDef`] | - | - |
//! | `0x71` | [`Command::Renumber`] | new node | 1 byte, node in use |
//! | `0x72` | [`Command::MoveLocks`] | old node, new node | - |
//!
//! The driver never retries. A missing acknowledge becomes
//! [`BusError::NoAck`], a response shorter than the command requires
//! becomes [`BusError::Short`].

use crate::address::{InputNodeId, NodeId, OutputRef, Pace, PinId};
use crate::codec::OUTPUT_DEF_LEN;
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::output::OutputDef;
use crate::traits::Bus;

/// Longest command frame: command byte plus a definition.
pub const FRAME_MAX: usize = 1 + OUTPUT_DEF_LEN;
/// Read States response length.
pub const STATES_LEN: usize = 1;
/// Renumber response length.
pub const RENUMBER_REPLY_LEN: usize = 1;
/// Pace override byte meaning "use the definition's pace".
pub const PACE_NONE: u8 = 0xff;
/// Renumber payload meaning "revert to the jumper setting".
pub const NODE_JUMPERS: u8 = 0xff;

const OPCODE_MASK: u8 = 0xf0;
const OPERAND_MASK: u8 = 0x0f;

const OP_READ_STATES: u8 = 0x10;
const OP_WRITE_STATE: u8 = 0x20;
const OP_READ_DEF: u8 = 0x30;
const OP_WRITE_DEF: u8 = 0x40;
const OP_SAVE_DEF: u8 = 0x50;
const OP_RESET_DEF: u8 = 0x60;
const OP_SYSTEM: u8 = 0x70;

const SYS_RENUMBER: u8 = 0x01;
const SYS_MOVE_LOCKS: u8 = 0x02;

// ============================================================================
// Command frames
// ============================================================================

/// A command frame as sent by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Report the commanded state of all eight pins.
    ReadStates,
    /// Command one pin Hi or Lo.
    WriteState {
        /// Pin to command.
        pin: PinId,
        /// New state (true = Hi).
        state: bool,
        /// Pace for this movement only.
        pace: Option<Pace>,
    },
    /// Report one pin's definition.
    ReadDef(PinId),
    /// Replace one pin's definition without persisting it.
    WriteDef {
        /// Pin to update.
        pin: PinId,
        /// New definition.
        def: OutputDef,
    },
    /// Replace and persist one pin's definition.
    SaveDef {
        /// Pin to update.
        pin: PinId,
        /// New definition.
        def: OutputDef,
    },
    /// Reload one pin's definition from storage.
    ResetDef(PinId),
    /// Change the node number. The raw byte is kept so the node can judge
    /// it; [`NODE_JUMPERS`] reverts to the jumper setting.
    Renumber(u8),
    /// Repoint every lock referencing `old` to `new`.
    MoveLocks {
        /// Node number being replaced.
        old: NodeId,
        /// Replacement node number.
        new: NodeId,
    },
}

impl Command {
    /// Encode into `buf`, returning the frame length.
    pub fn encode(&self, buf: &mut [u8; FRAME_MAX]) -> usize {
        match *self {
            Command::ReadStates => {
                buf[0] = OP_READ_STATES;
                1
            }
            Command::WriteState { pin, state, pace } => {
                buf[0] = OP_WRITE_STATE | pin.get();
                buf[1] = state as u8;
                buf[2] = pace.map_or(PACE_NONE, Pace::get);
                3
            }
            Command::ReadDef(pin) => {
                buf[0] = OP_READ_DEF | pin.get();
                1
            }
            Command::WriteDef { pin, def } | Command::SaveDef { pin, def } => {
                let op = if matches!(self, Command::SaveDef { .. }) {
                    OP_SAVE_DEF
                } else {
                    OP_WRITE_DEF
                };
                buf[0] = op | pin.get();
                buf[1..FRAME_MAX].copy_from_slice(&def.to_bytes());
                FRAME_MAX
            }
            Command::ResetDef(pin) => {
                buf[0] = OP_RESET_DEF | pin.get();
                1
            }
            Command::Renumber(node) => {
                buf[0] = OP_SYSTEM | SYS_RENUMBER;
                buf[1] = node;
                2
            }
            Command::MoveLocks { old, new } => {
                buf[0] = OP_SYSTEM | SYS_MOVE_LOCKS;
                buf[1] = old.get();
                buf[2] = new.get();
                3
            }
        }
    }

    /// Decode a received frame.
    ///
    /// Returns `None` for an unknown command or a truncated payload.
    /// Definitions are decoded leniently (out-of-range fields clamped).
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let (&head, payload) = frame.split_first()?;
        let pin = PinId::try_new(head & OPERAND_MASK);
        match head & OPCODE_MASK {
            OP_READ_STATES => Some(Command::ReadStates),
            OP_WRITE_STATE => {
                let state = *payload.first()?;
                let pace = match payload.get(1) {
                    Some(&PACE_NONE) | None => None,
                    Some(&p) => Some(Pace::new(p)),
                };
                Some(Command::WriteState {
                    pin: pin?,
                    state: state != 0,
                    pace,
                })
            }
            OP_READ_DEF => Some(Command::ReadDef(pin?)),
            op @ (OP_WRITE_DEF | OP_SAVE_DEF) => {
                let bytes: &[u8; OUTPUT_DEF_LEN] = payload.get(..OUTPUT_DEF_LEN)?.try_into().ok()?;
                let def = OutputDef::from_bytes(bytes);
                let pin = pin?;
                Some(if op == OP_SAVE_DEF {
                    Command::SaveDef { pin, def }
                } else {
                    Command::WriteDef { pin, def }
                })
            }
            OP_RESET_DEF => Some(Command::ResetDef(pin?)),
            OP_SYSTEM => match head & OPERAND_MASK {
                SYS_RENUMBER => Some(Command::Renumber(*payload.first()?)),
                SYS_MOVE_LOCKS => Some(Command::MoveLocks {
                    old: NodeId::new(*payload.first()?),
                    new: NodeId::new(*payload.get(1)?),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Master-side protocol driver.
///
/// Owns the bus and turns typed requests into frames. Presence tracking is
/// not its concern; see [`crate::registry::Registry`].
pub struct BusDriver<B: Bus> {
    bus: B,
    output_base: u8,
    input_base: u8,
}

impl<B: Bus> BusDriver<B> {
    /// Wrap a bus using the base addresses from `config`.
    pub fn new(bus: B, config: &BusConfig) -> Self {
        Self {
            bus,
            output_base: config.output_base,
            input_base: config.input_base,
        }
    }

    /// The underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the underlying bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Bus address of an output node.
    pub fn output_address(&self, node: NodeId) -> u8 {
        self.output_base.wrapping_add(node.get())
    }

    /// Bus address of an input node.
    pub fn input_address(&self, node: InputNodeId) -> u8 {
        self.input_base.wrapping_add(node.get())
    }

    fn send(&mut self, address: u8, command: Command) -> core::result::Result<(), BusError> {
        let mut frame = [0u8; FRAME_MAX];
        let len = command.encode(&mut frame);
        tracing::trace!(target: "signalbox::bus", address, ?command, "send");
        self.bus.write(address, &frame[..len]).map_err(|e| {
            tracing::debug!(target: "signalbox::bus", address, error = ?e, "no acknowledge");
            BusError::NoAck { address }
        })
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> core::result::Result<(), BusError> {
        let expected = buf.len();
        let got = self.bus.read(address, buf).map_err(|e| {
            tracing::debug!(target: "signalbox::bus", address, error = ?e, "read failed");
            BusError::NoAck { address }
        })?;
        if got < expected {
            tracing::debug!(target: "signalbox::bus", address, expected, got, "short response");
            return Err(BusError::Short {
                address,
                expected,
                got,
            });
        }
        Ok(())
    }

    /// Zero-length write: does anything answer at `address`?
    pub fn probe(&mut self, address: u8) -> core::result::Result<(), BusError> {
        self.bus
            .write(address, &[])
            .map_err(|_| BusError::NoAck { address })
    }

    /// Probe an input node.
    pub fn probe_input(&mut self, node: InputNodeId) -> core::result::Result<(), BusError> {
        let address = self.input_address(node);
        self.probe(address)
    }

    /// Commanded states of all pins on `node`, bit per pin.
    pub fn read_states(&mut self, node: NodeId) -> core::result::Result<u8, BusError> {
        let address = self.output_address(node);
        self.send(address, Command::ReadStates)?;
        let mut buf = [0u8; STATES_LEN];
        self.receive(address, &mut buf)?;
        Ok(buf[0])
    }

    /// Command one output Hi or Lo, optionally overriding its pace.
    pub fn write_state(
        &mut self,
        output: OutputRef,
        state: bool,
        pace: Option<Pace>,
    ) -> core::result::Result<(), BusError> {
        let address = self.output_address(output.node);
        self.send(
            address,
            Command::WriteState {
                pin: output.pin,
                state,
                pace,
            },
        )
    }

    /// Read one output's definition.
    ///
    /// Out-of-range fields in the response are clamped.
    pub fn read_def(&mut self, output: OutputRef) -> Result<OutputDef> {
        let address = self.output_address(output.node);
        self.send(address, Command::ReadDef(output.pin))?;
        let mut buf = [0u8; OUTPUT_DEF_LEN];
        self.receive(address, &mut buf)?;
        Ok(OutputDef::from_bytes(&buf))
    }

    /// Replace one output's definition on its node, without persisting.
    pub fn write_def(
        &mut self,
        output: OutputRef,
        def: &OutputDef,
    ) -> core::result::Result<(), BusError> {
        let address = self.output_address(output.node);
        self.send(
            address,
            Command::WriteDef {
                pin: output.pin,
                def: *def,
            },
        )
    }

    /// Replace and persist one output's definition on its node.
    pub fn save_def(
        &mut self,
        output: OutputRef,
        def: &OutputDef,
    ) -> core::result::Result<(), BusError> {
        let address = self.output_address(output.node);
        self.send(
            address,
            Command::SaveDef {
                pin: output.pin,
                def: *def,
            },
        )
    }

    /// Make the node reload one output's definition from its storage.
    pub fn reset_def(&mut self, output: OutputRef) -> core::result::Result<(), BusError> {
        let address = self.output_address(output.node);
        self.send(address, Command::ResetDef(output.pin))
    }

    /// Ask `node` to take a new number (`None` = revert to jumpers).
    ///
    /// Returns the node number the node reports it will use. The reply is
    /// read from the old address.
    pub fn renumber(
        &mut self,
        node: NodeId,
        new: Option<NodeId>,
    ) -> core::result::Result<u8, BusError> {
        let address = self.output_address(node);
        let requested = new.map_or(NODE_JUMPERS, NodeId::get);
        self.send(address, Command::Renumber(requested))?;
        let mut buf = [0u8; RENUMBER_REPLY_LEN];
        self.receive(address, &mut buf)?;
        Ok(buf[0])
    }

    /// Tell `node` to repoint its lock references from `old` to `new`.
    pub fn move_locks(
        &mut self,
        node: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> core::result::Result<(), BusError> {
        let address = self.output_address(node);
        self.send(address, Command::MoveLocks { old, new })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputType;

    fn round_trip(command: Command) -> Option<Command> {
        let mut buf = [0u8; FRAME_MAX];
        let len = command.encode(&mut buf);
        Command::decode(&buf[..len])
    }

    // =========================================================================
    // Frame Encoding Tests
    // =========================================================================

    #[test]
    fn write_state_frame() {
        let mut buf = [0u8; FRAME_MAX];
        let cmd = Command::WriteState {
            pin: PinId::new(5),
            state: true,
            pace: None,
        };
        let len = cmd.encode(&mut buf);
        assert_eq!(&buf[..len], &[0x25, 0x01, 0xff]);

        let cmd = Command::WriteState {
            pin: PinId::new(0),
            state: false,
            pace: Some(Pace::new(3)),
        };
        let len = cmd.encode(&mut buf);
        assert_eq!(&buf[..len], &[0x20, 0x00, 0x03]);
    }

    #[test]
    fn system_frames() {
        let mut buf = [0u8; FRAME_MAX];
        let len = Command::Renumber(7).encode(&mut buf);
        assert_eq!(&buf[..len], &[0x71, 0x07]);

        let len = Command::MoveLocks {
            old: NodeId::new(3),
            new: NodeId::new(7),
        }
        .encode(&mut buf);
        assert_eq!(&buf[..len], &[0x72, 0x03, 0x07]);
    }

    #[test]
    fn def_frames_carry_record() {
        let def = OutputDef::new(OutputType::Servo).with_lo(10).with_hi(20);
        let mut buf = [0u8; FRAME_MAX];
        let len = Command::SaveDef {
            pin: PinId::new(2),
            def,
        }
        .encode(&mut buf);
        assert_eq!(len, 16);
        assert_eq!(buf[0], 0x52);
        assert_eq!(&buf[1..], &def.to_bytes());
    }

    // =========================================================================
    // Frame Decoding Tests
    // =========================================================================

    #[test]
    fn decode_matches_encode() {
        let def = OutputDef::new(OutputType::Blink).with_state(true);
        for cmd in [
            Command::ReadStates,
            Command::ReadDef(PinId::new(7)),
            Command::ResetDef(PinId::new(1)),
            Command::WriteDef {
                pin: PinId::new(4),
                def,
            },
            Command::Renumber(NODE_JUMPERS),
        ] {
            assert_eq!(round_trip(cmd), Some(cmd));
        }
    }

    #[test]
    fn decode_rejects_bad_frames() {
        assert_eq!(Command::decode(&[]), None);
        assert_eq!(Command::decode(&[0x90]), None);
        assert_eq!(Command::decode(&[0x73, 0x00]), None);
        // Pin nibble above 7.
        assert_eq!(Command::decode(&[0x38]), None);
        // Truncated payloads.
        assert_eq!(Command::decode(&[0x21]), None);
        assert_eq!(Command::decode(&[0x41, 0x00, 0x00]), None);
        assert_eq!(Command::decode(&[0x72, 0x01]), None);
    }

    #[test]
    fn decode_write_state_without_pace() {
        assert_eq!(
            Command::decode(&[0x23, 0x01]),
            Some(Command::WriteState {
                pin: PinId::new(3),
                state: true,
                pace: None,
            })
        );
    }
}
