//! Remote output node: eight output pins behind one bus address.
//!
//! The node is the slave side of [`crate::protocol`]. It keeps every pin's
//! definition in memory, drives one [`OutputMachine`] per pin, and persists
//! definitions and its node number through a [`DefinitionStore`].
//!
//! # Addressing
//!
//! The node number comes from storage offset
//! [`NODE_NUMBER_OFFSET`]. The value [`NODE_NUMBER_UNSET`] means "use the
//! jumpers". A renumber reply is always read from the old address; the new
//! address takes effect once that reply has been collected.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::NodeId;
//! use rs_signalbox::config::TimingConfig;
//! use rs_signalbox::hal::MockStore;
//! use rs_signalbox::node::OutputNode;
//! use rs_signalbox::traits::BusDevice;
//!
//! let node = OutputNode::boot(MockStore::new(), NodeId::new(2), &TimingConfig::default()).unwrap();
//! assert_eq!(node.node(), NodeId::new(2));
//! assert_eq!(node.bus_address(), 0x52);
//! ```

use crate::address::{NodeId, OutputRef, PinId, OUTPUT_NODE_MAX, OUTPUT_PIN_MAX};
use crate::codec::{output_record_offset, NODE_NUMBER_OFFSET, NODE_NUMBER_UNSET, OUTPUT_DEF_LEN};
use crate::config::{BusConfig, TimingConfig};
use crate::error::{Error, Result};
use crate::interlock::{evaluate, StateOutcome};
use crate::output::OutputDef;
use crate::protocol::{Command, NODE_JUMPERS};
use crate::traits::{BusDevice, DefinitionStore};
use crate::transition::{MachineEvent, OutputMachine};

const PINS: usize = OUTPUT_PIN_MAX as usize;

/// What the next read from this node returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reply {
    None,
    States,
    Def(PinId),
    Renumber(NodeId),
}

/// One output node.
pub struct OutputNode<S: DefinitionStore> {
    store: S,
    base: u8,
    jumpers: NodeId,
    node: NodeId,
    defs: [OutputDef; PINS],
    machines: [OutputMachine; PINS],
    reply: Reply,
    now_ms: u64,
}

impl<S: DefinitionStore> OutputNode<S> {
    /// Load the node number and all pin definitions from `store`.
    ///
    /// Records that fail strict decoding (including erased storage) start
    /// from the default definition.
    pub fn boot(mut store: S, jumpers: NodeId, timing: &TimingConfig) -> Result<Self> {
        let mut number = [0u8; 1];
        store
            .get(NODE_NUMBER_OFFSET, &mut number)
            .map_err(|_| Error::Storage {
                offset: NODE_NUMBER_OFFSET,
            })?;
        let node = match number[0] {
            NODE_NUMBER_UNSET => jumpers,
            n if n < OUTPUT_NODE_MAX => NodeId::new(n),
            n => {
                tracing::warn!(target: "signalbox::node", stored = n, "invalid node number, using jumpers");
                jumpers
            }
        };

        let mut defs = [OutputDef::default(); PINS];
        for pin in PinId::all() {
            defs[pin.index()] = load_def(&mut store, pin)?;
        }
        let machines = core::array::from_fn(|i| {
            OutputMachine::new(&defs[i], timing).with_seed(seed(node, i))
        });

        tracing::info!(target: "signalbox::node", %node, %jumpers, "node booted");
        Ok(Self {
            store,
            base: BusConfig::default().output_base,
            jumpers,
            node,
            defs,
            machines,
            reply: Reply::None,
            now_ms: 0,
        })
    }

    /// Answer on `base + node` instead of the default output base.
    pub fn with_bus_base(mut self, base: u8) -> Self {
        self.base = base;
        self
    }

    /// Node number in use.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Node number set by the jumpers.
    pub fn jumpers(&self) -> NodeId {
        self.jumpers
    }

    /// In-memory definition of one pin.
    pub fn def(&self, pin: PinId) -> &OutputDef {
        &self.defs[pin.index()]
    }

    /// State machine of one pin.
    pub fn machine(&self, pin: PinId) -> &OutputMachine {
        &self.machines[pin.index()]
    }

    /// Commanded states, bit per pin.
    pub fn states(&self) -> u8 {
        PinId::all()
            .filter(|p| self.defs[p.index()].state())
            .fold(0, |acc, p| acc | p.bit())
    }

    /// The storage collaborator.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The storage collaborator, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance every pin's machine to `now_ms`.
    ///
    /// An expiring auto-reset is gated on the pin's Lo locks. Locks on this
    /// node's own pins are checked against their commanded states; a lock
    /// on any other node cannot be verified here and blocks the reset.
    pub fn update(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        let node = self.node;
        let defs = &self.defs;
        let mut events = [MachineEvent::None; PINS];
        for (pin, machine) in self.machines.iter_mut().enumerate() {
            events[pin] = machine.update(now_ms, || {
                let mut view = |r: OutputRef| (r.node == node).then(|| defs[r.pin.index()].state());
                let output = OutputRef::new(node, PinId::new(pin as u8));
                matches!(evaluate(output, &defs[pin], false, &mut view), StateOutcome::Applied)
            });
        }

        for (pin, event) in events.into_iter().enumerate() {
            match event {
                MachineEvent::AutoReset => {
                    self.defs[pin].set_state(false);
                    tracing::info!(target: "signalbox::node", node = %self.node, pin, "auto reset");
                }
                MachineEvent::ResetBlocked => {
                    tracing::info!(target: "signalbox::node", node = %self.node, pin, "auto reset blocked");
                }
                MachineEvent::Arrived => {
                    tracing::trace!(target: "signalbox::node", node = %self.node, pin, "arrived");
                }
                MachineEvent::None => {}
            }
        }
    }

    // ========================================================================
    // Command handling
    // ========================================================================

    fn handle(&mut self, command: Command) {
        match command {
            Command::ReadStates => self.reply = Reply::States,
            Command::WriteState { pin, state, pace } => {
                self.defs[pin.index()].set_state(state);
                self.machines[pin.index()].command(state, pace, self.now_ms);
            }
            Command::ReadDef(pin) => self.reply = Reply::Def(pin),
            Command::WriteDef { pin, def } => self.apply(pin, def),
            Command::SaveDef { pin, def } => {
                self.apply(pin, def);
                if let Err(e) = self.persist(pin) {
                    tracing::error!(target: "signalbox::node", %e, "save failed");
                }
            }
            Command::ResetDef(pin) => match load_def(&mut self.store, pin) {
                Ok(def) => self.apply(pin, def),
                Err(e) => tracing::error!(target: "signalbox::node", %e, "reset failed"),
            },
            Command::Renumber(requested) => {
                let new = self.renumber(requested);
                self.reply = Reply::Renumber(new);
            }
            Command::MoveLocks { old, new } => self.move_locks(old, new),
        }
    }

    fn apply(&mut self, pin: PinId, def: OutputDef) {
        self.defs[pin.index()] = def;
        self.machines[pin.index()].apply_def(&def, self.now_ms);
    }

    fn persist(&mut self, pin: PinId) -> Result<()> {
        let offset = output_record_offset(pin);
        self.store
            .put(offset, &self.defs[pin.index()].to_bytes())
            .map_err(|_| Error::Storage { offset })
    }

    /// Decide the node number to use after a renumber request. Anything
    /// that cannot be honoured keeps the current number.
    fn renumber(&mut self, requested: u8) -> NodeId {
        let new = match requested {
            NODE_JUMPERS => self.jumpers,
            n if n < OUTPUT_NODE_MAX => NodeId::new(n),
            n => {
                tracing::warn!(target: "signalbox::node", requested = n, "renumber refused: out of range");
                return self.node;
            }
        };
        if let Err(e) = self.store.put(NODE_NUMBER_OFFSET, &[requested]) {
            tracing::error!(target: "signalbox::node", error = ?e, "renumber refused: storage failure");
            return self.node;
        }
        tracing::info!(target: "signalbox::node", old = %self.node, %new, "renumbered");
        new
    }

    fn move_locks(&mut self, old: NodeId, new: NodeId) {
        for pin in PinId::all() {
            if self.defs[pin.index()].move_locks(old, new) {
                if let Err(e) = self.persist(pin) {
                    tracing::error!(target: "signalbox::node", %e, pin = pin.get(), "move locks: save failed");
                }
            }
        }
    }
}

impl<S: DefinitionStore> BusDevice for OutputNode<S> {
    fn bus_address(&self) -> u8 {
        self.base.wrapping_add(self.node.get())
    }

    fn on_receive(&mut self, data: &[u8]) {
        match Command::decode(data) {
            Some(command) => {
                tracing::trace!(target: "signalbox::node", node = %self.node, ?command, "receive");
                self.handle(command);
            }
            None => {
                tracing::warn!(target: "signalbox::node", node = %self.node, len = data.len(), "unknown command");
            }
        }
    }

    fn on_request(&mut self, buf: &mut [u8]) -> usize {
        let reply = core::mem::replace(&mut self.reply, Reply::None);
        match reply {
            Reply::None => 0,
            Reply::States => fill(buf, &[self.states()]),
            Reply::Def(pin) => fill(buf, &self.defs[pin.index()].to_bytes()),
            Reply::Renumber(new) => {
                let n = fill(buf, &[new.get()]);
                self.node = new;
                n
            }
        }
    }
}

fn fill(buf: &mut [u8], bytes: &[u8]) -> usize {
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    n
}

fn load_def<S: DefinitionStore>(store: &mut S, pin: PinId) -> Result<OutputDef> {
    let offset = output_record_offset(pin);
    let mut bytes = [0u8; OUTPUT_DEF_LEN];
    store
        .get(offset, &mut bytes)
        .map_err(|_| Error::Storage { offset })?;
    Ok(OutputDef::try_from_bytes(&bytes).unwrap_or_else(|e| {
        tracing::warn!(target: "signalbox::node", pin = pin.get(), %e, "stored definition invalid, using default");
        OutputDef::default()
    }))
}

fn seed(node: NodeId, pin: usize) -> u32 {
    0x9e37_79b9u32
        .wrapping_mul(node.get() as u32 * 8 + pin as u32 + 1)
        .rotate_left(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Pace, ResetInterval};
    use crate::hal::MockStore;
    use crate::output::{LockKind, LockSlot, OutputType};

    fn timing() -> TimingConfig {
        TimingConfig::default().with_reset_unit_ms(100)
    }

    fn boot(jumpers: u8) -> OutputNode<MockStore> {
        OutputNode::boot(MockStore::new(), NodeId::new(jumpers), &timing()).unwrap()
    }

    fn send(node: &mut OutputNode<MockStore>, command: Command) {
        let mut frame = [0u8; crate::protocol::FRAME_MAX];
        let len = command.encode(&mut frame);
        node.on_receive(&frame[..len]);
    }

    fn out(node: u8, pin: u8) -> OutputRef {
        OutputRef::new(NodeId::new(node), PinId::new(pin))
    }

    // =========================================================================
    // Boot Tests
    // =========================================================================

    #[test]
    fn erased_store_boots_from_jumpers_with_defaults() {
        let node = boot(4);
        assert_eq!(node.node(), NodeId::new(4));
        assert_eq!(node.bus_address(), 0x54);
        assert_eq!(*node.def(PinId::new(0)), OutputDef::default());
        assert_eq!(node.states(), 0);
    }

    #[test]
    fn stored_number_overrides_jumpers() {
        let mut store = MockStore::new();
        store.put(NODE_NUMBER_OFFSET, &[9]).unwrap();
        let def = OutputDef::new(OutputType::Led).with_state(true);
        store.put(output_record_offset(PinId::new(3)), &def.to_bytes()).unwrap();

        let node = OutputNode::boot(store, NodeId::new(1), &timing()).unwrap();
        assert_eq!(node.node(), NodeId::new(9));
        assert_eq!(*node.def(PinId::new(3)), def);
        assert_eq!(node.states(), 0x08);
    }

    #[test]
    fn boot_fails_on_storage_error() {
        let mut store = MockStore::new();
        store.fail_gets = true;
        assert!(matches!(
            OutputNode::boot(store, NodeId::new(0), &timing()),
            Err(Error::Storage { offset: 0 })
        ));
    }

    // =========================================================================
    // Command Tests
    // =========================================================================

    #[test]
    fn read_states_reply() {
        let mut node = boot(2);
        send(
            &mut node,
            Command::WriteState {
                pin: PinId::new(5),
                state: true,
                pace: None,
            },
        );
        send(&mut node, Command::ReadStates);
        let mut buf = [0u8; 4];
        assert_eq!(node.on_request(&mut buf), 1);
        assert_eq!(buf[0], 0x20);

        // Reply is consumed.
        assert_eq!(node.on_request(&mut buf), 0);
    }

    #[test]
    fn write_def_is_not_persisted_until_saved() {
        let mut node = boot(2);
        let pin = PinId::new(1);
        let def = OutputDef::new(OutputType::Servo).with_hi(120);

        send(&mut node, Command::WriteDef { pin, def });
        assert_eq!(*node.def(pin), def);
        assert_eq!(node.store().puts, 0);

        send(&mut node, Command::ResetDef(pin));
        assert_eq!(*node.def(pin), OutputDef::default());

        send(&mut node, Command::SaveDef { pin, def });
        assert_eq!(node.store().puts, 1);
        send(&mut node, Command::ResetDef(pin));
        assert_eq!(*node.def(pin), def);
    }

    #[test]
    fn read_def_reply() {
        let mut node = boot(2);
        let pin = PinId::new(6);
        let def = OutputDef::new(OutputType::Signal).with_lo(10);
        send(&mut node, Command::WriteDef { pin, def });
        send(&mut node, Command::ReadDef(pin));
        let mut buf = [0u8; OUTPUT_DEF_LEN];
        assert_eq!(node.on_request(&mut buf), OUTPUT_DEF_LEN);
        assert_eq!(OutputDef::from_bytes(&buf), def);
    }

    #[test]
    fn unknown_command_ignored() {
        let mut node = boot(2);
        node.on_receive(&[0xe0, 0x01]);
        let mut buf = [0u8; 1];
        assert_eq!(node.on_request(&mut buf), 0);
    }

    // =========================================================================
    // Renumber Tests
    // =========================================================================

    #[test]
    fn renumber_applies_after_reply() {
        let mut node = boot(3);
        send(&mut node, Command::Renumber(7));
        assert_eq!(node.bus_address(), 0x53);

        let mut buf = [0u8; 1];
        assert_eq!(node.on_request(&mut buf), 1);
        assert_eq!(buf[0], 7);
        assert_eq!(node.node(), NodeId::new(7));
        assert_eq!(node.bus_address(), 0x57);

        let mut stored = [0u8; 1];
        node.store_mut().get(NODE_NUMBER_OFFSET, &mut stored).unwrap();
        assert_eq!(stored[0], 7);
    }

    #[test]
    fn renumber_to_jumpers() {
        let mut store = MockStore::new();
        store.put(NODE_NUMBER_OFFSET, &[12]).unwrap();
        let mut node = OutputNode::boot(store, NodeId::new(1), &timing()).unwrap();

        send(&mut node, Command::Renumber(NODE_JUMPERS));
        let mut buf = [0u8; 1];
        node.on_request(&mut buf);
        assert_eq!(buf[0], 1);
        assert_eq!(node.node(), NodeId::new(1));
    }

    #[test]
    fn renumber_refused_echoes_old() {
        let mut node = boot(3);
        send(&mut node, Command::Renumber(40));
        let mut buf = [0u8; 1];
        node.on_request(&mut buf);
        assert_eq!(buf[0], 3);

        node.store_mut().fail_puts = true;
        send(&mut node, Command::Renumber(7));
        node.on_request(&mut buf);
        assert_eq!(buf[0], 3);
        assert_eq!(node.node(), NodeId::new(3));
    }

    #[test]
    fn move_locks_persists_changed_defs() {
        let mut node = boot(1);
        let mut def = OutputDef::new(OutputType::Servo);
        def.set_lock(LockKind::Hi, 0, LockSlot::new(out(3, 2), true)).unwrap();
        send(
            &mut node,
            Command::SaveDef {
                pin: PinId::new(4),
                def,
            },
        );
        let puts = node.store().puts;

        send(
            &mut node,
            Command::MoveLocks {
                old: NodeId::new(3),
                new: NodeId::new(7),
            },
        );
        assert_eq!(node.store().puts, puts + 1);
        let slot = node.def(PinId::new(4)).lock(LockKind::Hi, 0).copied().unwrap();
        assert_eq!(slot.target, out(7, 2));
    }

    // =========================================================================
    // Auto-reset Tests
    // =========================================================================

    fn resetting(def: OutputDef) -> OutputDef {
        def.with_reset(ResetInterval::new(2)).with_pace(Pace::FASTEST)
    }

    #[test]
    fn auto_reset_clears_state() {
        let mut node = boot(2);
        let pin = PinId::new(0);
        send(
            &mut node,
            Command::WriteDef {
                pin,
                def: resetting(OutputDef::new(OutputType::Servo)),
            },
        );
        send(
            &mut node,
            Command::WriteState {
                pin,
                state: true,
                pace: None,
            },
        );
        node.update(199);
        assert!(node.def(pin).state());
        node.update(200);
        assert!(!node.def(pin).state());
        assert_eq!(node.states(), 0);
    }

    #[test]
    fn auto_reset_gated_by_own_pins() {
        let mut node = boot(2);
        let pin = PinId::new(0);
        let mut def = resetting(OutputDef::new(OutputType::Servo));
        def.set_lock(LockKind::Lo, 0, LockSlot::new(out(2, 1), true)).unwrap();
        send(&mut node, Command::WriteDef { pin, def });
        send(
            &mut node,
            Command::WriteState {
                pin,
                state: true,
                pace: None,
            },
        );

        // Pin 1 is Lo, so the reset is dropped.
        node.update(200);
        assert!(node.def(pin).state());
    }

    #[test]
    fn auto_reset_blocked_by_foreign_lock() {
        let mut node = boot(2);
        let pin = PinId::new(0);
        let mut def = resetting(OutputDef::new(OutputType::Servo));
        def.set_lock(LockKind::Lo, 0, LockSlot::new(out(5, 1), false)).unwrap();
        send(&mut node, Command::WriteDef { pin, def });
        send(
            &mut node,
            Command::WriteState {
                pin,
                state: true,
                pace: None,
            },
        );
        node.update(200);
        assert!(node.def(pin).state());
    }
}
