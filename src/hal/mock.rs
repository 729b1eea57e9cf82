//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for every collaborator trait, so a
//! complete installation (controller, bus, output nodes, input nodes) can
//! run on the desktop.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBus`] | [`Bus`] | Routes frames to simulated output nodes; input nodes ack probes |
//! | [`MockStore`] | [`DefinitionStore`] | Erased-EEPROM byte array with failure injection |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockDelay`] | [`Delay`] | Records requested delays without sleeping |
//! | [`MockEvents`] | [`EventSource`] | Queued input transitions |
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::{NodeId, OutputRef, PinId};
//! use rs_signalbox::config::Config;
//! use rs_signalbox::controller::Controller;
//! use rs_signalbox::hal::{MockBus, MockStore};
//!
//! let config = Config::default();
//! let mut bus = MockBus::new();
//! bus.add_output(NodeId::new(2), &config.timing).unwrap();
//!
//! let mut controller = Controller::new(bus, MockStore::new(), config);
//! controller.scan();
//!
//! let points = OutputRef::new(NodeId::new(2), PinId::new(5));
//! assert!(controller.request_state(points, true).unwrap().is_applied());
//! assert!(controller.bus().output_node(NodeId::new(2)).unwrap().def(PinId::new(5)).state());
//! ```
//!
//! [`Bus`]: crate::traits::Bus
//! [`DefinitionStore`]: crate::traits::DefinitionStore
//! [`Clock`]: crate::traits::Clock
//! [`Delay`]: crate::traits::Delay
//! [`EventSource`]: crate::traits::EventSource

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use crate::address::NodeId;
use crate::config::TimingConfig;
use crate::error::Result;
use crate::input::InputEvent;
use crate::node::OutputNode;
use crate::traits::{Bus, BusDevice, Clock, DefinitionStore, Delay, EventSource};

// ============================================================================
// Bus Mock
// ============================================================================

/// Simulated bus.
///
/// Output nodes are real [`OutputNode`]s backed by [`MockStore`]s, so a
/// frame written here runs the node's own command handling. Input nodes are
/// plain addresses that acknowledge probes.
///
/// Failures are injected per address with [`MockBus::nack`] and
/// [`MockBus::truncate`].
#[derive(Default)]
pub struct MockBus {
    nodes: Vec<OutputNode<MockStore>>,
    inputs: Vec<u8>,
    nacks: Vec<u8>,
    truncated: Vec<(u8, usize)>,
    /// Every frame written, with its address, in order.
    pub writes: Vec<(u8, Vec<u8>)>,
}

impl MockBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Boot an output node with erased storage and the given jumper
    /// setting, and attach it.
    pub fn add_output(&mut self, jumpers: NodeId, timing: &TimingConfig) -> Result<()> {
        let node = OutputNode::boot(MockStore::new(), jumpers, timing)?;
        self.attach(node);
        Ok(())
    }

    /// Attach an already booted output node.
    pub fn attach(&mut self, node: OutputNode<MockStore>) {
        self.nodes.push(node);
    }

    /// Attach an input node (I/O expander) answering at `address`.
    pub fn add_input_node(&mut self, address: u8) {
        if !self.inputs.contains(&address) {
            self.inputs.push(address);
        }
    }

    /// Make `address` stop acknowledging.
    pub fn nack(&mut self, address: u8) {
        if !self.nacks.contains(&address) {
            self.nacks.push(address);
        }
    }

    /// Make reads from `address` return at most `len` bytes.
    pub fn truncate(&mut self, address: u8, len: usize) {
        self.truncated.retain(|(a, _)| *a != address);
        self.truncated.push((address, len));
    }

    /// Remove all injected failures.
    pub fn heal(&mut self) {
        self.nacks.clear();
        self.truncated.clear();
    }

    /// The output node currently numbered `node`.
    pub fn output_node(&self, node: NodeId) -> Option<&OutputNode<MockStore>> {
        self.nodes.iter().find(|n| n.node() == node)
    }

    /// The output node currently numbered `node`, mutably.
    pub fn output_node_mut(&mut self, node: NodeId) -> Option<&mut OutputNode<MockStore>> {
        self.nodes.iter_mut().find(|n| n.node() == node)
    }

    /// Advance every output node to `now_ms`.
    pub fn update(&mut self, now_ms: u64) {
        for node in &mut self.nodes {
            node.update(now_ms);
        }
    }

    /// Number of frames written to `address`.
    pub fn frames_to(&self, address: u8) -> usize {
        self.writes.iter().filter(|(a, _)| *a == address).count()
    }

    fn device(&mut self, address: u8) -> Option<&mut OutputNode<MockStore>> {
        self.nodes.iter_mut().find(|n| n.bus_address() == address)
    }
}

impl Bus for MockBus {
    type Error = ();

    fn write(&mut self, address: u8, data: &[u8]) -> core::result::Result<(), ()> {
        if self.nacks.contains(&address) {
            return Err(());
        }
        let is_input = self.inputs.contains(&address);
        match self.device(address) {
            Some(node) => {
                if !data.is_empty() {
                    node.on_receive(data);
                }
            }
            None if is_input => {}
            None => return Err(()),
        }
        if !data.is_empty() {
            self.writes.push((address, data.to_vec()));
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> core::result::Result<usize, ()> {
        if self.nacks.contains(&address) {
            return Err(());
        }
        let limit = self
            .truncated
            .iter()
            .find(|(a, _)| *a == address)
            .map_or(buf.len(), |(_, len)| (*len).min(buf.len()));
        match self.device(address) {
            Some(node) => Ok(node.on_request(&mut buf[..limit])),
            None => Err(()),
        }
    }
}

// ============================================================================
// Storage Mock
// ============================================================================

/// Default capacity: enough for every input record of a 32-node controller.
pub const MOCK_STORE_SIZE: usize = 4096;

/// Byte-array storage, initially erased (all `0xff`).
#[derive(Clone, Debug)]
pub struct MockStore {
    data: Vec<u8>,
    /// Fail every `get`.
    pub fail_gets: bool,
    /// Fail every `put`.
    pub fail_puts: bool,
    /// Number of successful `put` calls.
    pub puts: usize,
}

impl MockStore {
    /// Erased storage of [`MOCK_STORE_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_size(MOCK_STORE_SIZE)
    }

    /// Erased storage of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0xff; size],
            fail_gets: false,
            fail_puts: false,
            puts: 0,
        }
    }

    /// Raw contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionStore for MockStore {
    type Error = ();

    fn get(&mut self, offset: usize, buf: &mut [u8]) -> core::result::Result<(), ()> {
        if self.fail_gets {
            return Err(());
        }
        let src = self.data.get(offset..offset + buf.len()).ok_or(())?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn put(&mut self, offset: usize, data: &[u8]) -> core::result::Result<(), ()> {
        if self.fail_puts {
            return Err(());
        }
        let dst = self.data.get_mut(offset..offset + data.len()).ok_or(())?;
        dst.copy_from_slice(data);
        self.puts += 1;
        Ok(())
    }
}

// ============================================================================
// Time Mocks
// ============================================================================

/// Mock clock for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use rs_signalbox::hal::MockClock;
/// use rs_signalbox::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

/// Delay that records what was asked of it and returns at once.
#[derive(Debug, Default)]
pub struct MockDelay {
    /// Every requested delay, in order.
    pub calls: Vec<u32>,
}

impl MockDelay {
    /// Creates a new mock delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all requested delays.
    pub fn total_ms(&self) -> u64 {
        self.calls.iter().map(|&ms| ms as u64).sum()
    }
}

impl Delay for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(ms);
    }
}

// ============================================================================
// Input Mock
// ============================================================================

/// Queued input transitions.
#[derive(Debug, Default)]
pub struct MockEvents {
    queue: VecDeque<InputEvent>,
    /// Timeouts passed to each `next_event` call.
    pub polls: Vec<u32>,
}

impl MockEvents {
    /// An empty event source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transition.
    pub fn push(&mut self, event: InputEvent) {
        self.queue.push_back(event);
    }

    /// Transitions still queued.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl EventSource for MockEvents {
    fn next_event(&mut self, timeout_ms: u32) -> Option<InputEvent> {
        self.polls.push(timeout_ms);
        self.queue.pop_front()
    }
}

// ============================================================================
// Tests
// ============================================================================
