//! Which nodes are on the bus, and the last known output states.
//!
//! The registry is an owned value. The controller holds it and passes it
//! by `&mut` to the operations that scan or renumber; nothing else mutates
//! it.
//!
//! Each output node has a cached state byte (bit per pin) and a freshness
//! flag. A byte is fresh after a successful Read States or after the
//! controller itself commanded a pin on that node, and stale after a
//! failed read.

use crate::address::{InputNodeId, NodeId, OutputRef, INPUT_NODE_MAX, OUTPUT_NODE_MAX};
use crate::protocol::BusDriver;
use crate::traits::Bus;

/// Presence bitmaps and the output state cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    outputs: u32,
    inputs: u32,
    input_limit: u8,
    states: [u8; OUTPUT_NODE_MAX as usize],
    fresh: u32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(INPUT_NODE_MAX)
    }
}

impl Registry {
    /// An empty registry for a generation supporting `input_limit` input
    /// nodes.
    pub fn new(input_limit: u8) -> Self {
        Self {
            outputs: 0,
            inputs: 0,
            input_limit: input_limit.min(INPUT_NODE_MAX),
            states: [0; OUTPUT_NODE_MAX as usize],
            fresh: 0,
        }
    }

    /// Number of input nodes this generation supports.
    pub fn input_limit(&self) -> u8 {
        self.input_limit
    }

    // ========================================================================
    // Presence
    // ========================================================================

    /// Output presence bitmap, bit per node.
    pub fn outputs(&self) -> u32 {
        self.outputs
    }

    /// Input presence bitmap, bit per node.
    pub fn inputs(&self) -> u32 {
        self.inputs
    }

    /// Whether output node `node` answered the last scan.
    pub fn is_output_present(&self, node: NodeId) -> bool {
        self.outputs & node.bit() != 0
    }

    /// Mark an output node present or absent.
    pub fn set_output_present(&mut self, node: NodeId, present: bool) {
        if present {
            self.outputs |= node.bit();
        } else {
            self.outputs &= !node.bit();
            self.fresh &= !node.bit();
        }
    }

    /// Whether input node `node` answered the last scan.
    pub fn is_input_present(&self, node: InputNodeId) -> bool {
        node.get() < self.input_limit && self.inputs & node.bit() != 0
    }

    /// Mark an input node present or absent. Nodes past the generation's
    /// limit are never recorded.
    pub fn set_input_present(&mut self, node: InputNodeId, present: bool) {
        if node.get() >= self.input_limit {
            return;
        }
        if present {
            self.inputs |= node.bit();
        } else {
            self.inputs &= !node.bit();
        }
    }

    /// Present output nodes in address order.
    pub fn output_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        NodeId::all().filter(|n| self.is_output_present(*n))
    }

    /// Next node after `start`, moving `step` at a time around the ring,
    /// whose presence equals `present`. `start` itself is considered last.
    pub fn next_node(&self, start: NodeId, step: i8, present: bool) -> Option<NodeId> {
        let step = if step == 0 { 1 } else { step as i32 };
        let mut node = start.get() as i32;
        for _ in 0..OUTPUT_NODE_MAX {
            node = (node + step).rem_euclid(OUTPUT_NODE_MAX as i32);
            let id = NodeId::new(node as u8);
            if self.is_output_present(id) == present {
                return Some(id);
            }
        }
        None
    }

    // ========================================================================
    // State cache
    // ========================================================================

    /// Cached state byte of `node`, if fresh.
    pub fn cached_states(&self, node: NodeId) -> Option<u8> {
        (self.fresh & node.bit() != 0).then(|| self.states[node.get() as usize])
    }

    /// Cached state of one output, if its node's byte is fresh.
    pub fn cached_state(&self, output: OutputRef) -> Option<bool> {
        self.cached_states(output.node)
            .map(|states| states & output.pin.bit() != 0)
    }

    /// Store a freshly read state byte.
    pub fn set_cached_states(&mut self, node: NodeId, states: u8) {
        self.states[node.get() as usize] = states;
        self.fresh |= node.bit();
    }

    /// Record a state the controller just commanded. A stale byte stays
    /// stale, since the other pins are still unknown.
    pub fn update_cached_state(&mut self, output: OutputRef, state: bool) {
        let byte = &mut self.states[output.node.get() as usize];
        if state {
            *byte |= output.pin.bit();
        } else {
            *byte &= !output.pin.bit();
        }
    }

    /// Mark a node's cache byte stale.
    pub fn mark_stale(&mut self, node: NodeId) {
        self.fresh &= !node.bit();
    }

    /// Move presence and cache from `old` to `new` after a renumber.
    ///
    /// The two cached state bytes swap places; whatever lands on `old` is
    /// stale.
    pub fn move_node(&mut self, old: NodeId, new: NodeId) {
        let fresh = self.fresh & old.bit() != 0;
        self.states.swap(old.get() as usize, new.get() as usize);
        self.mark_stale(old);
        self.set_output_present(old, false);
        self.set_output_present(new, true);
        if fresh {
            self.fresh |= new.bit();
        } else {
            self.fresh &= !new.bit();
        }
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Send Read States to every output address and record who answers.
    ///
    /// Returns the new output presence bitmap.
    pub fn scan_outputs<B: Bus>(&mut self, driver: &mut BusDriver<B>) -> u32 {
        for node in NodeId::all() {
            match driver.read_states(node) {
                Ok(states) => {
                    self.set_output_present(node, true);
                    self.set_cached_states(node, states);
                }
                Err(_) => {
                    self.set_output_present(node, false);
                }
            }
        }
        tracing::info!(
            target: "signalbox::bus",
            outputs = format_args!("{:#010x}", self.outputs),
            "output scan complete"
        );
        self.outputs
    }

    /// Probe every input address the generation supports.
    ///
    /// Returns the new input presence bitmap.
    pub fn scan_inputs<B: Bus>(&mut self, driver: &mut BusDriver<B>) -> u32 {
        for node in (0..self.input_limit).map(InputNodeId::new) {
            let present = driver.probe_input(node).is_ok();
            self.set_input_present(node, present);
        }
        tracing::info!(
            target: "signalbox::bus",
            inputs = format_args!("{:#010x}", self.inputs),
            "input scan complete"
        );
        self.inputs
    }
}
