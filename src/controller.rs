//! The controller: the single entry point a panel or menu layer talks to.
//!
//! [`Controller`] owns the bus driver, the node registry and the store
//! holding input definitions, and coordinates them. Every operation checks
//! presence first, so a request aimed at an unscanned node fails fast with
//! [`Error::NodeAbsent`] instead of timing out on the bus.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::address::{NodeId, OutputRef, PinId};
//! use rs_signalbox::config::{Config, TimingConfig};
//! use rs_signalbox::controller::Controller;
//! use rs_signalbox::hal::{MockBus, MockStore};
//! use rs_signalbox::output::{LockKind, LockSlot};
//!
//! let mut bus = MockBus::new();
//! bus.add_output(NodeId::new(1), &TimingConfig::default()).unwrap();
//! bus.add_output(NodeId::new(2), &TimingConfig::default()).unwrap();
//!
//! let mut controller = Controller::new(bus, MockStore::new(), Config::default());
//! let found = controller.scan();
//! assert_eq!(found.output_count(), 2);
//!
//! // The signal at 1.0 may only clear while the points at 2.5 are Hi.
//! let signal = OutputRef::new(NodeId::new(1), PinId::new(0));
//! let points = OutputRef::new(NodeId::new(2), PinId::new(5));
//! controller
//!     .edit_lock(signal, LockKind::Hi, 0, LockSlot::new(points, true))
//!     .unwrap();
//!
//! assert!(!controller.request_state(signal, true).unwrap().is_applied());
//! assert!(controller.request_state(points, true).unwrap().is_applied());
//! assert!(controller.request_state(signal, true).unwrap().is_applied());
//! ```

use crate::address::{InputRef, NodeId, OutputRef, Pace};
use crate::codec::{load_input_def, store_input_def};
use crate::config::{Config, LockSource};
use crate::dispatch::{self, DispatchReport, OutputRequester};
use crate::error::{Error, Result};
use crate::input::{InputDef, InputEvent};
use crate::interlock::{evaluate, StateOutcome};
use crate::output::{LockKind, LockSlot, OutputDef};
use crate::protocol::BusDriver;
use crate::registry::Registry;
use crate::renumber::{self, RenumberReport};
use crate::traits::{Bus, DefinitionStore, Delay, EventSource};

/// Presence bitmaps found by [`Controller::scan`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanResult {
    /// Output nodes that answered, bit per node.
    pub outputs: u32,
    /// Input nodes that answered, bit per node.
    pub inputs: u32,
}

impl ScanResult {
    /// Number of output nodes found.
    pub fn output_count(&self) -> u32 {
        self.outputs.count_ones()
    }

    /// Number of input nodes found.
    pub fn input_count(&self) -> u32 {
        self.inputs.count_ones()
    }
}

/// Bus master coordinating outputs, inputs and their definitions.
///
/// # Type Parameters
///
/// - `B`: the bus ([`Bus`] trait)
/// - `S`: storage for input definitions ([`DefinitionStore`] trait)
pub struct Controller<B: Bus, S: DefinitionStore> {
    driver: BusDriver<B>,
    registry: Registry,
    store: S,
    config: Config,
}

impl<B: Bus, S: DefinitionStore> Controller<B, S> {
    /// Create a controller. Nothing is present until [`scan`](Self::scan)
    /// runs.
    pub fn new(bus: B, store: S, config: Config) -> Self {
        Self {
            driver: BusDriver::new(bus, &config.bus),
            registry: Registry::new(config.bus.input_nodes),
            store,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Presence and state cache.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The underlying bus.
    pub fn bus(&self) -> &B {
        self.driver.bus()
    }

    /// The underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        self.driver.bus_mut()
    }

    /// Input definition storage.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Input definition storage, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Release the bus and the store.
    pub fn into_parts(self) -> (B, S) {
        (self.driver.into_inner(), self.store)
    }

    fn require_output(&self, node: NodeId) -> Result<()> {
        if self.registry.is_output_present(node) {
            Ok(())
        } else {
            Err(Error::NodeAbsent(node))
        }
    }

    fn require_input(&self, input: InputRef) -> Result<()> {
        if self.registry.is_input_present(input.node) {
            Ok(())
        } else {
            Err(Error::InputNodeAbsent(input.node.get()))
        }
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Probe every output and input address and rebuild presence.
    pub fn scan(&mut self) -> ScanResult {
        let outputs = self.registry.scan_outputs(&mut self.driver);
        let inputs = self.registry.scan_inputs(&mut self.driver);
        ScanResult { outputs, inputs }
    }

    // ========================================================================
    // Output definitions
    // ========================================================================

    /// Read an output's working definition from its node.
    pub fn load_output(&mut self, output: OutputRef) -> Result<OutputDef> {
        self.require_output(output.node)?;
        self.driver.read_def(output)
    }

    /// Replace an output's working definition without persisting it.
    pub fn write_output(&mut self, output: OutputRef, def: &OutputDef) -> Result<()> {
        self.require_output(output.node)?;
        self.driver.write_def(output, def)?;
        self.registry.update_cached_state(output, def.state());
        Ok(())
    }

    /// Replace and persist an output's definition.
    pub fn save_output(&mut self, output: OutputRef, def: &OutputDef) -> Result<()> {
        self.require_output(output.node)?;
        self.driver.save_def(output, def)?;
        self.registry.update_cached_state(output, def.state());
        Ok(())
    }

    /// Discard unsaved edits: the node reloads the definition from its own
    /// storage.
    pub fn reset_output(&mut self, output: OutputRef) -> Result<()> {
        self.require_output(output.node)?;
        self.driver.reset_def(output)?;
        // The reloaded state is unknown until the next read.
        self.registry.mark_stale(output.node);
        Ok(())
    }

    /// Set one lock slot of an output and persist the definition.
    ///
    /// Pass a slot with `enabled: false` to switch it off while keeping
    /// its reference. Returns the saved definition.
    pub fn edit_lock(
        &mut self,
        output: OutputRef,
        kind: LockKind,
        index: usize,
        slot: LockSlot,
    ) -> Result<OutputDef> {
        let mut def = self.load_output(output)?;
        def.set_lock(kind, index, slot)?;
        self.driver.save_def(output, &def)?;
        tracing::info!(
            target: "signalbox::lock",
            %output,
            ?kind,
            index,
            prerequisite = %slot.target,
            required = slot.required,
            enabled = slot.enabled,
            "lock edited"
        );
        Ok(def)
    }

    // ========================================================================
    // Output states
    // ========================================================================

    /// Commanded state of `output`.
    ///
    /// With [`LockSource::Cached`] a fresh cache byte answers without a bus
    /// exchange. Otherwise, and on a miss, the node is read and the cache
    /// refreshed.
    pub fn output_state(&mut self, output: OutputRef) -> Result<bool> {
        self.require_output(output.node)?;
        if self.config.bus.lock_source == LockSource::Cached {
            if let Some(state) = self.registry.cached_state(output) {
                return Ok(state);
            }
        }
        let states = self.driver.read_states(output.node)?;
        self.registry.set_cached_states(output.node, states);
        Ok(states & output.pin.bit() != 0)
    }

    /// Ask for `output` to move to `state` at its own pace.
    ///
    /// A refusal by the interlock is reported as
    /// [`StateOutcome::Blocked`], not as an error.
    pub fn request_state(&mut self, output: OutputRef, state: bool) -> Result<StateOutcome> {
        self.request_state_paced(output, state, None)
    }

    /// Like [`request_state`](Self::request_state), overriding the pace
    /// for this movement.
    pub fn request_state_paced(
        &mut self,
        output: OutputRef,
        state: bool,
        pace: Option<Pace>,
    ) -> Result<StateOutcome> {
        let def = self.load_output(output)?;
        let outcome = {
            let mut view = |prerequisite: OutputRef| self.output_state(prerequisite).ok();
            evaluate(output, &def, state, &mut view)
        };
        if outcome.is_applied() {
            self.driver.write_state(output, state, pace)?;
            self.registry.update_cached_state(output, state);
            tracing::debug!(target: "signalbox::bus", %output, state, "state written");
        }
        Ok(outcome)
    }

    /// Drive an output to its opposite state, hold it there, then put it
    /// back. The interlock is bypassed; this is an operator wiring check.
    pub fn test_output<D>(&mut self, output: OutputRef, delay: &mut D) -> Result<()>
    where
        D: Delay + ?Sized,
    {
        let state = self.load_output(output)?.state();
        tracing::info!(target: "signalbox::bus", %output, "testing output");
        self.driver.write_state(output, !state, None)?;
        self.registry.update_cached_state(output, !state);
        delay.delay_ms(self.config.timing.test_hold_ms);
        self.driver.write_state(output, state, None)?;
        self.registry.update_cached_state(output, state);
        Ok(())
    }

    // ========================================================================
    // Renumbering
    // ========================================================================

    /// Renumber an output node (`None` = back to its jumpers) and repoint
    /// every input mapping and lock that refers to it.
    pub fn renumber(&mut self, old: NodeId, new: Option<NodeId>) -> Result<RenumberReport> {
        renumber::renumber(
            &mut self.driver,
            &mut self.registry,
            &mut self.store,
            old,
            new,
        )
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Stored definition of an input.
    pub fn load_input(&mut self, input: InputRef) -> Result<InputDef> {
        self.require_input(input)?;
        load_input_def(&mut self.store, input)
    }

    /// Persist an input's definition.
    pub fn save_input(&mut self, input: InputRef, def: &InputDef) -> Result<()> {
        self.require_input(input)?;
        store_input_def(&mut self.store, input, def)
    }

    /// Run the mapping sequence for one input transition.
    pub fn dispatch<D>(&mut self, event: InputEvent, delay: &mut D) -> Result<DispatchReport>
    where
        D: Delay + ?Sized,
    {
        let def = self.load_input(event.input)?;
        let unit = self.config.timing.delay_unit_ms;
        Ok(dispatch::dispatch(&def, event, self, delay, unit))
    }

    /// Wait up to the configured poll timeout for one input event and
    /// dispatch it. Returns `Ok(None)` if nothing happened.
    pub fn poll_input<E, D>(
        &mut self,
        events: &mut E,
        delay: &mut D,
    ) -> Result<Option<DispatchReport>>
    where
        E: EventSource + ?Sized,
        D: Delay + ?Sized,
    {
        match events.next_event(self.config.timing.poll_timeout_ms) {
            Some(event) => self.dispatch(event, delay).map(Some),
            None => Ok(None),
        }
    }
}

impl<B: Bus, S: DefinitionStore> OutputRequester for Controller<B, S> {
    fn output_state(&mut self, output: OutputRef) -> Result<bool> {
        Controller::output_state(self, output)
    }

    fn request_state(&mut self, output: OutputRef, state: bool) -> Result<StateOutcome> {
        Controller::request_state(self, output, state)
    }
}
