//! Changing an output node's number and repointing everything that refers
//! to it.
//!
//! A renumber runs four steps:
//!
//! 1. Send Renumber to the node at its old address. The number it replies
//!    with is authoritative.
//! 2. Move the node's presence bit and cached state byte in the registry.
//! 3. Rewrite every stored input mapping aimed at the old node and persist
//!    the changed input definitions. Every input node the installation
//!    supports is walked, present or not.
//! 4. Broadcast Move-Locks to every present output node.
//!
//! A bus failure in step 1 aborts with nothing changed. A node that echoes
//! its old number has refused, and steps 2-4 are skipped. Failures in
//! steps 3 and 4 do not stop the pass. They are collected in the
//! [`RenumberReport`] and nothing is rolled back.

use heapless::Vec;

use crate::address::{InputNodeId, InputPin, InputRef, NodeId};
use crate::codec::{load_input_def, store_input_def};
use crate::error::{BusError, Error, Result};
use crate::protocol::BusDriver;
use crate::registry::Registry;
use crate::traits::{Bus, DefinitionStore};

/// Failures kept per report; later ones are only counted.
pub const FAILURES_MAX: usize = 16;

/// A step 3 or step 4 action that did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenumberFailure {
    /// An input definition could not be read or persisted.
    Input {
        /// The input whose record failed.
        input: InputRef,
        /// Storage error.
        error: Error,
    },
    /// An output node did not take the Move-Locks broadcast.
    MoveLocks {
        /// Node that failed.
        node: NodeId,
        /// Bus error.
        error: BusError,
    },
}

/// Outcome of a renumber pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenumberReport {
    /// Number the node had.
    pub old: NodeId,
    /// Number the node answers to now.
    pub new: NodeId,
    /// Input definitions rewritten and persisted.
    pub inputs_updated: u16,
    /// Output nodes that took the Move-Locks broadcast.
    pub nodes_notified: u8,
    /// Actions that failed, in order.
    pub failures: Vec<RenumberFailure, FAILURES_MAX>,
    /// Failures beyond [`FAILURES_MAX`].
    pub failures_dropped: u16,
}

impl RenumberReport {
    fn new(old: NodeId, new: NodeId) -> Self {
        Self {
            old,
            new,
            inputs_updated: 0,
            nodes_notified: 0,
            failures: Vec::new(),
            failures_dropped: 0,
        }
    }

    /// Whether the node's number actually changed.
    pub fn changed(&self) -> bool {
        self.old != self.new
    }

    /// Whether every propagation step completed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.failures_dropped == 0
    }

    fn fail(&mut self, failure: RenumberFailure) {
        tracing::warn!(target: "signalbox::renumber", ?failure, "propagation step failed");
        if self.failures.push(failure).is_err() {
            self.failures_dropped = self.failures_dropped.saturating_add(1);
        }
    }
}

/// Renumber output node `old` to `new` (`None` = its jumper setting).
///
/// `store` holds the controller's input definitions.
pub fn renumber<B, S>(
    driver: &mut BusDriver<B>,
    registry: &mut Registry,
    store: &mut S,
    old: NodeId,
    new: Option<NodeId>,
) -> Result<RenumberReport>
where
    B: Bus,
    S: DefinitionStore + ?Sized,
{
    if !registry.is_output_present(old) {
        return Err(Error::NodeAbsent(old));
    }

    let reply = driver.renumber(old, new)?;
    let actual = NodeId::try_new(reply).ok_or(Error::OutOfRange {
        what: "renumber reply",
        value: reply,
    })?;

    if actual == old {
        return match new {
            Some(requested) if requested != old => {
                tracing::info!(target: "signalbox::renumber", %old, %requested, "renumber refused");
                Err(Error::RenumberRefused {
                    old,
                    requested: requested.get(),
                })
            }
            _ => {
                tracing::debug!(target: "signalbox::renumber", %old, "number unchanged");
                Ok(RenumberReport::new(old, old))
            }
        };
    }
    if new.is_some_and(|requested| requested != actual) {
        tracing::info!(target: "signalbox::renumber", %old, %actual, "jumpers override request");
    }

    registry.move_node(old, actual);
    let mut report = RenumberReport::new(old, actual);

    // Records outlive their input node, so absent nodes are rewritten too.
    for node in (0..registry.input_limit()).map(InputNodeId::new) {
        for pin in InputPin::all() {
            let input = InputRef::new(node, pin);
            let mut def = match load_input_def(store, input) {
                Ok(def) => def,
                Err(error) => {
                    report.fail(RenumberFailure::Input { input, error });
                    continue;
                }
            };
            if !def.move_outputs(old, actual) {
                continue;
            }
            match store_input_def(store, input, &def) {
                Ok(()) => report.inputs_updated += 1,
                Err(error) => report.fail(RenumberFailure::Input { input, error }),
            }
        }
    }

    let outputs: Vec<_, 32> = registry.output_nodes().collect();
    for node in outputs {
        match driver.move_locks(node, old, actual) {
            Ok(()) => report.nodes_notified += 1,
            Err(error) => report.fail(RenumberFailure::MoveLocks { node, error }),
        }
    }

    tracing::info!(
        target: "signalbox::renumber",
        %old,
        new = %actual,
        inputs = report.inputs_updated,
        nodes = report.nodes_notified,
        failures = report.failures.len() + report.failures_dropped as usize,
        "renumber complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{OutputRef, PinId};
    use crate::config::{BusConfig, TimingConfig};
    use crate::hal::{MockBus, MockStore};
    use crate::input::{InputDef, InputType, Mapping};
    use crate::output::{LockKind, LockSlot, OutputDef, OutputType};

    fn out(node: u8, pin: u8) -> OutputRef {
        OutputRef::new(NodeId::new(node), PinId::new(pin))
    }

    struct Rig {
        driver: BusDriver<MockBus>,
        registry: Registry,
        store: MockStore,
    }

    fn rig(outputs: &[u8]) -> Rig {
        let config = BusConfig::default();
        let mut bus = MockBus::new();
        for &node in outputs {
            bus.add_output(NodeId::new(node), &TimingConfig::default())
                .unwrap();
        }
        bus.add_input_node(config.input_base);
        let mut driver = BusDriver::new(bus, &config);
        let mut registry = Registry::new(config.input_nodes);
        registry.scan_outputs(&mut driver);
        registry.scan_inputs(&mut driver);
        Rig {
            driver,
            registry,
            store: MockStore::new(),
        }
    }

    fn input(pin: u8) -> InputRef {
        InputRef::new(InputNodeId::new(0), InputPin::new(pin))
    }

    #[test]
    fn moves_registry_inputs_and_locks() {
        let mut rig = rig(&[3, 4]);
        rig.registry.set_cached_states(NodeId::new(3), 0b0100_0000);
        let mapped = InputDef::new(InputType::Toggle)
            .with_mapping(0, Mapping::output(out(3, 6)))
            .with_mapping(1, Mapping::output(out(4, 0)));
        store_input_def(&mut rig.store, input(2), &mapped).unwrap();

        let mut locked = OutputDef::new(OutputType::Signal);
        locked
            .set_lock(LockKind::Hi, 0, LockSlot::new(out(3, 6), true))
            .unwrap();
        rig.driver.save_def(out(4, 1), &locked).unwrap();

        let report = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(3),
            Some(NodeId::new(7)),
        )
        .unwrap();

        assert!(report.changed());
        assert!(report.is_complete());
        assert_eq!(report.inputs_updated, 1);
        assert_eq!(report.nodes_notified, 2);

        assert!(!rig.registry.is_output_present(NodeId::new(3)));
        assert!(rig.registry.is_output_present(NodeId::new(7)));
        assert_eq!(rig.registry.cached_state(out(7, 6)), Some(true));

        let moved = load_input_def(&mut rig.store, input(2)).unwrap();
        assert_eq!(moved.first_output(), Some(out(7, 6)));
        assert_eq!(moved.mapping(1), Some(&Mapping::output(out(4, 0))));

        let def = rig.driver.read_def(out(4, 1)).unwrap();
        assert_eq!(def.lock(LockKind::Hi, 0).map(|s| s.target), Some(out(7, 6)));
        assert_eq!(rig.driver.read_states(NodeId::new(7)), Ok(0));
    }

    #[test]
    fn refusal_changes_nothing() {
        let mut rig = rig_with_full_store(3);
        store_input_def(
            &mut rig.store,
            input(1),
            &InputDef::new(InputType::On).with_mapping(0, Mapping::output(out(3, 2))),
        )
        .unwrap();
        let before = rig.store.puts;

        let result = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(3),
            Some(NodeId::new(9)),
        );
        assert_eq!(
            result,
            Err(Error::RenumberRefused {
                old: NodeId::new(3),
                requested: 9
            })
        );
        assert!(rig.registry.is_output_present(NodeId::new(3)));
        assert!(!rig.registry.is_output_present(NodeId::new(9)));
        assert_eq!(rig.store.puts, before);
        let kept = load_input_def(&mut rig.store, input(1)).unwrap();
        assert_eq!(kept.first_output(), Some(out(3, 2)));
    }

    /// A rig whose node at `node` cannot persist, so it refuses renumbers.
    fn rig_with_full_store(node: u8) -> Rig {
        let mut rig = rig(&[node]);
        let stuck = rig
            .driver
            .bus_mut()
            .output_node_mut(NodeId::new(node))
            .unwrap();
        stuck.store_mut().fail_puts = true;
        rig
    }

    #[test]
    fn bus_failure_aborts() {
        let mut rig = rig(&[5]);
        let address = rig.driver.output_address(NodeId::new(5));
        rig.driver.bus_mut().nack(address);
        let result = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(5),
            Some(NodeId::new(6)),
        );
        assert!(matches!(result, Err(Error::Bus(_))));
        assert!(rig.registry.is_output_present(NodeId::new(5)));
    }

    #[test]
    fn absent_node_rejected() {
        let mut rig = rig(&[]);
        let result = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(2),
            None,
        );
        assert_eq!(result, Err(Error::NodeAbsent(NodeId::new(2))));
    }

    #[test]
    fn jumper_request_without_change_is_no_op() {
        let mut rig = rig(&[2]);
        let report = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(2),
            None,
        )
        .unwrap();
        assert!(!report.changed());
        assert_eq!(report.nodes_notified, 0);
    }

    #[test]
    fn absent_input_node_records_rewritten() {
        let mut rig = rig(&[3]);
        let unplugged = InputRef::new(InputNodeId::new(5), InputPin::new(9));
        assert!(!rig.registry.is_input_present(unplugged.node));
        store_input_def(
            &mut rig.store,
            unplugged,
            &InputDef::new(InputType::OnOff).with_mapping(0, Mapping::output(out(3, 0))),
        )
        .unwrap();

        let report = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(3),
            Some(NodeId::new(7)),
        )
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.inputs_updated, 1);
        let moved = load_input_def(&mut rig.store, unplugged).unwrap();
        assert_eq!(moved.first_output(), Some(out(7, 0)));
    }

    #[test]
    fn propagation_failures_collected() {
        let mut rig = rig(&[3, 4]);
        let address = rig.driver.output_address(NodeId::new(4));
        rig.driver.bus_mut().nack(address);
        store_input_def(
            &mut rig.store,
            input(0),
            &InputDef::new(InputType::On).with_mapping(0, Mapping::output(out(3, 0))),
        )
        .unwrap();
        rig.store.fail_puts = true;

        let report = renumber(
            &mut rig.driver,
            &mut rig.registry,
            &mut rig.store,
            NodeId::new(3),
            Some(NodeId::new(10)),
        )
        .unwrap();

        assert_eq!(report.new, NodeId::new(10));
        assert!(!report.is_complete());
        assert_eq!(report.inputs_updated, 0);
        assert_eq!(report.nodes_notified, 1);
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f, RenumberFailure::Input { input: i, .. } if *i == input(0))));
        assert!(report.failures.iter().any(
            |f| matches!(f, RenumberFailure::MoveLocks { node, .. } if *node == NodeId::new(4))
        ));
    }
}
