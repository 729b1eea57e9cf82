//! Integration tests for node renumbering

use rs_signalbox::{
    address::{InputNodeId, InputPin},
    codec::{store_input_def, NODE_NUMBER_OFFSET},
    hal::{MockBus, MockDelay, MockStore},
    Config, Controller, DefinitionStore, Error, InputDef, InputEvent, InputRef, InputType,
    LockKind, LockSlot, Mapping, NodeId, OutputRef, PinId, RenumberFailure,
};

fn out(node: u8, pin: u8) -> OutputRef {
    OutputRef::new(NodeId::new(node), PinId::new(pin))
}

fn input(node: u8, pin: u8) -> InputRef {
    InputRef::new(InputNodeId::new(node), InputPin::new(pin))
}

fn setup(outputs: &[u8], inputs: &[u8]) -> Controller<MockBus, MockStore> {
    let config = Config::default();
    let mut bus = MockBus::new();
    for &node in outputs {
        bus.add_output(NodeId::new(node), &config.timing).unwrap();
    }
    for &node in inputs {
        bus.add_input_node(config.bus.input_base + node);
    }
    let mut controller = Controller::new(bus, MockStore::new(), config);
    controller.scan();
    controller
}

#[test]
fn renumber_propagates_everywhere() {
    let mut c = setup(&[1, 3, 5], &[0, 2]);

    // Inputs on two nodes aim at node 3.
    let toggle = InputDef::new(InputType::Toggle)
        .with_mapping(0, Mapping::output(out(3, 4)))
        .with_mapping(1, Mapping::Delay(2))
        .with_mapping(2, Mapping::output(out(5, 0)));
    c.save_input(input(0, 7), &toggle).unwrap();
    c.save_input(
        input(2, 15),
        &InputDef::new(InputType::Off).with_mapping(2, Mapping::output(out(3, 0))),
    )
    .unwrap();
    c.save_input(
        input(2, 1),
        &InputDef::new(InputType::On).with_mapping(0, Mapping::output(out(1, 1))),
    )
    .unwrap();

    // Locks on two other nodes and on node 3 itself.
    c.edit_lock(out(1, 0), LockKind::Hi, 0, LockSlot::new(out(3, 4), true))
        .unwrap();
    c.edit_lock(out(5, 2), LockKind::Lo, 3, LockSlot::new(out(3, 7), false))
        .unwrap();
    c.edit_lock(out(3, 1), LockKind::Hi, 1, LockSlot::new(out(3, 4), true))
        .unwrap();
    c.request_state(out(3, 4), true).unwrap();

    let report = c.renumber(NodeId::new(3), Some(NodeId::new(7))).unwrap();
    assert_eq!(report.new, NodeId::new(7));
    assert!(report.is_complete());
    assert_eq!(report.inputs_updated, 2);
    assert_eq!(report.nodes_notified, 3);

    // Registry
    assert!(!c.registry().is_output_present(NodeId::new(3)));
    assert!(c.registry().is_output_present(NodeId::new(7)));
    assert_eq!(c.registry().cached_state(out(7, 4)), Some(true));
    assert_eq!(c.load_output(out(3, 0)), Err(Error::NodeAbsent(NodeId::new(3))));

    // Inputs
    let moved = c.load_input(input(0, 7)).unwrap();
    assert_eq!(moved.mapping(0), Some(&Mapping::output(out(7, 4))));
    assert_eq!(moved.mapping(1), Some(&Mapping::Delay(2)));
    assert_eq!(moved.mapping(2), Some(&Mapping::output(out(5, 0))));
    assert_eq!(
        c.load_input(input(2, 15)).unwrap().mapping(2),
        Some(&Mapping::output(out(7, 0)))
    );
    assert_eq!(
        c.load_input(input(2, 1)).unwrap().first_output(),
        Some(out(1, 1))
    );

    // Locks, including the renumbered node's own
    let lock = |c: &mut Controller<MockBus, MockStore>, r: OutputRef, kind: LockKind, i: usize| {
        c.load_output(r).unwrap().lock(kind, i).map(|s| s.target)
    };
    assert_eq!(lock(&mut c, out(1, 0), LockKind::Hi, 0), Some(out(7, 4)));
    assert_eq!(lock(&mut c, out(5, 2), LockKind::Lo, 3), Some(out(7, 7)));
    assert_eq!(lock(&mut c, out(7, 1), LockKind::Hi, 1), Some(out(7, 4)));

    // The new number is persisted on the node.
    let node = c.bus_mut().output_node_mut(NodeId::new(7)).unwrap();
    let mut number = [0u8; 1];
    node.store_mut().get(NODE_NUMBER_OFFSET, &mut number).unwrap();
    assert_eq!(number[0], 7);

    // And the toggle still drives the moved output.
    c.dispatch(InputEvent::press(input(0, 7)), &mut MockDelay::new())
        .unwrap();
    assert!(!c.output_state(out(7, 4)).unwrap());
}

#[test]
fn unplugged_input_node_still_repointed() {
    let mut c = setup(&[3], &[0]);
    let unplugged = input(1, 0);
    assert_eq!(
        c.load_input(unplugged),
        Err(Error::InputNodeAbsent(1))
    );
    // Written while the panel was connected.
    let def = InputDef::new(InputType::OnOff).with_mapping(0, Mapping::output(out(3, 0)));
    store_input_def(c.store_mut(), unplugged, &def).unwrap();

    let report = c.renumber(NodeId::new(3), Some(NodeId::new(7))).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.inputs_updated, 1);

    // Plug the panel back in and its switch drives the moved output.
    let address = c.config().bus.input_base + 1;
    c.bus_mut().add_input_node(address);
    c.scan();
    assert_eq!(
        c.load_input(unplugged).unwrap().first_output(),
        Some(out(7, 0))
    );
}

#[test]
fn refused_renumber_changes_nothing() {
    let mut c = setup(&[3], &[0]);
    let def = InputDef::new(InputType::OnOff).with_mapping(0, Mapping::output(out(3, 2)));
    c.save_input(input(0, 0), &def).unwrap();
    c.bus_mut()
        .output_node_mut(NodeId::new(3))
        .unwrap()
        .store_mut()
        .fail_puts = true;
    let frames = c.bus().writes.len();

    let result = c.renumber(NodeId::new(3), Some(NodeId::new(9)));
    assert_eq!(
        result,
        Err(Error::RenumberRefused {
            old: NodeId::new(3),
            requested: 9
        })
    );
    assert!(c.registry().is_output_present(NodeId::new(3)));
    assert!(!c.registry().is_output_present(NodeId::new(9)));
    assert_eq!(c.load_input(input(0, 0)).unwrap(), def);
    // Only the Renumber frame itself went out; no Move-Locks broadcast.
    assert_eq!(c.bus().writes.len(), frames + 1);
}

#[test]
fn revert_to_jumpers() {
    let mut c = setup(&[4], &[]);
    c.renumber(NodeId::new(4), Some(NodeId::new(12))).unwrap();
    assert!(c.registry().is_output_present(NodeId::new(12)));

    let report = c.renumber(NodeId::new(12), None).unwrap();
    assert_eq!(report.new, NodeId::new(4));
    assert!(c.registry().is_output_present(NodeId::new(4)));
    assert!(!c.registry().is_output_present(NodeId::new(12)));
}

#[test]
fn move_locks_failure_is_reported_not_fatal() {
    let mut c = setup(&[1, 2, 3], &[]);
    c.edit_lock(out(1, 0), LockKind::Hi, 0, LockSlot::new(out(2, 0), true))
        .unwrap();
    c.bus_mut().nack(0x51);

    let report = c.renumber(NodeId::new(2), Some(NodeId::new(20))).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.nodes_notified, 2);
    assert!(matches!(
        report.failures.as_slice(),
        [RenumberFailure::MoveLocks { node, .. }] if *node == NodeId::new(1)
    ));

    // Node 1 still points at the old number: a mixed state, as documented.
    c.bus_mut().heal();
    let def = c.load_output(out(1, 0)).unwrap();
    assert_eq!(def.lock(LockKind::Hi, 0).map(|s| s.target), Some(out(2, 0)));
}
