//! Integration tests for interlocking across nodes

use rs_signalbox::{
    hal::{MockBus, MockStore},
    BusConfig, BusDevice, Config, Controller, Error, LockKind, LockSlot, LockSource, NodeId, OutputDef,
    OutputRef, OutputType, PinId, ResetInterval, StateOutcome, TimingConfig,
};

fn out(node: u8, pin: u8) -> OutputRef {
    OutputRef::new(NodeId::new(node), PinId::new(pin))
}

fn setup(config: Config, nodes: &[u8]) -> Controller<MockBus, MockStore> {
    let mut bus = MockBus::new();
    for &node in nodes {
        bus.add_output(NodeId::new(node), &config.timing).unwrap();
    }
    let mut controller = Controller::new(bus, MockStore::new(), config);
    controller.scan();
    controller
}

#[test]
fn route_setting_sequence() {
    let mut c = setup(Config::default(), &[1, 2]);
    let points = out(2, 0);
    let home = out(1, 0);
    let distant = out(1, 1);

    // Home clears only with the points Hi; distant only with home Hi.
    c.edit_lock(home, LockKind::Hi, 0, LockSlot::new(points, true))
        .unwrap();
    c.edit_lock(distant, LockKind::Hi, 0, LockSlot::new(home, true))
        .unwrap();
    // Points may not move back while home is clear.
    c.edit_lock(points, LockKind::Lo, 0, LockSlot::new(home, false))
        .unwrap();

    assert!(!c.request_state(distant, true).unwrap().is_applied());
    assert!(!c.request_state(home, true).unwrap().is_applied());
    assert!(c.request_state(points, true).unwrap().is_applied());
    assert!(c.request_state(home, true).unwrap().is_applied());
    assert!(c.request_state(distant, true).unwrap().is_applied());

    let blocked = c.request_state(points, false).unwrap();
    assert_eq!(blocked.blocked().map(|b| b.prerequisite), Some(home));
    assert!(c.output_state(points).unwrap());
}

#[test]
fn first_failing_slot_reported() {
    let mut c = setup(Config::default(), &[1, 2]);
    let signal = out(1, 0);
    c.edit_lock(signal, LockKind::Hi, 0, LockSlot::new(out(2, 0), false))
        .unwrap();
    c.edit_lock(signal, LockKind::Hi, 2, LockSlot::new(out(2, 1), true))
        .unwrap();
    c.edit_lock(signal, LockKind::Hi, 3, LockSlot::new(out(2, 2), true))
        .unwrap();

    match c.request_state(signal, true).unwrap() {
        StateOutcome::Blocked(block) => {
            assert_eq!(block.slot, 2);
            assert_eq!(block.kind, LockKind::Hi);
            assert!(block.required);
            assert_eq!(block.actual, Some(false));
        }
        StateOutcome::Applied => panic!("expected block"),
    }
}

#[test]
fn unreachable_prerequisite_blocks() {
    let mut c = setup(Config::default(), &[1, 2]);
    c.edit_lock(out(1, 0), LockKind::Hi, 0, LockSlot::new(out(2, 0), false))
        .unwrap();

    let address = 0x52;
    c.bus_mut().nack(address);
    let outcome = c.request_state(out(1, 0), true).unwrap();
    assert_eq!(outcome.blocked().map(|b| b.actual), Some(None));
    assert!(matches!(outcome.into_result(), Err(Error::LockBlocked(_))));

    c.bus_mut().heal();
    assert!(c.request_state(out(1, 0), true).unwrap().is_applied());
}

#[test]
fn self_reference_on_same_node() {
    let mut c = setup(Config::default(), &[4]);
    // Pin 1 may only go Hi while pin 0 is Hi.
    c.edit_lock(out(4, 1), LockKind::Hi, 0, LockSlot::new(out(4, 0), true))
        .unwrap();
    assert!(!c.request_state(out(4, 1), true).unwrap().is_applied());
    c.request_state(out(4, 0), true).unwrap();
    assert!(c.request_state(out(4, 1), true).unwrap().is_applied());
}

#[test]
fn cached_source_trusts_cache_until_stale() {
    let config = Config::default().with_bus(BusConfig::default().with_lock_source(LockSource::Cached));
    let mut c = setup(config, &[1, 2]);
    c.edit_lock(out(1, 0), LockKind::Hi, 0, LockSlot::new(out(2, 0), true))
        .unwrap();

    // Moved behind the controller's back: the cache still says Lo.
    c.bus_mut()
        .output_node_mut(NodeId::new(2))
        .unwrap()
        .on_receive(&[0x20, 0x01, 0xff]);
    assert!(!c.request_state(out(1, 0), true).unwrap().is_applied());

    // A rescan refreshes it.
    c.scan();
    assert!(c.request_state(out(1, 0), true).unwrap().is_applied());
}

#[test]
fn node_auto_reset_respects_local_locks() {
    let timing = TimingConfig::default().with_reset_unit_ms(100);
    let mut c = setup(Config::default().with_timing(timing), &[3]);
    let signal = out(3, 0);
    let lever = out(3, 1);
    c.save_output(
        signal,
        &OutputDef::new(OutputType::Led).with_reset(ResetInterval::new(2)),
    )
    .unwrap();
    // The signal may not drop while the lever is Hi.
    c.edit_lock(signal, LockKind::Lo, 0, LockSlot::new(lever, false))
        .unwrap();
    c.request_state(lever, true).unwrap();
    c.request_state(signal, true).unwrap();

    c.bus_mut().update(250);
    assert!(c.output_state(signal).unwrap(), "reset must be blocked");

    c.request_state(lever, false).unwrap();
    c.request_state(signal, true).unwrap();
    c.bus_mut().update(600);
    assert!(!c.output_state(signal).unwrap());
}
