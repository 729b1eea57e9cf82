//! Desktop signal box simulator.
//!
//! Builds a small installation on the mock bus (three output nodes, one
//! input node) and walks it through discovery, interlocking, a panel
//! switch, an auto-reset and a renumber, logging every step.
//!
//! # Run
//!
//! ```bash
//! cargo run --features sim --bin signalbox-sim
//!
//! # Verbosity: none, errors, brief (default), detail
//! cargo run --features sim --bin signalbox-sim -- detail
//!
//! # Or per target
//! RUST_LOG=signalbox::lock=trace cargo run --features sim --bin signalbox-sim
//! ```

use anyhow::{bail, Context};
use rs_signalbox::address::{InputNodeId, InputPin, ResetInterval};
use rs_signalbox::hal::{MockBus, MockClock, MockDelay, MockEvents, MockStore};
use rs_signalbox::traits::Clock;
use rs_signalbox::{
    Config, Controller, DebugLevel, InputDef, InputEvent, InputRef, InputType, LockKind, LockSlot,
    Mapping, NodeId, OutputDef, OutputRef, OutputType, PinId, TimingConfig,
};
use tracing_subscriber::EnvFilter;

/// Simulated time per tick.
const TICK_MS: u64 = 20;

/// Ticks allowed for an output to settle or reset.
const SETTLE_TICKS: u32 = 500;

type Sim = Controller<MockBus, MockStore>;

fn init_logging(level: DebugLevel) {
    let filter = EnvFilter::from_default_env().add_directive(level.level_filter().into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

fn out(node: u8, pin: u8) -> OutputRef {
    OutputRef::new(NodeId::new(node), PinId::new(pin))
}

/// Run the nodes until `done` holds or the tick budget runs out.
fn run_until<F>(sim: &mut Sim, clock: &mut MockClock, mut done: F) -> anyhow::Result<u64>
where
    F: FnMut(&MockBus) -> bool,
{
    let start = clock.now_ms();
    for _ in 0..SETTLE_TICKS {
        clock.advance(TICK_MS);
        sim.bus_mut().update(clock.now_ms());
        if done(sim.bus()) {
            return Ok(clock.elapsed_since(start));
        }
    }
    bail!("nothing happened within {} ms", SETTLE_TICKS as u64 * TICK_MS)
}

fn main() -> anyhow::Result<()> {
    let level = std::env::args()
        .nth(1)
        .map(|arg| DebugLevel::from_text(&arg).with_context(|| format!("unknown debug level {arg:?}")))
        .transpose()?
        .unwrap_or(DebugLevel::Brief);
    init_logging(level);

    let timing = TimingConfig::default()
        .with_reset_unit_ms(200)
        .with_delay_unit_ms(100);
    let config = Config::default()
        .with_timing(timing.clone())
        .with_debug_level(level);

    let mut bus = MockBus::new();
    for node in [1, 2, 3] {
        bus.add_output(NodeId::new(node), &timing)?;
    }
    bus.add_input_node(config.bus.input_base);

    let mut sim = Controller::new(bus, MockStore::new(), config);
    let mut clock = MockClock::new();
    let mut delay = MockDelay::new();

    // 1. Discovery
    let found = sim.scan();
    tracing::info!(
        outputs = found.output_count(),
        inputs = found.input_count(),
        "step 1: scan"
    );

    // 2. The home signal may only clear while the points are Hi.
    let points = out(2, 5);
    let signal = out(1, 0);
    let distant = out(3, 1);
    sim.save_output(
        points,
        &OutputDef::new(OutputType::Servo).with_lo(60).with_hi(120),
    )?;
    sim.save_output(
        signal,
        &OutputDef::new(OutputType::Signal)
            .with_lo(20)
            .with_hi(160)
            .with_reset(ResetInterval::new(3)),
    )?;
    sim.edit_lock(signal, LockKind::Hi, 0, LockSlot::new(points, true))?;
    tracing::info!(%signal, %points, "step 2: lock configured");

    // 3. Points are Lo, so the signal stays at danger.
    match sim.request_state(signal, true)?.blocked() {
        Some(block) => tracing::info!(%block, "step 3: request blocked"),
        None => bail!("signal cleared with the points Lo"),
    }

    // 4. A panel toggle switch throws the points, then the signal clears.
    let switch = InputRef::new(InputNodeId::new(0), InputPin::new(0));
    sim.save_input(
        switch,
        &InputDef::new(InputType::Toggle).with_mapping(0, Mapping::output(points)),
    )?;
    let mut events = MockEvents::new();
    events.push(InputEvent::press(switch));
    events.push(InputEvent::release(switch));
    while let Some(report) = sim.poll_input(&mut events, &mut delay)? {
        tracing::info!(state = ?report.state, clean = report.is_clean(), "step 4: switch");
    }
    let settled = run_until(&mut sim, &mut clock, |bus| {
        bus.output_node(points.node)
            .is_some_and(|n| n.machine(points.pin).value() == 120)
    })?;
    tracing::info!(ms = settled, "step 4: points thrown");
    if !sim.request_state(signal, true)?.is_applied() {
        bail!("signal still locked with the points Hi");
    }

    // 5. The signal returns to danger on its own after three reset units.
    let reset = run_until(&mut sim, &mut clock, |bus| {
        bus.output_node(signal.node)
            .is_some_and(|n| !n.def(signal.pin).state())
    })?;
    tracing::info!(ms = reset, state = sim.output_state(signal)?, "step 5: auto-reset");

    // 6. Node 3 moves to 7; locks and mappings naming it follow.
    sim.edit_lock(signal, LockKind::Lo, 0, LockSlot::new(distant, false))?;
    sim.save_input(
        InputRef::new(InputNodeId::new(0), InputPin::new(1)),
        &InputDef::new(InputType::OnOff).with_mapping(0, Mapping::output(distant)),
    )?;
    let report = sim.renumber(NodeId::new(3), Some(NodeId::new(7)))?;
    tracing::info!(
        old = %report.old,
        new = %report.new,
        inputs = report.inputs_updated,
        nodes = report.nodes_notified,
        complete = report.is_complete(),
        "step 6: renumber"
    );

    let home = sim.load_output(signal)?;
    match home.lock(LockKind::Lo, 0) {
        Some(slot) if slot.target == distant.with_node(report.new) => {
            tracing::info!(prerequisite = %slot.target, "step 6: lock repointed")
        }
        other => bail!("lock not repointed: {other:?}"),
    }
    Ok(())
}
