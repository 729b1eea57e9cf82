//! # rs-signalbox
//!
//! Core of a model railway signal box: a controller driving remote output
//! nodes (servos, LEDs, signals) and reading input nodes (panel switches)
//! over a shared two-wire bus.
//!
//! ## Features
//!
//! - **Packed definitions**: fixed-layout output and input records, used
//!   verbatim on the bus and in storage
//! - **Bus protocol**: typed commands for state, definition and system
//!   administration of remote nodes
//! - **Interlocking**: per-output lock slots gate every state change on the
//!   states of other outputs
//! - **Output motion**: paced servo sweeps, LED fades, flashers and
//!   auto-reset, run autonomously on each node
//! - **Renumbering**: move a node to a new address and repoint every input
//!   mapping and lock that refers to it
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Bus, storage, time and input collaborators
//! - `codec` - Definition encoding
//! - `protocol` - Bus commands and the master-side driver
//! - `registry` - Node presence and the output state cache
//! - `interlock` - Lock evaluation
//! - `transition` - Per-output movement state machine
//! - `renumber` - Node renumbering
//! - `dispatch` - Input transitions to output requests
//! - `node` - A remote output node
//! - `controller` - The façade a panel talks to
//! - `hal` - Concrete implementations (mock for testing, embedded-hal adapters)
//!
//! ## Example
//!
//! ```rust
//! use rs_signalbox::{
//!     Config, Controller, InputDef, InputEvent, InputType, Mapping,
//!     address::{InputNodeId, InputPin, InputRef, NodeId, OutputRef, PinId},
//!     hal::{MockBus, MockDelay, MockStore},
//! };
//!
//! let config = Config::default();
//! let mut bus = MockBus::new();
//! bus.add_output(NodeId::new(2), &config.timing).unwrap();
//! bus.add_input_node(config.bus.input_base + 1);
//!
//! let mut controller = Controller::new(bus, MockStore::new(), config);
//! controller.scan();
//!
//! // A panel switch that toggles the points at 2.5.
//! let points = OutputRef::new(NodeId::new(2), PinId::new(5));
//! let switch = InputRef::new(InputNodeId::new(1), InputPin::new(0));
//! let def = InputDef::new(InputType::Toggle).with_mapping(0, Mapping::output(points));
//! controller.save_input(switch, &def).unwrap();
//!
//! let mut delay = MockDelay::new();
//! controller.dispatch(InputEvent::press(switch), &mut delay).unwrap();
//! assert!(controller.output_state(points).unwrap());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Node, pin and reference types with their bit widths.
pub mod address;
/// Byte layouts of output and input definitions.
pub mod codec;
/// Shared configuration for the controller and the simulator.
pub mod config;
/// The controller façade coordinating bus, registry and storage.
pub mod controller;
/// Turning input transitions into output state requests.
pub mod dispatch;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Input definitions and events.
pub mod input;
/// Lock evaluation.
pub mod interlock;
/// A remote output node.
pub mod node;
/// Output definitions and lock slots.
pub mod output;
/// Bus commands and the master-side driver.
pub mod protocol;
/// Node presence and the output state cache.
pub mod registry;
/// Node renumbering and reference propagation.
pub mod renumber;
/// Collaborator traits for bus, storage, time and input.
pub mod traits;
/// Per-output movement and flashing state machine.
pub mod transition;

// Re-exports for convenience
pub use address::{InputRef, NodeId, OutputRef, Pace, PinId, ResetInterval};
pub use config::{BusConfig, Config, DebugConfig, DebugLevel, LockSource, TimingConfig};
pub use controller::{Controller, ScanResult};
pub use dispatch::{DispatchReport, DispatchStep, OutputRequester};
pub use error::{BusError, Error, Result};
pub use input::{InputDef, InputEvent, InputType, Mapping};
pub use interlock::{LockBlock, StateOutcome};
pub use node::OutputNode;
pub use output::{LockKind, LockSlot, OutputDef, OutputType};
pub use protocol::{BusDriver, Command};
pub use registry::Registry;
pub use renumber::{RenumberFailure, RenumberReport};
pub use traits::{Bus, BusDevice, Clock, DefinitionStore, Delay, EventSource};
pub use transition::{MachineEvent, Motion, OutputMachine};
