//! Collaborator traits: the bus, non-volatile storage, time and input events.
//!
//! Everything the core touches outside its own memory goes through one of
//! these traits, so the same code runs against real peripherals or the
//! mocks in [`crate::hal::mock`].
//!
//! | Trait | Used by | Purpose |
//! |-------|---------|---------|
//! | [`Bus`] | controller | Master side of the two-wire bus |
//! | [`BusDevice`] | output node | Slave side: receive and request handlers |
//! | [`DefinitionStore`] | controller, node | Byte-addressed non-volatile storage |
//! | [`Clock`] | node, simulator | Millisecond time source |
//! | [`Delay`] | dispatcher | Blocking pause between mapping steps |
//! | [`EventSource`] | controller | Input transitions with a timeout |

pub mod bus;
pub mod hardware;
pub mod storage;

pub use bus::*;
pub use hardware::*;
pub use storage::*;
