//! Two-wire bus abstraction.
//!
//! The controller is the only master. It addresses a node by its 7-bit bus
//! address, writes a command frame, and optionally reads a response.
//! Output nodes sit on the other side as [`BusDevice`]s.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::traits::Bus;
//! use rs_signalbox::hal::MockBus;
//!
//! let mut bus = MockBus::new();
//! bus.add_input_node(0x20);
//!
//! // A zero-length write is a probe.
//! assert!(bus.write(0x20, &[]).is_ok());
//! assert!(bus.write(0x21, &[]).is_err());
//! ```

/// Master side of the bus.
///
/// Implementations report failures through their own error type. The
/// protocol driver treats any error as "the node did not acknowledge" and
/// never retries.
pub trait Bus {
    /// Error type for failed transfers.
    type Error: core::fmt::Debug;

    /// Write `data` to the node at `address`. An empty `data` is a probe.
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Read a response from the node at `address` into `buf`.
    ///
    /// Returns the number of bytes the node actually supplied, which may be
    /// fewer than `buf.len()`.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

impl<T: Bus + ?Sized> Bus for &mut T {
    type Error = T::Error;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).read(address, buf)
    }
}

/// Slave side of the bus, as seen by a node.
///
/// The two handlers correspond to the receive and request interrupts of a
/// bus peripheral. They run to completion and must not block.
pub trait BusDevice {
    /// Address the device currently answers on.
    fn bus_address(&self) -> u8;

    /// A master wrote a frame to this device.
    fn on_receive(&mut self, data: &[u8]);

    /// A master is reading from this device. Fill `buf` and return the
    /// number of bytes supplied.
    fn on_request(&mut self, buf: &mut [u8]) -> usize;
}
