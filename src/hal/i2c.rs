//! Adapters from `embedded-hal` 1.0 traits to the crate's collaborator
//! traits.
//!
//! Any I2C master implementing [`embedded_hal::i2c::I2c`] can carry the
//! bus protocol, and any [`embedded_hal::delay::DelayNs`] can time input
//! delay steps.
//!
//! ```rust,ignore
//! use rs_signalbox::hal::{HalDelay, I2cBus};
//!
//! let bus = I2cBus::new(i2c);
//! let mut controller = Controller::new(bus, eeprom, Config::default());
//! controller.poll_input(&mut expanders, &mut HalDelay::new(delay));
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::traits::{Bus, Delay};

/// Bus master over an `embedded-hal` I2C peripheral.
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    /// Wrap an I2C master.
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Release the I2C master.
    pub fn into_inner(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Bus for I2cBus<I> {
    type Error = I::Error;

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        self.i2c.write(address, data)
    }

    /// I2C reads are master-clocked, so a successful read always fills
    /// `buf`.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.i2c.read(address, buf)?;
        Ok(buf.len())
    }
}

/// Blocking delay over an `embedded-hal` delay provider.
pub struct HalDelay<D> {
    delay: D,
}

impl<D: DelayNs> HalDelay<D> {
    /// Wrap a delay provider.
    pub fn new(delay: D) -> Self {
        Self { delay }
    }
}

impl<D: DelayNs> Delay for HalDelay<D> {
    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    /// One responding address that answers every read with `0xa5`.
    struct FakeI2c {
        address: u8,
        written: alloc::vec::Vec<u8>,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != self.address {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(data) => self.written.extend_from_slice(data),
                    Operation::Read(buf) => buf.fill(0xa5),
                }
            }
            Ok(())
        }
    }

    struct CountingDelay(u32);

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0 += ns / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0 += ms;
        }
    }

    #[test]
    fn i2c_bus_forwards() {
        let mut bus = I2cBus::new(FakeI2c {
            address: 0x52,
            written: alloc::vec::Vec::new(),
        });
        bus.write(0x52, &[0x10]).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(bus.read(0x52, &mut buf), Ok(2));
        assert_eq!(buf, [0xa5, 0xa5]);
        assert!(bus.write(0x53, &[]).is_err());
        assert_eq!(bus.into_inner().written, alloc::vec![0x10]);
    }

    #[test]
    fn hal_delay_forwards() {
        let mut delay = HalDelay::new(CountingDelay(0));
        delay.delay_ms(25);
        assert_eq!(delay.delay.0, 25);
    }
}
