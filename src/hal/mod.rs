//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test implementations for desktop development
//! - `i2c`: Adapters over `embedded-hal` 1.0 I2C and delay (requires `hal` feature)

pub mod mock;

#[cfg(feature = "hal")]
pub mod i2c;

pub use mock::*;

#[cfg(feature = "hal")]
pub use i2c::*;
