//! Time and input traits.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Clock`] | Monotonic millisecond time source for `no_std` environments |
//! | [`Delay`] | Blocking pause, used between input mapping steps |
//! | [`EventSource`] | Input transitions with a bounded wait |
//!
//! For testing and desktop development, use the mock implementations from
//! [`crate::hal::mock`].
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::traits::Clock;
//! use rs_signalbox::hal::MockClock;
//!
//! let mut clock = MockClock::new();
//! clock.set(1000);
//! clock.advance(250);
//! assert_eq!(clock.elapsed_since(1000), 250);
//! ```

use crate::input::InputEvent;

/// Clock trait for getting current time.
///
/// Needed for `no_std` environments where `std::time` is unavailable.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed epoch. Never decreases.
    fn now_ms(&self) -> u64;

    /// Milliseconds since `start_ms`, zero if `start_ms` is in the future.
    fn elapsed_since(&self, start_ms: u64) -> u64 {
        self.now_ms().saturating_sub(start_ms)
    }
}

/// Blocking delay.
///
/// Dispatching an input blocks for the duration of its delay steps; the
/// single-threaded controller has nothing else to do meanwhile.
pub trait Delay {
    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

impl<T: Delay + ?Sized> Delay for &mut T {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// Source of physical input transitions.
pub trait EventSource {
    /// Wait up to `timeout_ms` for the next transition.
    ///
    /// Returns `None` on timeout. A timeout of zero polls.
    fn next_event(&mut self, timeout_ms: u32) -> Option<InputEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0
        }
    }

    struct CountingDelay {
        total_ms: u64,
    }

    impl Delay for CountingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += ms as u64;
        }
    }

    // =========================================================================
    // Clock Default Methods Tests
    // =========================================================================

    #[test]
    fn elapsed_since_past() {
        assert_eq!(FixedClock(1500).elapsed_since(1000), 500);
    }

    #[test]
    fn elapsed_since_future_saturates() {
        assert_eq!(FixedClock(1000).elapsed_since(1500), 0);
    }

    // =========================================================================
    // Delay Forwarding Tests
    // =========================================================================

    #[test]
    fn delay_through_mut_ref() {
        fn pause(mut delay: impl Delay) {
            delay.delay_ms(30);
            delay.delay_ms(12);
        }

        let mut delay = CountingDelay { total_ms: 0 };
        pause(&mut delay);
        assert_eq!(delay.total_ms, 42);
    }
}
