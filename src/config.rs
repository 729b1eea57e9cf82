//! Controller configuration.
//!
//! Plain structs with `with_*` builders, usable without `std`.
//!
//! # Example
//!
//! ```rust
//! use rs_signalbox::config::{BusConfig, Config, DebugLevel, LockSource, TimingConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.bus.output_base, 0x50);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_bus(BusConfig::default().with_input_nodes(32).with_lock_source(LockSource::Cached))
//!     .with_timing(TimingConfig::default().with_reset_unit_ms(500))
//!     .with_debug_level(DebugLevel::Detail);
//! ```

use tracing::level_filters::LevelFilter;

use crate::address::INPUT_NODE_MAX;

/// Input nodes supported by the first hardware generation.
pub const INPUT_NODES_GEN1: u8 = 8;

// ============================================================================
// Main Config
// ============================================================================

/// Complete controller configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Bus addressing and lock evaluation
    pub bus: BusConfig,
    /// Time units
    pub timing: TimingConfig,
    /// Diagnostic verbosity
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            timing: TimingConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Config {
    /// Set bus configuration
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Set timing configuration
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Set debug configuration
    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Shorthand for `with_debug(DebugConfig { level })`
    pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
        self.debug.level = level;
        self
    }
}

// ============================================================================
// Bus Config
// ============================================================================

/// Where the interlock reads prerequisite states from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LockSource {
    /// Read States from the owning node on every evaluation.
    #[default]
    Live,
    /// Use fresh registry cache bytes, reading live only on a miss.
    Cached,
}

/// Bus addressing configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusConfig {
    /// Bus address of output node 0
    pub output_base: u8,
    /// Bus address of input node 0
    pub input_base: u8,
    /// Input nodes the hardware generation supports (8 or 32)
    pub input_nodes: u8,
    /// Source of prerequisite states for lock evaluation
    pub lock_source: LockSource,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            output_base: 0x50,
            input_base: 0x20,
            input_nodes: INPUT_NODES_GEN1,
            lock_source: LockSource::Live,
        }
    }
}

impl BusConfig {
    /// Set the output node base address
    pub fn with_output_base(mut self, base: u8) -> Self {
        self.output_base = base;
        self
    }

    /// Set the input node base address
    pub fn with_input_base(mut self, base: u8) -> Self {
        self.input_base = base;
        self
    }

    /// Set the number of input nodes (capped at 32)
    pub fn with_input_nodes(mut self, nodes: u8) -> Self {
        self.input_nodes = nodes.min(INPUT_NODE_MAX);
        self
    }

    /// Set the lock state source
    pub fn with_lock_source(mut self, source: LockSource) -> Self {
        self.lock_source = source;
        self
    }
}

// ============================================================================
// Timing Config
// ============================================================================

/// Time units used by outputs and input dispatch
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingConfig {
    /// Length of one auto-reset unit in milliseconds
    pub reset_unit_ms: u32,
    /// Length of one input delay unit in milliseconds
    pub delay_unit_ms: u32,
    /// Base flash period in milliseconds
    pub flash_unit_ms: u32,
    /// How long `poll_input` waits for an event
    pub poll_timeout_ms: u32,
    /// How long a tested output is held in its opposite state
    pub test_hold_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reset_unit_ms: 1000,
            delay_unit_ms: 1000,
            flash_unit_ms: 64,
            poll_timeout_ms: 50,
            test_hold_ms: 1000,
        }
    }
}

impl TimingConfig {
    /// Set the auto-reset unit
    pub fn with_reset_unit_ms(mut self, ms: u32) -> Self {
        self.reset_unit_ms = ms;
        self
    }

    /// Set the input delay unit
    pub fn with_delay_unit_ms(mut self, ms: u32) -> Self {
        self.delay_unit_ms = ms;
        self
    }

    /// Set the flash unit (at least 1ms)
    pub fn with_flash_unit_ms(mut self, ms: u32) -> Self {
        self.flash_unit_ms = ms.max(1);
        self
    }

    /// Set the input poll timeout
    pub fn with_poll_timeout_ms(mut self, ms: u32) -> Self {
        self.poll_timeout_ms = ms;
        self
    }

    /// Set the output test hold time
    pub fn with_test_hold_ms(mut self, ms: u32) -> Self {
        self.test_hold_ms = ms;
        self
    }
}

// ============================================================================
// Debug Config
// ============================================================================

/// Diagnostic verbosity, from silent to every bus exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DebugLevel {
    /// No diagnostics.
    None,
    /// Failures only.
    #[default]
    Errors,
    /// Failures, refusals and state changes.
    Brief,
    /// Everything, including individual bus exchanges.
    Detail,
}

impl DebugLevel {
    /// The `tracing` filter matching this level.
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            DebugLevel::None => LevelFilter::OFF,
            DebugLevel::Errors => LevelFilter::WARN,
            DebugLevel::Brief => LevelFilter::INFO,
            DebugLevel::Detail => LevelFilter::TRACE,
        }
    }

    /// Parse from text (`none`, `errors`, `brief`, `detail`, or `0`-`3`).
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        [
            ("none", "0", DebugLevel::None),
            ("errors", "1", DebugLevel::Errors),
            ("brief", "2", DebugLevel::Brief),
            ("detail", "3", DebugLevel::Detail),
        ]
        .into_iter()
        .find(|(name, digit, _)| s.eq_ignore_ascii_case(name) || s == *digit)
        .map(|(_, _, level)| level)
    }
}

/// Diagnostic configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugConfig {
    /// Verbosity
    pub level: DebugLevel,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.bus.output_base, 0x50);
        assert_eq!(config.bus.input_base, 0x20);
        assert_eq!(config.bus.input_nodes, 8);
        assert_eq!(config.bus.lock_source, LockSource::Live);
        assert_eq!(config.timing.reset_unit_ms, 1000);
        assert_eq!(config.debug.level, DebugLevel::Errors);
    }

    #[test]
    fn input_nodes_capped() {
        let bus = BusConfig::default().with_input_nodes(64);
        assert_eq!(bus.input_nodes, 32);
    }

    #[test]
    fn flash_unit_never_zero() {
        assert_eq!(TimingConfig::default().with_flash_unit_ms(0).flash_unit_ms, 1);
    }

    #[test]
    fn debug_level_filters() {
        assert_eq!(DebugLevel::None.level_filter(), LevelFilter::OFF);
        assert_eq!(DebugLevel::Detail.level_filter(), LevelFilter::TRACE);
        assert!(DebugLevel::Brief > DebugLevel::Errors);
    }

    #[test]
    fn debug_level_from_text() {
        assert_eq!(DebugLevel::from_text("Detail"), Some(DebugLevel::Detail));
        assert_eq!(DebugLevel::from_text(" 2 "), Some(DebugLevel::Brief));
        assert_eq!(DebugLevel::from_text("loud"), None);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_bus(BusConfig::default().with_output_base(0x40))
            .with_timing(TimingConfig::default().with_delay_unit_ms(250))
            .with_debug_level(DebugLevel::Brief);

        assert_eq!(config.bus.output_base, 0x40);
        assert_eq!(config.timing.delay_unit_ms, 250);
        assert_eq!(config.debug.level, DebugLevel::Brief);
    }
}
