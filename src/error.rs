//! Error types shared by the controller, the bus driver and the nodes.
//!
//! Bus failures are never retried by the driver. They surface as
//! [`BusError`] and the caller decides whether they mean "node absent" or
//! "operation failed". An interlock refusal is an expected outcome, not a
//! failure, and is reported through
//! [`StateOutcome`](crate::interlock::StateOutcome). [`Error::LockBlocked`]
//! exists for callers that prefer to propagate it with `?`.

use crate::address::NodeId;
use crate::interlock::LockBlock;

/// A failed bus exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The addressed node did not acknowledge.
    #[error("no acknowledge from bus address {address:#04x}")]
    NoAck {
        /// Bus address that was selected.
        address: u8,
    },
    /// The node answered with fewer bytes than the command requires.
    #[error("short response from bus address {address:#04x}: expected {expected} bytes, got {got}")]
    Short {
        /// Bus address that was selected.
        address: u8,
        /// Byte count the command requires.
        expected: usize,
        /// Byte count actually received.
        got: usize,
    },
}

impl BusError {
    /// Bus address the failed exchange was aimed at.
    pub fn address(&self) -> u8 {
        match self {
            BusError::NoAck { address } | BusError::Short { address, .. } => *address,
        }
    }
}

/// Errors reported by core operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A bus exchange failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The output node is not in the registry.
    #[error("output node {0} is not present")]
    NodeAbsent(NodeId),

    /// The input node is not in the registry.
    #[error("input node {0:02X} is not present")]
    InputNodeAbsent(u8),

    /// The interlock refused a state change.
    #[error("{0}")]
    LockBlocked(LockBlock),

    /// The node kept its old address instead of taking the requested one.
    #[error("node {old} refused renumber to {requested:02X}")]
    RenumberRefused {
        /// Address the node still answers on.
        old: NodeId,
        /// Address that was requested.
        requested: u8,
    },

    /// A decoded field exceeds its legal maximum.
    #[error("{field} value {value} exceeds maximum {max}")]
    RangeViolation {
        /// Name of the offending field.
        field: &'static str,
        /// Value found.
        value: u8,
        /// Largest legal value.
        max: u8,
    },

    /// The storage collaborator failed.
    #[error("storage failure at offset {offset:#06x}")]
    Storage {
        /// Record offset of the failed access.
        offset: usize,
    },

    /// An argument was outside its legal range.
    #[error("{what} {value} out of range")]
    OutOfRange {
        /// What the argument was.
        what: &'static str,
        /// Value given.
        value: u8,
    },
}

impl Error {
    /// Whether this is a bus-level failure.
    pub fn is_bus(&self) -> bool {
        matches!(self, Error::Bus(_))
    }
}

/// Result alias for core operations.
pub type Result<T> = core::result::Result<T, Error>;
