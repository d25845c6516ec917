// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the device model
//!
//! The cycle model itself is total: once constructed, no tick can fail.
//! Errors exist only for configuration and for command validation.

use thiserror::Error;

/// Result type alias for device model construction
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building a device model
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// PE grid dimensions are unusable
    #[error("Invalid array geometry {rows}x{cols}: {reason}")]
    InvalidGeometry {
        /// Requested rows
        rows: usize,
        /// Requested columns
        cols: usize,
        /// Why it was rejected
        reason: String,
    },

    /// A queue or memory depth is unusable
    #[error("Invalid {what} depth {depth}: {reason}")]
    InvalidDepth {
        /// Which buffer
        what: &'static str,
        /// Requested depth
        depth: usize,
        /// Why it was rejected
        reason: String,
    },
}

impl CoreError {
    /// Create an invalid geometry error
    pub fn invalid_geometry(rows: usize, cols: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            rows,
            cols,
            reason: reason.into(),
        }
    }

    /// Create an invalid depth error
    pub fn invalid_depth(what: &'static str, depth: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDepth {
            what,
            depth,
            reason: reason.into(),
        }
    }
}

/// Reasons a command word is rejected before it touches any state
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Bits outside the defined command set
    #[error("Undefined command bits {bits:#x}")]
    UndefinedBits {
        /// The offending bits
        bits: u32,
    },

    /// Weight-stationary load and accumulator dump in one command
    #[error("LOAD_MODE and DUMP are mutually exclusive")]
    LoadWithDump,

    /// Start and dump in one command
    #[error("START and DUMP are mutually exclusive")]
    StartWithDump,

    /// Load mode only selects the dataflow of a run being started
    #[error("LOAD_MODE requires START")]
    LoadWithoutStart,
}
