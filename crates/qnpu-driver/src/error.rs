// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for NPU driver operations

use std::path::PathBuf;
use thiserror::Error;

use qnpu_core::CoreError;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while driving the NPU
#[derive(Debug, Error)]
pub enum DriverError {
    /// A bus transaction or status poll did not complete in time
    #[error("Timeout after {cycles} cycles waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: &'static str,
        /// Cycles spent
        cycles: u64,
    },

    /// Operand dimensions do not fit the operation
    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Which operand
        what: &'static str,
        /// Expected shape
        expected: String,
        /// Actual shape
        got: String,
    },

    /// Operand does not fit in a staging memory
    #[error("{port} staging overflow: {words} words, capacity {capacity}")]
    StagingOverflow {
        /// Staging port name
        port: &'static str,
        /// Words requested
        words: usize,
        /// Staging depth
        capacity: usize,
    },

    /// Device is in a state that does not allow the operation
    #[error("Device in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Matrix text could not be parsed
    #[error("Parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Reason for failure
        reason: String,
    },

    /// Matrix file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Device model could not be built
    #[error("Device model: {source}")]
    Core {
        /// Underlying model error
        #[from]
        source: CoreError,
    },
}

impl DriverError {
    /// Create a timeout error
    pub fn timeout(what: &'static str, cycles: u64) -> Self {
        Self::Timeout { what, cycles }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(
        what: &'static str,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}
