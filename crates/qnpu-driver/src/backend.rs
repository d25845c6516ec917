// SPDX-License-Identifier: AGPL-3.0-only

//! Register bus abstraction
//!
//! The driver speaks only 32-bit register reads and writes. Anything that
//! can carry them (the cycle model, a tracing wrapper around it, or a real
//! memory-mapped device) implements [`RegisterBus`].

use crate::error::Result;
use std::fmt::Debug;

/// A transport for 32-bit register accesses.
pub trait RegisterBus: Debug {
    /// Write one register. Returns once the device accepted the write.
    ///
    /// # Errors
    ///
    /// Returns error if the device does not accept the write in time.
    fn write32(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Read one register.
    ///
    /// # Errors
    ///
    /// Returns error if the device does not answer in time.
    fn read32(&mut self, addr: u32) -> Result<u32>;

    /// Let `cycles` clock cycles pass without a transaction.
    fn idle(&mut self, cycles: u64);

    /// Device cycles elapsed so far.
    fn cycles(&self) -> u64;

    /// Backend type for diagnostics
    fn backend_type(&self) -> BackendType;
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendType {
    /// Cycle-accurate software model of the device
    Simulator,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulator => write!(f, "Simulator (cycle model)"),
        }
    }
}
