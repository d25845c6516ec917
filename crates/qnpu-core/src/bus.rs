// SPDX-License-Identifier: AGPL-3.0-only

//! Narrow register bus
//!
//! One 32-bit request per transaction. The device answers with `ready`
//! exactly once per accepted request; a request answered with
//! `ready == false` was not accepted and must be presented again.

/// A single register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRequest {
    /// Register byte offset
    pub addr: u32,
    /// Write data (ignored on reads)
    pub data: u32,
    /// Write when `true`, read otherwise
    pub write: bool,
}

impl BusRequest {
    /// Read request.
    pub const fn read(addr: u32) -> Self {
        Self {
            addr,
            data: 0,
            write: false,
        }
    }

    /// Write request.
    pub const fn write(addr: u32, data: u32) -> Self {
        Self {
            addr,
            data,
            write: true,
        }
    }
}

/// The device's answer for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusResponse {
    /// The request was accepted this cycle
    pub ready: bool,
    /// Read data (0 on writes)
    pub data: u32,
}

impl BusResponse {
    pub(crate) const STALL: Self = Self {
        ready: false,
        data: 0,
    };

    pub(crate) const fn ack(data: u32) -> Self {
        Self { ready: true, data }
    }
}
