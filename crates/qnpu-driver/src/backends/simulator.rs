// SPDX-License-Identifier: AGPL-3.0-only

//! Simulator backend
//!
//! Presents each register access to the cycle model and keeps it on the
//! bus, one clock per attempt, until the device answers `ready`. An
//! attempt budget turns a stuck handshake (ingress backpressure that never
//! clears) into a [`DriverError::Timeout`] instead of a hang.

use qnpu_core::{BusRequest, Npu, NpuConfig};
use tracing::debug;

use crate::backend::{BackendType, RegisterBus};
use crate::error::{DriverError, Result};

/// Register bus backed by an in-process [`Npu`].
#[derive(Debug, Clone)]
pub struct SimulatorBus {
    npu: Npu,
    timeout_cycles: u64,
}

impl SimulatorBus {
    /// Build a device model and attach to it.
    ///
    /// # Errors
    ///
    /// Returns error if `config` is not a valid device.
    pub fn new(config: NpuConfig, timeout_cycles: u64) -> Result<Self> {
        let npu = Npu::new(config)?;
        debug!("Simulator bus attached, {timeout_cycles}-cycle transaction timeout");
        Ok(Self {
            npu,
            timeout_cycles: timeout_cycles.max(1),
        })
    }

    /// Default device with the given transaction timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the default device cannot be built.
    pub fn with_defaults(timeout_cycles: u64) -> Result<Self> {
        Self::new(NpuConfig::default(), timeout_cycles)
    }

    /// The device model.
    pub fn npu(&self) -> &Npu {
        &self.npu
    }

    fn transact(&mut self, request: BusRequest) -> Result<u32> {
        for _ in 0..self.timeout_cycles {
            let response = self.npu.tick(Some(request));
            if response.ready {
                return Ok(response.data);
            }
        }
        Err(DriverError::timeout(
            if request.write { "write ready" } else { "read ready" },
            self.timeout_cycles,
        ))
    }
}

impl RegisterBus for SimulatorBus {
    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        self.transact(BusRequest::write(addr, value)).map(|_| ())
    }

    fn read32(&mut self, addr: u32) -> Result<u32> {
        self.transact(BusRequest::read(addr))
    }

    fn idle(&mut self, cycles: u64) {
        self.npu.idle(cycles);
    }

    fn cycles(&self) -> u64 {
        self.npu.cycle()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Simulator
    }
}
