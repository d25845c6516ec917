// SPDX-License-Identifier: AGPL-3.0-only

//! Transaction-counting bus wrapper.

use qnpu_chip::regs;
use tracing::trace;

use crate::backend::{BackendType, RegisterBus};
use crate::error::Result;

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Register writes
    pub writes: u64,
    /// Register reads
    pub reads: u64,
    /// Reads of `STATUS` (polling overhead)
    pub status_polls: u64,
    /// Words pushed into the staging ports
    pub staged_words: u64,
    /// Words popped from `READ_OUT`
    pub output_words: u64,
}

/// Wraps a bus and records every transaction.
#[derive(Debug)]
pub struct TracedBus<B> {
    inner: B,
    stats: BusStats,
}

impl<B: RegisterBus> TracedBus<B> {
    /// Wrap `inner`.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: BusStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Unwrap.
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: RegisterBus> RegisterBus for TracedBus<B> {
    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        trace!("W {addr:#06x} <- {value:#010x}");
        self.inner.write32(addr, value)?;
        self.stats.writes += 1;
        if matches!(addr, regs::WRITE_W | regs::WRITE_A) {
            self.stats.staged_words += 1;
        }
        Ok(())
    }

    fn read32(&mut self, addr: u32) -> Result<u32> {
        let value = self.inner.read32(addr)?;
        trace!("R {addr:#06x} -> {value:#010x}");
        self.stats.reads += 1;
        match addr {
            regs::STATUS => self.stats.status_polls += 1,
            regs::READ_OUT => self.stats.output_words += 1,
            _ => {}
        }
        Ok(value)
    }

    fn idle(&mut self, cycles: u64) {
        self.inner.idle(cycles);
    }

    fn cycles(&self) -> u64 {
        self.inner.cycles()
    }

    fn backend_type(&self) -> BackendType {
        self.inner.backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatorBus;

    #[test]
    fn test_counts_by_register() {
        let mut bus = TracedBus::new(SimulatorBus::with_defaults(8).unwrap());
        bus.write32(regs::WRITE_W, 1).unwrap();
        bus.write32(regs::RUN_LENGTH, 1).unwrap();
        bus.read32(regs::STATUS).unwrap();
        bus.read32(regs::READ_OUT).unwrap();
        assert_eq!(
            bus.stats(),
            BusStats {
                writes: 2,
                reads: 2,
                status_polls: 1,
                staged_words: 1,
                output_words: 1,
            }
        );
        assert_eq!(bus.backend_type(), BackendType::Simulator);
    }
}
