// SPDX-License-Identifier: AGPL-3.0-only

//! Driver tuning knobs

/// Limits and pacing for host-side polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Cycles a single bus transaction may wait for `ready`
    pub transaction_timeout_cycles: u64,

    /// Status polls before a wait gives up
    pub poll_limit: u64,

    /// Idle cycles inserted before every output read (models a slow host)
    pub read_delay_cycles: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_cycles: 64,
            poll_limit: 100_000,
            read_delay_cycles: 0,
        }
    }
}

impl DriverConfig {
    /// Set the per-transaction timeout.
    #[must_use]
    pub fn with_transaction_timeout(mut self, cycles: u64) -> Self {
        self.transaction_timeout_cycles = cycles;
        self
    }

    /// Set the status poll limit.
    #[must_use]
    pub fn with_poll_limit(mut self, polls: u64) -> Self {
        self.poll_limit = polls;
        self
    }

    /// Set the read pacing delay.
    #[must_use]
    pub fn with_read_delay(mut self, cycles: u64) -> Self {
        self.read_delay_cycles = cycles;
        self
    }
}
