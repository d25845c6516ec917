// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration registers and command decoding
//!
//! Configuration registers can only be written through a [`ConfigWriter`],
//! and a writer can only be obtained while the busy lock is free. A run in
//! flight therefore cannot observe a configuration change: the lock is a
//! property of the types, not a check scattered through the datapath.

use qnpu_chip::regs::{self, cmd, quant};
use qnpu_chip::LANES;

use crate::error::CommandError;
use crate::ppu::QuantizationConfig;
use crate::staging::PointerResets;

// ── Commands ─────────────────────────────────────────────────────────────────

/// Decoded `CMD` word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags(u32);

impl CommandFlags {
    /// Wrap a raw command word.
    pub const fn from_bits(word: u32) -> Self {
        Self(word)
    }

    /// Raw command word.
    pub const fn bits(self) -> u32 {
        self.0
    }

    const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Start a run.
    pub const fn start(self) -> bool {
        self.has(cmd::START)
    }

    /// Zero the accumulators.
    pub const fn clear_acc(self) -> bool {
        self.has(cmd::ACC_CLEAR)
    }

    /// Drain the accumulators without computing.
    pub const fn dump(self) -> bool {
        self.has(cmd::DUMP)
    }

    /// Weight-stationary run.
    pub const fn load_mode(self) -> bool {
        self.has(cmd::LOAD_MODE)
    }

    /// `true` for a zero word.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Staging pointers this command rewinds.
    pub const fn pointer_resets(self) -> PointerResets {
        let all = self.has(cmd::RST_DMA_PTRS);
        PointerResets {
            weight_write: all || self.has(cmd::RST_W_WR),
            weight_read: all || self.has(cmd::RST_W_RD),
            act_write: all || self.has(cmd::RST_A_WR),
            act_read: all || self.has(cmd::RST_A_RD),
        }
    }

    /// Reject undefined bits and illegal combinations.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(self) -> Result<Self, CommandError> {
        let undefined = self.0 & !cmd::MASK;
        if undefined != 0 {
            return Err(CommandError::UndefinedBits { bits: undefined });
        }
        if self.load_mode() && self.dump() {
            return Err(CommandError::LoadWithDump);
        }
        if self.start() && self.dump() {
            return Err(CommandError::StartWithDump);
        }
        if self.load_mode() && !self.start() {
            return Err(CommandError::LoadWithoutStart);
        }
        Ok(self)
    }
}

// ── Busy lock ────────────────────────────────────────────────────────────────

/// Whether configuration writes may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyLock {
    /// No run in flight
    Free,
    /// A run is computing or draining
    Held,
}

// ── Register file ────────────────────────────────────────────────────────────

/// Host-visible configuration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    run_length: u32,
    quant_cfg: u32,
    quant_mult: i32,
    bias: [i32; LANES],
    last_cmd: u32,
}

impl Default for RegisterFile {
    /// Reset values select a passthrough PPU: multiplier 1, everything else 0.
    fn default() -> Self {
        Self {
            run_length: 0,
            quant_cfg: 0,
            quant_mult: 1,
            bias: [0; LANES],
            last_cmd: 0,
        }
    }
}

impl RegisterFile {
    /// Latched run length.
    pub fn run_length(&self) -> u32 {
        self.run_length
    }

    /// Latched `QUANT_CFG` word.
    pub fn quant_cfg(&self) -> u32 {
        self.quant_cfg
    }

    /// Latched multiplier.
    pub fn quant_mult(&self) -> i32 {
        self.quant_mult
    }

    /// Bias of output lane `lane` (0 past the table).
    pub fn bias(&self, lane: usize) -> i32 {
        self.bias.get(lane).copied().unwrap_or(0)
    }

    /// Last accepted command word.
    pub fn last_command(&self) -> u32 {
        self.last_cmd
    }

    /// Per-lane PPU configs for `width` output lanes.
    pub fn quantization(&self, width: usize) -> Vec<QuantizationConfig> {
        (0..width)
            .map(|lane| {
                QuantizationConfig::from_registers(self.bias(lane), self.quant_mult, self.quant_cfg)
            })
            .collect()
    }

    /// Read a configuration register. `None` for addresses this file does
    /// not back.
    pub fn read(&self, addr: u32) -> Option<u32> {
        match addr {
            regs::CMD => Some(self.last_cmd),
            regs::RUN_LENGTH => Some(self.run_length),
            regs::QUANT_CFG => Some(self.quant_cfg),
            regs::QUANT_MULT => Some(self.quant_mult as u32),
            _ => regs::bias_lane(addr).map(|lane| self.bias[lane] as u32),
        }
    }

    /// Gain write access to the configuration registers. Returns `None`
    /// while the lock is held.
    pub fn writer(&mut self, lock: BusyLock) -> Option<ConfigWriter<'_>> {
        match lock {
            BusyLock::Free => Some(ConfigWriter { regs: self }),
            BusyLock::Held => None,
        }
    }

    pub(crate) fn record_command(&mut self, flags: CommandFlags) {
        self.last_cmd = flags.bits();
    }
}

/// Write capability for busy-locked configuration registers.
#[derive(Debug)]
pub struct ConfigWriter<'a> {
    regs: &'a mut RegisterFile,
}

impl ConfigWriter<'_> {
    /// Set the run length.
    pub fn set_run_length(&mut self, value: u32) {
        self.regs.run_length = value;
    }

    /// Set the `QUANT_CFG` word. Undefined bits are dropped.
    pub fn set_quant_cfg(&mut self, word: u32) {
        self.regs.quant_cfg = word & (quant::SHIFT_MASK | (0xFF << quant::ZERO_SHIFT) | quant::RELU);
    }

    /// Set the multiplier.
    pub fn set_quant_mult(&mut self, mult: i32) {
        self.regs.quant_mult = mult;
    }

    /// Set one bias entry. Out-of-range lanes are ignored.
    pub fn set_bias(&mut self, lane: usize, bias: i32) {
        if let Some(slot) = self.regs.bias.get_mut(lane) {
            *slot = bias;
        }
    }

    /// Route a bus write by address. Returns `false` if `addr` is not a
    /// configuration register.
    pub fn write(&mut self, addr: u32, data: u32) -> bool {
        match addr {
            regs::RUN_LENGTH => self.set_run_length(data),
            regs::QUANT_CFG => self.set_quant_cfg(data),
            regs::QUANT_MULT => self.set_quant_mult(data as i32),
            _ => match regs::bias_lane(addr) {
                Some(lane) => self.set_bias(lane, data as i32),
                None => return false,
            },
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_decoding() {
        let c = CommandFlags::from_bits(cmd::START | cmd::RST_W_RD | cmd::RST_A_RD | cmd::ACC_CLEAR);
        assert!(c.start());
        assert!(c.clear_acc());
        assert!(!c.dump());
        let r = c.pointer_resets();
        assert!(r.weight_read && r.act_read);
        assert!(!r.weight_write && !r.act_write);
    }

    #[test]
    fn dma_reset_covers_all_pointers() {
        let c = CommandFlags::from_bits(cmd::RST_DMA_PTRS);
        assert_eq!(c.pointer_resets(), PointerResets::ALL);
        assert!(CommandFlags::default().pointer_resets().is_empty());
    }

    #[test]
    fn illegal_combinations_rejected() {
        let check = |bits| CommandFlags::from_bits(bits).validate();
        assert_eq!(check(cmd::LOAD_MODE | cmd::DUMP), Err(CommandError::LoadWithDump));
        assert_eq!(check(cmd::START | cmd::DUMP), Err(CommandError::StartWithDump));
        assert_eq!(check(cmd::LOAD_MODE), Err(CommandError::LoadWithoutStart));
        assert_eq!(
            check(1 << 20),
            Err(CommandError::UndefinedBits { bits: 1 << 20 })
        );
        assert!(check(cmd::START | cmd::LOAD_MODE).is_ok());
        assert!(check(0).is_ok());
    }

    #[test]
    fn writer_denied_while_busy() {
        let mut regs = RegisterFile::default();
        assert!(regs.writer(BusyLock::Held).is_none());
        let mut w = regs.writer(BusyLock::Free).unwrap();
        w.set_run_length(16);
        assert_eq!(regs.run_length(), 16);
    }

    #[test]
    fn bus_write_routing() {
        let mut regs = RegisterFile::default();
        let mut w = regs.writer(BusyLock::Free).unwrap();
        assert!(w.write(regs::QUANT_MULT, (-3i32) as u32));
        assert!(w.write(regs::bias(2), 40));
        assert!(w.write(regs::QUANT_CFG, 0xFFFF_FFFF));
        assert!(!w.write(regs::STATUS, 1));
        assert_eq!(regs.quant_mult(), -3);
        assert_eq!(regs.bias(2), 40);
        assert_eq!(regs.quant_cfg(), 0x1_FF1F);
        assert_eq!(regs.read(regs::bias(2)), Some(40));
        assert_eq!(regs.read(regs::STATUS), None);
    }

    #[test]
    fn quantization_per_lane() {
        let mut regs = RegisterFile::default();
        {
            let mut w = regs.writer(BusyLock::Free).unwrap();
            w.set_quant_cfg(quant::pack(2, -1, true));
            w.set_quant_mult(5);
            w.set_bias(1, 7);
        }
        let q = regs.quantization(4);
        assert_eq!(q.len(), 4);
        assert_eq!(q[1].bias, 7);
        assert_eq!(q[0].bias, 0);
        assert!(q.iter().all(|c| c.mult == 5 && c.shift == 2 && c.zero_point == -1 && c.relu));
    }
}
