// SPDX-License-Identifier: AGPL-3.0-only

//! Register map of the NPU control block.
//!
//! One register bank, 32-bit registers, byte offsets. Every register is
//! reached over the narrow request/ready bus; there is no second address
//! space.
//!
//! ```text
//! 0x00  STATUS       R    busy / done / input-full / output-valid
//! 0x04  CMD          W    pointer resets, start, clear, dump, load-mode
//! 0x08  RUN_LENGTH   RW   contraction depth K (busy-locked)
//! 0x0C  GEOMETRY     R    rows, cols, staging depth
//! 0x10  WRITE_W      W    weight staging port
//! 0x14  WRITE_A      W    activation staging port
//! 0x18  READ_OUT     R    output queue pop
//! 0x20  W_PTRS       R    weight staging write/read pointers
//! 0x24  A_PTRS       R    activation staging write/read pointers
//! 0x40  QUANT_CFG    RW   shift, zero point, relu (busy-locked)
//! 0x44  QUANT_MULT   RW   fixed-point multiplier (busy-locked)
//! 0x80  BIAS[0..4]   RW   per-lane bias table (busy-locked)
//! ```

// ── Status and control ───────────────────────────────────────────────────────

/// Status register.
pub const STATUS: u32 = 0x00;

/// Command register. Writing executes the set bits once.
pub const CMD: u32 = 0x04;

/// Run length: contraction depth (output-stationary) or vector count
/// (weight-stationary).
pub const RUN_LENGTH: u32 = 0x08;

/// Read-only geometry word, see [`geometry_word`](crate::geometry::ArrayGeometry::geometry_word).
pub const GEOMETRY: u32 = 0x0C;

// ── Data ports ───────────────────────────────────────────────────────────────

/// Weight staging port. One word = one weight row of 4 packed lanes.
pub const WRITE_W: u32 = 0x10;
/// Activation staging port. One word = one activation column of 4 packed lanes.
pub const WRITE_A: u32 = 0x14;
/// Output port. Each read pops one quantized row from the output queue.
pub const READ_OUT: u32 = 0x18;

/// Weight staging pointers: write pointer [15:0], read pointer [31:16].
pub const W_PTRS: u32 = 0x20;
/// Activation staging pointers: write pointer [15:0], read pointer [31:16].
pub const A_PTRS: u32 = 0x24;

// ── Quantization ─────────────────────────────────────────────────────────────

/// Packed quantization config, see [`quant`].
pub const QUANT_CFG: u32 = 0x40;
/// Signed 32-bit fixed-point multiplier.
pub const QUANT_MULT: u32 = 0x44;
/// First entry of the per-lane bias table.
pub const BIAS_BASE: u32 = 0x80;
/// Stride between bias entries.
pub const BIAS_STRIDE: u32 = 4;
/// Number of bias entries (one per output lane).
pub const BIAS_COUNT: u32 = crate::lanes::LANES as u32;

/// Offset of bias entry `lane`.
#[must_use]
pub const fn bias(lane: u32) -> u32 {
    BIAS_BASE + lane * BIAS_STRIDE
}

/// Lane index if `addr` falls inside the bias table.
#[must_use]
pub const fn bias_lane(addr: u32) -> Option<usize> {
    if addr >= BIAS_BASE
        && addr < BIAS_BASE + BIAS_COUNT * BIAS_STRIDE
        && (addr - BIAS_BASE) % BIAS_STRIDE == 0
    {
        Some(((addr - BIAS_BASE) / BIAS_STRIDE) as usize)
    } else {
        None
    }
}

/// Registers whose writes are dropped while the device is busy.
#[must_use]
pub const fn is_busy_locked(addr: u32) -> bool {
    matches!(addr, RUN_LENGTH | QUANT_CFG | QUANT_MULT | WRITE_W | WRITE_A)
        || bias_lane(addr).is_some()
}

// ── Status register bit definitions ──────────────────────────────────────────

/// Status register bits.
pub mod status {
    /// A run is in flight (running or draining).
    pub const BUSY: u32 = 1 << 0;
    /// The last run finished computing; all results are in the output queue.
    pub const DONE: u32 = 1 << 1;
    /// A staging port cannot accept another word.
    pub const INPUT_FULL: u32 = 1 << 2;
    /// The output queue holds at least one word.
    pub const OUTPUT_VALID: u32 = 1 << 3;
}

// ── Command register bit definitions ─────────────────────────────────────────

/// Command register bits.
pub mod cmd {
    /// Reset all four staging pointers.
    pub const RST_DMA_PTRS: u32 = 1 << 0;
    /// Start a run with the latched run length.
    pub const START: u32 = 1 << 1;
    /// Zero every accumulator.
    pub const ACC_CLEAR: u32 = 1 << 2;
    /// Drain the current accumulators through the PPU (idle only).
    pub const DUMP: u32 = 1 << 3;
    /// Reset the weight read pointer.
    pub const RST_W_RD: u32 = 1 << 4;
    /// Reset the activation read pointer.
    pub const RST_A_RD: u32 = 1 << 5;
    /// Reset the weight write pointer.
    pub const RST_W_WR: u32 = 1 << 6;
    /// Reset the activation write pointer.
    pub const RST_A_WR: u32 = 1 << 7;
    /// Run weight-stationary: shift weights in, then stream activations.
    pub const LOAD_MODE: u32 = 1 << 8;

    /// Every defined bit.
    pub const MASK: u32 = RST_DMA_PTRS
        | START
        | ACC_CLEAR
        | DUMP
        | RST_W_RD
        | RST_A_RD
        | RST_W_WR
        | RST_A_WR
        | LOAD_MODE;
}

// ── Quantization config packing ──────────────────────────────────────────────

/// `QUANT_CFG` word layout.
pub mod quant {
    /// Right-shift amount, 5 bits.
    pub const SHIFT_MASK: u32 = 0x1F;
    /// Zero point, signed 8 bits.
    pub const ZERO_SHIFT: u32 = 8;
    /// Rectification enable.
    pub const RELU: u32 = 1 << 16;

    /// Pack shift, zero point and relu into a `QUANT_CFG` word.
    #[must_use]
    pub const fn pack(shift: u8, zero_point: i8, relu: bool) -> u32 {
        let mut word = (shift as u32) & SHIFT_MASK;
        word |= ((zero_point as u8) as u32) << ZERO_SHIFT;
        if relu {
            word |= RELU;
        }
        word
    }

    /// Unpack a `QUANT_CFG` word.
    #[must_use]
    pub const fn unpack(word: u32) -> (u8, i8, bool) {
        let shift = (word & SHIFT_MASK) as u8;
        let zero = ((word >> ZERO_SHIFT) & 0xFF) as u8 as i8;
        (shift, zero, word & RELU != 0)
    }
}

/// Pack a write/read pointer pair into a `W_PTRS`/`A_PTRS` word.
#[must_use]
pub const fn pack_ptrs(write: usize, read: usize) -> u32 {
    ((write as u32) & 0xFFFF) | (((read as u32) & 0xFFFF) << 16)
}

/// Unpack a `W_PTRS`/`A_PTRS` word into `(write, read)`.
#[must_use]
pub const fn unpack_ptrs(word: u32) -> (usize, usize) {
    ((word & 0xFFFF) as usize, (word >> 16) as usize)
}
