// SPDX-License-Identifier: AGPL-3.0-only

//! Post-processing unit: 32-bit accumulators to signed 8-bit outputs
//!
//! Per lane, in this exact order:
//!
//! 1. add the lane bias
//! 2. multiply by the fixed-point multiplier
//! 3. arithmetic right shift with round-half-up (add `2^(shift-1)` first)
//! 4. add the zero point
//! 5. optional ReLU
//! 6. saturate to `-128..=127`
//!
//! Intermediates are widened so no step can overflow: the bias sum needs
//! 33 bits and the product 65.

use qnpu_chip::regs::quant;

/// Quantization parameters of one output lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationConfig {
    /// Added to the accumulator before scaling
    pub bias: i32,
    /// Fixed-point multiplier
    pub mult: i32,
    /// Right shift, 0..=31
    pub shift: u8,
    /// Added after scaling
    pub zero_point: i8,
    /// Clamp negatives to zero before saturation
    pub relu: bool,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self::PASSTHROUGH
    }
}

impl QuantizationConfig {
    /// Identity scaling: outputs equal accumulators saturated to 8 bits.
    pub const PASSTHROUGH: Self = Self {
        bias: 0,
        mult: 1,
        shift: 0,
        zero_point: 0,
        relu: false,
    };

    /// Build a lane config from register values. The shift is truncated to
    /// its 5-bit field.
    pub fn from_registers(bias: i32, mult: i32, cfg_word: u32) -> Self {
        let (shift, zero_point, relu) = quant::unpack(cfg_word);
        Self {
            bias,
            mult,
            shift,
            zero_point,
            relu,
        }
    }
}

/// Requantize one accumulator.
pub fn requantize(acc: i32, cfg: &QuantizationConfig) -> i8 {
    let biased = i64::from(acc) + i64::from(cfg.bias);
    let mut v = i128::from(biased) * i128::from(cfg.mult);
    let shift = u32::from(cfg.shift & quant::SHIFT_MASK as u8);
    if shift > 0 {
        v = (v + (1i128 << (shift - 1))) >> shift;
    }
    v += i128::from(cfg.zero_point);
    if cfg.relu && v < 0 {
        v = 0;
    }
    v.clamp(i128::from(i8::MIN), i128::from(i8::MAX)) as i8
}

/// Lane-parallel requantizer with latched per-lane configs.
///
/// The unit is pure: lane `i` of the output depends only on lane `i` of the
/// input and the config latched for lane `i`.
#[derive(Debug, Clone)]
pub struct PostProcessingUnit {
    lanes: Vec<QuantizationConfig>,
}

impl PostProcessingUnit {
    /// Create a unit of `width` lanes, all passthrough.
    pub fn new(width: usize) -> Self {
        Self {
            lanes: vec![QuantizationConfig::PASSTHROUGH; width],
        }
    }

    /// Latch new per-lane configs. Lanes beyond `configs` keep theirs.
    pub fn latch(&mut self, configs: &[QuantizationConfig]) {
        for (lane, cfg) in self.lanes.iter_mut().zip(configs) {
            *lane = *cfg;
        }
    }

    /// Currently latched configs.
    pub fn configs(&self) -> &[QuantizationConfig] {
        &self.lanes
    }

    /// Requantize one vector of accumulators.
    pub fn process(&self, accs: &[i32]) -> Vec<i8> {
        accs.iter()
            .zip(&self.lanes)
            .map(|(&acc, cfg)| requantize(acc, cfg))
            .collect()
    }
}
