// SPDX-License-Identifier: AGPL-3.0-only

//! Host-side view of the quantization registers

use qnpu_chip::regs::quant;
use qnpu_chip::LANES;
use rand::Rng;

/// Everything written to `QUANT_CFG`, `QUANT_MULT` and the bias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantParams {
    /// Fixed-point multiplier
    pub mult: i32,
    /// Right shift, 0..=31
    pub shift: u8,
    /// Added after scaling
    pub zero_point: i8,
    /// Clamp negatives to zero
    pub relu: bool,
    /// Per-output-lane bias
    pub bias: [i32; LANES],
}

impl Default for QuantParams {
    fn default() -> Self {
        Self::PASSTHROUGH
    }
}

impl QuantParams {
    /// Multiplier 1, everything else zero: outputs are saturated accumulators.
    pub const PASSTHROUGH: Self = Self {
        mult: 1,
        shift: 0,
        zero_point: 0,
        relu: false,
        bias: [0; LANES],
    };

    /// Replace the bias table.
    #[must_use]
    pub fn with_bias(mut self, bias: [i32; LANES]) -> Self {
        self.bias = bias;
        self
    }

    /// Bias table from a slice, zero-padded past its end.
    #[must_use]
    pub fn with_bias_slice(mut self, bias: &[i32]) -> Self {
        self.bias = [0; LANES];
        for (slot, b) in self.bias.iter_mut().zip(bias) {
            *slot = *b;
        }
        self
    }

    /// Packed `QUANT_CFG` word.
    pub fn cfg_word(&self) -> u32 {
        quant::pack(self.shift, self.zero_point, self.relu)
    }

    /// Random parameters in the stress-test ranges: multiplier 1..=10,
    /// shift 0..=3, zero point -5..=5, bias -20..=20.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut bias = [0; LANES];
        for b in &mut bias {
            *b = rng.gen_range(-20..=20);
        }
        Self {
            mult: rng.gen_range(1..=10),
            shift: rng.gen_range(0..=3),
            zero_point: rng.gen_range(-5..=5),
            relu: false,
            bias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_bias_slice_is_padded() {
        let q = QuantParams::default().with_bias_slice(&[5, -6]);
        assert_eq!(q.bias, [5, -6, 0, 0]);
    }

    #[test]
    fn test_cfg_word_layout() {
        let q = QuantParams {
            shift: 3,
            zero_point: -1,
            ..QuantParams::default()
        };
        assert_eq!(q.cfg_word(), 0xFF03);
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let q = QuantParams::random(&mut rng);
            assert!((1..=10).contains(&q.mult));
            assert!(q.shift <= 3);
            assert!((-5..=5).contains(&q.zero_point));
            assert!(q.bias.iter().all(|b| (-20..=20).contains(b)));
        }
    }
}
