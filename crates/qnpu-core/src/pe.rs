// SPDX-License-Identifier: AGPL-3.0-only

//! Processing element
//!
//! One multiply-accumulate cell. Operands are signed 8-bit, the accumulator
//! is a signed 32-bit register that wraps on overflow. The cell holds no
//! references to its neighbours: the array reads a neighbour's registers
//! by index and passes the values in.

/// Registers of one PE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingElement {
    weight: i8,
    accumulator: i32,
    act: i8,
}

impl ProcessingElement {
    /// Stationary (weight-stationary) or passing (output-stationary) weight.
    pub fn weight(&self) -> i8 {
        self.weight
    }

    /// Accumulator or partial sum.
    pub fn accumulator(&self) -> i32 {
        self.accumulator
    }

    /// Activation register forwarded east.
    pub fn act(&self) -> i8 {
        self.act
    }

    /// Accumulator input plus `act · weight`, wrapping.
    fn mac(base: i32, act: i8, weight: i8) -> i32 {
        base.wrapping_add(i32::from(act) * i32::from(weight))
    }

    /// Output-stationary step: latch both operands for forwarding and
    /// accumulate locally.
    pub fn step_output_stationary(&mut self, act_in: i8, weight_in: i8) {
        self.accumulator = Self::mac(self.accumulator, act_in, weight_in);
        self.act = act_in;
        self.weight = weight_in;
    }

    /// Weight-stationary step: add this cell's product to the partial sum
    /// from the north and latch the activation for forwarding.
    pub fn step_weight_stationary(&mut self, act_in: i8, psum_in: i32) {
        self.accumulator = Self::mac(psum_in, act_in, self.weight);
        self.act = act_in;
    }

    /// Latch a new stationary weight.
    pub fn load_weight(&mut self, weight: i8) {
        self.weight = weight;
    }

    /// Overwrite the accumulator (used by the drain shift).
    pub fn set_accumulator(&mut self, value: i32) {
        self.accumulator = value;
    }

    /// Zero the accumulator. Weight and activation registers are kept.
    pub fn clear(&mut self) {
        self.accumulator = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stationary_accumulates() {
        let mut pe = ProcessingElement::default();
        pe.step_output_stationary(3, 4);
        pe.step_output_stationary(-2, 5);
        assert_eq!(pe.accumulator(), 2);
        assert_eq!(pe.act(), -2);
        assert_eq!(pe.weight(), 5);
    }

    #[test]
    fn weight_stationary_uses_psum_not_self() {
        let mut pe = ProcessingElement::default();
        pe.load_weight(-7);
        pe.step_weight_stationary(2, 100);
        assert_eq!(pe.accumulator(), 86);
        pe.step_weight_stationary(1, 0);
        assert_eq!(pe.accumulator(), -7);
        assert_eq!(pe.weight(), -7);
    }

    #[test]
    fn extreme_operands_do_not_overflow_product() {
        let mut pe = ProcessingElement::default();
        pe.step_output_stationary(i8::MIN, i8::MIN);
        assert_eq!(pe.accumulator(), 16384);
    }

    #[test]
    fn accumulator_wraps() {
        let mut pe = ProcessingElement::default();
        pe.set_accumulator(i32::MAX);
        pe.step_output_stationary(1, 1);
        assert_eq!(pe.accumulator(), i32::MIN);
    }

    #[test]
    fn clear_keeps_weight() {
        let mut pe = ProcessingElement::default();
        pe.load_weight(9);
        pe.step_weight_stationary(1, 1);
        pe.clear();
        assert_eq!(pe.accumulator(), 0);
        assert_eq!(pe.weight(), 9);
    }
}
