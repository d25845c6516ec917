// SPDX-License-Identifier: AGPL-3.0-only

//! Lane-staggering delay lines at the array edges
//!
//! A [`SkewBuffer`] turns one simultaneous vector into a diagonal wavefront:
//! lane `i` leaves `i` cycles after lane 0. A [`DeskewBuffer`] undoes the
//! stagger on the other side: lane `i` is held `N-1-i` cycles so every lane
//! of one logical vector appears in the same cycle.
//!
//! Both are ragged shift registers. A lane of delay `d` is a FIFO pre-filled
//! with `d` zeros: each tick pushes one value and pops the value pushed `d`
//! ticks earlier. Lanes of delay 0 are combinational.

use std::collections::VecDeque;

/// One delay line of fixed length.
#[derive(Debug, Clone)]
struct DelayLine<T> {
    stages: VecDeque<T>,
}

impl<T: Copy + Default> DelayLine<T> {
    fn new(delay: usize) -> Self {
        Self {
            stages: std::iter::repeat(T::default()).take(delay).collect(),
        }
    }

    /// Shift `value` in and return the value pushed `delay` ticks ago.
    fn shift(&mut self, value: T) -> T {
        self.stages.push_back(value);
        self.stages.pop_front().unwrap_or(value)
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            *stage = T::default();
        }
    }
}

// ── Skew ─────────────────────────────────────────────────────────────────────

/// Input-edge staggering buffer.
///
/// Lane `i` of the output at tick `t` is lane `i` of the vector pushed at
/// tick `t - i`. An invalid push shifts a zero bubble into every lane.
#[derive(Debug, Clone)]
pub struct SkewBuffer<T> {
    lanes: Vec<DelayLine<T>>,
    out: Vec<T>,
}

impl<T: Copy + Default> SkewBuffer<T> {
    /// Create a buffer for `width` lanes.
    pub fn new(width: usize) -> Self {
        Self {
            lanes: (0..width).map(DelayLine::new).collect(),
            out: vec![T::default(); width],
        }
    }

    /// Number of lanes.
    pub fn width(&self) -> usize {
        self.lanes.len()
    }

    /// Advance one cycle and return the staggered output.
    ///
    /// Lanes missing from `input` read as zero.
    pub fn push(&mut self, input: &[T], valid: bool) -> &[T] {
        for (i, (lane, out)) in self.lanes.iter_mut().zip(&mut self.out).enumerate() {
            let value = if valid {
                input.get(i).copied().unwrap_or_default()
            } else {
                T::default()
            };
            *out = lane.shift(value);
        }
        &self.out
    }

    /// Output produced by the last [`push`](Self::push).
    pub fn output(&self) -> &[T] {
        &self.out
    }

    /// Flush every stage to zero.
    pub fn reset(&mut self) {
        self.lanes.iter_mut().for_each(DelayLine::reset);
        self.out.iter_mut().for_each(|v| *v = T::default());
    }
}

// ── Deskew ───────────────────────────────────────────────────────────────────

/// Output-edge realignment buffer.
///
/// `valid` on a push describes the vector whose lane 0 arrives in that
/// cycle; lane `i` of the same vector arrives `i` cycles later and is gated
/// by that same valid bit. `valid_out` asserts `N-1` cycles after a valid
/// push, when the realigned vector is visible on [`output`](Self::output).
#[derive(Debug, Clone)]
pub struct DeskewBuffer<T> {
    lanes: Vec<DelayLine<T>>,
    valid_history: VecDeque<bool>,
    out: Vec<T>,
    valid_out: bool,
}

impl<T: Copy + Default> DeskewBuffer<T> {
    /// Create a buffer for `width` lanes.
    pub fn new(width: usize) -> Self {
        Self {
            lanes: (0..width)
                .map(|i| DelayLine::new(width - 1 - i))
                .collect(),
            valid_history: std::iter::repeat(false).take(width).collect(),
            out: vec![T::default(); width],
            valid_out: false,
        }
    }

    /// Number of lanes.
    pub fn width(&self) -> usize {
        self.lanes.len()
    }

    /// Advance one cycle.
    ///
    /// Lane `i` of `input` is accepted only if the push `i` cycles ago was
    /// valid; otherwise a zero bubble enters that lane.
    pub fn push(&mut self, input: &[T], valid: bool) {
        self.valid_history.pop_back();
        self.valid_history.push_front(valid);

        for (i, (lane, out)) in self.lanes.iter_mut().zip(&mut self.out).enumerate() {
            let value = if self.valid_history[i] {
                input.get(i).copied().unwrap_or_default()
            } else {
                T::default()
            };
            *out = lane.shift(value);
        }
        self.valid_out = self.valid_history.back().copied().unwrap_or(false);
    }

    /// Realigned vector.
    pub fn output(&self) -> &[T] {
        &self.out
    }

    /// The vector on [`output`](Self::output) is a complete valid result.
    pub fn valid_out(&self) -> bool {
        self.valid_out
    }

    /// Flush every stage and the valid pipeline.
    pub fn reset(&mut self) {
        self.lanes.iter_mut().for_each(DelayLine::reset);
        self.valid_history.iter_mut().for_each(|v| *v = false);
        self.out.iter_mut().for_each(|v| *v = T::default());
        self.valid_out = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_diagonal_wavefront() {
        let mut skew = SkewBuffer::<i8>::new(4);
        let first = skew.push(&[10, 20, 30, 40], true).to_vec();
        assert_eq!(first, vec![10, 0, 0, 0]);

        let mut outputs = vec![first];
        for _ in 0..3 {
            outputs.push(skew.push(&[0, 0, 0, 0], false).to_vec());
        }
        assert_eq!(outputs[1], vec![0, 20, 0, 0]);
        assert_eq!(outputs[2], vec![0, 0, 30, 0]);
        assert_eq!(outputs[3], vec![0, 0, 0, 40]);

        assert_eq!(skew.push(&[], false), &[0, 0, 0, 0]);
    }

    #[test]
    fn skew_streams_back_to_back() {
        let mut skew = SkewBuffer::<i8>::new(3);
        skew.push(&[1, 2, 3], true);
        skew.push(&[4, 5, 6], true);
        let out = skew.push(&[7, 8, 9], true);
        // lane i shows the vector pushed i ticks ago
        assert_eq!(out, &[7, 5, 3]);
    }

    #[test]
    fn invalid_push_is_a_bubble() {
        let mut skew = SkewBuffer::<i8>::new(2);
        assert_eq!(skew.push(&[9, 9], false), &[0, 0]);
        assert_eq!(skew.push(&[0, 0], false), &[0, 0]);
    }

    #[test]
    fn deskew_reassembles_staggered_vector() {
        // Lane t of the result arrives at tick t
        let mut deskew = DeskewBuffer::<i32>::new(4);
        let data = [100, 200, 300, 400];
        for t in 0..4 {
            let mut input = [0; 4];
            input[t] = data[t];
            deskew.push(&input, t == 0);
            if t < 3 {
                assert!(!deskew.valid_out(), "valid_out early at tick {t}");
            }
        }
        assert!(deskew.valid_out());
        assert_eq!(deskew.output(), &data);

        deskew.push(&[0; 4], false);
        assert!(!deskew.valid_out());
    }

    #[test]
    fn deskew_valid_pulse_latency() {
        let mut deskew = DeskewBuffer::<i32>::new(4);
        let mut valid_at = None;
        for t in 0..10 {
            deskew.push(&[0; 4], t == 0);
            if deskew.valid_out() {
                assert!(valid_at.is_none(), "valid_out must pulse once");
                valid_at = Some(t);
            }
        }
        assert_eq!(valid_at, Some(3));
    }

    #[test]
    fn deskew_gates_lanes_of_an_invalid_vector() {
        let mut deskew = DeskewBuffer::<i32>::new(2);
        // Valid vector at tick 0, its lane 1 arrives at tick 1 together
        // with lane 0 of an invalid vector.
        deskew.push(&[5, 77], true);
        deskew.push(&[66, 6], false);
        assert!(deskew.valid_out());
        assert_eq!(deskew.output(), &[5, 6]);
    }

    #[test]
    fn skew_then_deskew_is_pure_delay() {
        let n = 4;
        let mut skew = SkewBuffer::<i32>::new(n);
        let mut deskew = DeskewBuffer::<i32>::new(n);
        let vectors: Vec<Vec<i32>> = (0..6).map(|k| (0..4).map(|i| k * 10 + i).collect()).collect();

        let mut seen = Vec::new();
        for t in 0..vectors.len() + n {
            let valid = t < vectors.len();
            let input = if valid { vectors[t].clone() } else { vec![0; n] };
            let mid = skew.push(&input, valid).to_vec();
            deskew.push(&mid, valid);
            if deskew.valid_out() {
                seen.push(deskew.output().to_vec());
            }
        }
        assert_eq!(seen, vectors);
    }

    #[test]
    fn single_lane_is_combinational() {
        let mut skew = SkewBuffer::<i8>::new(1);
        let mut deskew = DeskewBuffer::<i8>::new(1);
        assert_eq!(skew.push(&[3], true), &[3]);
        deskew.push(&[3], true);
        assert!(deskew.valid_out());
        assert_eq!(deskew.output(), &[3]);
    }
}
