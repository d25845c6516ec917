// SPDX-License-Identifier: AGPL-3.0-only

//! Systolic PE grid
//!
//! PEs live in one flat arena indexed `row * cols + col`. Each tick computes
//! every PE's next state from the *current* registers of its west and north
//! neighbours, so data moves exactly one hop per cycle.
//!
//! | Dataflow | West edge | North edge | South edge |
//! |----------|-----------|------------|------------|
//! | Output-stationary | activations | weights | accumulators (dump) |
//! | Weight-stationary | activations | weights (load only) | partial sums |
//!
//! Control has a fixed priority per cycle: clear, then dump, then weight
//! load, then compute.

use qnpu_chip::ArrayGeometry;

use crate::pe::ProcessingElement;

/// Which operand stays resident in the PEs during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dataflow {
    /// Weights and activations both flow; each PE owns one output element.
    #[default]
    OutputStationary,
    /// Weights are preloaded; partial sums flow south.
    WeightStationary,
}

impl std::fmt::Display for Dataflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutputStationary => write!(f, "output-stationary"),
            Self::WeightStationary => write!(f, "weight-stationary"),
        }
    }
}

/// Control and edge inputs for one cycle.
///
/// Edge vectors carry signed 8-bit lanes. Missing lanes read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArraySignals {
    /// Zero every accumulator. Overrides everything else this cycle.
    pub clear_acc: bool,
    /// Rotate accumulators one row south, emitting the bottom row.
    pub dump: bool,
    /// Shift stationary weights one row south, taking row 0 from `north`.
    pub load_weight: bool,
    /// Dataflow of a compute cycle.
    pub dataflow: Dataflow,
    /// West edge, one lane per row.
    pub west: Vec<i8>,
    /// North edge, one lane per column.
    pub north: Vec<i8>,
}

impl ArraySignals {
    /// Compute cycle with the given edges.
    pub fn compute(dataflow: Dataflow, west: &[i8], north: &[i8]) -> Self {
        Self {
            dataflow,
            west: west.to_vec(),
            north: north.to_vec(),
            ..Self::default()
        }
    }

    /// Accumulator clear cycle.
    pub fn clear() -> Self {
        Self {
            clear_acc: true,
            ..Self::default()
        }
    }

    /// Drain cycle.
    pub fn dump() -> Self {
        Self {
            dump: true,
            ..Self::default()
        }
    }

    /// Weight shift cycle with `row` entering at the top.
    pub fn load_weight(row: &[i8]) -> Self {
        Self {
            load_weight: true,
            north: row.to_vec(),
            ..Self::default()
        }
    }
}

fn lane(edge: &[i8], index: usize) -> i8 {
    edge.get(index).copied().unwrap_or(0)
}

/// The PE grid.
#[derive(Debug, Clone)]
pub struct SystolicArray {
    geometry: ArrayGeometry,
    cells: Vec<ProcessingElement>,
}

impl SystolicArray {
    /// Create a grid with every register zeroed.
    pub fn new(geometry: ArrayGeometry) -> Self {
        Self {
            geometry,
            cells: vec![ProcessingElement::default(); geometry.pe_count()],
        }
    }

    /// Grid dimensions.
    pub fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.geometry.cols + col
    }

    /// PE at `(row, col)`.
    pub fn pe(&self, row: usize, col: usize) -> &ProcessingElement {
        &self.cells[self.index(row, col)]
    }

    /// Accumulator at `(row, col)`.
    pub fn accumulator(&self, row: usize, col: usize) -> i32 {
        self.pe(row, col).accumulator()
    }

    /// Every accumulator, row-major.
    pub fn accumulators(&self) -> Vec<Vec<i32>> {
        self.cells
            .chunks(self.geometry.cols)
            .map(|row| row.iter().map(ProcessingElement::accumulator).collect())
            .collect()
    }

    /// Every stationary weight, row-major.
    pub fn weights(&self) -> Vec<Vec<i8>> {
        self.cells
            .chunks(self.geometry.cols)
            .map(|row| row.iter().map(ProcessingElement::weight).collect())
            .collect()
    }

    /// Bottom row of accumulators, the values a dump would emit next.
    pub fn south_edge(&self) -> Vec<i32> {
        self.bottom_row()
    }

    fn bottom_row(&self) -> Vec<i32> {
        let start = self.index(self.geometry.rows - 1, 0);
        self.cells[start..]
            .iter()
            .map(ProcessingElement::accumulator)
            .collect()
    }

    /// Advance one cycle and return the south edge.
    ///
    /// The south edge is the bottom row of accumulators. On a dump cycle it
    /// is the row being drained, captured before the shift.
    pub fn tick(&mut self, signals: &ArraySignals) -> Vec<i32> {
        if signals.clear_acc {
            self.cells.iter_mut().for_each(ProcessingElement::clear);
            return self.bottom_row();
        }
        if signals.dump {
            let south = self.bottom_row();
            self.shift_accumulators_south();
            return south;
        }
        if signals.load_weight {
            self.shift_weights_south(&signals.north);
        } else {
            match signals.dataflow {
                Dataflow::OutputStationary => {
                    self.step_output_stationary(&signals.west, &signals.north);
                }
                Dataflow::WeightStationary => self.step_weight_stationary(&signals.west),
            }
        }
        self.bottom_row()
    }

    // Every update below walks the arena from the last cell to the first.
    // A cell's west (index - 1) and north (index - cols) neighbours come
    // earlier in the arena, so they still hold last cycle's values when
    // the cell reads them.

    fn step_output_stationary(&mut self, west: &[i8], north: &[i8]) {
        let ArrayGeometry { rows, cols } = self.geometry;
        for r in (0..rows).rev() {
            for c in (0..cols).rev() {
                let act_in = if c == 0 {
                    lane(west, r)
                } else {
                    self.pe(r, c - 1).act()
                };
                let weight_in = if r == 0 {
                    lane(north, c)
                } else {
                    self.pe(r - 1, c).weight()
                };
                let i = self.index(r, c);
                self.cells[i].step_output_stationary(act_in, weight_in);
            }
        }
    }

    fn step_weight_stationary(&mut self, west: &[i8]) {
        let ArrayGeometry { rows, cols } = self.geometry;
        for r in (0..rows).rev() {
            for c in (0..cols).rev() {
                let act_in = if c == 0 {
                    lane(west, r)
                } else {
                    self.pe(r, c - 1).act()
                };
                let psum_in = if r == 0 {
                    0
                } else {
                    self.pe(r - 1, c).accumulator()
                };
                let i = self.index(r, c);
                self.cells[i].step_weight_stationary(act_in, psum_in);
            }
        }
    }

    fn shift_weights_south(&mut self, north: &[i8]) {
        let ArrayGeometry { rows, cols } = self.geometry;
        for r in (0..rows).rev() {
            for c in 0..cols {
                let weight = if r == 0 {
                    lane(north, c)
                } else {
                    self.pe(r - 1, c).weight()
                };
                let i = self.index(r, c);
                self.cells[i].load_weight(weight);
            }
        }
    }

    /// The drain chain is circular: the bottom row re-enters at the top,
    /// so `rows` consecutive dumps leave every accumulator where it was.
    fn shift_accumulators_south(&mut self) {
        let ArrayGeometry { rows, cols } = self.geometry;
        let leaving = self.bottom_row();
        for r in (0..rows).rev() {
            for c in 0..cols {
                let value = if r == 0 {
                    leaving[c]
                } else {
                    self.pe(r - 1, c).accumulator()
                };
                let i = self.index(r, c);
                self.cells[i].set_accumulator(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skew::{DeskewBuffer, SkewBuffer};

    /// Feed `a` (rows × k) and `b` (k × cols) through input skew buffers.
    fn run_output_stationary(array: &mut SystolicArray, a: &[Vec<i8>], b: &[Vec<i8>]) {
        let ArrayGeometry { rows, cols } = array.geometry();
        let k = b.len();
        let mut skew_a = SkewBuffer::new(rows);
        let mut skew_w = SkewBuffer::new(cols);
        for t in 0..array.geometry().contraction_cycles(k) {
            let valid = t < k;
            let col: Vec<i8> = if valid { a.iter().map(|row| row[t]).collect() } else { vec![] };
            let row: Vec<i8> = if valid { b[t].clone() } else { vec![] };
            let west = skew_a.push(&col, valid).to_vec();
            let north = skew_w.push(&row, valid).to_vec();
            array.tick(&ArraySignals::compute(Dataflow::OutputStationary, &west, &north));
        }
    }

    fn matmul(a: &[Vec<i8>], b: &[Vec<i8>]) -> Vec<Vec<i32>> {
        a.iter()
            .map(|row| {
                (0..b[0].len())
                    .map(|c| {
                        row.iter()
                            .zip(b)
                            .map(|(&x, brow)| i32::from(x) * i32::from(brow[c]))
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn output_stationary_identity() {
        let mut array = SystolicArray::new(ArrayGeometry::DEVICE);
        let a: Vec<Vec<i8>> = (0..4).map(|r| (0..4).map(|c| (r * 4 + c + 1) as i8).collect()).collect();
        let id: Vec<Vec<i8>> = (0..4).map(|r| (0..4).map(|c| i8::from(r == c)).collect()).collect();
        run_output_stationary(&mut array, &a, &id);
        let expected: Vec<Vec<i32>> = a.iter().map(|r| r.iter().map(|&v| i32::from(v)).collect()).collect();
        assert_eq!(array.accumulators(), expected);
    }

    #[test]
    fn output_stationary_rectangular_contraction() {
        let geometry = ArrayGeometry { rows: 2, cols: 3 };
        let mut array = SystolicArray::new(geometry);
        let a = vec![vec![1, -2, 3, 4, 5], vec![-6, 7, 8, -9, 10]];
        let b = vec![
            vec![1, 2, 3],
            vec![4, -5, 6],
            vec![7, 8, -9],
            vec![10, 11, 12],
            vec![-13, 14, 15],
        ];
        run_output_stationary(&mut array, &a, &b);
        assert_eq!(array.accumulators(), matmul(&a, &b));
    }

    #[test]
    fn dump_emits_bottom_row_first() {
        let mut array = SystolicArray::new(ArrayGeometry::DEVICE);
        let a: Vec<Vec<i8>> = (0..4).map(|r| vec![r as i8 + 1; 1]).collect();
        let b = vec![vec![1, 1, 1, 1]];
        run_output_stationary(&mut array, &a, &b);

        let rows: Vec<Vec<i32>> = (0..4).map(|_| array.tick(&ArraySignals::dump())).collect();
        assert_eq!(rows[0], vec![4; 4]);
        assert_eq!(rows[3], vec![1; 4]);
        // A full drain rotates the grid back into place
        let expected: Vec<Vec<i32>> = (1..=4).map(|v| vec![v; 4]).collect();
        assert_eq!(array.accumulators(), expected);
    }

    #[test]
    fn clear_overrides_compute() {
        let mut array = SystolicArray::new(ArrayGeometry::DEVICE);
        array.tick(&ArraySignals::compute(Dataflow::OutputStationary, &[3; 4], &[3; 4]));
        assert_eq!(array.accumulator(0, 0), 9);
        let mut signals = ArraySignals::compute(Dataflow::OutputStationary, &[3; 4], &[3; 4]);
        signals.clear_acc = true;
        array.tick(&signals);
        assert_eq!(array.accumulators(), vec![vec![0; 4]; 4]);
    }

    #[test]
    fn operands_move_one_hop_per_cycle() {
        let mut array = SystolicArray::new(ArrayGeometry::DEVICE);
        array.tick(&ArraySignals::compute(Dataflow::OutputStationary, &[5, 0, 0, 0], &[7, 0, 0, 0]));
        assert_eq!(array.pe(0, 0).act(), 5);
        assert_eq!(array.pe(0, 1).act(), 0);
        array.tick(&ArraySignals::compute(Dataflow::OutputStationary, &[], &[]));
        assert_eq!(array.pe(0, 1).act(), 5);
        assert_eq!(array.pe(1, 0).weight(), 7);
        assert_eq!(array.pe(0, 2).act(), 0);
    }

    #[test]
    fn weight_load_fills_bottom_first() {
        let mut array = SystolicArray::new(ArrayGeometry::DEVICE);
        for r in (0..4).rev() {
            array.tick(&ArraySignals::load_weight(&[r as i8 * 10; 4]));
        }
        let weights = array.weights();
        for (r, row) in weights.iter().enumerate() {
            assert_eq!(row, &vec![r as i8 * 10; 4]);
        }
    }

    #[test]
    fn weight_stationary_stream_matches_matvec() {
        let geometry = ArrayGeometry::DEVICE;
        let mut array = SystolicArray::new(geometry);
        let w: Vec<Vec<i8>> = (0..4)
            .map(|r| (0..4).map(|c| (r as i8 - c as i8) * 3).collect())
            .collect();
        for r in (0..4).rev() {
            array.tick(&ArraySignals::load_weight(&w[r]));
        }

        let xs: Vec<Vec<i8>> = (0..5).map(|n| (0..4).map(|r| (n + r) as i8 - 3).collect()).collect();
        let mut skew = SkewBuffer::new(4);
        let mut deskew = DeskewBuffer::new(4);
        let mut valid_line = std::collections::VecDeque::from(vec![false; geometry.rows - 1]);
        let mut results = Vec::new();
        for t in 0..xs.len() + geometry.fill_latency() + 1 {
            let valid = t < xs.len();
            let input = if valid { xs[t].clone() } else { vec![] };
            let west = skew.push(&input, valid).to_vec();
            let south = array.tick(&ArraySignals::compute(Dataflow::WeightStationary, &west, &[]));
            valid_line.push_back(valid);
            let delayed = valid_line.pop_front().unwrap();
            deskew.push(&south, delayed);
            if deskew.valid_out() {
                results.push(deskew.output().to_vec());
            }
        }

        let expected: Vec<Vec<i32>> = xs
            .iter()
            .map(|x| {
                (0..4)
                    .map(|c| (0..4).map(|r| i32::from(x[r]) * i32::from(w[r][c])).sum())
                    .collect()
            })
            .collect();
        assert_eq!(results, expected);
        // Weights stay resident
        assert_eq!(array.weights(), w);
    }
}
