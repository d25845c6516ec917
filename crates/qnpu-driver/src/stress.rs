// SPDX-License-Identifier: AGPL-3.0-only

//! Randomized device-vs-reference checking
//!
//! Each iteration draws a full 4×K · K×4 problem with random quantization
//! parameters, runs it on the device and compares every output byte against
//! [`reference::quantize_matmul`]. Seeded, so a failing seed replays exactly.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::backend::RegisterBus;
use crate::driver::NpuDriver;
use crate::error::Result;
use crate::matrix::Matrix;
use crate::quant::QuantParams;
use crate::reference;

/// Contraction depth of every stress problem.
pub const STRESS_DEPTH: usize = 8;

/// Operand values are drawn from `-OPERAND_RANGE..=OPERAND_RANGE`.
pub const OPERAND_RANGE: i8 = 5;

/// One random problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressCase {
    /// Left operand, rows × k
    pub a: Matrix,
    /// Right operand, k × cols
    pub b: Matrix,
    /// Post-processing parameters
    pub quant: QuantParams,
}

impl StressCase {
    /// Draw a `rows×k · k×cols` problem.
    pub fn random(rng: &mut impl Rng, rows: usize, k: usize, cols: usize) -> Self {
        let mut operand = |r, c| {
            Matrix::from_fn(r, c, |_, _| rng.gen_range(-OPERAND_RANGE..=OPERAND_RANGE))
        };
        let a = operand(rows, k);
        let b = operand(k, cols);
        Self {
            a,
            b,
            quant: QuantParams::random(rng),
        }
    }

    /// Expected device output.
    ///
    /// # Errors
    ///
    /// Returns error if the operands do not chain.
    pub fn expected(&self) -> Result<Matrix> {
        reference::quantize_matmul(&self.a, &self.b, &self.quant)
    }
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StressReport {
    /// Problems run
    pub iterations: usize,
    /// Iterations whose output differed from the reference
    pub mismatches: Vec<usize>,
    /// Device cycles spent
    pub cycles: u64,
}

impl StressReport {
    /// Every iteration matched.
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl std::fmt::Display for StressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} passed in {} cycles",
            self.iterations - self.mismatches.len(),
            self.iterations,
            self.cycles
        )
    }
}

/// Run `iterations` random full-tile problems seeded with `seed`.
///
/// # Errors
///
/// Returns error if the device stops responding. Wrong answers are reported
/// in [`StressReport::mismatches`], not as errors.
pub fn run_stress<B: RegisterBus>(
    driver: &mut NpuDriver<B>,
    iterations: usize,
    seed: u64,
) -> Result<StressReport> {
    let geometry = driver.geometry();
    let mut rng = SmallRng::seed_from_u64(seed);
    let begin = driver.cycles();
    let mut report = StressReport {
        iterations,
        ..StressReport::default()
    };

    for iteration in 0..iterations {
        let case = StressCase::random(&mut rng, geometry.rows, STRESS_DEPTH, geometry.cols);
        let got = driver.matmul_tile(&case.a, &case.b, &case.quant)?;
        let expected = case.expected()?;
        if got != expected {
            warn!("Stress iteration {iteration} mismatch:\nexpected\n{expected}got\n{got}");
            report.mismatches.push(iteration);
        }
    }

    report.cycles = driver.cycles() - begin;
    info!("Stress seed {seed}: {report}");
    Ok(report)
}
