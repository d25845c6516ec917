// SPDX-License-Identifier: AGPL-3.0-only

//! Dense-layer classification on the device
//!
//! One quantized dense layer `scores = x · W + bias` runs through
//! [`NpuDriver::matvec_tiled`]; the predicted class is the index of the
//! largest score (first one on ties). [`evaluate`] runs a whole sample set
//! and reports two rates:
//!
//! | Rate | Meaning |
//! |------|---------|
//! | bit-exact | device scores identical to [`reference::matvec`] |
//! | accuracy | device prediction equals the label (labelled sets only) |

use tracing::{info, warn};

use crate::backend::RegisterBus;
use crate::driver::NpuDriver;
use crate::error::{DriverError, Result};
use crate::matrix::Matrix;
use crate::quant::QuantParams;
use crate::reference;

/// Index of the largest score, first on ties. `None` for no scores.
pub fn argmax(scores: &[i8]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, i8)>, (i, &v)| match best {
            Some((_, top)) if top >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Scores of one sample and the class they select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// One requantized score per class
    pub scores: Vec<i8>,
    /// Predicted class
    pub class: usize,
}

impl<B: RegisterBus> NpuDriver<B> {
    /// Classify `x` with the dense layer `w` (K features × N classes).
    ///
    /// # Errors
    ///
    /// Returns error if `w` has no classes, on shape mismatch, or if the
    /// device stops responding.
    pub fn classify(
        &mut self,
        x: &[i8],
        w: &Matrix,
        bias: &[i32],
        q: &QuantParams,
    ) -> Result<Classification> {
        let scores = self.matvec_tiled(x, w, bias, q)?;
        let class = argmax(&scores)
            .ok_or_else(|| DriverError::shape_mismatch("class count", "at least 1", "0"))?;
        Ok(Classification { scores, class })
    }
}

/// Outcome of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleResult {
    /// Device result
    pub device: Classification,
    /// Class chosen by the reference scores
    pub reference_class: usize,
    /// Device scores equal the reference scores
    pub bit_exact: bool,
    /// Ground truth, when labels were given
    pub label: Option<usize>,
}

impl SampleResult {
    /// Device prediction matches the label. `None` when unlabelled.
    pub fn correct(&self) -> Option<bool> {
        self.label.map(|label| label == self.device.class)
    }
}

/// Per-sample results of a classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    /// One entry per sample, in input order
    pub samples: Vec<SampleResult>,
}

impl ClassificationReport {
    /// Samples whose device scores equal the reference scores.
    pub fn bit_exact(&self) -> usize {
        self.samples.iter().filter(|s| s.bit_exact).count()
    }

    /// Labelled samples predicted correctly, `None` without labels.
    pub fn correct(&self) -> Option<usize> {
        self.samples
            .iter()
            .map(SampleResult::correct)
            .try_fold(0, |n, ok| ok.map(|ok| n + usize::from(ok)))
    }

    /// Bit-exact samples as a percentage.
    pub fn match_rate(&self) -> f64 {
        percent(self.bit_exact(), self.samples.len())
    }

    /// Correct predictions as a percentage, `None` without labels.
    pub fn accuracy(&self) -> Option<f64> {
        self.correct().map(|n| percent(n, self.samples.len()))
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 * 100.0 / total as f64
    }
}

/// Classify every row of `samples` on the device and check each against the
/// reference model and, if given, its label.
///
/// # Errors
///
/// Returns error if the labels do not line up with the samples, a label is
/// not a class of `w`, or the device stops responding. Wrong scores are
/// reported per sample, not as errors.
pub fn evaluate<B: RegisterBus>(
    driver: &mut NpuDriver<B>,
    w: &Matrix,
    bias: &[i32],
    q: &QuantParams,
    samples: &Matrix,
    labels: Option<&[usize]>,
) -> Result<ClassificationReport> {
    if let Some(labels) = labels {
        if labels.len() != samples.rows() {
            return Err(DriverError::shape_mismatch(
                "labels",
                format!("{} entries", samples.rows()),
                format!("{} entries", labels.len()),
            ));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= w.cols()) {
            return Err(DriverError::shape_mismatch(
                "label",
                format!("a class below {}", w.cols()),
                bad.to_string(),
            ));
        }
    }

    let mut report = ClassificationReport::default();
    for i in 0..samples.rows() {
        let x = samples.row(i);
        let device = driver.classify(x, w, bias, q)?;
        let expected = reference::matvec(x, w, bias, q)?;
        let bit_exact = device.scores == expected;
        if !bit_exact {
            warn!("Sample {i}: device {:?} != reference {expected:?}", device.scores);
        }
        report.samples.push(SampleResult {
            reference_class: argmax(&expected).unwrap_or_default(),
            bit_exact,
            label: labels.map(|l| l[i]),
            device,
        });
    }

    info!(
        "Classified {} samples: {:.1}% bit-exact",
        report.samples.len(),
        report.match_rate()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[3, 9, 9, -1]), Some(1));
        assert_eq!(argmax(&[-128, -128]), Some(0));
        assert_eq!(argmax(&[-5, -2, -7]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_report_rates() {
        let sample = |class, bit_exact, label| SampleResult {
            device: Classification {
                scores: vec![0; 3],
                class,
            },
            reference_class: class,
            bit_exact,
            label,
        };
        let report = ClassificationReport {
            samples: vec![
                sample(0, true, Some(0)),
                sample(1, true, Some(2)),
                sample(2, false, Some(2)),
                sample(1, true, Some(1)),
            ],
        };
        assert_eq!(report.bit_exact(), 3);
        assert_eq!(report.correct(), Some(3));
        assert!((report.match_rate() - 75.0).abs() < 1e-9);
        assert_eq!(report.accuracy(), Some(75.0));

        let unlabelled = ClassificationReport {
            samples: vec![sample(0, true, None)],
        };
        assert_eq!(unlabelled.accuracy(), None);
        assert_eq!(ClassificationReport::default().match_rate(), 0.0);
    }
}
