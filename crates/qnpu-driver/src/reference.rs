// SPDX-License-Identifier: AGPL-3.0-only

//! Golden host model
//!
//! Bit-exact arithmetic the device must reproduce. Written independently of
//! the device model: rounding here is floor division of `v + d/2` by
//! `d = 2^shift` over unbounded integers, which is the same function as the
//! hardware's add-then-arithmetic-shift.

use crate::error::{DriverError, Result};
use crate::matrix::Matrix;
use crate::quant::QuantParams;

/// Requantize one accumulator.
pub fn ppu(acc: i32, bias: i32, mult: i32, shift: u8, zero_point: i8, relu: bool) -> i8 {
    let v = (i128::from(acc) + i128::from(bias)) * i128::from(mult);
    let shift = shift & 0x1F;
    let scaled = if shift == 0 {
        v
    } else {
        let d = 1i128 << shift;
        (v + d / 2).div_euclid(d)
    };
    let mut out = scaled + i128::from(zero_point);
    if relu {
        out = out.max(0);
    }
    out.clamp(-128, 127) as i8
}

/// `a · b` with 32-bit wrapping accumulation, as the PEs compute it.
///
/// # Errors
///
/// Returns error if the inner dimensions differ.
pub fn matmul_i32(a: &Matrix, b: &Matrix) -> Result<Vec<Vec<i32>>> {
    if a.cols() != b.rows() {
        return Err(DriverError::shape_mismatch(
            "inner dimension",
            format!("{} rows in b", a.cols()),
            b.shape(),
        ));
    }
    Ok((0..a.rows())
        .map(|r| {
            (0..b.cols())
                .map(|c| {
                    (0..a.cols()).fold(0i32, |acc, k| {
                        acc.wrapping_add(i32::from(a.get(r, k)) * i32::from(b.get(k, c)))
                    })
                })
                .collect()
        })
        .collect())
}

/// Requantize an accumulator grid; column `c` uses `q.bias[c]`.
pub fn quantize(acc: &[Vec<i32>], q: &QuantParams) -> Matrix {
    let rows = acc.len();
    let cols = acc.first().map_or(0, Vec::len);
    Matrix::from_fn(rows, cols, |r, c| {
        let bias = q.bias.get(c).copied().unwrap_or(0);
        ppu(acc[r][c], bias, q.mult, q.shift, q.zero_point, q.relu)
    })
}

/// Quantized `a · b`.
///
/// # Errors
///
/// Returns error if the inner dimensions differ.
pub fn quantize_matmul(a: &Matrix, b: &Matrix, q: &QuantParams) -> Result<Matrix> {
    Ok(quantize(&matmul_i32(a, b)?, q))
}

/// Weight-stationary stream: row `n` of the result is `xs[n] · w`.
///
/// # Errors
///
/// Returns error if `xs` rows are not as long as `w` has rows.
pub fn weight_stationary(xs: &Matrix, w: &Matrix, q: &QuantParams) -> Result<Matrix> {
    quantize_matmul(xs, w, q)
}

/// Quantized `x · w` for a wide `w`, with one bias per output.
///
/// # Errors
///
/// Returns error if `x`, `w` and `bias` disagree on shape.
pub fn matvec(x: &[i8], w: &Matrix, bias: &[i32], q: &QuantParams) -> Result<Vec<i8>> {
    if x.len() != w.rows() {
        return Err(DriverError::shape_mismatch(
            "activation vector",
            format!("{} elements", w.rows()),
            format!("{} elements", x.len()),
        ));
    }
    if !bias.is_empty() && bias.len() != w.cols() {
        return Err(DriverError::shape_mismatch(
            "bias vector",
            format!("{} elements", w.cols()),
            format!("{} elements", bias.len()),
        ));
    }
    Ok((0..w.cols())
        .map(|c| {
            let acc = x.iter().enumerate().fold(0i32, |acc, (k, &xk)| {
                acc.wrapping_add(i32::from(xk) * i32::from(w.get(k, c)))
            });
            let b = bias.get(c).copied().unwrap_or(0);
            ppu(acc, b, q.mult, q.shift, q.zero_point, q.relu)
        })
        .collect())
}
