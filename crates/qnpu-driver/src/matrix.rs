// SPDX-License-Identifier: AGPL-3.0-only

//! Dense signed 8-bit matrices and their text format
//!
//! ```text
//! # comments run to end of line
//! 1  -2   3
//! 4   5  -6
//! ```
//!
//! One row per line, whitespace-separated integers in `-128..=127`, every
//! row the same length. Blank lines are ignored. Vector files
//! ([`load_vector`]) use the same syntax with 32-bit values and ignore line
//! breaks.

use std::fmt;
use std::path::Path;

use crate::error::{DriverError, Result};

/// Row-major `i8` matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i8>,
}

impl Matrix {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// `n × n` identity.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |r, c| i8::from(r == c))
    }

    /// Build element-wise.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> i8) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Build from row vectors.
    ///
    /// # Errors
    ///
    /// Returns error if the rows are ragged.
    pub fn from_rows(rows: &[Vec<i8>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
            return Err(DriverError::shape_mismatch(
                "matrix row",
                format!("{cols} columns"),
                format!("{} columns", bad.len()),
            ));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.concat(),
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `"RxC"` for error messages.
    pub fn shape(&self) -> String {
        format!("{}x{}", self.rows, self.cols)
    }

    /// Element at `(r, c)`.
    ///
    /// # Panics
    ///
    /// Panics if out of bounds.
    pub fn get(&self, r: usize, c: usize) -> i8 {
        assert!(r < self.rows && c < self.cols, "({r}, {c}) outside {}", self.shape());
        self.data[r * self.cols + c]
    }

    /// Element at `(r, c)`, or 0 outside the matrix (zero padding).
    pub fn get_or_zero(&self, r: usize, c: usize) -> i8 {
        if r < self.rows && c < self.cols {
            self.data[r * self.cols + c]
        } else {
            0
        }
    }

    /// Overwrite the element at `(r, c)`.
    ///
    /// # Panics
    ///
    /// Panics if out of bounds.
    pub fn set(&mut self, r: usize, c: usize, value: i8) {
        assert!(r < self.rows && c < self.cols, "({r}, {c}) outside {}", self.shape());
        self.data[r * self.cols + c] = value;
    }

    /// Row `r` as a slice.
    pub fn row(&self, r: usize) -> &[i8] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Column `c`, copied.
    pub fn column(&self, c: usize) -> Vec<i8> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    /// Transposed copy.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |r, c| self.get(c, r))
    }

    /// Parse the text format.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Parse`] with the 1-based line of the first
    /// bad token, out-of-range value or ragged row.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rows: Vec<Vec<i8>> = Vec::new();
        for (line, content) in content_lines(text) {
            let mut row = Vec::new();
            for token in content.split_whitespace() {
                let value: i64 = token
                    .parse()
                    .map_err(|_| DriverError::parse(line, format!("'{token}' is not an integer")))?;
                let value = i8::try_from(value).map_err(|_| {
                    DriverError::parse(line, format!("{value} outside -128..=127"))
                })?;
                row.push(value);
            }
            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    return Err(DriverError::parse(
                        line,
                        format!("expected {} values, found {}", first.len(), row.len()),
                    ));
                }
            }
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(DriverError::parse(0, "no rows"));
        }
        Self::from_rows(&rows)
    }

    /// Read and parse a matrix file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&read_text(path.as_ref())?)
    }
}

/// Parse a flat list of signed 32-bit integers in the same text format.
/// Line breaks are not significant, so a bias vector may be written as a
/// row or a column.
///
/// # Errors
///
/// Returns [`DriverError::Parse`] on a bad token or an empty file.
pub fn parse_vector(text: &str) -> Result<Vec<i32>> {
    let mut values = Vec::new();
    for (line, content) in content_lines(text) {
        for token in content.split_whitespace() {
            let value = token
                .parse()
                .map_err(|_| DriverError::parse(line, format!("'{token}' is not a 32-bit integer")))?;
            values.push(value);
        }
    }
    if values.is_empty() {
        return Err(DriverError::parse(0, "no values"));
    }
    Ok(values)
}

/// Read and parse a vector file.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub fn load_vector(path: impl AsRef<Path>) -> Result<Vec<i32>> {
    parse_vector(&read_text(path.as_ref())?)
}

/// Non-blank lines with comments stripped, numbered from 1.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().filter_map(|(index, raw)| {
        let content = raw.split('#').next().unwrap_or("").trim();
        (!content.is_empty()).then_some((index + 1, content))
    })
}

fn read_text(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|source| DriverError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Loaded {} bytes from {}", text.len(), path.display());
    Ok(text)
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            let line: Vec<String> = self.row(r).iter().map(|v| format!("{v:>4}")).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}
