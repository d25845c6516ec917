// SPDX-License-Identifier: AGPL-3.0-only

//! Processing-element grid geometry and pipeline timing.
//!
//! ## Timing model
//!
//! - Skew buffers delay lane `i` by `i` cycles.
//! - Data moves one PE per cycle, east for activations, south for weights or
//!   partial sums.
//! - The last product of a K-deep contraction lands in PE(R−1, C−1)
//!   `K + R + C − 2` cycles after the first input is presented.

use crate::lanes::LANES;

/// Rows × columns of the PE grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayGeometry {
    /// PE rows (activation lanes).
    pub rows: usize,
    /// PE columns (weight / output lanes).
    pub cols: usize,
}

impl ArrayGeometry {
    /// The register-mapped device: one bus word per row or column.
    pub const DEVICE: Self = Self { rows: LANES, cols: LANES };

    /// Square grid.
    #[must_use]
    pub const fn square(n: usize) -> Self {
        Self { rows: n, cols: n }
    }

    /// Number of processing elements.
    #[must_use]
    pub const fn pe_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Flush cycles after the last operand enters until every PE has seen it.
    #[must_use]
    pub const fn fill_latency(&self) -> usize {
        (self.rows - 1) + (self.cols - 1)
    }

    /// Total cycles for a K-deep contraction, feed plus flush.
    #[must_use]
    pub const fn contraction_cycles(&self, depth: usize) -> usize {
        depth + self.fill_latency()
    }

    /// `GEOMETRY` register word for a given staging depth.
    #[must_use]
    pub const fn geometry_word(&self, staging_depth: usize) -> u32 {
        (self.rows as u32 & 0xFF)
            | ((self.cols as u32 & 0xFF) << 8)
            | ((staging_depth as u32 & 0xFFFF) << 16)
    }

    /// Decode a `GEOMETRY` word into `(geometry, staging_depth)`.
    #[must_use]
    pub const fn from_geometry_word(word: u32) -> (Self, usize) {
        (
            Self {
                rows: (word & 0xFF) as usize,
                cols: ((word >> 8) & 0xFF) as usize,
            },
            (word >> 16) as usize,
        )
    }
}

impl Default for ArrayGeometry {
    fn default() -> Self {
        Self::DEVICE
    }
}

/// Default staging memory depth in words (per operand).
pub const DEFAULT_STAGING_DEPTH: usize = 1024;

/// Default output queue depth in words.
pub const DEFAULT_OUTPUT_DEPTH: usize = 8;

/// Default ingress queue depth per staging port.
pub const DEFAULT_INGRESS_DEPTH: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_geometry() {
        let g = ArrayGeometry::DEVICE;
        assert_eq!(g.pe_count(), 16);
        assert_eq!(g.fill_latency(), 6);
        assert_eq!(g.contraction_cycles(4), 10);
    }

    #[test]
    fn geometry_word_roundtrip() {
        let word = ArrayGeometry::DEVICE.geometry_word(DEFAULT_STAGING_DEPTH);
        assert_eq!(word, 0x0400_0404);
        assert_eq!(
            ArrayGeometry::from_geometry_word(word),
            (ArrayGeometry::DEVICE, DEFAULT_STAGING_DEPTH)
        );
    }
}
