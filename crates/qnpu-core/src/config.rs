// SPDX-License-Identifier: AGPL-3.0-only

//! Device model configuration

use qnpu_chip::geometry::{
    ArrayGeometry, DEFAULT_INGRESS_DEPTH, DEFAULT_OUTPUT_DEPTH, DEFAULT_STAGING_DEPTH,
};
use qnpu_chip::LANES;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Sizes of every buffer in the device
///
/// Defaults match the register-mapped device: a 4×4 grid, 1024-word staging
/// memories and 8-deep queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpuConfig {
    /// PE grid dimensions
    pub geometry: ArrayGeometry,

    /// Words per staging memory (each of weights and activations)
    pub staging_depth: usize,

    /// Depth of the ingress queue in front of each staging port
    pub ingress_depth: usize,

    /// Depth of the result egress queue
    pub output_depth: usize,
}

impl Default for NpuConfig {
    fn default() -> Self {
        Self {
            geometry: ArrayGeometry::DEVICE,
            staging_depth: DEFAULT_STAGING_DEPTH,
            ingress_depth: DEFAULT_INGRESS_DEPTH,
            output_depth: DEFAULT_OUTPUT_DEPTH,
        }
    }
}

impl NpuConfig {
    /// Set the grid geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: ArrayGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the staging memory depth.
    #[must_use]
    pub fn with_staging_depth(mut self, depth: usize) -> Self {
        self.staging_depth = depth;
        self
    }

    /// Set the ingress queue depth.
    #[must_use]
    pub fn with_ingress_depth(mut self, depth: usize) -> Self {
        self.ingress_depth = depth;
        self
    }

    /// Set the output queue depth.
    #[must_use]
    pub fn with_output_depth(mut self, depth: usize) -> Self {
        self.output_depth = depth;
        self
    }

    /// Check that the configuration can be built.
    ///
    /// # Errors
    ///
    /// Returns error if the grid does not fit one bus word per row/column,
    /// or if any depth is zero or exceeds what the pointer registers encode.
    pub fn validate(&self) -> Result<()> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if rows == 0 || cols == 0 {
            return Err(CoreError::invalid_geometry(rows, cols, "grid must be non-empty"));
        }
        if rows > LANES || cols > LANES {
            return Err(CoreError::invalid_geometry(
                rows,
                cols,
                format!("bus words carry at most {LANES} lanes"),
            ));
        }
        if self.staging_depth == 0 || self.staging_depth > 0xFFFF {
            return Err(CoreError::invalid_depth(
                "staging",
                self.staging_depth,
                "must be in 1..=65535",
            ));
        }
        if self.ingress_depth == 0 {
            return Err(CoreError::invalid_depth("ingress", 0, "must be non-zero"));
        }
        if self.output_depth == 0 {
            return Err(CoreError::invalid_depth("output", 0, "must be non-zero"));
        }
        debug!(
            "NpuConfig: {rows}x{cols} grid, staging={} ingress={} output={}",
            self.staging_depth, self.ingress_depth, self.output_depth
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(NpuConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_oversized_grid() {
        let cfg = NpuConfig::default().with_geometry(ArrayGeometry::square(8));
        assert!(matches!(cfg.validate(), Err(CoreError::InvalidGeometry { .. })));
    }

    #[test]
    fn rejects_zero_output_depth() {
        let cfg = NpuConfig::default().with_output_depth(0);
        assert!(matches!(
            cfg.validate(),
            Err(CoreError::InvalidDepth { what: "output", .. })
        ));
    }
}
