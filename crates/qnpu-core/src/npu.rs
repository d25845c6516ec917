// SPDX-License-Identifier: AGPL-3.0-only

//! Top-level device: sequencer, context and cycle counter.

use tracing::info;

use crate::bus::{BusRequest, BusResponse};
use crate::config::NpuConfig;
use crate::error::Result;
use crate::sequencer::{ControlSequencer, DeviceContext, State};

/// Cycle-accurate model of the whole device.
///
/// One call to [`tick`](Self::tick) is one clock edge. The host drives the
/// model exclusively through bus requests; inspection accessors exist for
/// tests and tooling and have no side effects.
#[derive(Debug, Clone)]
pub struct Npu {
    config: NpuConfig,
    ctx: DeviceContext,
    sequencer: ControlSequencer,
    cycle: u64,
}

impl Npu {
    /// Build a device.
    ///
    /// # Errors
    ///
    /// Returns error if `config` fails validation.
    pub fn new(config: NpuConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "NPU model: {}x{} PEs, {} staging words per operand, output queue {}",
            config.geometry.rows, config.geometry.cols, config.staging_depth, config.output_depth
        );
        Ok(Self {
            config,
            ctx: DeviceContext::new(config.staging_depth),
            sequencer: ControlSequencer::new(
                config.geometry,
                config.ingress_depth,
                config.output_depth,
            ),
            cycle: 0,
        })
    }

    /// Advance one cycle, optionally presenting one bus request.
    pub fn tick(&mut self, request: Option<BusRequest>) -> BusResponse {
        let response = self.sequencer.step(&mut self.ctx, request);
        self.cycle += 1;
        response
    }

    /// Advance `cycles` cycles with the bus idle.
    pub fn idle(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick(None);
        }
    }

    /// Cycles elapsed since construction.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Sequencer state.
    pub fn state(&self) -> State {
        self.sequencer.state()
    }

    /// Current `STATUS` value, without a bus transaction.
    pub fn status(&self) -> u32 {
        self.sequencer.status_word(&self.ctx)
    }

    /// Construction parameters.
    pub fn config(&self) -> &NpuConfig {
        &self.config
    }

    /// Registers and staging memories.
    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    /// Sequencer and datapath.
    pub fn sequencer(&self) -> &ControlSequencer {
        &self.sequencer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnpu_chip::regs;

    #[test]
    fn counts_cycles() {
        let mut npu = Npu::new(NpuConfig::default()).unwrap();
        npu.idle(5);
        npu.tick(Some(BusRequest::read(regs::STATUS)));
        assert_eq!(npu.cycle(), 6);
        assert_eq!(npu.state(), State::Idle);
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(Npu::new(NpuConfig::default().with_staging_depth(0)).is_err());
    }

    #[test]
    fn unbuildable_geometry_rejected() {
        use crate::error::CoreError;
        use qnpu_chip::ArrayGeometry;
        for geometry in [
            ArrayGeometry { rows: 5, cols: 4 },
            ArrayGeometry { rows: 4, cols: 5 },
            ArrayGeometry { rows: 0, cols: 4 },
            ArrayGeometry { rows: 4, cols: 0 },
        ] {
            let err = Npu::new(NpuConfig::default().with_geometry(geometry)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidGeometry { .. }), "{geometry:?}");
        }
    }

    #[test]
    fn reads_complete_in_one_cycle() {
        let mut npu = Npu::new(NpuConfig::default()).unwrap();
        let resp = npu.tick(Some(BusRequest::read(regs::GEOMETRY)));
        assert!(resp.ready);
        assert_eq!(resp.data & 0xFF, 4);
    }
}
