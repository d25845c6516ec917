// SPDX-License-Identifier: AGPL-3.0-only

//! Register-level NPU driver
//!
//! Implements the run protocol on top of any [`RegisterBus`]:
//!
//! ```text
//! 1. rewind write pointers of operands being replaced, stage words
//! 2. program RUN_LENGTH / QUANT_* / BIAS while idle
//! 3. START | RST_W_RD | RST_A_RD | ACC_CLEAR
//! 4. pop R result words (bottom row first), reverse for row-major
//! ```
//!
//! Output words are read as soon as `OUTPUT_VALID` is set rather than after
//! `DONE`, so runs complete even when the output queue is shallower than the
//! number of results.

use qnpu_chip::regs::{self, cmd, status};
use qnpu_chip::{pack_lanes, unpack_lanes, ArrayGeometry, LANES};
use tracing::{debug, info};

use crate::backend::RegisterBus;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::matrix::Matrix;
use crate::quant::QuantParams;

// ── Status and commands ──────────────────────────────────────────────────────

/// Decoded `STATUS` register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    /// A run is computing or draining
    pub busy: bool,
    /// The last run has queued all its results
    pub done: bool,
    /// A staging port cannot take another word
    pub input_full: bool,
    /// At least one result word is waiting
    pub output_valid: bool,
}

impl From<u32> for DeviceStatus {
    fn from(word: u32) -> Self {
        Self {
            busy: word & status::BUSY != 0,
            done: word & status::DONE != 0,
            input_full: word & status::INPUT_FULL != 0,
            output_valid: word & status::OUTPUT_VALID != 0,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |on: bool, name: &'static str| if on { name } else { "-" };
        write!(
            f,
            "[{} {} {} {}]",
            flag(self.busy, "BUSY"),
            flag(self.done, "DONE"),
            flag(self.input_full, "INPUT_FULL"),
            flag(self.output_valid, "OUTPUT_VALID"),
        )
    }
}

/// `CMD` word builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Command(u32);

impl Command {
    /// Empty command.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Raw command word.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Start a run.
    #[must_use]
    pub const fn start(self) -> Self {
        Self(self.0 | cmd::START)
    }

    /// Weight-stationary run.
    #[must_use]
    pub const fn load_mode(self) -> Self {
        Self(self.0 | cmd::LOAD_MODE)
    }

    /// Zero the accumulators.
    #[must_use]
    pub const fn clear(self) -> Self {
        Self(self.0 | cmd::ACC_CLEAR)
    }

    /// Drain the accumulators.
    #[must_use]
    pub const fn dump(self) -> Self {
        Self(self.0 | cmd::DUMP)
    }

    /// Rewind both read pointers.
    #[must_use]
    pub const fn rewind_reads(self) -> Self {
        Self(self.0 | cmd::RST_W_RD | cmd::RST_A_RD)
    }

    /// Rewind the weight write pointer.
    #[must_use]
    pub const fn rewind_weight_writes(self) -> Self {
        Self(self.0 | cmd::RST_W_WR)
    }

    /// Rewind the activation write pointer.
    #[must_use]
    pub const fn rewind_act_writes(self) -> Self {
        Self(self.0 | cmd::RST_A_WR)
    }

    /// Rewind all four pointers.
    #[must_use]
    pub const fn rewind_all(self) -> Self {
        Self(self.0 | cmd::RST_DMA_PTRS)
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// NPU driver over a register bus.
#[derive(Debug)]
pub struct NpuDriver<B> {
    bus: B,
    config: DriverConfig,
    geometry: ArrayGeometry,
    staging_depth: usize,
}

impl<B: RegisterBus> NpuDriver<B> {
    /// Attach to a device and read its geometry.
    ///
    /// # Errors
    ///
    /// Returns error if the geometry register cannot be read or describes a
    /// grid wider than a bus word.
    pub fn new(mut bus: B, config: DriverConfig) -> Result<Self> {
        let (geometry, staging_depth) =
            ArrayGeometry::from_geometry_word(bus.read32(regs::GEOMETRY)?);
        if geometry.rows == 0 || geometry.cols == 0 || geometry.rows > LANES || geometry.cols > LANES
        {
            return Err(DriverError::invalid_state(format!(
                "unsupported geometry {}x{}",
                geometry.rows, geometry.cols
            )));
        }
        info!(
            "NPU attached via {}: {}x{} array, {} staging words",
            bus.backend_type(),
            geometry.rows,
            geometry.cols,
            staging_depth
        );
        Ok(Self {
            bus,
            config,
            geometry,
            staging_depth,
        })
    }

    /// Array geometry reported by the device.
    pub fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    /// Words per staging memory.
    pub fn staging_depth(&self) -> usize {
        self.staging_depth
    }

    /// Device cycles elapsed.
    pub fn cycles(&self) -> u64 {
        self.bus.cycles()
    }

    /// The underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Detach from the device.
    pub fn into_inner(self) -> B {
        self.bus
    }

    // ── Register primitives ──────────────────────────────────────────────────

    /// Read and decode `STATUS`.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn status(&mut self) -> Result<DeviceStatus> {
        Ok(DeviceStatus::from(self.bus.read32(regs::STATUS)?))
    }

    /// Issue a command.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn command(&mut self, command: Command) -> Result<()> {
        debug!("CMD {:#05x}", command.bits());
        self.bus.write32(regs::CMD, command.bits())
    }

    /// Fail unless the device is idle; busy-locked writes would be dropped.
    fn ensure_idle(&mut self) -> Result<()> {
        let status = self.status()?;
        if status.busy {
            return Err(DriverError::invalid_state(format!("busy {status}")));
        }
        Ok(())
    }

    /// Program multiplier, shift, zero point, ReLU and the bias table.
    ///
    /// # Errors
    ///
    /// Returns error if the device is busy or the bus times out.
    pub fn write_quant(&mut self, q: &QuantParams) -> Result<()> {
        self.ensure_idle()?;
        self.bus.write32(regs::QUANT_CFG, q.cfg_word())?;
        self.bus.write32(regs::QUANT_MULT, q.mult as u32)?;
        for (lane, bias) in q.bias.iter().enumerate() {
            self.bus.write32(regs::bias(lane as u32), *bias as u32)?;
        }
        Ok(())
    }

    /// Read back the quantization registers.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn read_quant(&mut self) -> Result<QuantParams> {
        let (shift, zero_point, relu) = regs::quant::unpack(self.bus.read32(regs::QUANT_CFG)?);
        let mult = self.bus.read32(regs::QUANT_MULT)? as i32;
        let mut bias = [0; LANES];
        for (lane, slot) in bias.iter_mut().enumerate() {
            *slot = self.bus.read32(regs::bias(lane as u32))? as i32;
        }
        Ok(QuantParams {
            mult,
            shift,
            zero_point,
            relu,
            bias,
        })
    }

    /// Program the run length.
    ///
    /// # Errors
    ///
    /// Returns error if the device is busy or the bus times out.
    pub fn set_run_length(&mut self, length: usize) -> Result<()> {
        self.ensure_idle()?;
        self.bus.write32(regs::RUN_LENGTH, length as u32)
    }

    /// Zero every accumulator.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn clear_accumulators(&mut self) -> Result<()> {
        self.command(Command::new().clear())
    }

    /// Rewind staging pointers.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn reset_pointers(&mut self, command: Command) -> Result<()> {
        self.command(command)
    }

    /// Staging `(write, read)` pointers of the weight and activation ports.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn pointers(&mut self) -> Result<((usize, usize), (usize, usize))> {
        let w = regs::unpack_ptrs(self.bus.read32(regs::W_PTRS)?);
        let a = regs::unpack_ptrs(self.bus.read32(regs::A_PTRS)?);
        Ok((w, a))
    }

    fn stage(&mut self, port: u32, name: &'static str, words: &[[i8; LANES]]) -> Result<()> {
        let ((w_wr, _), (a_wr, _)) = self.pointers()?;
        let used = if port == regs::WRITE_W { w_wr } else { a_wr };
        let capacity = self.staging_depth.saturating_sub(used);
        if words.len() > capacity {
            return Err(DriverError::StagingOverflow {
                port: name,
                words: words.len(),
                capacity,
            });
        }
        for word in words {
            self.bus.write32(port, pack_lanes(*word))?;
        }
        debug!("Staged {} {name} words", words.len());
        Ok(())
    }

    /// Append weight words at the weight write pointer.
    ///
    /// # Errors
    ///
    /// Returns error if the words do not fit or the bus times out.
    pub fn stage_weights(&mut self, words: &[[i8; LANES]]) -> Result<()> {
        self.stage(regs::WRITE_W, "weight", words)
    }

    /// Append activation words at the activation write pointer.
    ///
    /// # Errors
    ///
    /// Returns error if the words do not fit or the bus times out.
    pub fn stage_activations(&mut self, words: &[[i8; LANES]]) -> Result<()> {
        self.stage(regs::WRITE_A, "activation", words)
    }

    /// Start a run: rewind read pointers and clear accumulators.
    ///
    /// # Errors
    ///
    /// Returns error on bus timeout.
    pub fn start(&mut self, weight_stationary: bool) -> Result<()> {
        let mut command = Command::new().start().rewind_reads().clear();
        if weight_stationary {
            command = command.load_mode();
        }
        self.command(command)
    }

    fn poll(&mut self, what: &'static str, until: impl Fn(DeviceStatus) -> bool) -> Result<()> {
        let start = self.bus.cycles();
        for _ in 0..self.config.poll_limit {
            if until(self.status()?) {
                return Ok(());
            }
        }
        Err(DriverError::timeout(what, self.bus.cycles() - start))
    }

    /// Poll until `DONE`.
    ///
    /// Only completes without reads if the output queue can hold every
    /// result of the run.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] after the configured poll limit.
    pub fn wait_done(&mut self) -> Result<()> {
        self.poll("DONE", |s| s.done)
    }

    /// Poll until `BUSY` clears.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] after the configured poll limit.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.poll("idle", |s| !s.busy)
    }

    /// Pop `count` output words in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] if a word does not arrive in time.
    pub fn read_results(&mut self, count: usize) -> Result<Vec<[i8; LANES]>> {
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            self.bus.idle(self.config.read_delay_cycles);
            self.poll("OUTPUT_VALID", |s| s.output_valid)?;
            words.push(unpack_lanes(self.bus.read32(regs::READ_OUT)?));
        }
        Ok(words)
    }

    /// Pop one drained accumulator grid and return it row-major.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] if a row does not arrive in time.
    pub fn read_rows(&mut self) -> Result<Vec<[i8; LANES]>> {
        let mut rows = self.read_results(self.geometry.rows)?;
        rows.reverse();
        Ok(rows)
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Quantized `a · b` for `a` of at most R rows and `b` of at most C
    /// columns, in one output-stationary run.
    ///
    /// # Errors
    ///
    /// Returns error on shape mismatch, staging overflow, busy device or
    /// timeout.
    pub fn matmul_tile(&mut self, a: &Matrix, b: &Matrix, q: &QuantParams) -> Result<Matrix> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if a.cols() != b.rows() {
            return Err(DriverError::shape_mismatch(
                "inner dimension",
                format!("{} rows in b", a.cols()),
                b.shape(),
            ));
        }
        if a.rows() > rows || b.cols() > cols {
            return Err(DriverError::shape_mismatch(
                "output tile",
                format!("at most {rows}x{cols}"),
                format!("{}x{}", a.rows(), b.cols()),
            ));
        }
        let k = a.cols();

        self.write_quant(q)?;
        self.set_run_length(k)?;
        self.reset_pointers(Command::new().rewind_weight_writes().rewind_act_writes())?;
        let act_words: Vec<[i8; LANES]> = (0..k)
            .map(|kk| std::array::from_fn(|r| a.get_or_zero(r, kk)))
            .collect();
        let weight_words: Vec<[i8; LANES]> = (0..k)
            .map(|kk| std::array::from_fn(|c| b.get_or_zero(kk, c)))
            .collect();
        self.stage_activations(&act_words)?;
        self.stage_weights(&weight_words)?;

        let begin = self.cycles();
        self.start(false)?;
        let grid = self.read_rows()?;
        debug!(
            "matmul tile {}x{}x{} in {} cycles",
            a.rows(),
            k,
            b.cols(),
            self.cycles() - begin
        );
        Ok(Matrix::from_fn(a.rows(), b.cols(), |r, c| grid[r][c]))
    }

    /// Quantized `a · b` of any shape, one [`matmul_tile`](Self::matmul_tile)
    /// per R×C block of the output. `bias` holds one entry per output column
    /// (or is empty) and replaces `q.bias`.
    ///
    /// # Errors
    ///
    /// Returns error on shape mismatch, staging overflow, busy device or
    /// timeout.
    pub fn matmul(
        &mut self,
        a: &Matrix,
        b: &Matrix,
        bias: &[i32],
        q: &QuantParams,
    ) -> Result<Matrix> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if !bias.is_empty() && bias.len() != b.cols() {
            return Err(DriverError::shape_mismatch(
                "bias vector",
                format!("{} elements", b.cols()),
                format!("{} elements", bias.len()),
            ));
        }
        let mut out = Matrix::zeros(a.rows(), b.cols());
        for row0 in (0..a.rows()).step_by(rows) {
            let height = rows.min(a.rows() - row0);
            let a_tile = Matrix::from_fn(height, a.cols(), |r, k| a.get(row0 + r, k));
            for col0 in (0..b.cols()).step_by(cols) {
                let width = cols.min(b.cols() - col0);
                let b_tile = Matrix::from_fn(b.rows(), width, |k, c| b.get(k, col0 + c));
                let tile_bias: Vec<i32> = (col0..col0 + width)
                    .map(|c| bias.get(c).copied().unwrap_or(0))
                    .collect();
                let tile = self.matmul_tile(&a_tile, &b_tile, &q.with_bias_slice(&tile_bias))?;
                for r in 0..height {
                    for c in 0..width {
                        out.set(row0 + r, col0 + c, tile.get(r, c));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Quantized `x · w` for `w` of K×N, split into C-column tiles.
    ///
    /// `x` is staged once and replayed for every tile by rewinding only the
    /// weight write pointer. `bias` holds one entry per output (or is empty).
    ///
    /// # Errors
    ///
    /// Returns error on shape mismatch, staging overflow, busy device or
    /// timeout.
    pub fn matvec_tiled(
        &mut self,
        x: &[i8],
        w: &Matrix,
        bias: &[i32],
        q: &QuantParams,
    ) -> Result<Vec<i8>> {
        let cols = self.geometry.cols;
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
        let k = x.len();

        self.set_run_length(k)?;
        self.reset_pointers(Command::new().rewind_all())?;
        let act_words: Vec<[i8; LANES]> = x
            .iter()
            .map(|&v| {
                let mut word = [0; LANES];
                word[0] = v;
                word
            })
            .collect();
        self.stage_activations(&act_words)?;

        let mut out = Vec::with_capacity(w.cols());
        for tile in (0..w.cols()).step_by(cols) {
            let width = cols.min(w.cols() - tile);
            let tile_bias: Vec<i32> = (tile..tile + width)
                .map(|c| bias.get(c).copied().unwrap_or(0))
                .collect();
            self.write_quant(&q.with_bias_slice(&tile_bias))?;
            self.reset_pointers(Command::new().rewind_weight_writes())?;
            let weight_words: Vec<[i8; LANES]> = (0..k)
                .map(|kk| std::array::from_fn(|c| if c < width { w.get(kk, tile + c) } else { 0 }))
                .collect();
            self.stage_weights(&weight_words)?;
            self.start(false)?;
            let grid = self.read_rows()?;
            out.extend_from_slice(&grid[0][..width]);
        }
        info!(
            "matvec {}x{}: {} tiles",
            k,
            w.cols(),
            w.cols().div_ceil(cols)
        );
        Ok(out)
    }

    /// Weight-stationary stream: preload `w` (at most R×C), then push each
    /// row of `xs` through it. Row `n` of the result is `xs[n] · w`.
    ///
    /// # Errors
    ///
    /// Returns error on shape mismatch, staging overflow, busy device or
    /// timeout.
    pub fn stream_weight_stationary(
        &mut self,
        w: &Matrix,
        xs: &Matrix,
        q: &QuantParams,
    ) -> Result<Matrix> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if w.rows() > rows || w.cols() > cols {
            return Err(DriverError::shape_mismatch(
                "stationary weights",
                format!("at most {rows}x{cols}"),
                w.shape(),
            ));
        }
        if xs.cols() != w.rows() {
            return Err(DriverError::shape_mismatch(
                "activation vectors",
                format!("{} columns", w.rows()),
                xs.shape(),
            ));
        }
        let n = xs.rows();

        self.write_quant(q)?;
        self.set_run_length(n)?;
        self.reset_pointers(Command::new().rewind_all())?;
        // Bottom row first: the last word shifted in stays at the top
        let weight_words: Vec<[i8; LANES]> = (0..rows)
            .rev()
            .map(|r| std::array::from_fn(|c| w.get_or_zero(r, c)))
            .collect();
        let act_words: Vec<[i8; LANES]> = (0..n)
            .map(|i| std::array::from_fn(|r| xs.get_or_zero(i, r)))
            .collect();
        self.stage_weights(&weight_words)?;
        self.stage_activations(&act_words)?;

        self.start(true)?;
        let results = self.read_results(n)?;
        Ok(Matrix::from_fn(n, w.cols(), |i, c| results[i][c]))
    }

    /// Re-drain the current accumulators through the PPU with `q`.
    ///
    /// # Errors
    ///
    /// Returns error if the device is busy or a row does not arrive.
    pub fn dump(&mut self, q: &QuantParams) -> Result<Matrix> {
        let ArrayGeometry { rows, cols } = self.geometry;
        self.write_quant(q)?;
        self.command(Command::new().dump())?;
        let grid = self.read_rows()?;
        Ok(Matrix::from_fn(rows, cols, |r, c| grid[r][c]))
    }
}
