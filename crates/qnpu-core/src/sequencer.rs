// SPDX-License-Identifier: AGPL-3.0-only

//! Control sequencer
//!
//! The only component that touches the register file and the staging
//! memories. Every cycle it:
//!
//! 1. answers at most one bus request
//! 2. commits one word per ingress queue into staging
//! 3. advances the datapath one step
//!
//! ```text
//!            staging write             START
//!   Idle ───────────────────▶ Loading ───────▶ Running
//!    ▲                                           │ operands fed + flushed
//!    │       output queue empty                  ▼
//!    └────────────────────────────────────── Draining
//! ```
//!
//! A run is output-stationary by default. With `LOAD_MODE` the first `R`
//! weight words are shifted into the PEs and the run streams `RUN_LENGTH`
//! activation vectors through them.

use std::collections::VecDeque;
use std::fmt;

use qnpu_chip::regs::{self, status};
use qnpu_chip::{pack_padded, unpack_lanes, ArrayGeometry};
use tracing::{debug, info, trace, warn};

use crate::array::{ArraySignals, Dataflow, SystolicArray};
use crate::bus::{BusRequest, BusResponse};
use crate::ppu::PostProcessingUnit;
use crate::queue::Queue;
use crate::regfile::{BusyLock, CommandFlags, RegisterFile};
use crate::skew::{DeskewBuffer, SkewBuffer};
use crate::staging::{Operand, StagingMemory};

/// Host-visible sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing staged since the last run
    Idle,
    /// Operands are being staged
    Loading,
    /// The array is computing
    Running,
    /// Results are leaving through the PPU and output queue
    Draining,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    ShiftWeights { remaining: usize },
    Contract { cycle: usize, total: usize },
    Stream { emitted: usize },
    Dump { remaining: usize },
    Drained,
}

impl Phase {
    fn state(self) -> State {
        match self {
            Self::Idle => State::Idle,
            Self::Loading => State::Loading,
            Self::ShiftWeights { .. } | Self::Contract { .. } | Self::Stream { .. } => {
                State::Running
            }
            Self::Dump { .. } | Self::Drained => State::Draining,
        }
    }
}

/// Mutable device state shared between the bus and the datapath.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    /// Configuration registers
    pub regs: RegisterFile,
    /// Operand memories
    pub staging: StagingMemory,
}

impl DeviceContext {
    /// Fresh context with reset register values and empty staging.
    pub fn new(staging_depth: usize) -> Self {
        Self {
            regs: RegisterFile::default(),
            staging: StagingMemory::new(staging_depth),
        }
    }
}

/// Sequencer with the datapath it drives.
#[derive(Debug, Clone)]
pub struct ControlSequencer {
    geometry: ArrayGeometry,
    array: SystolicArray,
    skew_act: SkewBuffer<i8>,
    skew_weight: SkewBuffer<i8>,
    deskew: DeskewBuffer<i32>,
    valid_line: VecDeque<bool>,
    ppu: PostProcessingUnit,
    ingress_weights: Queue<u32>,
    ingress_acts: Queue<u32>,
    output: Queue<u32>,
    phase: Phase,
    dataflow: Dataflow,
    run_length: usize,
    fed: usize,
    done: bool,
    runs: u64,
}

impl ControlSequencer {
    /// Build the datapath for `geometry` with the given queue depths.
    ///
    /// Callers pass dimensions already checked by [`NpuConfig::validate`].
    ///
    /// [`NpuConfig::validate`]: crate::NpuConfig::validate
    pub(crate) fn new(geometry: ArrayGeometry, ingress_depth: usize, output_depth: usize) -> Self {
        Self {
            geometry,
            array: SystolicArray::new(geometry),
            skew_act: SkewBuffer::new(geometry.rows),
            skew_weight: SkewBuffer::new(geometry.cols),
            deskew: DeskewBuffer::new(geometry.cols),
            valid_line: VecDeque::new(),
            ppu: PostProcessingUnit::new(geometry.cols),
            ingress_weights: Queue::new(ingress_depth),
            ingress_acts: Queue::new(ingress_depth),
            output: Queue::new(output_depth),
            phase: Phase::Idle,
            dataflow: Dataflow::default(),
            run_length: 0,
            fed: 0,
            done: false,
            runs: 0,
        }
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> State {
        self.phase.state()
    }

    /// Busy lock derived from the state.
    pub fn lock(&self) -> BusyLock {
        match self.state() {
            State::Running | State::Draining => BusyLock::Held,
            State::Idle | State::Loading => BusyLock::Free,
        }
    }

    /// Sticky completion flag.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Dataflow of the current or last run.
    pub fn dataflow(&self) -> Dataflow {
        self.dataflow
    }

    /// Runs started since reset.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// The PE grid.
    pub fn array(&self) -> &SystolicArray {
        &self.array
    }

    /// Words waiting in the output queue.
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// `STATUS` register value.
    pub fn status_word(&self, ctx: &DeviceContext) -> u32 {
        let mut word = 0;
        if self.lock() == BusyLock::Held {
            word |= status::BUSY;
        }
        if self.done {
            word |= status::DONE;
        }
        if self.input_full(ctx) {
            word |= status::INPUT_FULL;
        }
        if self.output.valid() {
            word |= status::OUTPUT_VALID;
        }
        word
    }

    fn input_full(&self, ctx: &DeviceContext) -> bool {
        self.ingress_weights.is_full()
            || self.ingress_acts.is_full()
            || ctx.staging.port(Operand::Weights).is_full()
            || ctx.staging.port(Operand::Activations).is_full()
    }

    fn ingress_mut(&mut self, operand: Operand) -> &mut Queue<u32> {
        match operand {
            Operand::Weights => &mut self.ingress_weights,
            Operand::Activations => &mut self.ingress_acts,
        }
    }

    fn set_phase(&mut self, next: Phase) {
        let (from, to) = (self.phase.state(), next.state());
        if from != to {
            debug!("Sequencer: {from} -> {to}");
        }
        self.phase = next;
    }

    // ── Cycle ────────────────────────────────────────────────────────────────

    /// Advance one clock cycle, optionally presenting one bus request.
    pub fn step(&mut self, ctx: &mut DeviceContext, request: Option<BusRequest>) -> BusResponse {
        let response = match request {
            Some(req) if req.write => self.bus_write(ctx, req.addr, req.data),
            Some(req) => self.bus_read(ctx, req.addr),
            None => BusResponse::default(),
        };
        self.commit_ingress(ctx);
        self.advance(ctx);
        response
    }

    fn bus_read(&mut self, ctx: &DeviceContext, addr: u32) -> BusResponse {
        let data = match addr {
            regs::STATUS => self.status_word(ctx),
            regs::READ_OUT => self.output.try_pop().unwrap_or(0),
            regs::GEOMETRY => self
                .geometry
                .geometry_word(ctx.staging.port(Operand::Weights).depth()),
            regs::W_PTRS => ctx.staging.port(Operand::Weights).pointer_word(),
            regs::A_PTRS => ctx.staging.port(Operand::Activations).pointer_word(),
            _ => ctx.regs.read(addr).unwrap_or(0),
        };
        trace!("read  {addr:#06x} -> {data:#010x}");
        BusResponse::ack(data)
    }

    fn bus_write(&mut self, ctx: &mut DeviceContext, addr: u32, data: u32) -> BusResponse {
        trace!("write {addr:#06x} <- {data:#010x}");
        match addr {
            regs::CMD => {
                self.execute(ctx, CommandFlags::from_bits(data));
                BusResponse::ack(0)
            }
            regs::WRITE_W => self.stage(Operand::Weights, data),
            regs::WRITE_A => self.stage(Operand::Activations, data),
            _ => {
                match ctx.regs.writer(self.lock()) {
                    Some(mut writer) => {
                        if !writer.write(addr, data) {
                            debug!("Write to {addr:#06x} ignored: not writable");
                        }
                    }
                    None => debug!("Write to {addr:#06x} dropped: busy"),
                }
                BusResponse::ack(0)
            }
        }
    }

    fn stage(&mut self, operand: Operand, word: u32) -> BusResponse {
        if self.lock() == BusyLock::Held {
            debug!("Staging write to {operand} dropped: busy");
            return BusResponse::ack(0);
        }
        if self.ingress_mut(operand).try_push(word).is_err() {
            trace!("{operand} ingress full, holding request");
            return BusResponse::STALL;
        }
        if self.phase == Phase::Idle {
            self.set_phase(Phase::Loading);
        }
        BusResponse::ack(0)
    }

    fn commit_ingress(&mut self, ctx: &mut DeviceContext) {
        if self.lock() == BusyLock::Held {
            return;
        }
        for operand in [Operand::Weights, Operand::Activations] {
            let port = ctx.staging.port_mut(operand);
            if port.is_full() {
                continue;
            }
            if let Some(word) = self.ingress_mut(operand).try_pop() {
                port.write(word);
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    fn execute(&mut self, ctx: &mut DeviceContext, flags: CommandFlags) {
        let flags = match flags.validate() {
            Ok(flags) => flags,
            Err(e) => {
                warn!("Command {:#x} rejected: {e}", flags.bits());
                return;
            }
        };
        if flags.is_empty() {
            return;
        }
        if self.lock() == BusyLock::Held {
            let restart = flags.start() && self.phase == Phase::Drained;
            if !restart {
                debug!(
                    "Command {:#x} rejected: device is {}",
                    flags.bits(),
                    self.state()
                );
                return;
            }
        }
        ctx.regs.record_command(flags);

        let resets = flags.pointer_resets();
        if !resets.is_empty() {
            ctx.staging.apply_resets(resets);
            // Words still in flight belong to the rewound buffer
            if resets.weight_write {
                self.ingress_weights.clear();
            }
            if resets.act_write {
                self.ingress_acts.clear();
            }
            debug!("Staging pointers reset: {resets:?}");
        }
        if flags.clear_acc() {
            self.array.tick(&ArraySignals::clear());
            debug!("Accumulators cleared");
        }
        if flags.start() {
            self.start_run(ctx, flags.load_mode());
        } else if flags.dump() {
            self.start_dump(ctx);
        }
    }

    fn start_run(&mut self, ctx: &DeviceContext, load_mode: bool) {
        self.run_length = ctx.regs.run_length() as usize;
        self.ppu.latch(&ctx.regs.quantization(self.geometry.cols));
        self.dataflow = if load_mode {
            Dataflow::WeightStationary
        } else {
            Dataflow::OutputStationary
        };
        self.skew_act.reset();
        self.skew_weight.reset();
        self.deskew.reset();
        self.valid_line = std::iter::repeat(false).take(self.geometry.rows - 1).collect();
        self.fed = 0;
        self.done = false;
        self.runs += 1;

        let next = match self.dataflow {
            Dataflow::OutputStationary => Phase::Contract {
                cycle: 0,
                total: self.geometry.contraction_cycles(self.run_length),
            },
            Dataflow::WeightStationary => Phase::ShiftWeights {
                remaining: self.geometry.rows,
            },
        };
        info!(
            "Run {} started: {}, run length {}",
            self.runs, self.dataflow, self.run_length
        );
        self.set_phase(next);
    }

    fn start_dump(&mut self, ctx: &DeviceContext) {
        self.ppu.latch(&ctx.regs.quantization(self.geometry.cols));
        self.done = false;
        info!("Manual dump of {} accumulator rows", self.geometry.rows);
        self.set_phase(Phase::Dump {
            remaining: self.geometry.rows,
        });
    }

    fn finish(&mut self) {
        self.done = true;
        info!("Run {} complete: all results queued", self.runs);
        self.set_phase(Phase::Drained);
    }

    // ── Datapath ─────────────────────────────────────────────────────────────

    fn advance(&mut self, ctx: &mut DeviceContext) {
        let ArrayGeometry { rows, cols } = self.geometry;
        match self.phase {
            Phase::Idle | Phase::Loading => {}

            Phase::Contract { cycle, total } => {
                let valid = cycle < self.run_length;
                let (act_word, weight_word) = if valid {
                    (
                        ctx.staging.port_mut(Operand::Activations).read(),
                        ctx.staging.port_mut(Operand::Weights).read(),
                    )
                } else {
                    (0, 0)
                };
                let west = self
                    .skew_act
                    .push(&unpack_lanes(act_word)[..rows], valid)
                    .to_vec();
                let north = self
                    .skew_weight
                    .push(&unpack_lanes(weight_word)[..cols], valid)
                    .to_vec();
                self.array.tick(&ArraySignals::compute(
                    Dataflow::OutputStationary,
                    &west,
                    &north,
                ));
                if cycle + 1 >= total {
                    self.set_phase(Phase::Dump { remaining: rows });
                } else {
                    self.phase = Phase::Contract {
                        cycle: cycle + 1,
                        total,
                    };
                }
            }

            Phase::ShiftWeights { remaining } => {
                let word = ctx.staging.port_mut(Operand::Weights).read();
                self.array
                    .tick(&ArraySignals::load_weight(&unpack_lanes(word)[..cols]));
                if remaining > 1 {
                    self.phase = Phase::ShiftWeights {
                        remaining: remaining - 1,
                    };
                } else if self.run_length == 0 {
                    self.finish();
                } else {
                    self.phase = Phase::Stream { emitted: 0 };
                }
            }

            Phase::Stream { emitted } => {
                if !self.output.ready() {
                    trace!("Output queue full, stream frozen");
                    return;
                }
                let valid = self.fed < self.run_length;
                let word = if valid {
                    self.fed += 1;
                    ctx.staging.port_mut(Operand::Activations).read()
                } else {
                    0
                };
                let west = self.skew_act.push(&unpack_lanes(word)[..rows], valid).to_vec();
                let south = self.array.tick(&ArraySignals::compute(
                    Dataflow::WeightStationary,
                    &west,
                    &[],
                ));
                self.valid_line.push_back(valid);
                let column_valid = self.valid_line.pop_front().unwrap_or(valid);
                self.deskew.push(&south, column_valid);

                if !self.deskew.valid_out() {
                    return;
                }
                let result = pack_padded(&self.ppu.process(self.deskew.output()));
                if self.output.try_push(result).is_err() {
                    warn!("Output queue refused result {result:#010x}");
                }
                let emitted = emitted + 1;
                if emitted >= self.run_length {
                    self.finish();
                } else {
                    self.phase = Phase::Stream { emitted };
                }
            }

            Phase::Dump { remaining } => {
                let word = pack_padded(&self.ppu.process(&self.array.south_edge()));
                if self.output.try_push(word).is_err() {
                    trace!("Output queue full, dump stalled");
                    return;
                }
                self.array.tick(&ArraySignals::dump());
                if remaining > 1 {
                    self.phase = Phase::Dump {
                        remaining: remaining - 1,
                    };
                } else {
                    self.finish();
                }
            }

            Phase::Drained => {
                if self.output.is_empty() {
                    self.set_phase(Phase::Idle);
                }
            }
        }
    }
}
