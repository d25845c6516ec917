// SPDX-License-Identifier: AGPL-3.0-only

//! Cycle-accurate model of the quantized systolic NPU.
//!
//! Everything here advances in lockstep with a single clock: each component
//! exposes a `tick`/`step`/`push` that computes its next state from its
//! current state and its inputs for that cycle. Nothing blocks and nothing
//! is shared: the [`ControlSequencer`] owns the datapath and receives the
//! register file and staging memories as an explicit [`DeviceContext`].
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`queue`] | Bounded ready/valid FIFO used at every boundary |
//! | [`skew`] | Input skew and output deskew delay lines |
//! | [`pe`] | One multiply-accumulate cell |
//! | [`array`] | PE grid, both dataflows, drain chain |
//! | [`ppu`] | Requantization to signed 8-bit |
//! | [`staging`] | Operand memories and their pointers |
//! | [`regfile`] | Configuration registers, commands, busy lock |
//! | [`sequencer`] | State machine driving all of the above |
//! | [`npu`] | Top level with cycle counter |
//! | [`bus`] | Request/response types of the register bus |
//!
//! # Example
//!
//! ```
//! use qnpu_chip::regs;
//! use qnpu_core::{BusRequest, Npu, NpuConfig};
//!
//! let mut npu = Npu::new(NpuConfig::default()).unwrap();
//! let resp = npu.tick(Some(BusRequest::read(regs::STATUS)));
//! assert!(resp.ready);
//! assert_eq!(resp.data, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]

pub mod array;
pub mod bus;
pub mod config;
pub mod error;
pub mod npu;
pub mod pe;
pub mod ppu;
pub mod queue;
pub mod regfile;
pub mod sequencer;
pub mod skew;
pub mod staging;

pub use array::{ArraySignals, Dataflow, SystolicArray};
pub use bus::{BusRequest, BusResponse};
pub use config::NpuConfig;
pub use error::{CommandError, CoreError, Result};
pub use npu::Npu;
pub use ppu::{requantize, PostProcessingUnit, QuantizationConfig};
pub use queue::Queue;
pub use regfile::{BusyLock, CommandFlags, ConfigWriter, RegisterFile};
pub use sequencer::{ControlSequencer, DeviceContext, State};
pub use skew::{DeskewBuffer, SkewBuffer};
pub use staging::{Operand, PointerResets, StagingMemory};
