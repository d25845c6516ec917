// SPDX-License-Identifier: AGPL-3.0-only

//! Host driver for the quantized systolic NPU.
//!
//! Everything here talks to the device through 32-bit register accesses
//! only, so the same code drives the cycle model and anything else that
//! implements [`RegisterBus`].
//!
//! # Layers
//!
//! ```text
//! NpuDriver      matmul_tile, matmul, matvec_tiled, classify,
//!     │          stream_weight_stationary, dump,
//!     │          stage_*, start, wait_*, read_results, read_rows
//! RegisterBus    write32 / read32 / idle
//!     │
//! SimulatorBus   qnpu_core::Npu, one clock per bus attempt
//! TracedBus<B>   transaction counters around any bus
//! ```
//!
//! [`reference`] is the golden model every device result is checked
//! against, [`stress`] automates that check over random problems, and
//! [`classify`] scores a dense layer over a labelled sample set.
//!
//! # Quick start
//!
//! ```
//! use qnpu_driver::{DriverConfig, Matrix, NpuDriver, QuantParams, SimulatorBus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SimulatorBus::with_defaults(64)?;
//! let mut npu = NpuDriver::new(bus, DriverConfig::default())?;
//!
//! let a = Matrix::from_fn(4, 4, |r, c| (r * 4 + c) as i8);
//! let out = npu.matmul_tile(&a, &Matrix::identity(4), &QuantParams::default())?;
//! assert_eq!(out, a);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

mod backend;
pub mod backends;
pub mod classify;
mod config;
mod driver;
mod error;
pub mod matrix;
pub mod quant;
pub mod reference;
pub mod stress;

pub use backend::{BackendType, RegisterBus};
pub use backends::{BusStats, SimulatorBus, TracedBus};
pub use classify::{evaluate, Classification, ClassificationReport, SampleResult};
pub use config::DriverConfig;
pub use driver::{Command, DeviceStatus, NpuDriver};
pub use error::{DriverError, Result};
pub use matrix::Matrix;
pub use quant::QuantParams;
pub use stress::{run_stress, StressCase, StressReport};
