// SPDX-License-Identifier: AGPL-3.0-only

//! Register bus implementations
//!
//! - **Simulator**: drives the cycle-accurate model one clock per poll
//! - **Traced**: wraps any bus, counting and logging every transaction

pub mod simulator;
pub mod traced;

pub use simulator::SimulatorBus;
pub use traced::{BusStats, TracedBus};
