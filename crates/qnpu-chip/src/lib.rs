// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model for the quantized systolic NPU.
//!
//! This crate has **no dependencies** and **no behavior**: it is a pure
//! description of the device as the host sees it. Register offsets, bit
//! definitions, PE grid geometry and the lane packing of bus words.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register map, status/command bits, quant config packing |
//! | [`geometry`] | PE grid dimensions, pipeline latencies, default depths |
//! | [`lanes`] | Four signed 8-bit lanes per 32-bit bus word |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

pub mod geometry;
pub mod lanes;
pub mod regs;

pub use geometry::ArrayGeometry;
pub use lanes::{pack_lanes, pack_padded, unpack_lanes, LANES};
