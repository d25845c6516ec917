// SPDX-License-Identifier: AGPL-3.0-only

//! `qnpu`: command-line front end for the quantized systolic NPU model.
//!
//! ```text
//! USAGE:
//!   qnpu regs                         Dump the register map of a fresh device
//!   qnpu identity                     A·I and x·I through both dataflows
//!   qnpu stress [-n N] [--seed S]     Random tiles vs the golden model
//!   qnpu tiled [--k K] [--n N]        Tiled matrix-vector product
//!   qnpu stream [--vectors N]         Weight-stationary stream
//!   qnpu ppu --acc V [...]            Requantize one accumulator
//!   qnpu matmul --a A --b B [...]     Multiply two matrix files
//!   qnpu classify --w W --bias B --samples X [--labels Y]
//!                                     Dense-layer argmax, match and accuracy
//! ```
//!
//! Set `RUST_LOG=debug` (or `trace`) to watch the sequencer and bus.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use qnpu_chip::{regs, ArrayGeometry};
use qnpu_core::NpuConfig;
use qnpu_driver::matrix::load_vector;
use qnpu_driver::{
    evaluate, reference, run_stress, DriverConfig, Matrix, NpuDriver, QuantParams, RegisterBus,
    SimulatorBus, TracedBus,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qnpu", about = "Quantized systolic NPU simulator CLI", version)]
struct Cli {
    /// Output queue depth of the simulated device.
    #[arg(long, global = true, default_value_t = qnpu_chip::geometry::DEFAULT_OUTPUT_DEPTH)]
    output_depth: usize,

    /// Words per staging memory.
    #[arg(long, global = true, default_value_t = qnpu_chip::geometry::DEFAULT_STAGING_DEPTH)]
    staging_depth: usize,

    /// Idle cycles before every output read.
    #[arg(long, global = true, default_value_t = 0)]
    read_delay: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print every register of a freshly reset device.
    Regs,
    /// Check that identity weights pass operands through unchanged.
    Identity,
    /// Compare random 4×8·8×4 tiles against the golden model.
    Stress {
        /// Number of random tiles.
        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: usize,
        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Tiled matrix-vector product x(K) · W(K×N) with per-output bias.
    Tiled {
        /// Contraction depth.
        #[arg(long, default_value_t = 20)]
        k: usize,
        /// Output length.
        #[arg(long, default_value_t = 10)]
        n: usize,
        /// RNG seed.
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Stream activation vectors through stationary 4×4 weights.
    Stream {
        /// Number of activation vectors.
        #[arg(long, default_value_t = 16)]
        vectors: usize,
        /// RNG seed.
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Requantize one accumulator value.
    Ppu {
        /// Accumulator value.
        #[arg(long, allow_hyphen_values = true)]
        acc: i32,
        /// Bias added before scaling.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        bias: i32,
        #[command(flatten)]
        quant: QuantArgs,
    },
    /// Multiply two matrix text files on the device.
    Matmul {
        /// Left operand (M×K).
        #[arg(long)]
        a: PathBuf,
        /// Right operand (K×N).
        #[arg(long)]
        b: PathBuf,
        #[command(flatten)]
        quant: QuantArgs,
    },
    /// Classify samples with a quantized dense layer and check every score
    /// against the golden model.
    Classify {
        /// Layer weights (features × classes).
        #[arg(long)]
        w: PathBuf,
        /// One bias per class.
        #[arg(long)]
        bias: Option<PathBuf>,
        /// One sample per row (samples × features).
        #[arg(long)]
        samples: PathBuf,
        /// One class index per sample.
        #[arg(long)]
        labels: Option<PathBuf>,
        #[command(flatten)]
        quant: QuantArgs,
    },
}

#[derive(Args)]
struct QuantArgs {
    /// Fixed-point multiplier.
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    mult: i32,
    /// Rounding right shift (0..=31).
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=31))]
    shift: u8,
    /// Output zero point.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    zero: i8,
    /// Clamp negative outputs to zero.
    #[arg(long)]
    relu: bool,
}

impl QuantArgs {
    fn params(&self) -> QuantParams {
        QuantParams {
            mult: self.mult,
            shift: self.shift,
            zero_point: self.zero,
            relu: self.relu,
            ..QuantParams::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let device = NpuConfig::default()
        .with_output_depth(cli.output_depth)
        .with_staging_depth(cli.staging_depth);
    let config = DriverConfig::default().with_read_delay(cli.read_delay);
    debug!("Device {device:?}, driver {config:?}");
    let bus = TracedBus::new(SimulatorBus::new(device, config.transaction_timeout_cycles)?);
    let mut npu = NpuDriver::new(bus, config)?;

    match cli.command {
        Cmd::Regs => cmd_regs(&mut npu)?,
        Cmd::Identity => cmd_identity(&mut npu)?,
        Cmd::Stress { iterations, seed } => cmd_stress(&mut npu, iterations, seed)?,
        Cmd::Tiled { k, n, seed } => cmd_tiled(&mut npu, k, n, seed)?,
        Cmd::Stream { vectors, seed } => cmd_stream(&mut npu, vectors, seed)?,
        Cmd::Ppu { acc, bias, quant } => cmd_ppu(acc, bias, &quant),
        Cmd::Matmul { a, b, quant } => cmd_matmul(&mut npu, &a, &b, &quant)?,
        Cmd::Classify {
            w,
            bias,
            samples,
            labels,
            quant,
        } => cmd_classify(
            &mut npu,
            &w,
            bias.as_deref(),
            &samples,
            labels.as_deref(),
            &quant,
        )?,
    }

    let stats = npu.bus().stats();
    println!();
    println!(
        "Bus: {} writes, {} reads ({} status polls), {} cycles",
        stats.writes,
        stats.reads,
        stats.status_polls,
        npu.cycles()
    );
    Ok(())
}

type Driver = NpuDriver<TracedBus<SimulatorBus>>;

fn cmd_regs(npu: &mut Driver) -> Result<()> {
    let geometry = npu.geometry();
    println!("Array        : {}x{} PEs", geometry.rows, geometry.cols);
    println!("Staging      : {} words per operand", npu.staging_depth());
    println!("Status       : {}", npu.status()?);
    println!();

    let named = [
        ("STATUS", regs::STATUS),
        ("CMD", regs::CMD),
        ("RUN_LENGTH", regs::RUN_LENGTH),
        ("GEOMETRY", regs::GEOMETRY),
        ("W_PTRS", regs::W_PTRS),
        ("A_PTRS", regs::A_PTRS),
        ("QUANT_CFG", regs::QUANT_CFG),
        ("QUANT_MULT", regs::QUANT_MULT),
    ];
    for (name, addr) in named {
        let value = npu.bus_mut().read32(addr)?;
        println!("{addr:#06x}  {name:<12} {value:#010x}");
    }
    for lane in 0..geometry.cols as u32 {
        let addr = regs::bias(lane);
        let value = npu.bus_mut().read32(addr)?;
        println!("{addr:#06x}  BIAS[{lane}]      {value:#010x}");
    }
    Ok(())
}

fn cmd_identity(npu: &mut Driver) -> Result<()> {
    let ArrayGeometry { rows, cols } = npu.geometry();
    let q = QuantParams::default();

    let a = Matrix::from_fn(rows, cols, |r, c| (r * cols + c) as i8 + 1);
    let out = npu.matmul_tile(&a, &Matrix::identity(cols), &q)?;
    println!("Output-stationary A·I:");
    print!("{out}");
    let os_ok = out == a;

    let xs = Matrix::from_fn(6, rows, |i, r| i as i8 * 10 - r as i8);
    let streamed = npu.stream_weight_stationary(&Matrix::identity(rows), &xs, &q)?;
    println!("Weight-stationary x·I:");
    print!("{streamed}");
    let ws_ok = streamed == xs;

    println!(
        "OS {}  WS {}",
        if os_ok { "PASS" } else { "FAIL" },
        if ws_ok { "PASS" } else { "FAIL" }
    );
    if !(os_ok && ws_ok) {
        bail!("identity weights altered the operands");
    }
    Ok(())
}

fn cmd_stress(npu: &mut Driver, iterations: usize, seed: u64) -> Result<()> {
    let report = run_stress(npu, iterations, seed)?;
    println!("Stress seed {seed}: {report}");
    if !report.passed() {
        bail!("mismatched iterations: {:?}", report.mismatches);
    }
    Ok(())
}

fn cmd_tiled(npu: &mut Driver, k: usize, n: usize, seed: u64) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let x: Vec<i8> = (0..k).map(|_| rng.gen_range(-20..=20)).collect();
    let w = Matrix::from_fn(k, n, |_, _| rng.gen_range(-20..=20));
    let bias: Vec<i32> = (0..n).map(|_| rng.gen_range(-200..=200)).collect();
    let q = QuantParams {
        shift: 4,
        ..QuantParams::default()
    };

    let got = npu.matvec_tiled(&x, &w, &bias, &q)?;
    let expected = reference::matvec(&x, &w, &bias, &q)?;
    println!("x      = {x:?}");
    println!("device = {got:?}");
    println!("golden = {expected:?}");
    if got != expected {
        bail!("tiled matvec differs from the golden model");
    }
    println!("PASS ({} tiles)", n.div_ceil(npu.geometry().cols));
    Ok(())
}

fn cmd_stream(npu: &mut Driver, vectors: usize, seed: u64) -> Result<()> {
    let ArrayGeometry { rows, cols } = npu.geometry();
    let mut rng = SmallRng::seed_from_u64(seed);
    let w = Matrix::from_fn(rows, cols, |_, _| rng.gen_range(-10..=10));
    let xs = Matrix::from_fn(vectors, rows, |_, _| rng.gen_range(-10..=10));
    let q = QuantParams::random(&mut rng);

    let begin = npu.cycles();
    let got = npu.stream_weight_stationary(&w, &xs, &q)?;
    let spent = npu.cycles() - begin;
    let expected = reference::weight_stationary(&xs, &w, &q)?;
    println!("Weights:");
    print!("{w}");
    println!("Results:");
    print!("{got}");
    if got != expected {
        bail!("weight-stationary stream differs from the golden model");
    }
    println!("PASS ({vectors} vectors in {spent} cycles)");
    Ok(())
}

fn cmd_ppu(acc: i32, bias: i32, quant: &QuantArgs) {
    let q = quant.params();
    let out = reference::ppu(acc, bias, q.mult, q.shift, q.zero_point, q.relu);
    println!(
        "(({acc} + {bias}) * {}) >> {} + {} {}=> {out}",
        q.mult,
        q.shift,
        q.zero_point,
        if q.relu { "relu " } else { "" }
    );
}

fn cmd_matmul(npu: &mut Driver, a: &Path, b: &Path, quant: &QuantArgs) -> Result<()> {
    let a = Matrix::load(a)?;
    let b = Matrix::load(b)?;
    let q = quant.params();
    let out = npu.matmul(&a, &b, &[], &q)?;
    print!("{out}");
    if out != reference::quantize_matmul(&a, &b, &q)? {
        bail!("device result differs from the golden model");
    }
    Ok(())
}

fn cmd_classify(
    npu: &mut Driver,
    w: &Path,
    bias: Option<&Path>,
    samples: &Path,
    labels: Option<&Path>,
    quant: &QuantArgs,
) -> Result<()> {
    let w = Matrix::load(w)?;
    let bias = match bias {
        Some(path) => load_vector(path)?,
        None => Vec::new(),
    };
    let samples = Matrix::load(samples)?;
    let labels = match labels {
        Some(path) => Some(
            load_vector(path)?
                .into_iter()
                .map(usize::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| anyhow::anyhow!("labels must be non-negative class indices"))?,
        ),
        None => None,
    };
    let q = quant.params();

    let report = evaluate(npu, &w, &bias, &q, &samples, labels.as_deref())?;

    println!(" {:<4} | {:<4} | {:<4} | {:<4} | {:<24} | BIT-OK", "ID", "REAL", "HW", "SW", "SCORES");
    println!("{}", "-".repeat(66));
    for (i, s) in report.samples.iter().enumerate() {
        let real = s.label.map_or_else(|| "-".to_string(), |l| l.to_string());
        let scores = format!("{:?}", s.device.scores);
        println!(
            " {i:<4} | {real:<4} | {:<4} | {:<4} | {scores:<24} | {}",
            s.device.class,
            s.reference_class,
            if s.bit_exact { "MATCH" } else { "FAIL" }
        );
    }
    println!();
    println!(
        "Bit-exact    : {}/{} ({:.1}%)",
        report.bit_exact(),
        report.samples.len(),
        report.match_rate()
    );
    if let (Some(correct), Some(accuracy)) = (report.correct(), report.accuracy()) {
        println!(
            "Accuracy     : {correct}/{} ({accuracy:.1}%)",
            report.samples.len()
        );
    }
    if report.bit_exact() != report.samples.len() {
        bail!("device scores differ from the golden model");
    }
    Ok(())
}
