// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end driver tests against the cycle model
//!
//! Every device result is compared with the golden model in
//! `qnpu_driver::reference`.

use qnpu_chip::regs;
use qnpu_core::NpuConfig;
use qnpu_driver::{
    reference, BusStats, Command, DriverConfig, DriverError, Matrix, NpuDriver, QuantParams,
    RegisterBus, SimulatorBus, TracedBus,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn driver_with(config: NpuConfig, driver: DriverConfig) -> NpuDriver<SimulatorBus> {
    let bus = SimulatorBus::new(config, driver.transaction_timeout_cycles).unwrap();
    NpuDriver::new(bus, driver).unwrap()
}

fn driver() -> NpuDriver<SimulatorBus> {
    driver_with(NpuConfig::default(), DriverConfig::default())
}

fn random_matrix(rng: &mut SmallRng, rows: usize, cols: usize) -> Matrix {
    Matrix::from_fn(rows, cols, |_, _| rng.gen())
}

// ── Dataflow transparency ────────────────────────────────────────────────────

#[test]
fn test_output_stationary_identity() {
    let mut npu = driver();
    let a = Matrix::from_rows(&[
        vec![1, 2, 3, 4],
        vec![-5, 6, -7, 8],
        vec![9, -10, 11, -12],
        vec![127, -128, 0, 1],
    ])
    .unwrap();
    let out = npu.matmul_tile(&a, &Matrix::identity(4), &QuantParams::default()).unwrap();
    assert_eq!(out, a);
}

#[test]
fn test_weight_stationary_identity() {
    let mut npu = driver();
    let xs = Matrix::from_fn(9, 4, |i, r| (i as i8 - 4) * 3 + r as i8);
    let out = npu
        .stream_weight_stationary(&Matrix::identity(4), &xs, &QuantParams::default())
        .unwrap();
    assert_eq!(out, xs);
}

// ── Arithmetic against the reference ─────────────────────────────────────────

#[test]
fn test_saturation_at_both_rails() {
    let mut npu = driver();
    let a = Matrix::from_fn(4, 8, |r, _| if r % 2 == 0 { 127 } else { -128 });
    let b = Matrix::from_fn(8, 4, |_, _| 127);
    let out = npu.matmul_tile(&a, &b, &QuantParams::default()).unwrap();
    assert_eq!(out.row(0), &[127; 4]);
    assert_eq!(out.row(1), &[-128; 4]);
    assert_eq!(out, reference::quantize_matmul(&a, &b, &QuantParams::default()).unwrap());
}

#[test]
fn test_relu_and_zero_point() {
    let mut npu = driver();
    let a = Matrix::from_fn(4, 3, |r, c| r as i8 * 10 - 15 + c as i8);
    let b = Matrix::from_fn(3, 4, |r, c| r as i8 - c as i8);
    let q = QuantParams {
        mult: 3,
        shift: 2,
        zero_point: -4,
        relu: true,
        bias: [5, -5, 50, -50],
    };
    let out = npu.matmul_tile(&a, &b, &q).unwrap();
    assert_eq!(out, reference::quantize_matmul(&a, &b, &q).unwrap());
    for r in 0..4 {
        assert!(out.row(r).iter().all(|&v| v >= 0));
    }
}

#[test]
fn test_back_to_back_tiles_do_not_leak() {
    let mut npu = driver();
    let mut rng = SmallRng::seed_from_u64(5);
    for k in [1, 7, 3, 16, 2] {
        let a = random_matrix(&mut rng, 4, k);
        let b = random_matrix(&mut rng, k, 4);
        let q = QuantParams::random(&mut rng);
        let out = npu.matmul_tile(&a, &b, &q).unwrap();
        assert_eq!(out, reference::quantize_matmul(&a, &b, &q).unwrap(), "k={k}");
    }
}

#[test]
fn test_tiled_matvec_matches_reference() {
    let mut npu = driver();
    let mut rng = SmallRng::seed_from_u64(9);
    let x: Vec<i8> = (0..20).map(|_| rng.gen_range(-20..=20)).collect();
    let w = Matrix::from_fn(20, 10, |_, _| rng.gen_range(-20..=20));
    let bias: Vec<i32> = (0..10).map(|_| rng.gen_range(-500..=500)).collect();
    let q = QuantParams {
        shift: 3,
        ..QuantParams::default()
    };
    let y = npu.matvec_tiled(&x, &w, &bias, &q).unwrap();
    assert_eq!(y.len(), 10);
    assert_eq!(y, reference::matvec(&x, &w, &bias, &q).unwrap());
}

#[test]
fn test_tiled_matmul_with_column_bias() {
    let mut npu = driver();
    let mut rng = SmallRng::seed_from_u64(17);
    let a = Matrix::from_fn(6, 9, |_, _| rng.gen_range(-30..=30));
    let b = Matrix::from_fn(9, 7, |_, _| rng.gen_range(-30..=30));
    let bias: Vec<i32> = (0..7).map(|c| c * 100 - 300).collect();
    let q = QuantParams {
        mult: 3,
        shift: 5,
        ..QuantParams::default()
    };
    let out = npu.matmul(&a, &b, &bias, &q).unwrap();

    let acc = reference::matmul_i32(&a, &b).unwrap();
    let expected = Matrix::from_fn(6, 7, |r, c| {
        reference::ppu(acc[r][c], bias[c], q.mult, q.shift, q.zero_point, q.relu)
    });
    assert_eq!(out, expected);
}

#[test]
fn test_weight_stationary_stream_matches_reference() {
    let mut npu = driver();
    let mut rng = SmallRng::seed_from_u64(13);
    let w = random_matrix(&mut rng, 4, 4);
    let xs = random_matrix(&mut rng, 12, 4);
    let q = QuantParams {
        mult: 5,
        shift: 7,
        zero_point: 2,
        relu: false,
        bias: [100, -100, 0, 7],
    };
    let out = npu.stream_weight_stationary(&w, &xs, &q).unwrap();
    assert_eq!(out, reference::weight_stationary(&xs, &w, &q).unwrap());
}

#[test]
fn test_partial_weight_stationary_tile() {
    let mut npu = driver();
    let w = Matrix::from_rows(&[vec![1, -1], vec![2, 0], vec![0, 3]]).unwrap();
    let xs = Matrix::from_rows(&[vec![1, 1, 1], vec![4, -2, 5], vec![0, 0, -1]]).unwrap();
    let out = npu.stream_weight_stationary(&w, &xs, &QuantParams::default()).unwrap();
    assert_eq!(out, Matrix::from_rows(&[vec![3, 2], vec![0, 11], vec![0, -3]]).unwrap());
}

#[test]
fn test_dump_requantizes_last_result() {
    let mut npu = driver();
    let a = Matrix::from_fn(4, 4, |r, c| (r * 4 + c) as i8 * 3);
    let b = Matrix::from_fn(4, 4, |r, c| (r + c) as i8);
    npu.matmul_tile(&a, &b, &QuantParams::default()).unwrap();

    let q = QuantParams {
        shift: 4,
        zero_point: 1,
        ..QuantParams::default()
    };
    let acc = reference::matmul_i32(&a, &b).unwrap();
    let expected = reference::quantize(&acc, &q);
    assert_eq!(npu.dump(&q).unwrap(), expected);
    // A second dump sees the same accumulators
    assert_eq!(npu.dump(&q).unwrap(), expected);
}

// ── Protocol ─────────────────────────────────────────────────────────────────

#[test]
fn test_busy_lock_keeps_running_config() {
    let mut npu = driver();
    npu.set_run_length(40).unwrap();
    npu.start(false).unwrap();
    assert!(npu.status().unwrap().busy);

    // Accepted on the bus, dropped by the lock
    npu.bus_mut().write32(regs::RUN_LENGTH, 3).unwrap();
    npu.bus_mut().write32(regs::QUANT_MULT, 9).unwrap();
    assert_eq!(npu.bus_mut().read32(regs::RUN_LENGTH).unwrap(), 40);
    assert_eq!(npu.read_quant().unwrap().mult, 1);

    npu.read_rows().unwrap();
    npu.wait_idle().unwrap();
    npu.set_run_length(3).unwrap();
    assert_eq!(npu.bus_mut().read32(regs::RUN_LENGTH).unwrap(), 3);
}

#[test]
fn test_slow_host_with_shallow_output_queue() {
    let mut npu = driver_with(
        NpuConfig::default().with_output_depth(1),
        DriverConfig::default().with_read_delay(25),
    );
    let mut rng = SmallRng::seed_from_u64(21);
    let a = random_matrix(&mut rng, 4, 6);
    let b = random_matrix(&mut rng, 6, 4);
    let q = QuantParams::random(&mut rng);
    assert_eq!(
        npu.matmul_tile(&a, &b, &q).unwrap(),
        reference::quantize_matmul(&a, &b, &q).unwrap()
    );

    let w = random_matrix(&mut rng, 4, 4);
    let xs = random_matrix(&mut rng, 10, 4);
    assert_eq!(
        npu.stream_weight_stationary(&w, &xs, &q).unwrap(),
        reference::weight_stationary(&xs, &w, &q).unwrap()
    );
}

#[test]
fn test_reused_activations_after_weight_rewind() {
    let mut npu = driver();
    npu.set_run_length(2).unwrap();
    npu.reset_pointers(Command::new().rewind_all()).unwrap();
    npu.stage_activations(&[[1, 2, 3, 4], [1, 1, 1, 1]]).unwrap();
    npu.stage_weights(&[[1, 0, 0, 0], [0, 1, 0, 0]]).unwrap();
    npu.start(false).unwrap();
    let first = npu.read_rows().unwrap();
    assert_eq!(first, vec![[1, 1, 0, 0], [2, 1, 0, 0], [3, 1, 0, 0], [4, 1, 0, 0]]);

    npu.reset_pointers(Command::new().rewind_weight_writes()).unwrap();
    npu.stage_weights(&[[0, 0, 2, 0], [0, 0, 0, 3]]).unwrap();
    npu.start(false).unwrap();
    let second = npu.read_rows().unwrap();
    assert_eq!(second, vec![[0, 0, 2, 3], [0, 0, 4, 3], [0, 0, 6, 3], [0, 0, 8, 3]]);
}

#[test]
fn test_shape_errors() {
    let mut npu = driver();
    let q = QuantParams::default();
    assert!(matches!(
        npu.matmul_tile(&Matrix::zeros(5, 2), &Matrix::zeros(2, 4), &q),
        Err(DriverError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        npu.matmul_tile(&Matrix::zeros(4, 2), &Matrix::zeros(3, 4), &q),
        Err(DriverError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        npu.matvec_tiled(&[1, 2], &Matrix::zeros(2, 5), &[1], &q),
        Err(DriverError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        npu.stream_weight_stationary(&Matrix::zeros(4, 4), &Matrix::zeros(3, 2), &q),
        Err(DriverError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_traced_bus_counts_a_tile() {
    let bus = TracedBus::new(SimulatorBus::with_defaults(64).unwrap());
    let mut npu = NpuDriver::new(bus, DriverConfig::default()).unwrap();
    let a = Matrix::from_fn(4, 5, |r, c| (r + c) as i8);
    let b = Matrix::from_fn(5, 4, |r, c| (r * c) as i8);
    npu.matmul_tile(&a, &b, &QuantParams::default()).unwrap();

    let stats: BusStats = npu.bus().stats();
    assert_eq!(stats.staged_words, 10);
    assert_eq!(stats.output_words, 4);
    assert!(stats.status_polls >= 4);
    assert!(stats.writes > stats.staged_words);
}
