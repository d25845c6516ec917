// SPDX-License-Identifier: AGPL-3.0-only

//! Property tests: device output equals the golden model for arbitrary
//! operands and quantization parameters.

use proptest::prelude::*;
use qnpu_chip::LANES;
use qnpu_core::NpuConfig;
use qnpu_driver::{reference, run_stress, DriverConfig, Matrix, NpuDriver, QuantParams, SimulatorBus};

fn driver(output_depth: usize) -> NpuDriver<SimulatorBus> {
    let bus = SimulatorBus::new(NpuConfig::default().with_output_depth(output_depth), 64).unwrap();
    NpuDriver::new(bus, DriverConfig::default()).unwrap()
}

fn matrix(rows: usize, cols: usize) -> impl Strategy<Value = Matrix> {
    prop::collection::vec(any::<i8>(), rows * cols)
        .prop_map(move |data| Matrix::from_fn(rows, cols, |r, c| data[r * cols + c]))
}

fn quant() -> impl Strategy<Value = QuantParams> {
    (
        -1000..=1000i32,
        0..=31u8,
        any::<i8>(),
        any::<bool>(),
        prop::array::uniform4(-100_000..=100_000i32),
    )
        .prop_map(|(mult, shift, zero_point, relu, bias)| QuantParams {
            mult,
            shift,
            zero_point,
            relu,
            bias,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn matmul_tile_matches_reference(
        (a, b) in (1..=16usize).prop_flat_map(|k| (matrix(LANES, k), matrix(k, LANES))),
        q in quant(),
        depth in 1..=6usize,
    ) {
        let mut npu = driver(depth);
        let got = npu.matmul_tile(&a, &b, &q).unwrap();
        prop_assert_eq!(got, reference::quantize_matmul(&a, &b, &q).unwrap());
    }

    #[test]
    fn weight_stationary_matches_reference(
        w in matrix(LANES, LANES),
        xs in (1..=12usize).prop_flat_map(|n| matrix(n, LANES)),
        q in quant(),
        depth in 1..=6usize,
    ) {
        let mut npu = driver(depth);
        let got = npu.stream_weight_stationary(&w, &xs, &q).unwrap();
        prop_assert_eq!(got, reference::weight_stationary(&xs, &w, &q).unwrap());
    }
}

#[test]
fn test_seeded_stress_runs_clean() {
    let mut npu = driver(8);
    for seed in [0, 1, 0xC0FFEE] {
        let report = run_stress(&mut npu, 20, seed).unwrap();
        assert!(report.passed(), "seed {seed}: {report}");
        assert_eq!(report.iterations, 20);
    }
}
