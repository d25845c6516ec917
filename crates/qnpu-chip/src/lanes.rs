// SPDX-License-Identifier: AGPL-3.0-only

//! Lane packing of bus words.
//!
//! Data words carry four signed 8-bit lanes, little-endian: lane 0 in bits
//! [7:0], lane 3 in bits [31:24]. Bias and accumulator words are plain
//! two's-complement `i32`.

/// Lanes per data word. The register-mapped device is `LANES × LANES`.
pub const LANES: usize = 4;

/// Pack four `i8` lanes into one bus word.
#[must_use]
pub fn pack_lanes(lanes: [i8; LANES]) -> u32 {
    u32::from_le_bytes(lanes.map(|v| v as u8))
}

/// Unpack one bus word into four `i8` lanes.
#[must_use]
pub fn unpack_lanes(word: u32) -> [i8; LANES] {
    word.to_le_bytes().map(|b| b as i8)
}

/// Pack a slice of up to [`LANES`] values, zero-padding missing lanes.
#[must_use]
pub fn pack_padded(values: &[i8]) -> u32 {
    let mut lanes = [0i8; LANES];
    for (dst, src) in lanes.iter_mut().zip(values) {
        *dst = *src;
    }
    pack_lanes(lanes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_lane_order() {
        assert_eq!(pack_lanes([1, 2, 3, 4]), 0x0403_0201);
        assert_eq!(pack_lanes([-1, 0, 0, 0]), 0x0000_00FF);
        assert_eq!(unpack_lanes(0x80FF_7F01), [1, 127, -1, -128]);
    }

    #[test]
    fn padded_pack() {
        assert_eq!(pack_padded(&[5]), 5);
        assert_eq!(unpack_lanes(pack_padded(&[-2, 3])), [-2, 3, 0, 0]);
    }
}
