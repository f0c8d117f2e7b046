// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BitReader, BitWriter, GapCoder};

/// Elias gamma coding: a value `v >= 1` is written as `N` zero bits followed by the `N + 1`-bit
/// binary representation of `v`, where `N = floor(log2(v))`. Small values cost few bits, which
/// matches the skew of doc-id gaps and position gaps in a posting list.
///
/// This is the default coder used when a caller does not pick one explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct GammaCoder;

impl GammaCoder {
    fn order(value: u32) -> usize {
        debug_assert!(value >= 1, "gamma coding requires a positive value");
        (31 - value.leading_zeros()) as usize
    }
}

impl GapCoder for GammaCoder {
    fn bit_length(value: u32) -> usize {
        2 * Self::order(value) + 1
    }

    fn write(writer: &mut BitWriter, value: u32) {
        let n = Self::order(value);
        writer.write_unary(n);
        if n > 0 {
            writer.write_bits(value, n);
        }
    }

    fn read(reader: &mut BitReader) -> Option<u32> {
        let n = reader.read_unary()?;
        let rest = if n > 0 { reader.read_bits(n)? } else { 0 };
        Some((1 << n) | rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn round_trip(values: &[u32]) {
        let mut writer = BitWriter::new();
        for &v in values {
            GammaCoder::write(&mut writer, v);
        }

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        for &v in values {
            assert_eq!(GammaCoder::read(&mut reader), Some(v));
        }
    }

    #[test]
    fn round_trips_small_values() {
        round_trip(&[1, 2, 3, 4, 7, 8, 255, 256, 1_000_000]);
    }

    #[test]
    fn bit_length_matches_actual_write() {
        for v in [1, 2, 5, 16, 17, 1023, 1024] {
            let mut writer = BitWriter::new();
            GammaCoder::write(&mut writer, v);
            assert_eq!(writer.len_bits(), GammaCoder::bit_length(v));
        }
    }

    #[test]
    fn one_is_cheapest() {
        assert_eq!(GammaCoder::bit_length(1), 1);
    }
}
