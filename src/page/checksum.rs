// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use xxhash_rust::xxh3::Xxh3Default;

/// A 128-bit page checksum, used by `verify()` to detect corruption below page granularity.
///
/// Computed with the same `Xxh3Default` hasher the teacher's own `ChecksummedWriter` feeds
/// written bytes through; here it runs as a single one-shot digest over an already-materialized
/// page buffer rather than incrementally over a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Checksum(u128);

impl std::ops::Deref for Checksum {
    type Target = u128;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Checksum {
    #[must_use]
    pub fn from_raw(value: u128) -> Self {
        Self(value)
    }

    /// Computes the checksum of a byte slice.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Xxh3Default::new();
        hasher.update(bytes);
        Self(hasher.digest128())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn checksum_is_deterministic() {
        let a = Checksum::from_bytes(b"hello world");
        let b = Checksum::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_differs_on_change() {
        let a = Checksum::from_bytes(b"hello world");
        let b = Checksum::from_bytes(b"hello worle");
        assert_ne!(a, b);
    }
}
