// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Page-level corruption detection shared by the Leaf and Overflow sub-files.

pub mod checksum;

/// Bytes reserved at the tail of every Leaf/Overflow page for its [`checksum::Checksum`]
/// trailer (a `u128`, little-endian).
pub const CHECKSUM_TRAILER_BYTES: usize = 16;
