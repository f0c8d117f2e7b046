// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::serde::{DeserializeError, SerializeError};

/// Which treatment a `verify()` pass was asked to apply to inconsistencies it finds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VerifyTreatment {
    /// Only report inconsistencies, do not touch the data.
    Continue,
    /// Report inconsistencies and stop at the first one.
    Stop,
    /// Report inconsistencies and physically reclaim what can be reclaimed
    /// (tombstoned ID-blocks, orphan LOC-pages).
    Correct,
}

/// Errors surfaced by the inverted-index engine.
///
/// Every mutating entry point on [`crate::unit::InvertedUnit`] wraps its body so that any of
/// these variants trigger `recover_all_pages` before the error is returned to the caller.
#[derive(Debug)]
pub enum Error {
    /// I/O error talking to a sub-file.
    Io(std::io::Error),

    /// Failed to serialize an on-disk structure.
    Serialize(SerializeError),

    /// Failed to deserialize an on-disk structure.
    Deserialize(DeserializeError),

    /// An invariant that the engine relies on was found broken — a DIR-block sequence was out
    /// of order, a conversion path that is not implemented (Long-list) was reached, or a
    /// structural assumption otherwise did not hold. Fatal to the current operation.
    Unexpected(&'static str),

    /// A rollback path (`recover_all_pages`, directory rename-back) itself failed. The caller
    /// must treat the owning unit as unavailable until administrative intervention.
    RecoveryFailed,

    /// `verify()` aborted because the B-tree's entry for a term was missing, area keys were
    /// not strictly ascending, or a `Correct` pass could not complete.
    VerifyAborted(&'static str),

    /// Invalid checksum found while loading a page (got, expected).
    InvalidChecksum((u128, u128)),

    /// A unit operation was attempted while the unit was not mounted.
    NotMounted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvertedIndexError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SerializeError> for Error {
    fn from(value: SerializeError) -> Self {
        Self::Serialize(value)
    }
}

impl From<DeserializeError> for Error {
    fn from(value: DeserializeError) -> Self {
        Self::Deserialize(value)
    }
}

/// Engine result type.
pub type Result<T> = std::result::Result<T, Error>;
