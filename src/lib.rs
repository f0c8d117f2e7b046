// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An inverted-index posting-list storage engine for a full-text search subsystem.
//!
//! A unit ([`unit::InvertedUnit`]) maps terms to posting lists through three sub-files: a
//! term→leaf-page B-tree ([`btree`]), a Leaf sub-file holding per-term areas ([`leaf`]), and an
//! Overflow sub-file holding the doc-id/location data a Middle-shaped list grows into
//! ([`overflow`]). [`list_manager::ListManager`] resolves a term to its area; [`list`] applies
//! the Short/Middle insert, merge and vacuum algorithms to it; [`iterator`] walks the result.
//!
//! ```no_run
//! use inverted_index::{config::Config, unit::InvertedUnit};
//!
//! # fn main() -> inverted_index::error::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let unit = InvertedUnit::create(dir.path(), &Config::new())?;
//! unit.insert("rust", 1, Some(vec![0, 12]))?;
//! assert!(unit.search_btree("rust")?);
//! # Ok(())
//! # }
//! ```

pub mod btree;
pub mod coding;
pub mod config;
pub mod error;
pub mod file;
pub mod fs;
pub mod iterator;
pub mod leaf;
pub mod list;
pub mod list_manager;
pub mod overflow;
pub mod page;
pub mod pager;
pub mod serde;
pub mod unit;

pub use config::Config;
pub use error::{Error, Result, VerifyTreatment};
pub use unit::InvertedUnit;
