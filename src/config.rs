// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::GammaCoder;

/// Default Leaf page size, in bytes. Chosen to comfortably hold a handful of short areas.
pub const DEFAULT_LEAF_PAGE_SIZE: usize = 8 * 1024;

/// Default Overflow page size, in bytes.
pub const DEFAULT_OVERFLOW_PAGE_SIZE: usize = 8 * 1024;

/// Default attached-page threshold before `saveAllPages` forces a checkpoint. The original
/// engine picks this based on pointer width (≈1000 on 64-bit, ≈100 on 32-bit); this crate
/// always runs on 64-bit-sized `usize` pages so it uses the 64-bit figure as a fixed default.
pub const DEFAULT_SAVE_ALL_PAGES_THRESHOLD: usize = 1000;

/// Configuration for one [`crate::unit::InvertedUnit`].
///
/// Follows the teacher's builder shape (`with_*` methods consuming and returning `self`) rather
/// than exposing public mutable fields, so that future knobs can be added without breaking call
/// sites.
#[derive(Debug, Clone)]
pub struct Config {
    leaf_page_size: usize,
    overflow_page_size: usize,
    save_all_pages_threshold: usize,
    no_tf: bool,
    no_location: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leaf_page_size: DEFAULT_LEAF_PAGE_SIZE,
            overflow_page_size: DEFAULT_OVERFLOW_PAGE_SIZE,
            save_all_pages_threshold: DEFAULT_SAVE_ALL_PAGES_THRESHOLD,
            no_tf: false,
            no_location: false,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Leaf sub-file's fixed page size, in bytes.
    #[must_use]
    pub fn leaf_page_size(mut self, bytes: usize) -> Self {
        self.leaf_page_size = bytes;
        self
    }

    /// Sets the Overflow sub-file's fixed page size, in bytes.
    #[must_use]
    pub fn overflow_page_size(mut self, bytes: usize) -> Self {
        self.overflow_page_size = bytes;
        self
    }

    /// Sets how many attached pages across all three sub-files may accumulate before
    /// `saveAllPages` is forced.
    #[must_use]
    pub fn save_all_pages_threshold(mut self, pages: usize) -> Self {
        self.save_all_pages_threshold = pages;
        self
    }

    /// Sets the unit's `isNoTF()` flag: no term-frequency or position data stored (implies
    /// `no_location`).
    #[must_use]
    pub fn no_tf(mut self, value: bool) -> Self {
        self.no_tf = value;
        self
    }

    /// Sets the unit's `isNolocation()` flag: term frequency stored, positions are not.
    #[must_use]
    pub fn no_location(mut self, value: bool) -> Self {
        self.no_location = value;
        self
    }

    #[must_use]
    pub fn get_leaf_page_size(&self) -> usize {
        self.leaf_page_size
    }

    #[must_use]
    pub fn get_overflow_page_size(&self) -> usize {
        self.overflow_page_size
    }

    #[must_use]
    pub fn get_save_all_pages_threshold(&self) -> usize {
        self.save_all_pages_threshold
    }

    #[must_use]
    pub fn get_no_tf(&self) -> bool {
        self.no_tf
    }

    #[must_use]
    pub fn get_no_location(&self) -> bool {
        self.no_location || self.no_tf
    }
}

/// The gap coder this crate ships by default. Exposed as a type alias rather than a runtime
/// choice in `Config` — swapping coders changes the on-disk format, so it is a compile-time
/// decision, not a per-unit setting (see DESIGN.md).
pub type DefaultGapCoder = GammaCoder;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new().leaf_page_size(4096).save_all_pages_threshold(10);
        assert_eq!(config.get_leaf_page_size(), 4096);
        assert_eq!(config.get_overflow_page_size(), DEFAULT_OVERFLOW_PAGE_SIZE);
        assert_eq!(config.get_save_all_pages_threshold(), 10);
    }
}
