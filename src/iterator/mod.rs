// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Forward-scanning cursors over a decoded posting list (§4.4).
//!
//! The original's `MiddleBaseListIterator` walks DIR-blocks → ID-pages → IDBlocks → LOC-blocks
//! lazily, one gap at a time, so that a lower-bound seek or an `expunge` touches only the bits
//! around the current cursor. This crate's [`crate::list`] already decodes a whole area's
//! postings into a `Vec` for merge/vacuum/collection (see its module docs and DESIGN.md); this
//! iterator applies the same simplification and is built as a cursor over that materialized
//! vector, re-decoding it from `overflow`/`area` on construction and on every mutation. Position
//! scanning is delegated to [`location::LocationListIterator`].

pub mod location;

use crate::{
    error::Result,
    leaf::area::Area,
    list::{self, Posting, Profile},
    overflow::OverflowFile,
};

pub use location::LocationListIterator;

/// Forward cursor over one term's decoded postings, with `lower_bound` positioning and
/// delete/undo-delete on the current item (§4.4).
pub struct InvertedIterator<'a> {
    overflow: &'a OverflowFile,
    profile: Profile,
    max_area_unit_size: usize,
    postings: Vec<Posting>,
    cursor: usize,
}

impl<'a> InvertedIterator<'a> {
    /// Decodes every posting currently stored in `area` and positions the cursor before the
    /// first one.
    pub fn new(overflow: &'a OverflowFile, area: &Area, profile: Profile, max_area_unit_size: usize) -> Result<Self> {
        let postings = list::collect_postings(overflow, area, profile)?;
        Ok(Self {
            overflow,
            profile,
            max_area_unit_size,
            postings,
            cursor: 0,
        })
    }

    /// The posting the cursor currently sits on, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Posting> {
        self.postings.get(self.cursor)
    }

    /// Advances the cursor by one posting. Returns the posting it now sits on, or `None` at
    /// end-of-list.
    pub fn next(&mut self) -> Option<&Posting> {
        if self.cursor < self.postings.len() {
            self.cursor += 1;
        }
        self.postings.get(self.cursor)
    }

    /// Positions the cursor at the first posting whose doc-id is `>= doc_id` (binary search,
    /// since `postings` is always doc-id-ascending). Returns `true` iff such a posting exists.
    pub fn lower_bound(&mut self, doc_id: u32) -> bool {
        self.cursor = self.postings.partition_point(|p| p.0 < doc_id);
        self.cursor < self.postings.len()
    }

    /// `true` once the cursor has run past the last posting.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.cursor >= self.postings.len()
    }

    /// Removes the posting the cursor currently sits on from `area`'s underlying storage,
    /// rebuilding it via [`list::remove`], and refreshes this iterator's materialized view so
    /// it keeps reflecting what is actually on disk. Mirrors the original's `expunge(current)`
    /// modulo the "pages freed+reallocated" slack §8's R2 already allows; see DESIGN.md.
    pub fn expunge_current(&mut self, area: &mut Area) -> Result<Option<Posting>> {
        let Some(&(doc_id, ..)) = self.current() else {
            return Ok(None);
        };
        let removed = list::remove(self.overflow, area, self.profile, self.max_area_unit_size, doc_id)?;
        self.refresh(area)?;
        self.lower_bound(doc_id);
        Ok(removed)
    }

    /// Inverse of [`Self::expunge_current`]: reinserts `posting` and refreshes the view,
    /// leaving the cursor on the reinserted doc-id.
    pub fn undo_expunge(&mut self, area: &mut Area, posting: Posting) -> Result<()> {
        let doc_id = posting.0;
        list::undo_remove(self.overflow, area, self.profile, self.max_area_unit_size, posting)?;
        self.refresh(area)?;
        self.lower_bound(doc_id);
        Ok(())
    }

    fn refresh(&mut self, area: &Area) -> Result<()> {
        self.postings = list::collect_postings(self.overflow, area, self.profile)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::area::{AreaBody, MiddleBody};
    use test_log::test;

    fn overflow_file() -> Result<(tempfile::TempDir, OverflowFile)> {
        let dir = tempfile::tempdir()?;
        let overflow = OverflowFile::create(dir.path(), 4096, false, false)?;
        Ok((dir, overflow))
    }

    fn middle_area(overflow: &OverflowFile, doc_ids: impl Iterator<Item = u32>) -> Result<Area> {
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };
        for doc_id in doc_ids {
            list::insert_middle(overflow, &mut area, Profile::Full, doc_id, Some(vec![doc_id]))?;
        }
        Ok(area)
    }

    #[test]
    fn next_walks_postings_in_order() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let area = middle_area(&overflow, 1..=5)?;

        let mut iter = InvertedIterator::new(&overflow, &area, Profile::Full, 4096)?;
        let mut seen = Vec::new();
        while let Some(&(doc_id, ..)) = iter.current() {
            seen.push(doc_id);
            iter.next();
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(iter.is_end());

        Ok(())
    }

    #[test]
    fn lower_bound_finds_first_matching_or_greater() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let area = middle_area(&overflow, [1, 3, 5, 7, 9].into_iter())?;

        let mut iter = InvertedIterator::new(&overflow, &area, Profile::Full, 4096)?;
        assert!(iter.lower_bound(4));
        assert_eq!(iter.current().map(|p| p.0), Some(5));

        assert!(!iter.lower_bound(100));
        assert!(iter.is_end());

        Ok(())
    }

    #[test]
    fn expunge_then_undo_restores_cursor_position() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = middle_area(&overflow, 1..=5)?;

        let mut iter = InvertedIterator::new(&overflow, &area, Profile::Full, 4096)?;
        assert!(iter.lower_bound(3));
        let removed = iter.expunge_current(&mut area)?.expect("doc 3 present");
        assert_eq!(removed.0, 3);
        assert!(!(1..=5).all(|d| iter.postings.iter().any(|p| p.0 == d)));

        iter.undo_expunge(&mut area, removed)?;
        assert_eq!(iter.postings.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

        Ok(())
    }
}
