// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-term cursor (§4.5): resolves a term via the B-tree, then chains across Leaf pages one
//! area at a time.
//!
//! The original's `makeShortList`/`makeMiddleList` factory methods pick a concrete list-variant
//! object according to the unit's `isNolocation()`/`isNoTF()` flags. This crate has no variant
//! types to choose between: [`crate::leaf::area::Area::new_short`] always produces a Short area,
//! and [`crate::list::insert`] promotes it to Middle on its own the moment it outgrows
//! `max_area_unit_size` (§4.3.3) — so the factory step collapses into "construct a Short area
//! and let the first insert decide", see DESIGN.md.

use crate::{
    btree::BtreeFile,
    error::{Error, Result},
    leaf::{area::Area, page::LeafPage, LeafFile},
    list::Profile,
    overflow::OverflowFile,
    pager::PageId,
};

/// How [`ListManager::reset`] should treat a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Require an exact key match; `reset` returns `false` otherwise.
    Search,
    /// Materialise a new Short area at the insertion point on a miss.
    Create,
    /// Land on the first area `>= term`, following `nextPageId` if the page runs out.
    LowerBound,
}

/// Cursor over one unit's term dictionary plus the Leaf page it currently holds.
pub struct ListManager<'a> {
    btree: &'a BtreeFile,
    leaf: &'a LeafFile,
    overflow: &'a OverflowFile,
    profile: Profile,
    max_area_unit_size: usize,
    page_id: Option<PageId>,
    area_idx: Option<usize>,
}

impl<'a> ListManager<'a> {
    #[must_use]
    pub fn new(btree: &'a BtreeFile, leaf: &'a LeafFile, overflow: &'a OverflowFile) -> Self {
        Self {
            btree,
            leaf,
            overflow,
            profile: Profile::from_flags(leaf.no_tf(), leaf.no_location()),
            max_area_unit_size: leaf.max_area_unit_size(),
            page_id: None,
            area_idx: None,
        }
    }

    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    #[must_use]
    pub fn overflow(&self) -> &'a OverflowFile {
        self.overflow
    }

    #[must_use]
    pub fn max_area_unit_size(&self) -> usize {
        self.max_area_unit_size
    }

    /// The `(page_id, area_index)` the cursor currently sits on, if positioned.
    #[must_use]
    pub fn current(&self) -> Option<(PageId, usize)> {
        Some((self.page_id?, self.area_idx?))
    }

    /// Resolves `term` and positions the cursor according to `mode` (§4.5).
    pub fn reset(&mut self, term: &str, mode: Mode) -> Result<bool> {
        // Step 1: if we still hold a page from a prior call, try it first.
        if let Some(page_id) = self.page_id {
            let page = self.leaf.attach_page(page_id)?;
            let idx = page.lower_bound(term);
            if idx < page.areas.len() {
                return self.finish(term, mode, page_id, idx, &page);
            }
        }

        // Step 2: fall back to the B-tree.
        let Some(page_id) = self.btree.floor(term) else {
            self.page_id = None;
            self.area_idx = None;
            return Ok(false);
        };
        let page = self.leaf.attach_page(page_id)?;
        let idx = page.lower_bound(term);
        self.finish(term, mode, page_id, idx, &page)
    }

    fn finish(&mut self, term: &str, mode: Mode, page_id: PageId, idx: usize, page: &LeafPage) -> Result<bool> {
        match mode {
            Mode::Search => {
                let hit = idx < page.areas.len() && page.areas[idx].key == term;
                self.page_id = Some(page_id);
                self.area_idx = hit.then_some(idx);
                Ok(hit)
            }
            Mode::Create => {
                if idx < page.areas.len() && page.areas[idx].key == term {
                    self.page_id = Some(page_id);
                    self.area_idx = Some(idx);
                    return Ok(true);
                }
                let (landed_page, landed_idx) = self.leaf.insert_area(self.btree, page_id, Area::new_short(term))?;
                self.page_id = Some(landed_page);
                self.area_idx = Some(landed_idx);
                Ok(true)
            }
            Mode::LowerBound => {
                self.page_id = Some(page_id);
                if idx < page.areas.len() {
                    self.area_idx = Some(idx);
                    return Ok(true);
                }
                self.advance_to_next_nonempty_page(page.next_page_id)
            }
        }
    }

    /// Advances the cursor to the next area on the current leaf page, chaining through
    /// `nextPageId` when the current page is exhausted.
    pub fn next(&mut self) -> Result<bool> {
        let (Some(page_id), Some(idx)) = (self.page_id, self.area_idx) else {
            return Ok(false);
        };
        let page = self.leaf.attach_page(page_id)?;
        if idx + 1 < page.areas.len() {
            self.area_idx = Some(idx + 1);
            return Ok(true);
        }
        self.advance_to_next_nonempty_page(page.next_page_id)
    }

    fn advance_to_next_nonempty_page(&mut self, mut next: Option<PageId>) -> Result<bool> {
        while let Some(next_id) = next {
            let next_page = self.leaf.attach_page(next_id)?;
            if !next_page.areas.is_empty() {
                self.page_id = Some(next_id);
                self.area_idx = Some(0);
                return Ok(true);
            }
            next = next_page.next_page_id;
        }
        self.area_idx = None;
        Ok(false)
    }

    /// The decoded area the cursor currently sits on.
    pub fn current_area(&self) -> Result<Option<Area>> {
        let Some((page_id, idx)) = self.current() else {
            return Ok(None);
        };
        let page = self.leaf.attach_page(page_id)?;
        Ok(page.areas.get(idx).cloned())
    }

    /// Applies `f` to the current area, splitting its Leaf page if growing the area pushed it
    /// past capacity (§4.2), and repositions the cursor onto the area's (possibly new) location.
    pub fn mutate_current_area<T>(&mut self, f: impl FnOnce(&mut Area) -> Result<T>) -> Result<T> {
        let Some((page_id, idx)) = self.current() else {
            return Err(Error::Unexpected("no current area to mutate"));
        };
        let (new_page_id, new_idx, result) = self.leaf.mutate_area(self.btree, page_id, idx, f)?;
        self.page_id = Some(new_page_id);
        self.area_idx = Some(new_idx);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list;
    use test_log::test;

    fn setup() -> Result<(tempfile::TempDir, BtreeFile, LeafFile, OverflowFile)> {
        let dir = tempfile::tempdir()?;
        let btree = BtreeFile::create(dir.path())?;
        let (leaf, _first) = LeafFile::create(dir.path(), 4096, false, false, &btree)?;
        let overflow = OverflowFile::create(dir.path(), 4096, false, false)?;
        Ok((dir, btree, leaf, overflow))
    }

    #[test]
    fn search_mode_requires_exact_match() -> Result<()> {
        let (_dir, btree, leaf, overflow) = setup()?;
        let mut manager = ListManager::new(&btree, &leaf, &overflow);

        assert!(manager.reset("", Mode::Search)?);
        assert!(!manager.reset("missing", Mode::Search)?);

        Ok(())
    }

    #[test]
    fn create_mode_splices_a_new_short_area() -> Result<()> {
        let (_dir, btree, leaf, overflow) = setup()?;
        let mut manager = ListManager::new(&btree, &leaf, &overflow);

        assert!(manager.reset("hello", Mode::Create)?);
        let area = manager.current_area()?.expect("area present");
        assert_eq!(area.key, "hello");
        assert!(manager.reset("hello", Mode::Search)?);

        Ok(())
    }

    #[test]
    fn next_chains_across_areas_in_order() -> Result<()> {
        let (_dir, btree, leaf, overflow) = setup()?;
        let mut manager = ListManager::new(&btree, &leaf, &overflow);

        for term in ["alpha", "beta", "gamma"] {
            manager.reset(term, Mode::Create)?;
        }

        manager.reset("", Mode::Search)?;
        let mut seen = vec![manager.current_area()?.expect("area").key];
        while manager.next()? {
            seen.push(manager.current_area()?.expect("area").key);
        }
        assert_eq!(seen, vec!["", "alpha", "beta", "gamma"]);

        Ok(())
    }

    #[test]
    fn insert_through_manager_round_trips() -> Result<()> {
        let (_dir, btree, leaf, overflow) = setup()?;
        let mut manager = ListManager::new(&btree, &leaf, &overflow);

        manager.reset("term", Mode::Create)?;
        let profile = manager.profile();
        let max = manager.max_area_unit_size();
        manager.mutate_current_area(|area| list::insert(&overflow, area, profile, max, 1, Some(vec![3])))?;

        let area = manager.current_area()?.expect("area present");
        let postings = list::collect_postings(&overflow, &area, profile)?;
        assert_eq!(postings, vec![(1, 1, Some(vec![3]))]);

        Ok(())
    }
}
