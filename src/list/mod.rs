// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-term posting-list logic (§4.3): Short lists store everything inline in a Leaf area;
//! Middle lists keep one last-IDBlock inline and overflow the rest. Rather than six duplicated
//! structs for the {Short, Middle} × {full, no-location, no-location-no-tf} product, this crate
//! models it as free functions parameterized by [`Profile`], operating on an already-decoded
//! [`Area`] plus the [`OverflowFile`] it may need to grow into (see DESIGN.md).

use crate::{
    error::{Error, Result},
    leaf::area::{Area, AreaBody, ListType, MiddleBody},
    overflow::{
        block::{DirBlock, IdBlock, LocBlock, LocEntry},
        page::OverflowPage,
        OverflowFile,
    },
};
use std::collections::HashSet;

/// Which of the four on-disk feature combinations a unit's lists use. Constant for the whole
/// unit (§4.3), not chosen per term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Term frequency and full position lists.
    Full,
    /// Term frequency only, no positions.
    NoLocation,
    /// Neither term frequency nor positions — doc-ids only.
    NoLocationNoTf,
}

impl Profile {
    #[must_use]
    pub fn from_flags(no_tf: bool, no_location: bool) -> Self {
        if no_tf {
            Self::NoLocationNoTf
        } else if no_location {
            Self::NoLocation
        } else {
            Self::Full
        }
    }

    #[must_use]
    pub fn is_nolocation(self) -> bool {
        matches!(self, Self::NoLocation | Self::NoLocationNoTf)
    }

    #[must_use]
    pub fn is_no_tf(self) -> bool {
        matches!(self, Self::NoLocationNoTf)
    }
}

/// One decoded posting, as returned by [`collect_postings`]: `(document_id, frequency,
/// positions)`.
pub type Posting = (u32, u32, Option<Vec<u32>>);

/// Inserts `(doc_id, positions)` into `area`, dispatching on its current shape and converting
/// Short → Middle if the insert would grow the area past `max_area_unit_size` (B1). A `doc_id`
/// at or before the area's current `last_document_id` is a no-op (B3).
pub fn insert(
    overflow: &OverflowFile,
    area: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    doc_id: u32,
    positions: Option<Vec<u32>>,
) -> Result<()> {
    crate::pager::fake_error::maybe_fail("insert")?;

    match area.list_type() {
        ListType::Short => {
            if insert_short(area, profile, max_area_unit_size, doc_id, positions)? {
                convert_to_middle(overflow, area, profile)?;
            }
            Ok(())
        }
        ListType::Middle => insert_middle(overflow, area, profile, doc_id, positions),
    }
}

/// Appends one posting to a Short area's inline postings vector (§4.3.1). Returns `true` if the
/// area now exceeds `max_area_unit_size` and the caller must [`convert_to_middle`] it.
pub fn insert_short(
    area: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    doc_id: u32,
    positions: Option<Vec<u32>>,
) -> Result<bool> {
    let already_seen = area.document_count > 0 && doc_id <= area.last_document_id;
    let AreaBody::Short(body) = &mut area.body else {
        return Err(Error::Unexpected("insert_short called on a non-short area"));
    };
    if already_seen {
        return Ok(false);
    }

    let frequency = positions.as_ref().map_or(1, |p| p.len() as u32);
    body.postings.push(crate::leaf::area::ShortPosting {
        document_id: doc_id,
        frequency,
        positions: if profile.is_nolocation() { None } else { positions },
    });

    if area.document_count == 0 {
        area.first_document_id = doc_id;
    }
    area.document_count += 1;
    area.last_document_id = doc_id;

    Ok(area.unit_size(profile.is_no_tf(), profile.is_nolocation()) > max_area_unit_size)
}

/// Rebuilds a Short area as Middle in place (§4.3.3), replaying its postings through
/// [`insert_middle`] so that every promotion/chaining rule applies exactly as it would to a
/// fresh Middle insert.
pub fn convert_to_middle(overflow: &OverflowFile, area: &mut Area, profile: Profile) -> Result<()> {
    let postings = match &area.body {
        AreaBody::Short(body) => body.postings.clone(),
        AreaBody::Middle(_) => return Err(Error::Unexpected("convert_to_middle called on a non-short area")),
    };

    area.body = AreaBody::Middle(MiddleBody::empty());
    area.document_count = 0;
    area.last_document_id = 0;
    area.first_document_id = 0;

    for posting in postings {
        insert_middle(overflow, area, profile, posting.document_id, posting.positions)?;
    }

    Ok(())
}

/// Inserts `(doc_id, positions)` into a Middle area (§4.3.2): appends to the inline last-IDBlock
/// (promoting it into an overflow ID-page first if it's full) and the current LOC-block chain.
pub fn insert_middle(
    overflow: &OverflowFile,
    area: &mut Area,
    profile: Profile,
    doc_id: u32,
    positions: Option<Vec<u32>>,
) -> Result<()> {
    let already_seen = area.document_count > 0 && doc_id <= area.last_document_id;
    let AreaBody::Middle(middle) = &mut area.body else {
        return Err(Error::Unexpected("insert_middle called on a non-middle area"));
    };
    if already_seen {
        return Ok(());
    }

    insert_document_id(overflow, middle, doc_id)?;

    let frequency = positions.as_ref().map_or(1, |p| p.len() as u32);
    let entry = LocEntry {
        frequency,
        positions: if profile.is_nolocation() { None } else { positions },
    };
    append_location(overflow, middle, profile, entry)?;

    if area.document_count == 0 {
        area.first_document_id = doc_id;
    }
    area.document_count += 1;
    area.last_document_id = doc_id;

    Ok(())
}

fn insert_document_id(overflow: &OverflowFile, middle: &mut MiddleBody, doc_id: u32) -> Result<()> {
    if middle.last_id_block.capacity_bits == 0 {
        middle.last_id_block = IdBlock::new(doc_id, overflow.id_block_capacity_bits());
        return Ok(());
    }
    if middle.last_id_block.push(doc_id) {
        return Ok(());
    }

    promote_last_id_block(overflow, middle)?;
    middle.last_id_block = IdBlock::new(doc_id, overflow.id_block_capacity_bits());
    Ok(())
}

/// Moves the current last-IDBlock into an overflow ID-bearing page, registering a DIR-block if
/// needed (§4.3.2.1). Simplified relative to the original's `copyIDBlock`: this crate never
/// splits an IDLOC page's id-section off into a separate ID-page at the 50%-full threshold — see
/// DESIGN.md.
fn promote_last_id_block(overflow: &OverflowFile, middle: &mut MiddleBody) -> Result<()> {
    let block = middle.last_id_block.clone();

    if let Some(dir) = middle.dir_blocks.last() {
        let page_id = dir.id_page_id;
        let pushed = overflow.mutate_page(page_id, |page| {
            let max = page
                .max_id_blocks()
                .ok_or(Error::Unexpected("dir-block target is not an id-bearing page"))?;
            let blocks = page.id_blocks_mut().expect("checked by max_id_blocks above");
            if blocks.len() >= max {
                return Ok(false);
            }
            blocks.push(block.clone());
            Ok(true)
        })?;
        if pushed {
            return Ok(());
        }
    }

    if middle.dir_blocks.is_empty() {
        let page_id = match middle.last_location_page_id {
            Some(id) => id,
            None => {
                let id = overflow.allocate_id_loc_page()?;
                middle.last_location_page_id = Some(id);
                id
            }
        };

        let pushed = overflow.mutate_page(page_id, |page| match (page.max_id_blocks(), page.id_blocks_mut()) {
            (Some(max), Some(blocks)) if blocks.len() < max => {
                blocks.push(block.clone());
                Ok(true)
            }
            _ => Ok(false),
        })?;

        if pushed {
            middle.dir_blocks.push(DirBlock::new(page_id, block.first_document_id));
            return Ok(());
        }
    }

    let page_id = overflow.allocate_id_page()?;
    overflow.mutate_page(page_id, |page| {
        let blocks = page.id_blocks_mut().ok_or(Error::Unexpected("expected an id-bearing page"))?;
        blocks.push(block.clone());
        Ok(())
    })?;
    middle.dir_blocks.push(DirBlock::new(page_id, block.first_document_id));
    Ok(())
}

/// Appends one `(frequency, positions)` pair to the list's current LOC-block, opening a new
/// block (and, if the current page is full, a new chained LOC-page) when it doesn't fit
/// (§4.3.2, `continueFlag`).
fn append_location(overflow: &OverflowFile, middle: &mut MiddleBody, profile: Profile, entry: LocEntry) -> Result<()> {
    if profile.is_no_tf() {
        return Ok(());
    }

    let needed = entry.bit_length(false, profile.is_nolocation());

    let mut page_id = match middle.last_location_page_id {
        Some(id) => id,
        None => {
            let id = overflow.allocate_id_loc_page()?;
            overflow.mutate_page(id, |page| {
                let blocks = page.loc_blocks_mut().ok_or(Error::Unexpected("expected a loc-bearing page"))?;
                blocks.push(LocBlock::new(overflow.loc_block_capacity_bits()));
                Ok(())
            })?;
            middle.last_location_page_id = Some(id);
            id
        }
    };

    let fits = overflow.mutate_page(page_id, |page| {
        let blocks = page.loc_blocks_mut().ok_or(Error::Unexpected("expected a loc-bearing page"))?;
        Ok(blocks.last().is_some_and(|b| b.free_bits(false, profile.is_nolocation()) >= needed))
    })?;

    if !fits {
        overflow.mutate_page(page_id, |page| {
            let blocks = page.loc_blocks_mut().ok_or(Error::Unexpected("expected a loc-bearing page"))?;
            if let Some(last) = blocks.last_mut() {
                last.continue_flag = true;
            }
            Ok(())
        })?;

        let new_page_id = overflow.allocate_loc_page()?;
        overflow.mutate_page(new_page_id, |page| {
            page.set_loc_prev_page_id(Some(page_id));
            let blocks = page.loc_blocks_mut().ok_or(Error::Unexpected("expected a loc-bearing page"))?;
            blocks.push(LocBlock::new(overflow.loc_block_capacity_bits()));
            Ok(())
        })?;
        overflow.mutate_page(page_id, |page| {
            page.set_loc_next_page_id(Some(new_page_id));
            Ok(())
        })?;

        middle.last_location_page_id = Some(new_page_id);
        page_id = new_page_id;
    }

    overflow.mutate_page(page_id, |page| {
        let blocks = page.loc_blocks_mut().ok_or(Error::Unexpected("expected a loc-bearing page"))?;
        blocks
            .last_mut()
            .ok_or(Error::Unexpected("loc page has no block"))?
            .entries
            .push(entry.clone());
        Ok(())
    })?;

    Ok(())
}

/// Decodes every live posting in `area`, in ascending doc-id order (I2). Used by merge-insert,
/// vacuum, and full-scan tests; a real engine would walk this lazily via an iterator (§4.4,
/// `src/iterator`), but a full materialized scan is adequate at this crate's scale.
pub fn collect_postings(overflow: &OverflowFile, area: &Area, profile: Profile) -> Result<Vec<Posting>> {
    match &area.body {
        AreaBody::Short(body) => Ok(body
            .postings
            .iter()
            .map(|p| (p.document_id, p.frequency, p.positions.clone()))
            .collect()),
        AreaBody::Middle(middle) => collect_middle_postings(overflow, middle, profile),
    }
}

fn collect_middle_postings(overflow: &OverflowFile, middle: &MiddleBody, profile: Profile) -> Result<Vec<Posting>> {
    let mut doc_ids = Vec::new();

    for dir in &middle.dir_blocks {
        if dir.tombstone {
            continue;
        }
        let page = overflow.attach_page(dir.id_page_id)?;
        let blocks = match &page {
            OverflowPage::Id(body) => &body.blocks,
            OverflowPage::IdLoc(body) => &body.id_blocks,
            OverflowPage::Loc(_) => return Err(Error::Unexpected("dir-block points at a pure loc page")),
        };
        for block in blocks {
            if block.tombstone {
                continue;
            }
            doc_ids.push(block.first_document_id);
            doc_ids.extend(block.doc_ids.iter().copied());
        }
    }

    if middle.last_id_block.capacity_bits > 0 && !middle.last_id_block.tombstone {
        doc_ids.push(middle.last_id_block.first_document_id);
        doc_ids.extend(middle.last_id_block.doc_ids.iter().copied());
    }

    if profile.is_no_tf() {
        return Ok(doc_ids.into_iter().map(|id| (id, 1, None)).collect());
    }

    let mut entries = Vec::new();
    if let Some(last_loc) = middle.last_location_page_id {
        let start = find_loc_chain_start(overflow, last_loc)?;

        let mut current = Some(start);
        while let Some(id) = current {
            let page = overflow.attach_page(id)?;
            let blocks = match &page {
                OverflowPage::Loc(body) => &body.blocks,
                OverflowPage::IdLoc(body) => &body.loc_blocks,
                OverflowPage::Id(_) => return Err(Error::Unexpected("expected a loc-bearing page")),
            };
            for block in blocks {
                entries.extend(block.entries.iter().cloned());
            }
            current = page.loc_next_page_id();
        }
    }

    if doc_ids.len() != entries.len() {
        return Err(Error::Unexpected("doc-id count does not match location-entry count"));
    }

    Ok(doc_ids
        .into_iter()
        .zip(entries)
        .map(|(id, entry)| (id, entry.frequency, entry.positions))
        .collect())
}

fn find_loc_chain_start(overflow: &OverflowFile, from: crate::pager::PageId) -> Result<crate::pager::PageId> {
    let mut current = from;
    loop {
        let page = overflow.attach_page(current)?;
        match page.loc_prev_page_id() {
            Some(prev) => current = prev,
            None => return Ok(current),
        }
    }
}

/// Streams `source`'s postings into `dest` (§4.3.4). A no-op if the merge precondition
/// (`dest.last_document_id < source first doc-id`) doesn't hold — the caller is re-attempting a
/// merge that already happened.
pub fn merge_insert(
    overflow: &OverflowFile,
    dest: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    source_postings: &[Posting],
) -> Result<()> {
    let Some(&(first_doc, _, _)) = source_postings.first() else {
        return Ok(());
    };

    if dest.document_count > 0 && dest.last_document_id >= first_doc {
        return Ok(());
    }

    for (doc_id, _frequency, positions) in source_postings {
        insert(overflow, dest, profile, max_area_unit_size, *doc_id, positions.clone())?;
    }

    Ok(())
}

/// Rebuilds a Middle area's overflow storage in place (§4.3.5): decode every posting, free every
/// overflow page the area currently references, then replay the postings into a fresh, minimal
/// Middle area.
pub fn vacuum(overflow: &OverflowFile, area: &mut Area, profile: Profile, max_area_unit_size: usize) -> Result<()> {
    if !matches!(area.body, AreaBody::Middle(_)) {
        return Err(Error::Unexpected("vacuum is only defined for middle areas"));
    }

    let postings = collect_postings(overflow, area, profile)?;
    rebuild_area(overflow, area, profile, max_area_unit_size, postings)
}

/// Removes `doc_id`'s posting, returning it for a possible [`undo_remove`]. Implemented (for
/// both shapes) as decode-all / filter / [`rebuild_area`] rather than the original's in-place
/// IDBlock-gap-rewrite-and-shift: §8's R2 already allows a delete/undo round-trip to differ
/// "modulo pages freed+reallocated", which is exactly what this produces. See DESIGN.md.
pub fn remove(
    overflow: &OverflowFile,
    area: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    doc_id: u32,
) -> Result<Option<Posting>> {
    crate::pager::fake_error::maybe_fail("expunge")?;

    let mut postings = collect_postings(overflow, area, profile)?;
    let Some(idx) = postings.iter().position(|p| p.0 == doc_id) else {
        return Ok(None);
    };
    let removed = postings.remove(idx);
    rebuild_area(overflow, area, profile, max_area_unit_size, postings)?;
    Ok(Some(removed))
}

/// Inverse of [`remove`]: reinserts a previously removed posting and rebuilds the area.
pub fn undo_remove(
    overflow: &OverflowFile,
    area: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    posting: Posting,
) -> Result<()> {
    let mut postings = collect_postings(overflow, area, profile)?;
    postings.push(posting);
    rebuild_area(overflow, area, profile, max_area_unit_size, postings)
}

/// Frees whatever overflow pages `area` currently references (if it is Middle), then replays
/// `postings` (sorted by doc-id) into a fresh area of the same key and shape, via the ordinary
/// [`insert`] path — so Short areas that grow past budget during the replay convert to Middle
/// exactly as a live insert sequence would.
fn rebuild_area(
    overflow: &OverflowFile,
    area: &mut Area,
    profile: Profile,
    max_area_unit_size: usize,
    mut postings: Vec<Posting>,
) -> Result<()> {
    postings.sort_by_key(|p| p.0);

    let was_middle = matches!(area.body, AreaBody::Middle(_));
    if was_middle {
        free_middle_pages(overflow, &area.body)?;
    }

    let mut rebuilt = Area::new_short(area.key.clone());
    if was_middle {
        rebuilt.body = AreaBody::Middle(MiddleBody::empty());
    }

    for (doc_id, _frequency, positions) in postings {
        insert(overflow, &mut rebuilt, profile, max_area_unit_size, doc_id, positions)?;
    }

    *area = rebuilt;
    Ok(())
}

fn free_middle_pages(overflow: &OverflowFile, body: &AreaBody) -> Result<()> {
    let AreaBody::Middle(middle) = body else {
        return Ok(());
    };

    let mut pages = HashSet::new();
    for dir in &middle.dir_blocks {
        pages.insert(dir.id_page_id);
    }

    if let Some(last_loc) = middle.last_location_page_id {
        let start = find_loc_chain_start(overflow, last_loc)?;
        let mut current = Some(start);
        while let Some(id) = current {
            pages.insert(id);
            let page = overflow.attach_page(id)?;
            current = page.loc_next_page_id();
        }
    }

    for id in pages {
        overflow.free_page(id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn overflow_file() -> Result<(tempfile::TempDir, OverflowFile)> {
        let dir = tempfile::tempdir()?;
        let file = OverflowFile::create(dir.path(), 1024, false, false)?;
        Ok((dir, file))
    }

    #[test]
    fn short_insert_accumulates_postings_and_tf() -> Result<()> {
        let mut area = Area::new_short("abc");
        insert_short(&mut area, Profile::Full, 4096, 1, Some(vec![5]))?;
        insert_short(&mut area, Profile::Full, 4096, 2, Some(vec![3, 7]))?;

        let AreaBody::Short(body) = &area.body else { panic!("expected short") };
        assert_eq!(body.postings.len(), 2);
        assert_eq!(body.postings[1].frequency, 2);
        assert_eq!(area.last_document_id, 2);
        assert_eq!(area.document_count, 2);

        Ok(())
    }

    #[test]
    fn short_insert_ignores_non_increasing_doc_id() -> Result<()> {
        let mut area = Area::new_short("abc");
        insert_short(&mut area, Profile::Full, 4096, 5, Some(vec![1]))?;
        insert_short(&mut area, Profile::Full, 4096, 5, Some(vec![9]))?;
        insert_short(&mut area, Profile::Full, 4096, 3, Some(vec![9]))?;

        let AreaBody::Short(body) = &area.body else { panic!("expected short") };
        assert_eq!(body.postings.len(), 1);

        Ok(())
    }

    #[test]
    fn short_insert_signals_conversion_when_area_outgrows_budget() -> Result<()> {
        let mut area = Area::new_short("abc");
        let mut needs_conversion = false;
        for doc_id in 1..200u32 {
            needs_conversion = insert_short(&mut area, Profile::Full, 64, doc_id, Some(vec![doc_id]))?;
            if needs_conversion {
                break;
            }
        }
        assert!(needs_conversion);
        Ok(())
    }

    #[test]
    fn middle_insert_round_trips_through_overflow() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };

        for doc_id in 1..=50u32 {
            insert_middle(&overflow, &mut area, Profile::Full, doc_id, Some(vec![doc_id % 7]))?;
        }

        let postings = collect_postings(&overflow, &area, Profile::Full)?;
        assert_eq!(postings.len(), 50);
        assert_eq!(postings.first().map(|p| p.0), Some(1));
        assert_eq!(postings.last().map(|p| p.0), Some(50));
        assert_eq!(postings[10].2, Some(vec![11 % 7]));

        Ok(())
    }

    #[test]
    fn convert_short_to_middle_preserves_postings() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area::new_short("abc");
        for doc_id in 1..=5u32 {
            insert_short(&mut area, Profile::Full, 1_000_000, doc_id, Some(vec![doc_id]))?;
        }

        convert_to_middle(&overflow, &mut area, Profile::Full)?;
        assert_eq!(area.list_type(), ListType::Middle);

        let postings = collect_postings(&overflow, &area, Profile::Full)?;
        assert_eq!(postings.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

        Ok(())
    }

    #[test]
    fn merge_insert_is_noop_when_precondition_violated() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area::new_short("abc");
        insert_short(&mut area, Profile::Full, 4096, 10, Some(vec![1]))?;

        merge_insert(&overflow, &mut area, Profile::Full, 4096, &[(5, 1, Some(vec![1]))])?;

        let AreaBody::Short(body) = &area.body else { panic!("expected short") };
        assert_eq!(body.postings.len(), 1);

        Ok(())
    }

    #[test]
    fn merge_insert_appends_when_precondition_holds() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area::new_short("abc");
        insert_short(&mut area, Profile::Full, 4096, 1, Some(vec![1]))?;

        merge_insert(
            &overflow,
            &mut area,
            Profile::Full,
            4096,
            &[(2, 1, Some(vec![2])), (3, 2, Some(vec![1, 2]))],
        )?;

        let postings = collect_postings(&overflow, &area, Profile::Full)?;
        assert_eq!(postings.iter().map(|p| p.0).collect::<Vec<_>>(), vec![1, 2, 3]);

        Ok(())
    }

    #[test]
    fn vacuum_preserves_full_scan_output() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };
        for doc_id in 1..=40u32 {
            insert_middle(&overflow, &mut area, Profile::Full, doc_id, Some(vec![doc_id]))?;
        }

        let before = collect_postings(&overflow, &area, Profile::Full)?;
        vacuum(&overflow, &mut area, Profile::Full, 4096)?;
        let after = collect_postings(&overflow, &area, Profile::Full)?;

        assert_eq!(before, after);

        Ok(())
    }

    #[test]
    fn remove_and_undo_remove_round_trip() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };
        for doc_id in 1..=20u32 {
            insert_middle(&overflow, &mut area, Profile::Full, doc_id, Some(vec![doc_id, doc_id + 1]))?;
        }

        let removed = remove(&overflow, &mut area, Profile::Full, 4096, 10)?.expect("doc 10 present");
        assert_eq!(removed.0, 10);
        let after_remove = collect_postings(&overflow, &area, Profile::Full)?;
        assert!(!after_remove.iter().any(|p| p.0 == 10));
        assert_eq!(after_remove.len(), 19);

        assert!(remove(&overflow, &mut area, Profile::Full, 4096, 10)?.is_none());

        undo_remove(&overflow, &mut area, Profile::Full, 4096, removed)?;
        let restored = collect_postings(&overflow, &area, Profile::Full)?;
        assert_eq!(restored.len(), 20);
        assert!(restored.iter().any(|p| p.0 == 10 && p.2 == Some(vec![10, 11])));

        Ok(())
    }

    #[test]
    fn middle_reinsert_after_expunge_id_block_continues_loc_chain() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };

        let many_positions: Vec<u32> = (0..40).collect();
        for doc_id in 1..=30u32 {
            insert_middle(&overflow, &mut area, Profile::Full, doc_id, Some(many_positions.clone()))?;
        }

        let spans_multiple_loc_pages = overflow.mutate_page(
            match &area.body {
                AreaBody::Middle(middle) => middle.last_location_page_id.expect("a loc page was allocated"),
                AreaBody::Short(_) => panic!("expected middle"),
            },
            |page| Ok(page.loc_prev_page_id().is_some()),
        )?;
        assert!(spans_multiple_loc_pages, "test setup should force a chained loc page");

        let removed = remove(&overflow, &mut area, Profile::Full, 4096, 15)?.expect("doc 15 present");
        assert_eq!(removed.0, 15);

        insert_middle(&overflow, &mut area, Profile::Full, 31, Some(many_positions.clone()))?;

        let postings = collect_postings(&overflow, &area, Profile::Full)?;
        assert_eq!(postings.len(), 30);
        assert!(!postings.iter().any(|p| p.0 == 15));
        assert!(postings.iter().any(|p| p.0 == 31 && p.2 == Some(many_positions.clone())));
        assert!(postings.windows(2).all(|w| w[0].0 < w[1].0));

        Ok(())
    }

    #[test]
    fn no_tf_profile_elides_locations() -> Result<()> {
        let (_dir, overflow) = overflow_file()?;
        let mut area = Area {
            key: "abc".into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Middle(MiddleBody::empty()),
        };
        for doc_id in 1..=5u32 {
            insert_middle(&overflow, &mut area, Profile::NoLocationNoTf, doc_id, None)?;
        }

        let postings = collect_postings(&overflow, &area, Profile::NoLocationNoTf)?;
        assert_eq!(postings.len(), 5);
        assert!(postings.iter().all(|p| p.1 == 1 && p.2.is_none()));

        Ok(())
    }
}
