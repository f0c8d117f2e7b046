// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The Overflow sub-file: ID-pages, LOC-pages and IDLOC-pages, allocated and paged through
//! [`crate::pager::PagePool`].

pub mod block;
pub mod page;

use crate::{
    error::{Error, Result},
    file::OVERFLOW_FOLDER,
    page::{checksum::Checksum, CHECKSUM_TRAILER_BYTES},
    pager::{PageId, PagePool},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use page::{IdLocPageBody, IdPageBody, LocPageBody, OverflowPage};
use std::path::Path;

const FILE_NAME: &str = "data";

/// Owns the Overflow sub-file's page pool and knows how to decode/encode the three page shapes
/// through it.
pub struct OverflowFile {
    pool: PagePool,
    no_tf: bool,
    no_location: bool,
    id_block_capacity_bits: usize,
    loc_block_capacity_bits: usize,
    max_id_blocks_per_page: usize,
    max_loc_blocks_per_page: usize,
}

impl OverflowFile {
    fn path(dir: &Path) -> std::path::PathBuf {
        dir.join(OVERFLOW_FOLDER).join(FILE_NAME)
    }

    /// Creates a fresh, empty Overflow sub-file.
    pub fn create(
        dir: &Path,
        page_size: usize,
        no_tf: bool,
        no_location: bool,
    ) -> Result<Self> {
        crate::fs::StdFileSystem::create_dir_all(&dir.join(OVERFLOW_FOLDER))?;
        Self::open(dir, page_size, no_tf, no_location)
    }

    /// Attaches to an existing Overflow sub-file.
    pub fn attach(
        dir: &Path,
        page_size: usize,
        no_tf: bool,
        no_location: bool,
    ) -> Result<Self> {
        Self::open(dir, page_size, no_tf, no_location)
    }

    fn open(dir: &Path, page_size: usize, no_tf: bool, no_location: bool) -> Result<Self> {
        let pool = PagePool::open(&Self::path(dir), page_size)?;

        // Budget: ~10 bytes of header per IDBlock, ~half the page for LOC data; both are
        // reasonable planning constants for a page of this size, not format-critical (the
        // capacities are stored per-block once allocated).
        let id_block_bytes = 64;
        let max_id_blocks_per_page = (page_size / id_block_bytes).max(1);
        let id_block_capacity_bits = (id_block_bytes * 4 - 10) * 8;

        let max_loc_blocks_per_page = 16;
        let loc_block_capacity_bits = (page_size / max_loc_blocks_per_page) * 8;

        Ok(Self {
            pool,
            no_tf,
            no_location,
            id_block_capacity_bits,
            loc_block_capacity_bits,
            max_id_blocks_per_page,
            max_loc_blocks_per_page,
        })
    }

    #[must_use]
    pub fn id_block_capacity_bits(&self) -> usize {
        self.id_block_capacity_bits
    }

    #[must_use]
    pub fn loc_block_capacity_bits(&self) -> usize {
        self.loc_block_capacity_bits
    }

    fn decode(&self, id: PageId) -> Result<OverflowPage> {
        let page = self.pool.attach(id)?;
        let bytes = page.read();
        let payload_len = bytes.len() - CHECKSUM_TRAILER_BYTES;
        let (payload, trailer) = bytes.split_at(payload_len);

        let expected = (&trailer[..]).read_u128::<LittleEndian>()?;
        let got = *Checksum::from_bytes(payload);
        if got != expected {
            return Err(Error::InvalidChecksum((got, expected)));
        }

        let mut cursor = payload;
        OverflowPage::read_from(&mut cursor, self.no_tf, self.no_location)
    }

    fn encode(&self, id: PageId, page: &OverflowPage) -> Result<()> {
        let pointer = self.pool.attach(id)?;
        let mut bytes = pointer.write();
        let payload_len = bytes.len() - CHECKSUM_TRAILER_BYTES;

        let mut buf = Vec::with_capacity(payload_len);
        page.write_to(&mut buf, self.no_tf, self.no_location)?;

        if buf.len() > payload_len {
            return Err(Error::Unexpected("encoded overflow page exceeds the configured page size"));
        }
        buf.resize(payload_len, 0);

        let checksum = Checksum::from_bytes(&buf);
        bytes[..payload_len].copy_from_slice(&buf);
        (&mut bytes[payload_len..]).write_u128::<LittleEndian>(*checksum)?;
        Ok(())
    }

    /// Allocates a new, empty ID-page.
    pub fn allocate_id_page(&self) -> Result<PageId> {
        let pointer = self.pool.allocate()?;
        let page = OverflowPage::Id(IdPageBody {
            blocks: Vec::new(),
            block_capacity_bits: self.id_block_capacity_bits,
            max_blocks: self.max_id_blocks_per_page,
        });
        self.encode(pointer.id(), &page)?;
        Ok(pointer.id())
    }

    /// Allocates a new, empty LOC-page.
    pub fn allocate_loc_page(&self) -> Result<PageId> {
        let pointer = self.pool.allocate()?;
        let page = OverflowPage::Loc(LocPageBody {
            prev_page_id: None,
            next_page_id: None,
            blocks: Vec::new(),
            block_capacity_bits: self.loc_block_capacity_bits,
            max_blocks: self.max_loc_blocks_per_page,
        });
        self.encode(pointer.id(), &page)?;
        Ok(pointer.id())
    }

    /// Allocates a new, empty IDLOC-page.
    pub fn allocate_id_loc_page(&self) -> Result<PageId> {
        let pointer = self.pool.allocate()?;
        let page = OverflowPage::IdLoc(IdLocPageBody {
            id_blocks: Vec::new(),
            id_block_capacity_bits: self.id_block_capacity_bits,
            max_id_blocks: self.max_id_blocks_per_page,
            prev_page_id: None,
            next_page_id: None,
            loc_blocks: Vec::new(),
            loc_block_capacity_bits: self.loc_block_capacity_bits,
            max_loc_blocks: self.max_loc_blocks_per_page,
        });
        self.encode(pointer.id(), &page)?;
        Ok(pointer.id())
    }

    /// Reads the current content of a page.
    pub fn attach_page(&self, id: PageId) -> Result<OverflowPage> {
        self.decode(id)
    }

    /// Applies `f` to the decoded page and re-encodes the result, mirroring the Leaf file's
    /// decode/mutate/re-encode cycle (see DESIGN.md).
    pub fn mutate_page<T>(
        &self,
        id: PageId,
        f: impl FnOnce(&mut OverflowPage) -> Result<T>,
    ) -> Result<T> {
        let mut page = self.decode(id)?;
        let result = f(&mut page)?;
        self.encode(id, &page)?;
        Ok(result)
    }

    /// Frees a page, returning its id to the pool's free list.
    pub fn free_page(&self, id: PageId) {
        self.pool.free(id);
    }

    pub fn flush_all(&self) -> Result<()> {
        self.pool.flush_all()
    }

    pub fn recover_all(&self) -> Result<()> {
        self.pool.recover_all()
    }

    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.pool.attached_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocate_id_page_and_push_block_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = OverflowFile::create(dir.path(), 512, false, false)?;

        let id_page = file.allocate_id_page()?;
        file.mutate_page(id_page, |page| {
            let body = page.as_id_mut().expect("id page");
            body.allocate_id_block(10);
            body.blocks[0].push(11);
            Ok(())
        })?;

        file.flush_all()?;

        let reloaded = file.attach_page(id_page)?;
        let body = reloaded.as_id().expect("id page");
        assert_eq!(body.blocks[0].first_document_id, 10);
        assert_eq!(body.blocks[0].doc_ids, vec![11]);

        Ok(())
    }

    #[test]
    fn loc_page_stores_entries_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = OverflowFile::create(dir.path(), 512, false, false)?;

        let loc_page = file.allocate_loc_page()?;
        file.mutate_page(loc_page, |page| {
            let body = page.as_loc_mut().expect("loc page");
            body.allocate_loc_block();
            body.blocks[0].entries.push(block::LocEntry {
                frequency: 2,
                positions: Some(vec![1, 5]),
            });
            Ok(())
        })?;

        let reloaded = file.attach_page(loc_page)?;
        let body = reloaded.as_loc().expect("loc page");
        assert_eq!(body.blocks[0].entries[0].frequency, 2);
        assert_eq!(body.blocks[0].entries[0].positions, Some(vec![1, 5]));

        Ok(())
    }
}
