// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Stand-in for the term→leaf-page-id B-tree.
//!
//! The B-tree *algorithm* is an external collaborator (§1): this crate only relies on its
//! contract (`insert`, `expunge`, `update`, `search`). [`BtreeFile`] satisfies that contract
//! with a latch-guarded sorted map persisted through [`crate::file::rewrite_atomic`] rather than
//! a real B+tree — see DESIGN.md.

use crate::{
    error::{Error, Result},
    file::{self, BTREE_FOLDER},
    fs::{FileSystem, StdFileSystem},
    pager::PageId,
    serde::{Deserializable, SerializeError, Serializable},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

const RECORD_FILE: &str = "terms";

impl Serializable for PageId {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::result::Result<(), SerializeError> {
        writer.write_u32::<LittleEndian>(self.0)?;
        Ok(())
    }
}

impl Deserializable for PageId {
    fn deserialize<R: Read>(reader: &mut R) -> std::result::Result<Self, crate::serde::DeserializeError> {
        Ok(PageId(reader.read_u32::<LittleEndian>()?))
    }
}

fn encode_map(map: &BTreeMap<String, PageId>) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(map.len() as u32).expect("writing to a Vec never fails");
    for (term, page_id) in map {
        let bytes = term.as_bytes();
        out.write_u32::<LittleEndian>(bytes.len() as u32).expect("writing to a Vec never fails");
        out.extend_from_slice(bytes);
        out.write_u32::<LittleEndian>(page_id.0).expect("writing to a Vec never fails");
    }
    out
}

fn decode_map(bytes: &[u8]) -> Result<BTreeMap<String, PageId>> {
    let mut map = BTreeMap::new();
    if bytes.len() < 4 {
        return Ok(map);
    }

    let mut cursor = &bytes[..];
    let mut read_u32 = |cursor: &mut &[u8]| -> Result<u32> {
        cursor.read_u32::<LittleEndian>().map_err(|_| Error::Unexpected("truncated btree record file"))
    };

    let count = read_u32(&mut cursor)?;
    for _ in 0..count {
        let len = read_u32(&mut cursor)? as usize;
        if cursor.len() < len + 4 {
            return Err(Error::Unexpected("truncated btree record file"));
        }
        let (term_bytes, tail) = cursor.split_at(len);
        let term = std::str::from_utf8(term_bytes)
            .map_err(|_| Error::Unexpected("non-utf8 term in btree record file"))?
            .to_owned();
        cursor = tail;

        let page_id = PageId(read_u32(&mut cursor)?);

        map.insert(term, page_id);
    }

    Ok(map)
}

/// The term→leaf-page-id B-tree stand-in.
///
/// Every mutation (`insert`/`expunge`/`update`) rewrites the whole backing file atomically.
/// This is adequate for the scale this crate targets (one unit's term dictionary); a production
/// substitute would use the real paged B+tree that this crate treats as out of scope.
pub struct BtreeFile {
    path: PathBuf,
    map: RwLock<BTreeMap<String, PageId>>,
}

impl BtreeFile {
    fn record_path(dir: &Path) -> PathBuf {
        dir.join(BTREE_FOLDER).join(RECORD_FILE)
    }

    /// Creates a new, empty B-tree stand-in file under `dir`. Callers are responsible for
    /// seeding the mandatory empty-string key (invariant B5) once the Leaf file exists.
    pub fn create(dir: &Path) -> Result<Self> {
        let folder = dir.join(BTREE_FOLDER);
        StdFileSystem::create_dir_all(&folder)?;

        let map = BTreeMap::new();
        file::rewrite_atomic::<StdFileSystem>(&Self::record_path(dir), &encode_map(&map))?;

        Ok(Self {
            path: dir.to_path_buf(),
            map: RwLock::new(map),
        })
    }

    /// Attaches to an existing B-tree stand-in file under `dir`.
    pub fn attach(dir: &Path) -> Result<Self> {
        let bytes = StdFileSystem::read(&Self::record_path(dir))?;
        let map = decode_map(&bytes)?;

        Ok(Self {
            path: dir.to_path_buf(),
            map: RwLock::new(map),
        })
    }

    fn persist(&self, map: &BTreeMap<String, PageId>) -> Result<()> {
        file::rewrite_atomic::<StdFileSystem>(&Self::record_path(&self.path), &encode_map(map))?;
        Ok(())
    }

    /// Inserts `term` → `page_id`. Each distinct smallest area-key on a Leaf page must have
    /// exactly one entry (invariant I1).
    pub fn insert(&self, term: &str, page_id: PageId) -> Result<()> {
        crate::pager::fake_error::maybe_fail("btree_insert")?;

        let mut map = self.map.write().expect("lock is poisoned");
        map.insert(term.to_owned(), page_id);
        self.persist(&map)
    }

    /// Removes `term`'s entry.
    pub fn expunge(&self, term: &str) -> Result<()> {
        crate::pager::fake_error::maybe_fail("btree_expunge")?;

        let mut map = self.map.write().expect("lock is poisoned");
        map.remove(term);
        self.persist(&map)
    }

    /// Atomically replaces `(term1 -> page1)` with `(term2 -> page2)`. Used when a page's
    /// smallest-area key changes without the page itself changing.
    pub fn update(&self, term1: &str, page1: PageId, term2: &str, page2: PageId) -> Result<()> {
        let mut map = self.map.write().expect("lock is poisoned");
        debug_assert_eq!(map.get(term1).copied(), Some(page1));
        map.remove(term1);
        map.insert(term2.to_owned(), page2);
        self.persist(&map)
    }

    /// Looks up the page-id of the Leaf page whose smallest area-key is `term`.
    #[must_use]
    pub fn search(&self, term: &str) -> Option<PageId> {
        self.map.read().expect("lock is poisoned").get(term).copied()
    }

    /// Finds the page-id of the Leaf page covering `term`: the entry with the greatest key
    /// `<= term` (since the map only indexes each page's smallest area key, per I1). Invariant
    /// B5's mandatory `""` entry guarantees this is always `Some` once the unit is created.
    #[must_use]
    pub fn floor(&self, term: &str) -> Option<PageId> {
        self.map
            .read()
            .expect("lock is poisoned")
            .range(..=term.to_owned())
            .next_back()
            .map(|(_, &id)| id)
    }

    /// Clears every entry (used by `InvertedUnit::clear()`).
    pub fn clear(&self) -> Result<()> {
        let mut map = self.map.write().expect("lock is poisoned");
        map.clear();
        self.persist(&map)
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().expect("lock is poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn insert_search_expunge_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let btree = BtreeFile::create(dir.path())?;

        btree.insert("", PageId(0))?;
        btree.insert("alpha", PageId(1))?;
        assert_eq!(btree.search("alpha"), Some(PageId(1)));
        assert_eq!(btree.search("missing"), None);

        btree.expunge("alpha")?;
        assert_eq!(btree.search("alpha"), None);

        Ok(())
    }

    #[test]
    fn update_replaces_atomically() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let btree = BtreeFile::create(dir.path())?;
        btree.insert("old", PageId(3))?;

        btree.update("old", PageId(3), "new", PageId(3))?;
        assert_eq!(btree.search("old"), None);
        assert_eq!(btree.search("new"), Some(PageId(3)));

        Ok(())
    }

    #[test]
    fn floor_finds_covering_page() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let btree = BtreeFile::create(dir.path())?;

        btree.insert("", PageId(0))?;
        btree.insert("m", PageId(1))?;
        btree.insert("z", PageId(2))?;

        assert_eq!(btree.floor(""), Some(PageId(0)));
        assert_eq!(btree.floor("a"), Some(PageId(0)));
        assert_eq!(btree.floor("m"), Some(PageId(1)));
        assert_eq!(btree.floor("n"), Some(PageId(1)));
        assert_eq!(btree.floor("zzz"), Some(PageId(2)));

        Ok(())
    }

    #[test]
    fn attach_reloads_persisted_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let btree = BtreeFile::create(dir.path())?;
            btree.insert("", PageId(0))?;
            btree.insert("term", PageId(7))?;
        }

        let btree = BtreeFile::attach(dir.path())?;
        assert_eq!(btree.search("term"), Some(PageId(7)));
        assert_eq!(btree.search(""), Some(PageId(0)));

        Ok(())
    }
}
