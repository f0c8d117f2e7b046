// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-crate stand-in for the page buffer pool that a real transactional file substrate would
//! provide. The buffer pool itself (pin/unpin, dirty tracking, allocate/free, latch) is treated
//! as an external collaborator by the engine; this module gives every sub-file (B-tree, Leaf,
//! Overflow) its own instance of that collaborator so the rest of the crate can be written
//! against a stable interface.
//!
//! Modeled directly on the teacher's `FileDescriptorTable`/`FileGuard` pair: a latch
//! (`RwLock`) guards the page-cache map lookup only, a `Mutex` guards the free list, and
//! pin/unpin is reference counting via a guard type's `Drop` impl.

use crate::error::Result;
use std::{
    collections::HashMap,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, RwLock,
    },
};

/// Deterministic error injection for rollback tests (§7), gated behind the `fake-error`
/// feature. `maybe_fail` is always callable — with the feature off it is a no-op — so call
/// sites at the engine's designated injection points (`allocate_page`, `attach_page`, `insert`,
/// `expunge`) never need their own `cfg` guards.
#[cfg(feature = "fake-error")]
pub mod fake_error {
    use std::sync::atomic::{AtomicBool, Ordering};

    static ARMED: AtomicBool = AtomicBool::new(false);

    /// Arms the next call to [`maybe_fail`] at any injection point to fail. Fires once.
    pub fn arm() {
        ARMED.store(true, Ordering::SeqCst);
    }

    /// Disarms without firing, in case a test wants to reset state between cases.
    pub fn disarm() {
        ARMED.store(false, Ordering::SeqCst);
    }

    pub(crate) fn maybe_fail(point: &'static str) -> crate::error::Result<()> {
        if ARMED.swap(false, Ordering::SeqCst) {
            return Err(crate::error::Error::Unexpected(point));
        }
        Ok(())
    }
}

#[cfg(not(feature = "fake-error"))]
pub mod fake_error {
    pub(crate) fn maybe_fail(_point: &'static str) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Identifies one fixed-size page within a sub-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// The always-valid first page of a freshly created file.
    pub const FIRST: PageId = PageId(0);

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// One page's mutable content plus its dirty flag. Content is a full page-sized byte buffer;
/// callers decode/encode their structured view into it.
pub struct CachedPage {
    id: PageId,
    bytes: Mutex<Box<[u8]>>,
    dirty: std::sync::atomic::AtomicBool,
}

impl CachedPage {
    #[must_use]
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn read(&self) -> std::sync::MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().expect("lock is poisoned")
    }

    /// Marks the page dirty and returns a lock to write through.
    pub fn write(&self) -> std::sync::MutexGuard<'_, Box<[u8]>> {
        self.dirty.store(true, Ordering::Release);
        self.bytes.lock().expect("lock is poisoned")
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// A pinned handle to a page. Dropping it unpins; the page stays cached until evicted by
/// `PagePool::clear` or process exit — this stand-in does not implement LRU eviction, since the
/// buffer pool's eviction policy is out of scope (§1).
pub struct PagePointer(Arc<CachedPage>);

impl std::ops::Deref for PagePointer {
    type Target = CachedPage;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Clone for PagePointer {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Per-sub-file page pool: owns the backing file, hands out pinned [`PagePointer`]s, and tracks
/// which page-ids are free for reuse.
pub struct PagePool {
    file: Mutex<std::fs::File>,
    page_size: usize,
    cache: RwLock<HashMap<PageId, Arc<CachedPage>>>,
    free_list: Mutex<Vec<PageId>>,
    next_page_id: AtomicU32,
}

impl PagePool {
    /// Opens (creating if absent) the sub-file at `path` with the given fixed page size.
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len() as usize;
        let next = (len / page_size) as u32;

        Ok(Self {
            file: Mutex::new(file),
            page_size,
            cache: RwLock::new(HashMap::new()),
            free_list: Mutex::new(Vec::new()),
            next_page_id: AtomicU32::new(next),
        })
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Allocates a fresh page, preferring a freed slot over growing the file.
    pub fn allocate(&self) -> Result<PagePointer> {
        fake_error::maybe_fail("allocate_page")?;

        let id = {
            let mut free = self.free_list.lock().expect("lock is poisoned");
            free.pop()
                .unwrap_or_else(|| PageId(self.next_page_id.fetch_add(1, Ordering::AcqRel)))
        };

        let page = Arc::new(CachedPage {
            id,
            bytes: Mutex::new(vec![0u8; self.page_size].into_boxed_slice()),
            dirty: std::sync::atomic::AtomicBool::new(true),
        });

        self.cache
            .write()
            .expect("lock is poisoned")
            .insert(id, Arc::clone(&page));

        Ok(PagePointer(page))
    }

    /// Pins and returns a page, reading it from disk on first access.
    pub fn attach(&self, id: PageId) -> Result<PagePointer> {
        fake_error::maybe_fail("attach_page")?;

        {
            let cache = self.cache.read().expect("lock is poisoned");
            if let Some(page) = cache.get(&id) {
                return Ok(PagePointer(Arc::clone(page)));
            }
        }

        let mut bytes = vec![0u8; self.page_size].into_boxed_slice();
        {
            let mut file = self.file.lock().expect("lock is poisoned");
            file.seek(SeekFrom::Start(id.0 as u64 * self.page_size as u64))?;
            file.read_exact(&mut bytes)?;
        }

        let page = Arc::new(CachedPage {
            id,
            bytes: Mutex::new(bytes),
            dirty: std::sync::atomic::AtomicBool::new(false),
        });

        let mut cache = self.cache.write().expect("lock is poisoned");
        let entry = cache.entry(id).or_insert_with(|| Arc::clone(&page));
        Ok(PagePointer(Arc::clone(entry)))
    }

    /// Releases `id` back to the free list so a future `allocate` can reuse it. The page stays
    /// resident in the cache until the next `flush_all`/`recover_all` cycle.
    pub fn free(&self, id: PageId) {
        self.free_list.lock().expect("lock is poisoned").push(id);
    }

    /// Writes every dirty page to disk (commit). Clears dirty flags on success.
    pub fn flush_all(&self) -> Result<()> {
        let cache = self.cache.read().expect("lock is poisoned");
        let mut file = self.file.lock().expect("lock is poisoned");

        for page in cache.values() {
            if !page.is_dirty() {
                continue;
            }

            let bytes = page.bytes.lock().expect("lock is poisoned");
            file.seek(SeekFrom::Start(page.id.0 as u64 * self.page_size as u64))?;
            file.write_all(&bytes)?;
            page.dirty.store(false, Ordering::Release);
        }

        file.sync_all()?;
        Ok(())
    }

    /// Discards every in-memory page and re-reads the cached set from disk (abort). Pages that
    /// were never flushed (pure in-memory allocations) are simply dropped from the cache.
    pub fn recover_all(&self) -> Result<()> {
        let ids: Vec<PageId> = {
            let cache = self.cache.read().expect("lock is poisoned");
            cache.keys().copied().collect()
        };

        let mut file = self.file.lock().expect("lock is poisoned");
        let file_len = file.metadata()?.len();

        let mut cache = self.cache.write().expect("lock is poisoned");
        for id in ids {
            let offset = id.0 as u64 * self.page_size as u64;
            if offset + self.page_size as u64 > file_len {
                cache.remove(&id);
                continue;
            }

            if let Some(page) = cache.get(&id) {
                let mut bytes = vec![0u8; self.page_size].into_boxed_slice();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut bytes)?;
                *page.bytes.lock().expect("lock is poisoned") = bytes;
                page.dirty.store(false, Ordering::Release);
            }
        }

        Ok(())
    }

    /// Drops the whole cache, forcing the next `attach` to re-read from disk.
    pub fn clear(&self) {
        self.cache.write().expect("lock is poisoned").clear();
    }

    /// Number of pages currently resident in the cache, used by `saveAllPages` to bound
    /// transient memory across a unit's three sub-files.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.cache.read().expect("lock is poisoned").len()
    }
}

/// Resolves the on-disk path of a sub-file given its owning directory and file name.
#[must_use]
pub fn sub_file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocate_attach_round_trips_through_flush() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pages.bin");

        {
            let pool = PagePool::open(&path, 64)?;
            let page = pool.allocate()?;
            assert_eq!(page.id(), PageId::FIRST);

            {
                let mut bytes = page.write();
                bytes[0] = 0xAB;
            }

            pool.flush_all()?;
        }

        let pool = PagePool::open(&path, 64)?;
        let page = pool.attach(PageId::FIRST)?;
        assert_eq!(page.read()[0], 0xAB);

        Ok(())
    }

    #[test]
    fn recover_all_discards_unflushed_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pages.bin");

        let pool = PagePool::open(&path, 64)?;
        let page = pool.allocate()?;
        pool.flush_all()?;

        {
            let mut bytes = page.write();
            bytes[0] = 0x11;
        }
        assert!(page.is_dirty());

        pool.recover_all()?;
        assert_eq!(page.read()[0], 0);

        Ok(())
    }

    #[test]
    fn free_list_reuses_page_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pages.bin");
        let pool = PagePool::open(&path, 64)?;

        let a = pool.allocate()?;
        pool.free(a.id());
        let b = pool.allocate()?;
        assert_eq!(a.id(), b.id());

        Ok(())
    }
}
