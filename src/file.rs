// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::fs::FileSystem;
use std::{io::Write, path::Path};

/// Magic bytes stamped at the front of every page file.
pub const MAGIC_BYTES: [u8; 4] = [b'I', b'I', b'D', 1];

/// Sub-directory name for the B-tree stand-in file, relative to a unit's directory.
pub const BTREE_FOLDER: &str = "btree";
/// Sub-directory name for the Leaf file, relative to a unit's directory.
pub const LEAF_FOLDER: &str = "leaf";
/// Sub-directory name for the Overflow file, relative to a unit's directory.
pub const OVERFLOW_FOLDER: &str = "overflow";

/// Atomically rewrites a file: write to a temp file in the same directory, fsync, rename over
/// the target, then fsync the containing directory so the rename itself is durable.
pub fn rewrite_atomic<F: FileSystem>(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let folder = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent directory"))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = F::open(path)?;
        file.sync_all()?;
        fsync_directory::<F>(folder)?;
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory<F: FileSystem>(path: &Path) -> std::io::Result<()> {
    let file = F::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory<F: FileSystem>(_path: &Path) -> std::io::Result<()> {
    // Cannot fsync a directory handle on Windows.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use std::io::Write;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("test.txt");
        {
            let mut file = <crate::fs::StdFileSystem as FileSystem>::create(&path)?;
            write!(file, "asdasdasdasdasd")?;
        }

        rewrite_atomic::<crate::fs::StdFileSystem>(&path, b"newcontent")?;

        let content = crate::fs::StdFileSystem::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }
}
