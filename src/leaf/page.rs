// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::area::Area;
use crate::pager::PageId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// One Leaf page: a sequence of areas packed after a fixed header (§3.1).
#[derive(Debug, Clone, Default)]
pub struct LeafPage {
    pub prev_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
    pub areas: Vec<Area>,
}

impl LeafPage {
    /// Binary search for the first area whose key is `>= key`. Returns `areas.len()` if every
    /// area sorts before `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &str) -> usize {
        self.areas.partition_point(|area| area.key.as_str() < key)
    }

    /// `lowerBound` plus an equality check.
    #[must_use]
    pub fn search(&self, key: &str) -> Option<usize> {
        let idx = self.lower_bound(key);
        (idx < self.areas.len() && self.areas[idx].key == key).then_some(idx)
    }

    #[must_use]
    pub fn smallest_key(&self) -> Option<&str> {
        self.areas.first().map(|a| a.key.as_str())
    }

    #[must_use]
    pub fn used_units(&self, no_tf: bool, no_location: bool) -> usize {
        self.areas.iter().map(|a| a.unit_size(no_tf, no_location)).sum()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> crate::error::Result<()> {
        writer.write_u32::<LittleEndian>(self.prev_page_id.map_or(u32::MAX, |id| id.0))?;
        writer.write_u32::<LittleEndian>(self.next_page_id.map_or(u32::MAX, |id| id.0))?;
        writer.write_u32::<LittleEndian>(self.areas.len() as u32)?;
        for area in &self.areas {
            area.write_to(writer)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> crate::error::Result<Self> {
        let prev = reader.read_u32::<LittleEndian>()?;
        let next = reader.read_u32::<LittleEndian>()?;
        let count = reader.read_u32::<LittleEndian>()?;

        let mut areas = Vec::with_capacity(count as usize);
        for _ in 0..count {
            areas.push(Area::read_from(reader)?);
        }

        Ok(Self {
            prev_page_id: (prev != u32::MAX).then_some(PageId(prev)),
            next_page_id: (next != u32::MAX).then_some(PageId(next)),
            areas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn lower_bound_and_search() {
        let mut page = LeafPage::default();
        page.areas.push(Area::new_short("a"));
        page.areas.push(Area::new_short("m"));
        page.areas.push(Area::new_short("z"));

        assert_eq!(page.lower_bound("b"), 1);
        assert_eq!(page.search("m"), Some(1));
        assert_eq!(page.search("missing"), None);
    }
}
