// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::block::{IdBlock, LocBlock};
use crate::{
    error::{Error, Result},
    pager::PageId,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const TAG_ID: u8 = 1;
const TAG_LOC: u8 = 2;
const TAG_ID_LOC: u8 = 3;

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_u32::<LittleEndian>(value)?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(reader.read_u32::<LittleEndian>()?)
}

fn write_page_id_opt<W: Write>(writer: &mut W, id: Option<PageId>) -> Result<()> {
    write_u32(writer, id.map_or(u32::MAX, |id| id.0))
}

fn read_page_id_opt<R: Read>(reader: &mut R) -> Result<Option<PageId>> {
    let raw = read_u32(reader)?;
    Ok((raw != u32::MAX).then_some(PageId(raw)))
}

/// One of the three overflow page shapes (§3.1, §6.2), tagged by the page's leading type word.
#[derive(Debug, Clone)]
pub enum OverflowPage {
    /// Array of fixed-size `IDBlock`s packed from the page tail.
    Id(IdPageBody),
    /// Doubly-linked list node holding variable-sized `LOC-block`s.
    Loc(LocPageBody),
    /// Both an ID and a LOC section — used at the end of a list before it grows enough to split
    /// the ID-blocks off into their own page.
    IdLoc(IdLocPageBody),
}

impl OverflowPage {
    #[must_use]
    pub fn as_id(&self) -> Option<&IdPageBody> {
        match self {
            Self::Id(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_id_mut(&mut self) -> Option<&mut IdPageBody> {
        match self {
            Self::Id(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_loc(&self) -> Option<&LocPageBody> {
        match self {
            Self::Loc(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_loc_mut(&mut self) -> Option<&mut LocPageBody> {
        match self {
            Self::Loc(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_id_loc(&self) -> Option<&IdLocPageBody> {
        match self {
            Self::IdLoc(body) => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_id_loc_mut(&mut self) -> Option<&mut IdLocPageBody> {
        match self {
            Self::IdLoc(body) => Some(body),
            _ => None,
        }
    }

    /// Live (non-tombstoned) ID-block count, used by the reclamation rules in §4.4.
    #[must_use]
    pub fn live_id_block_count(&self) -> usize {
        match self {
            Self::Id(body) => body.blocks.iter().filter(|b| !b.tombstone).count(),
            Self::IdLoc(body) => body.id_blocks.iter().filter(|b| !b.tombstone).count(),
            Self::Loc(_) => 0,
        }
    }

    #[must_use]
    pub fn loc_block_count(&self) -> usize {
        match self {
            Self::Loc(body) => body.blocks.len(),
            Self::IdLoc(body) => body.loc_blocks.len(),
            Self::Id(_) => 0,
        }
    }

    /// The page's ID-block vector, whichever of [`Self::Id`]/[`Self::IdLoc`] it is — lets
    /// `list::MiddleBody` promotion logic stay agnostic to which shape a DIR-block currently
    /// names (§4.3.2.1).
    pub fn id_blocks_mut(&mut self) -> Option<&mut Vec<IdBlock>> {
        match self {
            Self::Id(body) => Some(&mut body.blocks),
            Self::IdLoc(body) => Some(&mut body.id_blocks),
            Self::Loc(_) => None,
        }
    }

    #[must_use]
    pub fn max_id_blocks(&self) -> Option<usize> {
        match self {
            Self::Id(body) => Some(body.max_blocks),
            Self::IdLoc(body) => Some(body.max_id_blocks),
            Self::Loc(_) => None,
        }
    }

    /// The page's LOC-block vector, whichever of [`Self::Loc`]/[`Self::IdLoc`] it is.
    pub fn loc_blocks_mut(&mut self) -> Option<&mut Vec<LocBlock>> {
        match self {
            Self::Loc(body) => Some(&mut body.blocks),
            Self::IdLoc(body) => Some(&mut body.loc_blocks),
            Self::Id(_) => None,
        }
    }

    #[must_use]
    pub fn max_loc_blocks(&self) -> Option<usize> {
        match self {
            Self::Loc(body) => Some(body.max_blocks),
            Self::IdLoc(body) => Some(body.max_loc_blocks),
            Self::Id(_) => None,
        }
    }

    pub fn set_loc_prev_page_id(&mut self, id: Option<PageId>) {
        match self {
            Self::Loc(body) => body.prev_page_id = id,
            Self::IdLoc(body) => body.prev_page_id = id,
            Self::Id(_) => {}
        }
    }

    pub fn set_loc_next_page_id(&mut self, id: Option<PageId>) {
        match self {
            Self::Loc(body) => body.next_page_id = id,
            Self::IdLoc(body) => body.next_page_id = id,
            Self::Id(_) => {}
        }
    }

    #[must_use]
    pub fn loc_prev_page_id(&self) -> Option<PageId> {
        match self {
            Self::Loc(body) => body.prev_page_id,
            Self::IdLoc(body) => body.prev_page_id,
            Self::Id(_) => None,
        }
    }

    #[must_use]
    pub fn loc_next_page_id(&self) -> Option<PageId> {
        match self {
            Self::Loc(body) => body.next_page_id,
            Self::IdLoc(body) => body.next_page_id,
            Self::Id(_) => None,
        }
    }

    /// Serializes the page into a flat byte buffer for the pager's backing file.
    pub fn write_to<W: Write>(&self, writer: &mut W, no_tf: bool, no_location: bool) -> Result<()> {
        match self {
            Self::Id(body) => {
                writer.write_u8(TAG_ID)?;
                write_u32(writer, body.block_capacity_bits as u32)?;
                write_u32(writer, body.max_blocks as u32)?;
                write_u32(writer, body.blocks.len() as u32)?;
                for block in &body.blocks {
                    block.write_to(writer)?;
                }
            }
            Self::Loc(body) => {
                writer.write_u8(TAG_LOC)?;
                write_page_id_opt(writer, body.prev_page_id)?;
                write_page_id_opt(writer, body.next_page_id)?;
                write_u32(writer, body.block_capacity_bits as u32)?;
                write_u32(writer, body.max_blocks as u32)?;
                write_u32(writer, body.blocks.len() as u32)?;
                for block in &body.blocks {
                    block.write_to(writer, no_tf, no_location)?;
                }
            }
            Self::IdLoc(body) => {
                writer.write_u8(TAG_ID_LOC)?;
                write_u32(writer, body.id_block_capacity_bits as u32)?;
                write_u32(writer, body.max_id_blocks as u32)?;
                write_u32(writer, body.id_blocks.len() as u32)?;
                for block in &body.id_blocks {
                    block.write_to(writer)?;
                }
                write_page_id_opt(writer, body.prev_page_id)?;
                write_page_id_opt(writer, body.next_page_id)?;
                write_u32(writer, body.loc_block_capacity_bits as u32)?;
                write_u32(writer, body.max_loc_blocks as u32)?;
                write_u32(writer, body.loc_blocks.len() as u32)?;
                for block in &body.loc_blocks {
                    block.write_to(writer, no_tf, no_location)?;
                }
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R, no_tf: bool, no_location: bool) -> Result<Self> {
        let tag = reader.read_u8()?;

        match tag {
            TAG_ID => {
                let block_capacity_bits = read_u32(reader)? as usize;
                let max_blocks = read_u32(reader)? as usize;
                let count = read_u32(reader)?;
                let mut blocks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    blocks.push(IdBlock::read_from(reader)?);
                }
                Ok(Self::Id(IdPageBody {
                    blocks,
                    block_capacity_bits,
                    max_blocks,
                }))
            }
            TAG_LOC => {
                let prev_page_id = read_page_id_opt(reader)?;
                let next_page_id = read_page_id_opt(reader)?;
                let block_capacity_bits = read_u32(reader)? as usize;
                let max_blocks = read_u32(reader)? as usize;
                let count = read_u32(reader)?;
                let mut blocks = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    blocks.push(LocBlock::read_from(reader, no_tf, no_location)?);
                }
                Ok(Self::Loc(LocPageBody {
                    prev_page_id,
                    next_page_id,
                    blocks,
                    block_capacity_bits,
                    max_blocks,
                }))
            }
            TAG_ID_LOC => {
                let id_block_capacity_bits = read_u32(reader)? as usize;
                let max_id_blocks = read_u32(reader)? as usize;
                let id_count = read_u32(reader)?;
                let mut id_blocks = Vec::with_capacity(id_count as usize);
                for _ in 0..id_count {
                    id_blocks.push(IdBlock::read_from(reader)?);
                }

                let prev_page_id = read_page_id_opt(reader)?;
                let next_page_id = read_page_id_opt(reader)?;
                let loc_block_capacity_bits = read_u32(reader)? as usize;
                let max_loc_blocks = read_u32(reader)? as usize;
                let loc_count = read_u32(reader)?;
                let mut loc_blocks = Vec::with_capacity(loc_count as usize);
                for _ in 0..loc_count {
                    loc_blocks.push(LocBlock::read_from(reader, no_tf, no_location)?);
                }

                Ok(Self::IdLoc(IdLocPageBody {
                    id_blocks,
                    id_block_capacity_bits,
                    max_id_blocks,
                    prev_page_id,
                    next_page_id,
                    loc_blocks,
                    loc_block_capacity_bits,
                    max_loc_blocks,
                }))
            }
            _ => Err(Error::Unexpected("unknown overflow page type tag")),
        }
    }
}

/// Pure ID-page: `blockCount`/`blockSize` header plus the packed IDBlocks.
#[derive(Debug, Clone, Default)]
pub struct IdPageBody {
    pub blocks: Vec<IdBlock>,
    pub block_capacity_bits: usize,
    pub max_blocks: usize,
}

impl IdPageBody {
    /// Allocates a slot for a new ID-block with the given first doc-id, if the page has room.
    pub fn allocate_id_block(&mut self, first_document_id: u32) -> Option<usize> {
        if self.blocks.len() >= self.max_blocks {
            return None;
        }
        self.blocks.push(IdBlock::new(first_document_id, self.block_capacity_bits));
        Some(self.blocks.len() - 1)
    }
}

/// Pure LOC-page: a doubly-linked list node holding variable-sized LOC-blocks.
#[derive(Debug, Clone, Default)]
pub struct LocPageBody {
    pub prev_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
    pub blocks: Vec<LocBlock>,
    pub block_capacity_bits: usize,
    pub max_blocks: usize,
}

impl LocPageBody {
    pub fn allocate_loc_block(&mut self) -> Option<usize> {
        if self.blocks.len() >= self.max_blocks {
            return None;
        }
        self.blocks.push(LocBlock::new(self.block_capacity_bits));
        Some(self.blocks.len() - 1)
    }
}

/// Both sections on one page: used at the end of a list before it has grown enough to need the
/// ID-blocks split off into their own page.
#[derive(Debug, Clone, Default)]
pub struct IdLocPageBody {
    pub id_blocks: Vec<IdBlock>,
    pub id_block_capacity_bits: usize,
    pub max_id_blocks: usize,

    pub prev_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
    pub loc_blocks: Vec<LocBlock>,
    pub loc_block_capacity_bits: usize,
    pub max_loc_blocks: usize,
}

impl IdLocPageBody {
    pub fn allocate_id_block(&mut self, first_document_id: u32) -> Option<usize> {
        if self.id_blocks.len() >= self.max_id_blocks {
            return None;
        }
        self.id_blocks
            .push(IdBlock::new(first_document_id, self.id_block_capacity_bits));
        Some(self.id_blocks.len() - 1)
    }

    pub fn allocate_loc_block(&mut self) -> Option<usize> {
        if self.loc_blocks.len() >= self.max_loc_blocks {
            return None;
        }
        self.loc_blocks.push(LocBlock::new(self.loc_block_capacity_bits));
        Some(self.loc_blocks.len() - 1)
    }

    /// Fraction of `max_id_blocks` currently occupied — used by `copyIDBlock` (§4.3.2.1) to
    /// decide whether a promoted page should keep its IDLOC shape or split into ID + LOC.
    #[must_use]
    pub fn id_fill_ratio(&self) -> f64 {
        if self.max_id_blocks == 0 {
            return 0.0;
        }
        self.id_blocks.len() as f64 / self.max_id_blocks as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn id_page_allocate_respects_max_blocks() {
        let mut page = IdPageBody {
            max_blocks: 1,
            block_capacity_bits: 64,
            ..Default::default()
        };
        assert!(page.allocate_id_block(1).is_some());
        assert!(page.allocate_id_block(2).is_none());
    }

    #[test]
    fn live_id_block_count_excludes_tombstones() {
        let mut page = OverflowPage::Id(IdPageBody {
            max_blocks: 4,
            block_capacity_bits: 64,
            ..Default::default()
        });
        if let Some(body) = page.as_id_mut() {
            body.allocate_id_block(1);
            body.allocate_id_block(50);
            body.blocks[0].tombstone = true;
        }
        assert_eq!(page.live_id_block_count(), 1);
    }
}
