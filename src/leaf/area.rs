// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Decoded, in-memory view of one Leaf-page area (§3.1, §6.2): a term's key plus either its
//! entire Short posting list or the root of a Middle one.

use crate::overflow::block::{position_list_bit_length, DirBlock, IdBlock};
use crate::pager::PageId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Which of the two implemented shapes an area uses. `Long` is reserved (§9) and never
/// constructed; any path that would need it returns `Error::Unexpected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Short,
    Middle,
}

/// One (doc-id, term-frequency, positions) posting, decoded from a Short area's bit-packed data
/// region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortPosting {
    pub document_id: u32,
    pub frequency: u32,
    pub positions: Option<Vec<u32>>,
}

/// Short-shape payload: everything fits inline, stored here as the decoded posting sequence
/// rather than the original's two opposite-growing bit regions (see DESIGN.md — this crate
/// already decodes whole pages to structs per §9's "arena + indices" note; the Short area's
/// internal bit layout is the next, consistent, application of that same simplification).
#[derive(Debug, Clone, Default)]
pub struct ShortBody {
    pub postings: Vec<ShortPosting>,
}

impl ShortBody {
    #[must_use]
    pub fn last_document_id(&self) -> Option<u32> {
        self.postings.last().map(|p| p.document_id)
    }

    /// Bits the doc-id gap stream plus location stream would occupy, mirroring the original's
    /// `documentOffset`/`locationOffset` bookkeeping.
    #[must_use]
    pub fn data_bit_length(&self, no_tf: bool, no_location: bool) -> usize {
        use crate::config::DefaultGapCoder;
        use crate::coding::GapCoder;

        let mut prev = 0u32;
        let mut bits = 0usize;
        for posting in &self.postings {
            let gap = if prev == 0 {
                posting.document_id
            } else {
                posting.document_id - prev
            };
            bits += DefaultGapCoder::bit_length(gap.max(1));
            prev = posting.document_id;

            if !no_tf {
                bits += DefaultGapCoder::bit_length(posting.frequency);
                if !no_location {
                    if let Some(positions) = &posting.positions {
                        if posting.frequency != 1 {
                            let pos_bits = position_list_bit_length(positions);
                            bits += DefaultGapCoder::bit_length((pos_bits + 1) as u32) + pos_bits;
                        } else if let Some(&only) = positions.first() {
                            bits += DefaultGapCoder::bit_length(only + 1);
                        }
                    }
                }
            }
        }
        bits
    }
}

/// Middle-shape payload: one inline last-IDBlock plus zero or more DIR-blocks pointing at
/// ID-pages (§3.1).
#[derive(Debug, Clone)]
pub struct MiddleBody {
    pub last_id_block: IdBlock,
    pub dir_blocks: Vec<DirBlock>,
    /// Chains through the list's LOC-pages; `None` once nothing has been written yet.
    pub last_location_page_id: Option<PageId>,
}

impl MiddleBody {
    #[must_use]
    pub fn new(last_id_block: IdBlock) -> Self {
        Self {
            last_id_block,
            dir_blocks: Vec::new(),
            last_location_page_id: None,
        }
    }

    /// A freshly converted Middle area with no doc-ids written yet. `last_id_block` is an
    /// uninitialized placeholder (`capacity_bits == 0`) that the first insert replaces wholesale
    /// rather than appending to, since an empty IDBlock has no real `first_document_id` yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(IdBlock::new(0, 0))
    }
}

/// Either shape an area's payload can take.
#[derive(Debug, Clone)]
pub enum AreaBody {
    Short(ShortBody),
    Middle(MiddleBody),
}

/// One Leaf-page area: header fields (§3.1) plus its payload.
#[derive(Debug, Clone)]
pub struct Area {
    pub key: String,
    pub document_count: u32,
    pub last_document_id: u32,
    pub first_document_id: u32,
    pub body: AreaBody,
}

impl Area {
    #[must_use]
    pub fn new_short(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            document_count: 0,
            last_document_id: 0,
            first_document_id: 0,
            body: AreaBody::Short(ShortBody::default()),
        }
    }

    #[must_use]
    pub fn list_type(&self) -> ListType {
        match self.body {
            AreaBody::Short(_) => ListType::Short,
            AreaBody::Middle(_) => ListType::Middle,
        }
    }

    /// Approximate 32-bit-unit size this area would occupy on a page: a fixed header plus the
    /// UCS-2 key plus the coded data payload, rounded up to whole units. Used for split/grow
    /// threshold decisions (invariants B1-B3).
    #[must_use]
    pub fn unit_size(&self, no_tf: bool, no_location: bool) -> usize {
        const HEADER_UNITS: usize = 4;
        let key_units = self.key.chars().count().div_ceil(2);

        let data_units = match &self.body {
            AreaBody::Short(body) => body.data_bit_length(no_tf, no_location).div_ceil(32),
            AreaBody::Middle(body) => {
                const ID_BLOCK_HEADER_UNITS: usize = 3;
                const DIR_BLOCK_UNITS: usize = 2;
                ID_BLOCK_HEADER_UNITS
                    + body.last_id_block.capacity_bits.div_ceil(32)
                    + body.dir_blocks.len() * DIR_BLOCK_UNITS
            }
        };

        HEADER_UNITS + key_units + data_units
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> crate::error::Result<()> {
        writer.write_u8(matches!(self.body, AreaBody::Middle(_)) as u8)?;
        let key_bytes = self.key.as_bytes();
        writer.write_u32::<LittleEndian>(key_bytes.len() as u32)?;
        writer.write_all(key_bytes)?;
        writer.write_u32::<LittleEndian>(self.document_count)?;
        writer.write_u32::<LittleEndian>(self.last_document_id)?;
        writer.write_u32::<LittleEndian>(self.first_document_id)?;

        match &self.body {
            AreaBody::Short(body) => {
                writer.write_u32::<LittleEndian>(body.postings.len() as u32)?;
                for posting in &body.postings {
                    writer.write_u32::<LittleEndian>(posting.document_id)?;
                    writer.write_u32::<LittleEndian>(posting.frequency)?;
                    match &posting.positions {
                        Some(positions) => {
                            writer.write_u8(1)?;
                            writer.write_u32::<LittleEndian>(positions.len() as u32)?;
                            for p in positions {
                                writer.write_u32::<LittleEndian>(*p)?;
                            }
                        }
                        None => writer.write_u8(0)?,
                    }
                }
            }
            AreaBody::Middle(body) => {
                body.last_id_block.write_to(writer)?;
                writer.write_u32::<LittleEndian>(body.dir_blocks.len() as u32)?;
                for dir_block in &body.dir_blocks {
                    dir_block.write_to(writer)?;
                }
                writer.write_u32::<LittleEndian>(body.last_location_page_id.map_or(u32::MAX, |id| id.0))?;
            }
        }

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> crate::error::Result<Self> {
        let is_middle = reader.read_u8()? != 0;

        let key_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut key_bytes = vec![0u8; key_len];
        reader.read_exact(&mut key_bytes)?;
        let key = String::from_utf8(key_bytes)
            .map_err(|_| crate::error::Error::Unexpected("non-utf8 area key"))?;

        let document_count = reader.read_u32::<LittleEndian>()?;
        let last_document_id = reader.read_u32::<LittleEndian>()?;
        let first_document_id = reader.read_u32::<LittleEndian>()?;

        let body = if is_middle {
            let last_id_block = IdBlock::read_from(reader)?;
            let dir_count = reader.read_u32::<LittleEndian>()?;
            let mut dir_blocks = Vec::with_capacity(dir_count as usize);
            for _ in 0..dir_count {
                dir_blocks.push(DirBlock::read_from(reader)?);
            }
            let raw_loc_page = reader.read_u32::<LittleEndian>()?;
            AreaBody::Middle(MiddleBody {
                last_id_block,
                dir_blocks,
                last_location_page_id: (raw_loc_page != u32::MAX).then_some(PageId(raw_loc_page)),
            })
        } else {
            let count = reader.read_u32::<LittleEndian>()?;
            let mut postings = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let document_id = reader.read_u32::<LittleEndian>()?;
                let frequency = reader.read_u32::<LittleEndian>()?;

                let positions = if reader.read_u8()? != 0 {
                    let pos_count = reader.read_u32::<LittleEndian>()?;
                    let mut positions = Vec::with_capacity(pos_count as usize);
                    for _ in 0..pos_count {
                        positions.push(reader.read_u32::<LittleEndian>()?);
                    }
                    Some(positions)
                } else {
                    None
                };

                postings.push(ShortPosting {
                    document_id,
                    frequency,
                    positions,
                });
            }
            AreaBody::Short(ShortBody { postings })
        };

        Ok(Self {
            key,
            document_count,
            last_document_id,
            first_document_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn short_area_round_trips_through_bytes() -> crate::error::Result<()> {
        let mut area = Area::new_short("alpha");
        if let AreaBody::Short(body) = &mut area.body {
            body.postings.push(ShortPosting {
                document_id: 1,
                frequency: 1,
                positions: Some(vec![5]),
            });
            body.postings.push(ShortPosting {
                document_id: 2,
                frequency: 2,
                positions: Some(vec![3, 7]),
            });
        }
        area.document_count = 2;
        area.last_document_id = 2;
        area.first_document_id = 1;

        let mut buf = Vec::new();
        area.write_to(&mut buf)?;

        let mut cursor = &buf[..];
        let decoded = Area::read_from(&mut cursor)?;
        assert_eq!(decoded.key, "alpha");
        assert_eq!(decoded.document_count, 2);

        let AreaBody::Short(body) = decoded.body else {
            panic!("expected short body");
        };
        assert_eq!(body.postings.len(), 2);
        assert_eq!(body.postings[1].positions, Some(vec![3, 7]));

        Ok(())
    }
}
