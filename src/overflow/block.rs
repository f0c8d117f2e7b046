// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Decoded, in-memory views of the two block shapes an overflow page packs: IDBlocks (gap-coded
//! doc-id runs) and LOC-blocks (TF + position payloads).

use crate::{
    coding::{BitReader, BitWriter, GapCoder},
    config::DefaultGapCoder,
    error::{Error, Result},
    pager::PageId,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_u32::<LittleEndian>(value)?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(reader.read_u32::<LittleEndian>()?)
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    write_u32(writer, bytes.len() as u32)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// High bit of an `IDBlock`'s or `DirBlock`'s first-doc-id: marks the record reclaimable.
pub const TOMBSTONE_BIT: u32 = 1 << 31;

/// A fixed-capacity run of gap-coded doc-ids, one per term occurrence on this ID-page (or the
/// area's last-IDBlock).
#[derive(Debug, Clone)]
pub struct IdBlock {
    pub first_document_id: u32,
    pub tombstone: bool,
    pub loc_block_page_id: PageId,
    pub loc_block_offset: u32,
    /// Doc-ids strictly greater than `first_document_id`, in ascending order (decoded form of
    /// the gap-coded bit stream).
    pub doc_ids: Vec<u32>,
    /// Capacity of the gap-coded payload, in bits. `(blockSize * 4 - 10) * 8` per §3.1.
    pub capacity_bits: usize,
}

impl IdBlock {
    #[must_use]
    pub fn new(first_document_id: u32, capacity_bits: usize) -> Self {
        Self {
            first_document_id,
            tombstone: false,
            loc_block_page_id: PageId::FIRST,
            loc_block_offset: 0,
            doc_ids: Vec::new(),
            capacity_bits,
        }
    }

    /// Bits currently used by the gap stream.
    #[must_use]
    pub fn used_bits(&self) -> usize {
        let mut prev = self.first_document_id;
        let mut total = 0;
        for &id in &self.doc_ids {
            total += DefaultGapCoder::bit_length(id - prev);
            prev = id;
        }
        total
    }

    #[must_use]
    pub fn free_bits(&self) -> usize {
        self.capacity_bits.saturating_sub(self.used_bits())
    }

    /// Bits `push` would add for `doc_id`, without committing the change.
    #[must_use]
    pub fn bit_length_for(&self, doc_id: u32) -> usize {
        let prev = self.doc_ids.last().copied().unwrap_or(self.first_document_id);
        DefaultGapCoder::bit_length(doc_id - prev)
    }

    /// Appends `doc_id` (must be strictly greater than the current last doc-id). Returns `false`
    /// if it would not fit in the remaining capacity — the caller must promote/allocate instead.
    #[must_use]
    pub fn push(&mut self, doc_id: u32) -> bool {
        if self.bit_length_for(doc_id) > self.free_bits() {
            return false;
        }
        self.doc_ids.push(doc_id);
        true
    }

    #[must_use]
    pub fn last_document_id(&self) -> u32 {
        self.doc_ids.last().copied().unwrap_or(self.first_document_id)
    }

    /// Total live doc-id count, including the first.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.doc_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Removes `doc_id` (must be present). Returns `true` if the block became empty of data
    /// after removal (i.e. only the conceptual "first" slot would remain, which callers then
    /// tombstone or reinitialize).
    pub fn remove(&mut self, doc_id: u32) {
        if doc_id == self.first_document_id {
            if self.doc_ids.is_empty() {
                return;
            }
            self.first_document_id = self.doc_ids.remove(0);
        } else {
            self.doc_ids.retain(|&id| id != doc_id);
        }
    }

    /// Encodes the gap stream to bytes (used when persisting a page).
    #[must_use]
    pub fn encode_gaps(&self) -> Box<[u8]> {
        let mut writer = BitWriter::new();
        let mut prev = self.first_document_id;
        for &id in &self.doc_ids {
            DefaultGapCoder::write(&mut writer, id - prev);
            prev = id;
        }
        writer.into_bytes()
    }

    /// Decodes a gap stream back into doc-ids, given the first doc-id and the stream's bit
    /// length.
    #[must_use]
    pub fn decode_gaps(first_document_id: u32, bytes: &[u8], bit_len: usize) -> Vec<u32> {
        let mut reader = BitReader::with_bit_len(bytes, bit_len);
        let mut out = Vec::new();
        let mut prev = first_document_id;
        while let Some(gap) = DefaultGapCoder::read(&mut reader) {
            prev += gap;
            out.push(prev);
        }
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let tagged_first = if self.tombstone {
            self.first_document_id | TOMBSTONE_BIT
        } else {
            self.first_document_id
        };
        write_u32(writer, tagged_first)?;
        write_u32(writer, self.loc_block_page_id.0)?;
        write_u32(writer, self.loc_block_offset)?;
        write_u32(writer, self.capacity_bits as u32)?;
        write_u32(writer, self.used_bits() as u32)?;
        write_bytes(writer, &self.encode_gaps())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let tagged_first = read_u32(reader)?;
        let tombstone = tagged_first & TOMBSTONE_BIT != 0;
        let first_document_id = tagged_first & !TOMBSTONE_BIT;
        let loc_block_page_id = PageId(read_u32(reader)?);
        let loc_block_offset = read_u32(reader)?;
        let capacity_bits = read_u32(reader)? as usize;
        let bit_len = read_u32(reader)? as usize;
        let bytes = read_bytes(reader)?;

        Ok(Self {
            first_document_id,
            tombstone,
            loc_block_page_id,
            loc_block_offset,
            doc_ids: Self::decode_gaps(first_document_id, &bytes, bit_len),
            capacity_bits,
        })
    }
}

/// Variable-sized payload for one doc-id: term frequency and, for the full profile, its
/// position list.
#[derive(Debug, Clone)]
pub struct LocEntry {
    pub frequency: u32,
    /// `None` for the no-location profile.
    pub positions: Option<Vec<u32>>,
}

impl LocEntry {
    /// Bits this entry would occupy in a LOC-block, for the given profile.
    #[must_use]
    pub fn bit_length(&self, no_tf: bool, no_location: bool) -> usize {
        if no_tf {
            return 0;
        }

        let mut bits = DefaultGapCoder::bit_length(self.frequency);
        if !no_location {
            if let Some(positions) = &self.positions {
                if self.frequency != 1 {
                    let pos_bits = position_list_bit_length(positions);
                    bits += DefaultGapCoder::bit_length((pos_bits + 1) as u32);
                    bits += pos_bits;
                } else if let Some(&only) = positions.first() {
                    bits += DefaultGapCoder::bit_length(only + 1);
                }
            }
        }
        bits
    }

    /// Writes this entry per §6.3: frequency, then (full profile, frequency > 1) a bit-length
    /// prefix and the gap-coded position list, or (frequency == 1) a single raw position.
    pub fn write(&self, writer: &mut BitWriter, no_tf: bool, no_location: bool) {
        if no_tf {
            return;
        }

        DefaultGapCoder::write(writer, self.frequency);

        if no_location {
            return;
        }

        let Some(positions) = &self.positions else {
            return;
        };

        if self.frequency == 1 {
            if let Some(&only) = positions.first() {
                DefaultGapCoder::write(writer, only + 1);
            }
            return;
        }

        let pos_bits = position_list_bit_length(positions);
        DefaultGapCoder::write(writer, (pos_bits + 1) as u32);
        write_position_list(writer, positions);
    }

    /// Inverse of [`Self::write`].
    #[must_use]
    pub fn read(reader: &mut BitReader, no_tf: bool, no_location: bool) -> Option<Self> {
        if no_tf {
            return Some(Self {
                frequency: 1,
                positions: None,
            });
        }

        let frequency = DefaultGapCoder::read(reader)?;

        if no_location {
            return Some(Self {
                frequency,
                positions: None,
            });
        }

        if frequency == 1 {
            let raw = DefaultGapCoder::read(reader)?;
            return Some(Self {
                frequency,
                positions: Some(vec![raw - 1]),
            });
        }

        let bit_len = DefaultGapCoder::read(reader)? as usize - 1;
        let positions = read_position_list(reader, bit_len);
        Some(Self {
            frequency,
            positions: Some(positions),
        })
    }
}

/// Writes a strictly-increasing position list as described in §6.3: each position is gap-coded
/// from the previous one (0 for the first), with the whole gap shifted by one so a gap of zero
/// (i.e. position 0) is representable.
pub fn write_position_list(writer: &mut BitWriter, positions: &[u32]) {
    let mut prev = 0u32;
    for &p in positions {
        DefaultGapCoder::write(writer, p + 1 - prev);
        prev = p + 1;
    }
}

/// Inverse of [`write_position_list`]; reads until `bit_len` bits have been consumed.
#[must_use]
pub fn read_position_list(reader: &mut BitReader, bit_len: usize) -> Vec<u32> {
    let start = reader.position();
    let mut prev = 0u32;
    let mut out = Vec::new();
    while reader.position() - start < bit_len {
        let Some(value) = DefaultGapCoder::read(reader) else {
            break;
        };
        let p = value + prev - 1;
        prev = p + 1;
        out.push(p);
    }
    out
}

/// Bits needed to gap-code a position list (gaps from the previous position, first position
/// gap-coded from zero).
#[must_use]
pub fn position_list_bit_length(positions: &[u32]) -> usize {
    let mut prev = 0u32;
    let mut bits = 0usize;
    for &p in positions {
        bits += DefaultGapCoder::bit_length(p + 1 - prev);
        prev = p + 1;
    }
    bits
}

/// One LOC-block: header `[continueFlag:1 | dataUnitSize:13 | dataBitLength:18]` followed by
/// `dataUnitSize` 32-bit units of payload (§6.2). Represented here as a decoded sequence of
/// `LocEntry` values in the order their IDBlock counterparts were inserted.
#[derive(Debug, Clone, Default)]
pub struct LocBlock {
    pub continue_flag: bool,
    pub entries: Vec<LocEntry>,
    /// Capacity of the payload, in bits.
    pub capacity_bits: usize,
}

impl LocBlock {
    #[must_use]
    pub fn new(capacity_bits: usize) -> Self {
        Self {
            continue_flag: false,
            entries: Vec::new(),
            capacity_bits,
        }
    }

    #[must_use]
    pub fn used_bits(&self, no_tf: bool, no_location: bool) -> usize {
        self.entries.iter().map(|e| e.bit_length(no_tf, no_location)).sum()
    }

    #[must_use]
    pub fn free_bits(&self, no_tf: bool, no_location: bool) -> usize {
        self.capacity_bits.saturating_sub(self.used_bits(no_tf, no_location))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W, no_tf: bool, no_location: bool) -> Result<()> {
        writer.write_u8(u8::from(self.continue_flag))?;
        write_u32(writer, self.capacity_bits as u32)?;
        write_u32(writer, self.entries.len() as u32)?;

        let mut bits = BitWriter::new();
        for entry in &self.entries {
            entry.write(&mut bits, no_tf, no_location);
        }
        write_u32(writer, bits.len_bits() as u32)?;
        write_bytes(writer, &bits.into_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R, no_tf: bool, no_location: bool) -> Result<Self> {
        let continue_flag = reader.read_u8()? != 0;
        let capacity_bits = read_u32(reader)? as usize;
        let count = read_u32(reader)?;
        let bit_len = read_u32(reader)? as usize;
        let bytes = read_bytes(reader)?;

        let mut bits = BitReader::with_bit_len(&bytes, bit_len);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let entry = LocEntry::read(&mut bits, no_tf, no_location)
                .ok_or(Error::Unexpected("truncated LOC-block payload"))?;
            entries.push(entry);
        }

        Ok(Self {
            continue_flag,
            entries,
            capacity_bits,
        })
    }
}

/// One directory-block: `{idPageId, firstDocId}`, `firstDocId`'s high bit = dir-tombstoned.
#[derive(Debug, Clone, Copy)]
pub struct DirBlock {
    pub id_page_id: PageId,
    pub first_doc_id: u32,
    pub tombstone: bool,
}

impl DirBlock {
    #[must_use]
    pub fn new(id_page_id: PageId, first_doc_id: u32) -> Self {
        Self {
            id_page_id,
            first_doc_id,
            tombstone: false,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u32(writer, self.id_page_id.0)?;
        let tagged = if self.tombstone {
            self.first_doc_id | TOMBSTONE_BIT
        } else {
            self.first_doc_id
        };
        write_u32(writer, tagged)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let id_page_id = PageId(read_u32(reader)?);
        let tagged = read_u32(reader)?;
        Ok(Self {
            id_page_id,
            first_doc_id: tagged & !TOMBSTONE_BIT,
            tombstone: tagged & TOMBSTONE_BIT != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn id_block_push_respects_capacity() {
        let mut block = IdBlock::new(10, 8);
        assert!(block.push(11));
        assert!(!block.push(1_000_000_000));
    }

    #[test]
    fn id_block_gap_round_trips() {
        let mut block = IdBlock::new(10, 4096);
        for id in [12, 20, 21, 100] {
            assert!(block.push(id));
        }

        let bytes = block.encode_gaps();
        let decoded = IdBlock::decode_gaps(block.first_document_id, &bytes, block.used_bits());
        assert_eq!(decoded, block.doc_ids);
    }

    #[test]
    fn loc_entry_round_trips_full_profile() {
        let entry = LocEntry {
            frequency: 3,
            positions: Some(vec![0, 4, 9]),
        };

        let mut writer = BitWriter::new();
        entry.write(&mut writer, false, false);
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let decoded = LocEntry::read(&mut reader, false, false).expect("entry");
        assert_eq!(decoded.frequency, 3);
        assert_eq!(decoded.positions, Some(vec![0, 4, 9]));
    }

    #[test]
    fn loc_entry_elides_bit_length_for_frequency_one() {
        let entry = LocEntry {
            frequency: 1,
            positions: Some(vec![7]),
        };

        let mut writer = BitWriter::new();
        entry.write(&mut writer, false, false);
        assert_eq!(writer.len_bits(), entry.bit_length(false, false));

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let decoded = LocEntry::read(&mut reader, false, false).expect("entry");
        assert_eq!(decoded.positions, Some(vec![7]));
    }

    #[test]
    fn remove_first_promotes_next() {
        let mut block = IdBlock::new(10, 4096);
        block.push(20);
        block.push(30);
        block.remove(10);
        assert_eq!(block.first_document_id, 20);
        assert_eq!(block.doc_ids, vec![30]);
    }
}
