//! Block-chain reassembly.
//!
//! Every block after the header region starts with a little-endian `u32`
//! holding the offset of the next block in the chain; `0` ends the chain.
//! The remaining `block_size - 4` bytes are payload.  A logical stream is
//! the concatenation of the payloads in link order.
//!
//! Every pointer is validated against the [`Geometry`] before it is
//! dereferenced, and the number of hops is bounded by the number of blocks
//! the file can hold, so a corrupt or cyclic chain always terminates.

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::collections::HashSet;

use crate::error::{DatError, Result};
use crate::header::Header;
use crate::source::BlockSource;

/// Size of the next-block pointer at the front of every block.
pub const POINTER_SIZE: usize = 4;
/// Pointer value marking the last block of a chain.
pub const END_OF_CHAIN: u32 = 0;

/// The addressable layout of one DAT file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size:    u32,
    /// First byte after the header region; no chain block lives below it.
    pub data_start:    u64,
    /// One past the last addressable byte.
    pub limit:         u64,
}

impl Geometry {
    /// Bound by whichever is smaller: the declared file size or what the
    /// source actually holds.
    pub fn new(header: &Header, source_len: u64) -> Self {
        Self {
            block_size: header.block_size,
            data_start: header.header_region(),
            limit:      (header.file_size as u64).min(source_len),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.block_size as usize - POINTER_SIZE
    }

    /// Upper bound on the number of blocks any chain can visit.
    pub fn max_blocks(&self) -> u64 {
        self.limit / self.block_size as u64
    }

    /// True if `offset` names a whole data block inside the file.
    pub fn is_valid_block(&self, offset: u32) -> bool {
        let off = offset as u64;
        off % self.block_size as u64 == 0
            && off >= self.data_start
            && off + self.block_size as u64 <= self.limit
    }

    pub fn check_pointer(&self, offset: u32, from: u32) -> Result<()> {
        if self.is_valid_block(offset) {
            Ok(())
        } else {
            Err(DatError::InvalidBlockPointer { offset, from })
        }
    }
}

/// Walks the blocks of one chain, yielding `(offset, block bytes)`.
struct ChainCursor<'a> {
    source:   &'a dyn BlockSource,
    geometry: Geometry,
    start:    u32,
    next:     u32,
    /// Block whose pointer produced `next`; `END_OF_CHAIN` for the start.
    from:     u32,
    seen:     HashSet<u32>,
    block:    Vec<u8>,
}

impl<'a> ChainCursor<'a> {
    fn new(source: &'a dyn BlockSource, geometry: Geometry, start: u32) -> Self {
        Self {
            source,
            geometry,
            start,
            next: start,
            from: END_OF_CHAIN,
            seen: HashSet::new(),
            block: vec![0u8; geometry.block_size as usize],
        }
    }

    /// Read the next block.  Returns `Ok(None)` once the terminator is hit.
    /// A pointer is only validated when it is about to be followed.
    fn advance(&mut self) -> Result<Option<(u32, &[u8])>> {
        if self.next == END_OF_CHAIN && self.from != END_OF_CHAIN {
            return Ok(None);
        }
        let offset = self.next;
        self.geometry.check_pointer(offset, self.from)?;
        if self.seen.len() as u64 >= self.geometry.max_blocks() || !self.seen.insert(offset) {
            return Err(DatError::BrokenChain {
                start: self.start,
                limit: self.geometry.max_blocks(),
            });
        }
        self.source.read_at(offset as u64, &mut self.block)?;
        let next = LittleEndian::read_u32(&self.block[..POINTER_SIZE]);
        trace!("chain {:#010x}: block {:#010x} -> {:#010x}", self.start, offset, next);
        self.next = next;
        self.from = offset;
        Ok(Some((offset, &self.block[POINTER_SIZE..])))
    }
}

/// Reassemble the logical stream starting at `start`.
///
/// With `expected_length` the read stops as soon as that many bytes are
/// collected and fails with [`DatError::TruncatedChain`] if the chain ends
/// first.  Without it the whole chain is read to its terminator.
pub fn read_chain(
    source:          &dyn BlockSource,
    geometry:        Geometry,
    start:           u32,
    expected_length: Option<usize>,
) -> Result<Vec<u8>> {
    if expected_length == Some(0) {
        return Ok(Vec::new());
    }
    // Sizes come from disk; never reserve more than the file can hold.
    let ceiling = geometry.max_blocks() as usize * geometry.payload_size();
    let mut out = Vec::with_capacity(expected_length.unwrap_or(geometry.payload_size()).min(ceiling));
    let mut cursor = ChainCursor::new(source, geometry, start);

    while let Some((_, payload)) = cursor.advance()? {
        match expected_length {
            Some(want) => {
                let take = (want - out.len()).min(payload.len());
                out.extend_from_slice(&payload[..take]);
                if out.len() == want {
                    return Ok(out);
                }
            }
            None => out.extend_from_slice(payload),
        }
    }

    match expected_length {
        Some(expected) => Err(DatError::TruncatedChain { start, expected, actual: out.len() }),
        None => Ok(out),
    }
}

/// Offsets of every block in the chain, in link order.  Payloads are read
/// but discarded; used to walk the free list.
pub fn chain_offsets(source: &dyn BlockSource, geometry: Geometry, start: u32) -> Result<Vec<u32>> {
    let mut offsets = Vec::new();
    let mut cursor = ChainCursor::new(source, geometry, start);
    while let Some((offset, _)) = cursor.advance()? {
        offsets.push(offset);
    }
    Ok(offsets)
}
