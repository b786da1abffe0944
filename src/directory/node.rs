use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Read, Write};

use crate::error::{DatError, Result};

/// Child pointer slots at the front of every node.
pub const MAX_BRANCHES: usize = 62;
/// Entry slots per node; one fewer than the branch slots.
pub const MAX_ENTRIES: usize = MAX_BRANCHES - 1;
pub const ENTRY_SIZE: usize = 24;
/// Byte offset of the entry count, right after the branch table.
const COUNT_OFFSET: usize = MAX_BRANCHES * 4;
const ENTRIES_OFFSET: usize = COUNT_OFFSET + 4;
/// Full logical size of a node with every slot present.
pub const NODE_SIZE: usize = ENTRIES_OFFSET + MAX_ENTRIES * ENTRY_SIZE;

/// One directory record.  Immutable once read; identity is `file_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileEntry {
    pub file_id:     u32,
    /// Offset of the first block of the content chain.
    pub start_block: u32,
    pub size:        u32,
    /// Unix seconds.
    pub date:        u32,
    pub flags:       u32,
    pub iteration:   u32,
}

impl FileEntry {
    pub fn new(file_id: u32, start_block: u32, size: u32) -> Self {
        Self { file_id, start_block, size, date: 0, flags: 0, iteration: 0 }
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            file_id:     reader.read_u32::<LittleEndian>()?,
            start_block: reader.read_u32::<LittleEndian>()?,
            size:        reader.read_u32::<LittleEndian>()?,
            date:        reader.read_u32::<LittleEndian>()?,
            flags:       reader.read_u32::<LittleEndian>()?,
            iteration:   reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.file_id)?;
        writer.write_u32::<LittleEndian>(self.start_block)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.date)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.iteration)?;
        Ok(())
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date as i64, 0)
    }
}

/// A decoded B-tree node.  Leaf and internal nodes share one on-disk shape;
/// a zero first branch marks a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryNode {
    Leaf {
        entries: Vec<FileEntry>,
    },
    /// `children.len() == entries.len() + 1`; child `i` holds the ids
    /// between entry `i - 1` and entry `i`.
    Internal {
        entries:  Vec<FileEntry>,
        children: Vec<u32>,
    },
}

impl DirectoryNode {
    /// Decode the payload of the chain starting at `offset`.  Only the
    /// populated entry slots need to be present.
    pub fn decode(offset: u32, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRIES_OFFSET {
            return Err(DatError::directory(
                offset,
                format!("node payload is {} bytes, need at least {ENTRIES_OFFSET}", bytes.len()),
            ));
        }
        let mut reader = bytes;
        let mut branches = [0u32; MAX_BRANCHES];
        reader.read_u32_into::<LittleEndian>(&mut branches)?;
        let count = reader.read_u32::<LittleEndian>()? as usize;
        if count > MAX_ENTRIES {
            return Err(DatError::directory(offset, format!("entry count {count} exceeds {MAX_ENTRIES}")));
        }
        let needed = ENTRIES_OFFSET + count * ENTRY_SIZE;
        if bytes.len() < needed {
            return Err(DatError::directory(
                offset,
                format!("{count} entries need {needed} bytes, node has {}", bytes.len()),
            ));
        }

        let entries = (0..count)
            .map(|_| FileEntry::read(&mut reader))
            .collect::<io::Result<Vec<_>>>()?;

        if branches[0] == 0 {
            return Ok(DirectoryNode::Leaf { entries });
        }
        let children = branches[..count + 1].to_vec();
        if let Some(slot) = children.iter().position(|&c| c == 0) {
            return Err(DatError::directory(offset, format!("internal node missing child {slot}")));
        }
        Ok(DirectoryNode::Internal { entries, children })
    }

    /// Encode with every slot present, as the format stores it.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut branches = [0u32; MAX_BRANCHES];
        if let DirectoryNode::Internal { children, .. } = self {
            for (slot, &child) in branches.iter_mut().zip(children) {
                *slot = child;
            }
        }
        for b in branches {
            writer.write_u32::<LittleEndian>(b)?;
        }
        let entries = self.entries();
        writer.write_u32::<LittleEndian>(entries.len() as u32)?;
        for e in entries {
            e.write(&mut writer)?;
        }
        let unused = (MAX_ENTRIES - entries.len().min(MAX_ENTRIES)) * ENTRY_SIZE;
        writer.write_all(&vec![0u8; unused])?;
        Ok(())
    }

    pub fn entries(&self) -> &[FileEntry] {
        match self {
            DirectoryNode::Leaf { entries } | DirectoryNode::Internal { entries, .. } => entries,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, DirectoryNode::Leaf { .. })
    }

    pub fn child(&self, index: usize) -> Option<u32> {
        match self {
            DirectoryNode::Leaf { .. } => None,
            DirectoryNode::Internal { children, .. } => children.get(index).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(node: &DirectoryNode) -> Vec<u8> {
        let mut buf = Vec::new();
        node.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn full_node_size() {
        let node = DirectoryNode::Leaf { entries: vec![FileEntry::new(1, 2048, 50)] };
        assert_eq!(encode(&node).len(), NODE_SIZE);
        assert_eq!(NODE_SIZE, 1716);
    }

    #[test]
    fn decodes_leaf() {
        let entries = vec![FileEntry::new(1, 2048, 50), FileEntry::new(5, 3072, 2000)];
        let node = DirectoryNode::Leaf { entries: entries.clone() };
        let decoded = DirectoryNode::decode(1024, &encode(&node)).unwrap();
        assert!(decoded.is_leaf());
        assert_eq!(decoded.entries(), &entries[..]);
        assert_eq!(decoded.child(0), None);
    }

    #[test]
    fn decodes_internal_children() {
        let node = DirectoryNode::Internal {
            entries:  vec![FileEntry::new(10, 4096, 1)],
            children: vec![2048, 3072],
        };
        let decoded = DirectoryNode::decode(1024, &encode(&node)).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.child(1), Some(3072));
        assert_eq!(decoded.child(2), None);
    }

    #[test]
    fn accepts_compact_payload() {
        let node = DirectoryNode::Leaf { entries: vec![FileEntry::new(7, 2048, 3)] };
        let bytes = encode(&node);
        let compact = &bytes[..ENTRIES_OFFSET + ENTRY_SIZE];
        assert_eq!(DirectoryNode::decode(1024, compact).unwrap(), node);
    }

    #[test]
    fn rejects_oversized_count() {
        let mut bytes = encode(&DirectoryNode::Leaf { entries: Vec::new() });
        bytes[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&62u32.to_le_bytes());
        assert!(matches!(
            DirectoryNode::decode(1024, &bytes),
            Err(DatError::CorruptDirectory { offset: 1024, .. })
        ));
    }

    #[test]
    fn rejects_short_payload() {
        let bytes = encode(&DirectoryNode::Leaf { entries: vec![FileEntry::new(1, 2048, 1)] });
        assert!(DirectoryNode::decode(1024, &bytes[..ENTRIES_OFFSET + 10]).is_err());
        assert!(DirectoryNode::decode(1024, &bytes[..100]).is_err());
    }

    #[test]
    fn rejects_internal_with_missing_child() {
        let mut bytes = encode(&DirectoryNode::Internal {
            entries:  vec![FileEntry::new(1, 2048, 1)],
            children: vec![2048, 3072],
        });
        bytes[4..8].fill(0);
        assert!(matches!(
            DirectoryNode::decode(1024, &bytes),
            Err(DatError::CorruptDirectory { .. })
        ));
    }

    #[test]
    fn entry_date_converts() {
        let mut e = FileEntry::new(1, 2048, 1);
        e.date = 1_000_000_000;
        assert_eq!(e.modified().unwrap().timestamp(), 1_000_000_000);
    }
}
