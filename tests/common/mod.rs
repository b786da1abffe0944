#![allow(dead_code)]

use acdat::header::{DatabaseType, Header, HEADER_SIZE};
use acdat::{DirectoryNode, FileEntry};

/// Assembles a DAT image block by block: content chains, a B-tree directory
/// with a configurable fan-out, and an optional free list.
pub struct DatBuilder {
    block_size:    usize,
    data:          Vec<u8>,
    database_type: DatabaseType,
    subset:        u32,
    free:          Option<(u32, u32, u32)>,
}

impl DatBuilder {
    pub fn new(block_size: usize) -> Self {
        let region = HEADER_SIZE.div_ceil(block_size) * block_size;
        Self {
            block_size,
            data: vec![0u8; region],
            database_type: DatabaseType::Portal,
            subset: 0,
            free: None,
        }
    }

    pub fn with_type(mut self, database_type: DatabaseType, subset: u32) -> Self {
        self.database_type = database_type;
        self.subset = subset;
        self
    }

    fn alloc(&mut self) -> u32 {
        let offset = self.data.len();
        self.data.resize(offset + self.block_size, 0);
        offset as u32
    }

    /// Lay `payload` out over fresh blocks and return their offsets in link
    /// order.  An empty payload still takes one block.
    pub fn chain_blocks(&mut self, payload: &[u8]) -> Vec<u32> {
        let per_block = self.block_size - 4;
        let count = payload.len().div_ceil(per_block).max(1);
        let offsets: Vec<u32> = (0..count).map(|_| self.alloc()).collect();
        for (i, &offset) in offsets.iter().enumerate() {
            let next = offsets.get(i + 1).copied().unwrap_or(0);
            let at = offset as usize;
            self.data[at..at + 4].copy_from_slice(&next.to_le_bytes());
            let chunk = payload.chunks(per_block).nth(i).unwrap_or(&[]);
            self.data[at + 4..at + 4 + chunk.len()].copy_from_slice(chunk);
        }
        offsets
    }

    pub fn chain(&mut self, payload: &[u8]) -> u32 {
        self.chain_blocks(payload)[0]
    }

    /// Store every file's content and return its entry.  Order is kept.
    pub fn add_files(&mut self, files: &[(u32, Vec<u8>)]) -> Vec<FileEntry> {
        files
            .iter()
            .map(|(id, content)| {
                let start = self.chain(content);
                let mut entry = FileEntry::new(*id, start, content.len() as u32);
                entry.date = 1_600_000_000 + id % 1000;
                entry.iteration = 1;
                entry
            })
            .collect()
    }

    /// Write a B-tree over `entries` (already in id order) with at most
    /// `fanout` entries per node.  Returns the root offset.
    pub fn tree(&mut self, entries: &[FileEntry], fanout: usize) -> u32 {
        assert!((1..=acdat::directory::MAX_ENTRIES).contains(&fanout));
        if entries.len() <= fanout {
            return self.node(&DirectoryNode::Leaf { entries: entries.to_vec() });
        }

        let children_count = if entries.len() >= 2 * fanout + 1 { fanout + 1 } else { 2 };
        let rest = entries.len() - (children_count - 1);
        let base = rest / children_count;
        let extra = rest % children_count;

        let mut separators = Vec::with_capacity(children_count - 1);
        let mut children = Vec::with_capacity(children_count);
        let mut pos = 0;
        for i in 0..children_count {
            let take = base + usize::from(i < extra);
            children.push(self.tree(&entries[pos..pos + take], fanout));
            pos += take;
            if i + 1 < children_count {
                separators.push(entries[pos]);
                pos += 1;
            }
        }
        self.node(&DirectoryNode::Internal { entries: separators, children })
    }

    fn node(&mut self, node: &DirectoryNode) -> u32 {
        let mut bytes = Vec::new();
        node.write(&mut bytes).unwrap();
        self.chain(&bytes)
    }

    /// Chain `count` spare blocks into the free list.
    pub fn free_blocks(&mut self, count: usize) {
        let payload = vec![0u8; count * (self.block_size - 4)];
        let offsets = self.chain_blocks(&payload);
        self.free = Some((offsets[0], offsets[offsets.len() - 1], offsets.len() as u32));
    }

    pub fn finish(mut self, root: u32) -> Vec<u8> {
        let mut header = Header::new(
            self.database_type,
            self.block_size as u32,
            self.data.len() as u32,
            root,
        );
        header.subset = self.subset;
        if let Some((first, last, count)) = self.free {
            header.first_free_block = first;
            header.last_free_block = last;
            header.free_block_count = count;
        }
        header.write(&mut self.data[..HEADER_SIZE]).unwrap();
        self.data
    }
}

/// Deterministic content whose length varies with the id, including empty
/// and multi-block files.
pub fn content_for(id: u32) -> Vec<u8> {
    let len = (id as usize * 37) % 1500;
    (0..len).map(|i| (i as u32 ^ id) as u8).collect()
}

/// A complete image holding `ids` (any order, no duplicates) with generated
/// content.  Returns the image and the entries in id order.
pub fn build_image(ids: &[u32], block_size: usize, fanout: usize) -> (Vec<u8>, Vec<FileEntry>) {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let files: Vec<(u32, Vec<u8>)> = sorted.iter().map(|&id| (id, content_for(id))).collect();

    let mut builder = DatBuilder::new(block_size);
    let entries = builder.add_files(&files);
    let root = builder.tree(&entries, fanout);
    (builder.finish(root), entries)
}

pub fn read_u32(image: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(image[at..at + 4].try_into().unwrap())
}

pub fn patch_u32(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Header field offsets used to corrupt images in tests.
pub const FREE_COUNT_OFFSET: usize = 348;
pub const ROOT_OFFSET: usize = 352;
