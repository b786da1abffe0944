//! Point lookup and in-order traversal over the on-disk B-tree.
//!
//! Both walks fetch nodes through a [`NodeSource`], which is where caching
//! plugs in.  Both are bounded: a lookup never revisits a node on its path,
//! and a traversal never visits a node twice nor more nodes than the file
//! has blocks.

use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

use crate::chain::{read_chain, Geometry};
use crate::error::{DatError, Result};
use crate::source::BlockSource;

use super::cache::CacheStats;
use super::node::{DirectoryNode, FileEntry};

pub trait NodeSource: Send + Sync {
    fn node(&self, offset: u32) -> Result<Arc<DirectoryNode>>;

    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Reads and decodes every requested node straight from the block source.
pub struct NodeReader {
    source:   Arc<dyn BlockSource>,
    geometry: Geometry,
}

impl NodeReader {
    pub fn new(source: Arc<dyn BlockSource>, geometry: Geometry) -> Self {
        Self { source, geometry }
    }
}

impl NodeSource for NodeReader {
    fn node(&self, offset: u32) -> Result<Arc<DirectoryNode>> {
        let bytes = read_chain(self.source.as_ref(), self.geometry, offset, None)?;
        let node = DirectoryNode::decode(offset, &bytes)?;
        debug!("decoded node {offset:#010x}: {} entries, leaf={}", node.entries().len(), node.is_leaf());
        Ok(Arc::new(node))
    }
}

/// Descend from `root` to the entry for `file_id`.
///
/// A duplicated id resolves to the copy an in-order walk reaches first: a
/// match on an internal node is only a candidate until the subtree to its
/// left has been searched.
pub fn find(nodes: &dyn NodeSource, root: u32, max_nodes: u64, file_id: u32) -> Result<Option<FileEntry>> {
    let mut path: Vec<u32> = Vec::new();
    let mut offset = root;
    let mut candidate: Option<FileEntry> = None;
    loop {
        if path.contains(&offset) {
            return Err(DatError::directory(offset, "node revisited during lookup"));
        }
        if path.len() as u64 >= max_nodes {
            return Err(DatError::directory(offset, format!("lookup descended past {max_nodes} nodes")));
        }
        path.push(offset);

        let node = nodes.node(offset)?;
        let entries = node.entries();
        let i = entries.partition_point(|e| e.file_id < file_id);
        if let Some(hit) = entries.get(i).filter(|e| e.file_id == file_id) {
            candidate = Some(*hit);
        }
        match node.child(i) {
            Some(child) => offset = child,
            None => return Ok(candidate),
        }
    }
}

struct Frame {
    node: Arc<DirectoryNode>,
    /// Internal nodes interleave children and entries: even positions are
    /// child `pos / 2`, odd positions entry `pos / 2`.  Leaves count entries.
    pos:  usize,
}

/// Lazy in-order traversal yielding entries in ascending id order.
///
/// Stops after the first error.  Create a new one to restart.
pub struct Entries<'a> {
    nodes:     &'a dyn NodeSource,
    max_nodes: u64,
    pending:   Option<u32>,
    stack:     Vec<Frame>,
    visited:   HashSet<u32>,
    done:      bool,
}

impl<'a> Entries<'a> {
    pub fn new(nodes: &'a dyn NodeSource, root: u32, max_nodes: u64) -> Self {
        Self {
            nodes,
            max_nodes,
            pending: Some(root),
            stack: Vec::new(),
            visited: HashSet::new(),
            done: false,
        }
    }

    fn descend(&mut self, offset: u32) -> Result<()> {
        if self.visited.len() as u64 >= self.max_nodes {
            return Err(DatError::directory(offset, format!("traversal exceeded {} nodes", self.max_nodes)));
        }
        if !self.visited.insert(offset) {
            return Err(DatError::directory(offset, "node revisited during traversal"));
        }
        let node = self.nodes.node(offset)?;
        self.stack.push(Frame { node, pos: 0 });
        Ok(())
    }

    fn step(&mut self) -> Result<Option<FileEntry>> {
        loop {
            if let Some(offset) = self.pending.take() {
                self.descend(offset)?;
            }
            let (node, pos) = match self.stack.last_mut() {
                Some(frame) => {
                    frame.pos += 1;
                    (Arc::clone(&frame.node), frame.pos - 1)
                }
                None => return Ok(None),
            };
            match &*node {
                DirectoryNode::Leaf { entries } => match entries.get(pos) {
                    Some(e) => return Ok(Some(*e)),
                    None => {
                        self.stack.pop();
                    }
                },
                DirectoryNode::Internal { entries, children } => {
                    if pos % 2 == 0 {
                        match children.get(pos / 2) {
                            Some(&child) => self.pending = Some(child),
                            None => {
                                self.stack.pop();
                            }
                        }
                    } else {
                        match entries.get(pos / 2) {
                            Some(e) => return Ok(Some(*e)),
                            None => {
                                self.stack.pop();
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
