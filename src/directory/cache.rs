//! Directory lookup strategies, chosen once when a reader opens.
//!
//! - [`PreloadedIndex`] walks the whole tree at open and answers from memory.
//! - [`TreeLookup`] walks the tree per lookup, through either a
//!   [`CachedNodes`] layer or a bare [`NodeReader`].
//!
//! Cached nodes are immutable and keyed by block offset, so two threads
//! racing to decode the same node simply store equal values.

use log::{debug, warn};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

use super::node::{DirectoryNode, FileEntry};
use super::walker::{find, Entries, NodeSource};

pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<FileEntry>> + 'a>;

pub trait DirectoryLookup: Send + Sync {
    fn find(&self, file_id: u32) -> Result<Option<FileEntry>>;

    /// Every entry in ascending id order.
    fn entries(&self) -> EntryIter<'_>;

    /// Number of entries, when known without a walk.
    fn len(&self) -> Option<usize> {
        None
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits:         u64,
    pub misses:       u64,
    pub cached_nodes: usize,
}

// ── Eager ────────────────────────────────────────────────────────────────────

pub struct PreloadedIndex {
    entries: BTreeMap<u32, FileEntry>,
}

impl PreloadedIndex {
    /// Run one full traversal.  Any walk error fails the build.
    pub fn build(walk: Entries<'_>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for entry in walk {
            let entry = entry?;
            if entries.contains_key(&entry.file_id) {
                warn!("duplicate file id {:#010x} in directory, keeping first", entry.file_id);
                continue;
            }
            entries.insert(entry.file_id, entry);
        }
        debug!("preloaded {} file entries", entries.len());
        Ok(Self { entries })
    }
}

impl DirectoryLookup for PreloadedIndex {
    fn find(&self, file_id: u32) -> Result<Option<FileEntry>> {
        Ok(self.entries.get(&file_id).copied())
    }

    fn entries(&self) -> EntryIter<'_> {
        Box::new(self.entries.values().copied().map(Ok))
    }

    fn len(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

// ── Lazy ─────────────────────────────────────────────────────────────────────

enum NodeMap {
    Unbounded(RwLock<HashMap<u32, Arc<DirectoryNode>>>),
    Bounded(Mutex<LruCache<u32, Arc<DirectoryNode>>>),
}

/// Memoizes decoded nodes by block offset in front of another node source.
pub struct CachedNodes<N: NodeSource> {
    inner:  N,
    map:    NodeMap,
    hits:   AtomicU64,
    misses: AtomicU64,
}

impl<N: NodeSource> CachedNodes<N> {
    /// `capacity` of `None` keeps every node ever decoded.
    pub fn new(inner: N, capacity: Option<NonZeroUsize>) -> Self {
        let map = match capacity {
            Some(cap) => NodeMap::Bounded(Mutex::new(LruCache::new(cap))),
            None => NodeMap::Unbounded(RwLock::new(HashMap::new())),
        };
        Self { inner, map, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    fn lookup(&self, offset: u32) -> Option<Arc<DirectoryNode>> {
        match &self.map {
            NodeMap::Unbounded(map) => map.read().get(&offset).cloned(),
            NodeMap::Bounded(map) => map.lock().get(&offset).cloned(),
        }
    }

    fn store(&self, offset: u32, node: Arc<DirectoryNode>) {
        match &self.map {
            NodeMap::Unbounded(map) => {
                map.write().insert(offset, node);
            }
            NodeMap::Bounded(map) => {
                map.lock().put(offset, node);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let cached_nodes = match &self.map {
            NodeMap::Unbounded(map) => map.read().len(),
            NodeMap::Bounded(map) => map.lock().len(),
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cached_nodes,
        }
    }
}

impl<N: NodeSource> NodeSource for CachedNodes<N> {
    fn node(&self, offset: u32) -> Result<Arc<DirectoryNode>> {
        if let Some(node) = self.lookup(offset) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let node = self.inner.node(offset)?;
        self.store(offset, Arc::clone(&node));
        Ok(node)
    }

    fn cache_stats(&self) -> CacheStats {
        self.stats()
    }
}

/// Walks the tree on every call through `nodes`.
pub struct TreeLookup<N: NodeSource> {
    nodes:     N,
    root:      u32,
    max_nodes: u64,
}

impl<N: NodeSource> TreeLookup<N> {
    pub fn new(nodes: N, root: u32, max_nodes: u64) -> Self {
        Self { nodes, root, max_nodes }
    }

    pub fn walk(&self) -> Entries<'_> {
        Entries::new(&self.nodes, self.root, self.max_nodes)
    }
}

impl<N: NodeSource> DirectoryLookup for TreeLookup<N> {
    fn find(&self, file_id: u32) -> Result<Option<FileEntry>> {
        find(&self.nodes, self.root, self.max_nodes, file_id)
    }

    fn entries(&self) -> EntryIter<'_> {
        Box::new(self.walk())
    }

    fn stats(&self) -> CacheStats {
        self.nodes.cache_stats()
    }
}
