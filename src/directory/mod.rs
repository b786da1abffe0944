//! The directory B-tree: node layout, walks, and lookup strategies.

pub mod cache;
pub mod node;
pub mod walker;

pub use cache::{CacheStats, CachedNodes, DirectoryLookup, EntryIter, PreloadedIndex, TreeLookup};
pub use node::{DirectoryNode, FileEntry, MAX_ENTRIES, NODE_SIZE};
pub use walker::{Entries, NodeReader, NodeSource};
