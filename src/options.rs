use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::Result;

// ── ReaderOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`DatReader::open`](crate::DatReader::open).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Walk the whole directory at open and answer every lookup from memory.
    pub preload_file_entries: bool,
    /// Keep decoded directory nodes between lookups.  Ignored when preloading.
    pub cache_directories:    bool,
    /// Cap on cached nodes, least recently used evicted first.
    /// `None` keeps every node.
    pub node_cache_capacity:  Option<NonZeroUsize>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            preload_file_entries: false,
            cache_directories:    true,
            node_cache_capacity:  None,
        }
    }
}

impl ReaderOptions {
    pub fn preloaded() -> Self {
        Self { preload_file_entries: true, ..Self::default() }
    }

    pub fn uncached() -> Self {
        Self { cache_directories: false, ..Self::default() }
    }
}

// ── DatManagerOptions ─────────────────────────────────────────────────────────

/// One database slot of a [`DatManager`](crate::DatManager).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// `None` leaves the slot unopened.
    pub path:   Option<PathBuf>,
    #[serde(flatten)]
    pub reader: ReaderOptions,
}

impl DatabaseOptions {
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: Some(path.into()), reader: ReaderOptions::default() }
    }
}

/// Configuration for the four standard databases.
///
/// ```json
/// { "portal": { "path": "client_portal.dat", "preload_file_entries": true },
///   "cell":   { "path": "client_cell_1.dat" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatManagerOptions {
    pub portal:   DatabaseOptions,
    pub cell:     DatabaseOptions,
    pub language: DatabaseOptions,
    pub high_res: DatabaseOptions,
    /// Memory-map the files instead of reading through a file handle.
    pub use_mmap: bool,
}

impl Default for DatManagerOptions {
    fn default() -> Self {
        Self {
            portal:   DatabaseOptions::default(),
            cell:     DatabaseOptions::default(),
            language: DatabaseOptions::default(),
            high_res: DatabaseOptions::default(),
            use_mmap: true,
        }
    }
}

impl DatManagerOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
