//! [`DatReader`]: one opened DAT database.
//!
//! ```no_run
//! use acdat::{DatReader, ReaderOptions};
//!
//! let dat = DatReader::open_path("client_portal.dat", ReaderOptions::preloaded())?;
//! if let Some(entry) = dat.find(0x0600_0001)? {
//!     let bytes = dat.read_content(&entry)?;
//!     assert_eq!(bytes.len(), entry.size as usize);
//! }
//! # Ok::<(), acdat::DatError>(())
//! ```
//!
//! Opening reads and validates the header, then selects the directory
//! strategy once: a preloaded in-memory index, a node cache, or a bare walk.
//! After that the reader is immutable apart from the node cache and can be
//! shared across threads.

use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;

use crate::chain::{read_chain, Geometry};
use crate::directory::{
    CacheStats, CachedNodes, DirectoryLookup, EntryIter, FileEntry, NodeReader, PreloadedIndex,
    TreeLookup,
};
use crate::error::{DatError, Result};
use crate::header::{DatabaseKind, Header, HEADER_SIZE};
use crate::options::ReaderOptions;
use crate::source::{BlockSource, FileBlockSource, MmapBlockSource};

pub struct DatReader {
    source:   Arc<dyn BlockSource>,
    header:   Header,
    geometry: Geometry,
    lookup:   Box<dyn DirectoryLookup>,
}

impl DatReader {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<S: BlockSource + 'static>(source: S, options: ReaderOptions) -> Result<Self> {
        Self::open_shared(Arc::new(source), options)
    }

    pub fn open_path<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::open(FileBlockSource::open(path)?, options)
    }

    pub fn open_mmap<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::open(MmapBlockSource::open(path)?, options)
    }

    pub fn open_shared(source: Arc<dyn BlockSource>, options: ReaderOptions) -> Result<Self> {
        let source_len = source.len()?;
        if source_len < HEADER_SIZE as u64 {
            return Err(DatError::header(format!(
                "source holds {source_len} bytes, header needs {HEADER_SIZE}"
            )));
        }
        let mut raw = [0u8; HEADER_SIZE];
        source.read_at(0, &mut raw)?;
        let header = Header::parse(&raw)?;

        if source_len < header.file_size as u64 {
            warn!(
                "header declares {} bytes but source holds {source_len}; bounding reads by source",
                header.file_size
            );
        }
        let geometry = Geometry::new(&header, source_len);
        if !geometry.is_valid_block(header.root_block) {
            return Err(DatError::header(format!(
                "root block {:#010x} beyond end of source",
                header.root_block
            )));
        }
        debug!(
            "opened {:?} database: block_size={} file_size={} root={:#010x}",
            header.kind(),
            header.block_size,
            header.file_size,
            header.root_block
        );

        let lookup = select_lookup(&source, &header, geometry, &options)?;
        Ok(Self { source, header, geometry, lookup })
    }

    // ── Directory ────────────────────────────────────────────────────────────

    /// Resolve a file id.  `Ok(None)` is a normal negative answer.
    pub fn find(&self, file_id: u32) -> Result<Option<FileEntry>> {
        self.lookup.find(file_id)
    }

    /// Every entry in ascending id order.  Each call starts a fresh walk.
    pub fn iterate_entries(&self) -> EntryIter<'_> {
        self.lookup.entries()
    }

    /// Entry count, known only when preloaded.
    pub fn entry_count(&self) -> Option<usize> {
        self.lookup.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lookup.stats()
    }

    // ── Content ──────────────────────────────────────────────────────────────

    /// Exactly `entry.size` bytes of content.
    pub fn read_content(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        read_chain(
            self.source.as_ref(),
            self.geometry,
            entry.start_block,
            Some(entry.size as usize),
        )
    }

    /// Find and read in one step.
    pub fn read_file(&self, file_id: u32) -> Result<Option<Vec<u8>>> {
        match self.find(file_id)? {
            Some(entry) => self.read_content(&entry).map(Some),
            None => Ok(None),
        }
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn database_kind(&self) -> DatabaseKind {
        self.header.kind()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub(crate) fn shared_source(&self) -> Arc<dyn BlockSource> {
        Arc::clone(&self.source)
    }
}

fn select_lookup(
    source:   &Arc<dyn BlockSource>,
    header:   &Header,
    geometry: Geometry,
    options:  &ReaderOptions,
) -> Result<Box<dyn DirectoryLookup>> {
    let nodes = NodeReader::new(Arc::clone(source), geometry);
    let root = header.root_block;
    let max_nodes = geometry.max_blocks();

    if options.preload_file_entries {
        debug!("directory strategy: preload");
        let walk = TreeLookup::new(nodes, root, max_nodes);
        return Ok(Box::new(PreloadedIndex::build(walk.walk())?));
    }
    if options.cache_directories {
        debug!("directory strategy: node cache (capacity {:?})", options.node_cache_capacity);
        let cached = CachedNodes::new(nodes, options.node_cache_capacity);
        return Ok(Box::new(TreeLookup::new(cached, root, max_nodes)));
    }
    debug!("directory strategy: uncached walk");
    Ok(Box::new(TreeLookup::new(nodes, root, max_nodes)))
}
