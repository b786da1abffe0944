pub mod error;
pub mod header;
pub mod source;
pub mod chain;
pub mod directory;
pub mod options;
pub mod reader;
pub mod manager;
pub mod verify;
pub mod parallel;

pub use error::{DatError, Result};
pub use header::{DatabaseKind, DatabaseType, Header};
pub use source::{BlockSource, FileBlockSource, MemoryBlockSource, MmapBlockSource};
pub use directory::{CacheStats, DirectoryNode, FileEntry};
pub use options::{DatManagerOptions, DatabaseOptions, ReaderOptions};
pub use reader::DatReader;
pub use manager::DatManager;
pub use verify::{verify, Issue, VerifyOptions, VerifyReport};
pub use parallel::read_many;
