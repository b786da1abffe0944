use std::io;
use thiserror::Error;

/// Every failure the engine can report.
///
/// Block-level variants carry the offending offset so a caller can point at
/// the exact spot in the file. None of them poison the reader: a failed
/// lookup or read leaves every other entry accessible.
#[derive(Error, Debug)]
pub enum DatError {
    #[error("Corrupt header: {reason}")]
    CorruptHeader { reason: String },

    #[error("Invalid block pointer {offset:#010x} (referenced from {from:#010x})")]
    InvalidBlockPointer { offset: u32, from: u32 },

    #[error("Broken chain starting at {start:#010x}: exceeded {limit} blocks")]
    BrokenChain { start: u32, limit: u64 },

    #[error("Truncated chain starting at {start:#010x}: expected {expected} bytes, got {actual}")]
    TruncatedChain { start: u32, expected: usize, actual: usize },

    #[error("Corrupt directory node at {offset:#010x}: {reason}")]
    CorruptDirectory { offset: u32, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl DatError {
    pub(crate) fn header(reason: impl Into<String>) -> Self {
        DatError::CorruptHeader { reason: reason.into() }
    }

    pub(crate) fn directory(offset: u32, reason: impl Into<String>) -> Self {
        DatError::CorruptDirectory { offset, reason: reason.into() }
    }

    /// True for errors caused by on-disk corruption rather than I/O.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DatError::CorruptHeader { .. }
                | DatError::InvalidBlockPointer { .. }
                | DatError::BrokenChain { .. }
                | DatError::TruncatedChain { .. }
                | DatError::CorruptDirectory { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DatError>;
