//! [`DatManager`]: the four standard databases opened side by side.
//!
//! Each configured slot gets its own independent [`DatReader`] with its own
//! path and its own caching policy.  Nothing is shared between them.

use log::info;
use std::path::Path;

use crate::error::Result;
use crate::options::{DatManagerOptions, DatabaseOptions, ReaderOptions};
use crate::reader::DatReader;

pub struct DatManager {
    portal:   Option<DatReader>,
    cell:     Option<DatReader>,
    language: Option<DatReader>,
    high_res: Option<DatReader>,
}

impl DatManager {
    /// Open every slot that has a path.  Any failure aborts the whole open.
    pub fn open(options: DatManagerOptions) -> Result<Self> {
        let mmap = options.use_mmap;
        Ok(Self {
            portal:   open_slot("portal", &options.portal, mmap)?,
            cell:     open_slot("cell", &options.cell, mmap)?,
            language: open_slot("language", &options.language, mmap)?,
            high_res: open_slot("high_res", &options.high_res, mmap)?,
        })
    }

    pub fn portal(&self) -> Option<&DatReader> {
        self.portal.as_ref()
    }

    pub fn cell(&self) -> Option<&DatReader> {
        self.cell.as_ref()
    }

    pub fn language(&self) -> Option<&DatReader> {
        self.language.as_ref()
    }

    pub fn high_res(&self) -> Option<&DatReader> {
        self.high_res.as_ref()
    }
}

fn open_slot(name: &str, slot: &DatabaseOptions, mmap: bool) -> Result<Option<DatReader>> {
    let Some(path) = slot.path.as_deref() else {
        return Ok(None);
    };
    info!("opening {name} database {}", path.display());
    open_reader(path, slot.reader.clone(), mmap).map(Some)
}

fn open_reader(path: &Path, options: ReaderOptions, mmap: bool) -> Result<DatReader> {
    if mmap {
        DatReader::open_mmap(path, options)
    } else {
        DatReader::open_path(path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::DatabaseKind;
    use crate::reader::tests::sample;
    use tempfile::NamedTempFile;

    fn write_sample() -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), sample()).unwrap();
        tmp
    }

    #[test]
    fn unconfigured_slots_stay_closed() {
        let manager = DatManager::open(DatManagerOptions::default()).unwrap();
        assert!(manager.portal().is_none());
        assert!(manager.cell().is_none());
        assert!(manager.language().is_none());
        assert!(manager.high_res().is_none());
    }

    #[test]
    fn file_and_mmap_slots_read_alike() {
        let tmp = write_sample();
        for use_mmap in [true, false] {
            let options = DatManagerOptions {
                portal: DatabaseOptions::at(tmp.path()),
                use_mmap,
                ..DatManagerOptions::default()
            };
            let manager = DatManager::open(options).unwrap();
            let portal = manager.portal().unwrap();
            assert_eq!(portal.database_kind(), DatabaseKind::Portal);
            assert_eq!(portal.read_file(1).unwrap().unwrap(), vec![0x11; 50]);
        }
    }
}
