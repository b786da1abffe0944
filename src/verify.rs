//! Consistency checking for a whole database.
//!
//! [`verify`] walks the directory tree itself (never the preloaded index,
//! which has already collapsed duplicates), reads every entry's content, and
//! walks the free-block list.  Corruption never aborts the run: every
//! problem becomes an [`Issue`] in the report.  A walk error ends the
//! directory pass early, since the in-order position is lost.

use log::warn;
use std::collections::HashSet;

use crate::chain::chain_offsets;
use crate::directory::{NodeReader, TreeLookup};
use crate::reader::DatReader;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Compute a BLAKE3 digest of every readable entry.
    pub digests: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    /// The same id appears more than once in the tree.
    DuplicateId { file_id: u32 },
    /// The in-order walk produced a smaller id after a larger one.
    OutOfOrder { previous: u32, file_id: u32 },
    /// The entry resolved but its content could not be read.
    Unreadable { file_id: u32, error: String },
    /// The directory walk stopped early.
    DirectoryBroken { error: String },
    /// The free list could not be followed.
    FreeListBroken { error: String },
    /// The free list walked cleanly but disagrees with the header.
    FreeListMismatch { declared: u32, walked: u32 },
    FreeListTailMismatch { declared: u32, walked: u32 },
}

#[derive(Debug, Clone)]
pub struct EntryDigest {
    pub file_id: u32,
    pub size:    u32,
    pub blake3:  [u8; 32],
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub entries:        usize,
    pub readable:       usize,
    pub readable_bytes: u64,
    pub free_blocks:    usize,
    pub issues:         Vec<Issue>,
    pub digests:        Vec<EntryDigest>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} entr{} ({} readable, {:.2} MiB), {} free block(s), {} issue(s)",
            self.entries,
            if self.entries == 1 { "y" } else { "ies" },
            self.readable,
            self.readable_bytes as f64 / 1024.0 / 1024.0,
            self.free_blocks,
            self.issues.len(),
        )
    }
}

pub fn verify(dat: &DatReader, options: VerifyOptions) -> VerifyReport {
    let mut report = VerifyReport::default();
    check_directory(dat, options, &mut report);
    check_free_list(dat, &mut report);
    for issue in &report.issues {
        warn!("verify: {issue:?}");
    }
    report
}

fn check_directory(dat: &DatReader, options: VerifyOptions, report: &mut VerifyReport) {
    let geometry = dat.geometry();
    let tree = TreeLookup::new(
        NodeReader::new(dat.shared_source(), geometry),
        dat.header().root_block,
        geometry.max_blocks(),
    );

    let mut seen = HashSet::new();
    let mut previous: Option<u32> = None;
    for entry in tree.walk() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                report.issues.push(Issue::DirectoryBroken { error: e.to_string() });
                break;
            }
        };
        report.entries += 1;

        if !seen.insert(entry.file_id) {
            report.issues.push(Issue::DuplicateId { file_id: entry.file_id });
        }
        if let Some(prev) = previous {
            if entry.file_id < prev {
                report.issues.push(Issue::OutOfOrder { previous: prev, file_id: entry.file_id });
            }
        }
        previous = Some(entry.file_id);

        match dat.read_content(&entry) {
            Ok(bytes) => {
                report.readable += 1;
                report.readable_bytes += bytes.len() as u64;
                if options.digests {
                    report.digests.push(EntryDigest {
                        file_id: entry.file_id,
                        size:    entry.size,
                        blake3:  blake3::hash(&bytes).into(),
                    });
                }
            }
            Err(e) => report.issues.push(Issue::Unreadable {
                file_id: entry.file_id,
                error:   e.to_string(),
            }),
        }
    }
}

fn check_free_list(dat: &DatReader, report: &mut VerifyReport) {
    let header = dat.header();
    if header.first_free_block == 0 {
        if header.free_block_count != 0 {
            report.issues.push(Issue::FreeListMismatch {
                declared: header.free_block_count,
                walked:   0,
            });
        }
        return;
    }

    let source = dat.shared_source();
    match chain_offsets(source.as_ref(), dat.geometry(), header.first_free_block) {
        Ok(offsets) => {
            report.free_blocks = offsets.len();
            if offsets.len() as u32 != header.free_block_count {
                report.issues.push(Issue::FreeListMismatch {
                    declared: header.free_block_count,
                    walked:   offsets.len() as u32,
                });
            }
            let tail = offsets.last().copied().unwrap_or(0);
            if tail != header.last_free_block {
                report.issues.push(Issue::FreeListTailMismatch {
                    declared: header.last_free_block,
                    walked:   tail,
                });
            }
        }
        Err(e) => report.issues.push(Issue::FreeListBroken { error: e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ReaderOptions;
    use crate::reader::tests::sample;
    use crate::source::MemoryBlockSource;

    fn open(image: Vec<u8>) -> DatReader {
        DatReader::open(MemoryBlockSource::new(image), ReaderOptions::default()).unwrap()
    }

    fn set_free_list(image: &mut [u8], first: u32, last: u32, count: u32) {
        image[340..344].copy_from_slice(&first.to_le_bytes());
        image[344..348].copy_from_slice(&last.to_le_bytes());
        image[348..352].copy_from_slice(&count.to_le_bytes());
    }

    #[test]
    fn clean_database_reports_totals_and_digests() {
        let dat = open(sample());
        let report = verify(&dat, VerifyOptions { digests: true });
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.entries, 2);
        assert_eq!(report.readable, 2);
        assert_eq!(report.readable_bytes, 2050);
        assert_eq!(report.free_blocks, 0);
        let content = dat.read_file(5).unwrap().unwrap();
        assert_eq!(report.digests[1].file_id, 5);
        assert_eq!(report.digests[1].blake3, *blake3::hash(&content).as_bytes());
    }

    #[test]
    fn unfollowable_free_list_is_reported() {
        let mut image = sample();
        set_free_list(&mut image, 0x123, 0x123, 1);
        let report = verify(&open(image), VerifyOptions::default());
        assert_eq!(report.readable, 2);
        assert!(matches!(report.issues.as_slice(), [Issue::FreeListBroken { .. }]));
    }

    #[test]
    fn free_list_tail_is_checked() {
        let mut image = sample();
        // Block 2048 ends its chain, so the list walks as one block.
        set_free_list(&mut image, 2048, 0, 1);
        let report = verify(&open(image), VerifyOptions::default());
        assert_eq!(report.free_blocks, 1);
        assert_eq!(report.issues, vec![Issue::FreeListTailMismatch { declared: 0, walked: 2048 }]);
    }

    #[test]
    fn summary_pluralizes() {
        let one = VerifyReport { entries: 1, ..VerifyReport::default() };
        assert!(one.summary().starts_with("1 entry ("));
        assert!(VerifyReport::default().summary().starts_with("0 entries"));
    }
}
