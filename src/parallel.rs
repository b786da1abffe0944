//! Batch content reads.
//!
//! [`read_many`] resolves and reads a list of ids against one shared reader.
//! With the `parallel` feature the batch is spread over Rayon's global pool;
//! otherwise it runs sequentially.  Results come back in input order, and
//! each id succeeds or fails on its own.

use crate::error::Result;
use crate::reader::DatReader;

pub type BatchResult = (u32, Result<Option<Vec<u8>>>);

pub fn read_many(dat: &DatReader, ids: &[u32]) -> Vec<BatchResult> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        ids.par_iter().map(|&id| (id, dat.read_file(id))).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        ids.iter().map(|&id| (id, dat.read_file(id))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ReaderOptions;
    use crate::reader::tests::sample;
    use crate::source::MemoryBlockSource;

    #[test]
    fn results_follow_input_order() {
        let dat = DatReader::open(MemoryBlockSource::new(sample()), ReaderOptions::default()).unwrap();
        let results = read_many(&dat, &[5, 3, 1]);
        let ids: Vec<u32> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![5, 3, 1]);
        assert_eq!(results[0].1.as_ref().unwrap().as_ref().map(Vec::len), Some(2000));
        assert!(matches!(results[1].1, Ok(None)));
        assert_eq!(results[2].1.as_ref().unwrap().as_deref(), Some(&[0x11u8; 50][..]));
    }

    #[test]
    fn empty_batch() {
        let dat = DatReader::open(MemoryBlockSource::new(sample()), ReaderOptions::uncached()).unwrap();
        assert!(read_many(&dat, &[]).is_empty());
    }
}
