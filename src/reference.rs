use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::{Mutex, RwLock};

use anyhow::Result;
use bio::io::fasta;
use lru_time_cache::LruCache;

use crate::errors::Error;
use crate::genome::GenomicInterval;

/// Read access to an indexed reference genome.
///
/// `region_sequence` reports `Error::TruncatedSequence` when the fasta holds
/// fewer bases for a contig than its index claims; callers may drop the
/// affected window instead of aborting (see `WindowBuilder`).
pub trait ReferenceRead {
    /// All contigs as `(name, length)`, in index order.
    fn contigs(&self) -> Vec<(String, u64)>;

    fn contig_length(&self, contig: &str) -> Result<u64>;

    fn region_sequence(&self, interval: &GenomicInterval) -> Result<Vec<u8>>;
}

/// A lazy buffer for reference sequences backed by an indexed fasta file.
/// Whole contigs are cached so that successive window fetches on the same
/// contig are O(window length).
pub struct Buffer {
    reader: RwLock<fasta::IndexedReader<fs::File>>,
    sequences: Mutex<LruCache<String, Arc<Vec<u8>>>>,
}

impl Buffer {
    pub fn from_path<P: AsRef<Path> + std::fmt::Debug>(path: P, capacity: usize) -> Result<Self> {
        let fasta: fasta::IndexedReader<fs::File> = fasta::IndexedReader::from_file(&path)?;
        Ok(Buffer {
            reader: RwLock::new(fasta),
            sequences: Mutex::new(LruCache::with_capacity(capacity)),
        })
    }

    /// Load the given contig and return it as a shared slice. This is O(1)
    /// if the contig was loaded before.
    fn seq(&self, contig: &str) -> Result<Arc<Vec<u8>>> {
        let mut sequences = self.sequences.lock().unwrap();

        if !sequences.contains_key(contig) {
            let mut sequence = Arc::new(Vec::new());
            {
                let mut reader = self.reader.write().unwrap();
                reader.fetch_all(contig)?;
                reader.read(Arc::get_mut(&mut sequence).unwrap())?;
            }

            sequences.insert(contig.to_owned(), Arc::clone(&sequence));
            Ok(sequence)
        } else {
            Ok(Arc::clone(sequences.get(contig).unwrap()))
        }
    }
}

impl ReferenceRead for Buffer {
    fn contigs(&self) -> Vec<(String, u64)> {
        self.reader
            .read()
            .unwrap()
            .index
            .sequences()
            .iter()
            .map(|seq| (seq.name.clone(), seq.len))
            .collect()
    }

    fn contig_length(&self, contig: &str) -> Result<u64> {
        self.reader
            .read()
            .unwrap()
            .index
            .sequences()
            .iter()
            .find(|seq| seq.name == contig)
            .map(|seq| seq.len)
            .ok_or_else(|| {
                Error::UnknownContig {
                    contig: contig.to_owned(),
                }
                .into()
            })
    }

    fn region_sequence(&self, interval: &GenomicInterval) -> Result<Vec<u8>> {
        let seq = self.seq(&interval.contig)?;
        if interval.end as usize > seq.len() {
            return Err(Error::TruncatedSequence {
                region: interval.to_string(),
                expected: interval.end as u64,
                actual: seq.len() as u64,
            }
            .into());
        }
        Ok(seq[interval.start as usize..interval.end as usize].to_vec())
    }
}

/// Whether the given fetch failure is the distinguished truncation error
/// honored by `--skip-truncated`.
pub fn is_truncation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<Error>(),
        Some(Error::TruncatedSequence { .. })
    )
}
