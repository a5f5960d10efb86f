//! External sort for code streams that may not fit in memory.
//!
//! Codes accumulate in a bounded in-memory buffer; full buffers are
//! sorted in parallel and spilled to numbered sorted chunk files, which
//! are then k-way merged into the final sorted stream. When everything
//! fits in one buffer no chunk file is written at all.

use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Result, UnikError};
use crate::header::FLAG_SORTED;
use crate::merge::{Merger, MergeOptions, Operation};
use crate::reader::Reader;
use crate::taxonomy::Taxonomy;
use crate::utils::find_numbered_files;
use crate::writer::Writer;

const CHUNK_PREFIX: &str = "chunk";

/// What the sorted stream should keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutput {
    /// Every distinct code once, taxids folded with the LCA.
    All,
    /// Only codes that occurred at least twice.
    Repeated,
}

/// Accumulates `(code, taxid)` pairs and produces a sorted, deduplicated
/// .unik stream, spilling sorted chunks to `dir` when the buffer
/// overflows `max_chunk` pairs.
pub struct ExternalSorter<'a> {
    dir: PathBuf,
    k: usize,
    flags: u32,
    max_chunk: usize,
    taxonomy: Option<&'a Taxonomy>,
    buf: Vec<(u64, u32)>,
    n_chunks: usize,
    total: u64,
}

impl<'a> ExternalSorter<'a> {
    pub fn new<P: AsRef<Path>>(
        dir: P,
        k: usize,
        flags: u32,
        max_chunk: usize,
        taxonomy: Option<&'a Taxonomy>,
    ) -> Result<Self> {
        if max_chunk == 0 {
            return Err(UnikError::InvalidFormat("chunk size must be > 0".into()));
        }
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            k,
            flags: flags | FLAG_SORTED,
            max_chunk,
            taxonomy,
            buf: Vec::new(),
            n_chunks: 0,
            total: 0,
        })
    }

    /// Pairs pushed so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn push(&mut self, code: u64, taxid: u32) -> Result<()> {
        self.buf.push((code, taxid));
        self.total += 1;
        if self.buf.len() >= self.max_chunk {
            self.spill()?;
        }
        Ok(())
    }

    /// Sorts the buffer and writes it out as the next chunk file.
    /// Chunks keep duplicate codes; the merge phase settles them.
    fn spill(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.buf.par_sort_unstable();
        self.n_chunks += 1;
        let path = self
            .dir
            .join(format!("{}_{}.unik", CHUNK_PREFIX, self.n_chunks));
        let file = BufWriter::new(File::create(path)?);
        let mut w = Writer::new(file, self.k, self.flags)?;
        w.set_count(self.buf.len() as i64)?;
        for &(code, taxid) in &self.buf {
            w.write_code_with_taxid(code, taxid)?;
        }
        w.flush()?;
        self.buf.clear();
        Ok(())
    }

    /// Emits the sorted stream into `out` and removes the chunk files.
    /// Returns the number of codes written.
    pub fn finish<W: Write>(mut self, out: &mut Writer<W>, keep: SortOutput) -> Result<u64> {
        if self.n_chunks == 0 {
            return self.finish_in_memory(out, keep);
        }
        self.spill()?;

        let chunk_files = find_numbered_files(&self.dir, CHUNK_PREFIX, ".unik")?;
        let mut readers = Vec::with_capacity(chunk_files.len());
        for path in &chunk_files {
            readers.push(Reader::new(crate::utils::open_file(path)?)?);
        }
        let op = match keep {
            SortOutput::All => Operation::Union,
            SortOutput::Repeated => Operation::Duplicates,
        };
        let mut merger = Merger::new(readers, op, MergeOptions::default())?;
        let emitted = merger.run(self.taxonomy, out)?;

        for path in chunk_files {
            fs::remove_file(path)?;
        }
        Ok(emitted)
    }

    fn finish_in_memory<W: Write>(&mut self, out: &mut Writer<W>, keep: SortOutput) -> Result<u64> {
        self.buf.par_sort_unstable();
        let mut emitted = 0u64;
        let mut i = 0;
        while i < self.buf.len() {
            let (code, mut taxid) = self.buf[i];
            let mut j = i + 1;
            while j < self.buf.len() && self.buf[j].0 == code {
                taxid = match self.taxonomy {
                    Some(taxo) => taxo.lca(taxid, self.buf[j].1),
                    None => {
                        let other = self.buf[j].1;
                        if taxid == 0 || taxid == other {
                            other
                        } else if other == 0 {
                            taxid
                        } else {
                            0
                        }
                    }
                };
                j += 1;
            }
            if keep == SortOutput::All || j - i >= 2 {
                out.write_code_with_taxid(code, taxid)?;
                emitted += 1;
            }
            i = j;
        }
        out.flush()?;
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FLAG_INCLUDE_TAXID;

    fn read_all(buf: &[u8]) -> Vec<(u64, u32)> {
        let mut r = Reader::new(buf).unwrap();
        let mut got = Vec::new();
        while let Some(pair) = r.read_code_with_taxid().unwrap() {
            got.push(pair);
        }
        got
    }

    fn run_sort(
        codes: &[(u64, u32)],
        max_chunk: usize,
        flags: u32,
        keep: SortOutput,
    ) -> Vec<(u64, u32)> {
        let dir = tempfile::tempdir().unwrap();
        let mut sorter =
            ExternalSorter::new(dir.path(), 21, FLAG_SORTED | flags, max_chunk, None).unwrap();
        for &(code, taxid) in codes {
            sorter.push(code, taxid).unwrap();
        }
        let mut out = Writer::new(Vec::new(), 21, FLAG_SORTED | flags).unwrap();
        sorter.finish(&mut out, keep).unwrap();
        read_all(&out.into_inner())
    }

    #[test]
    fn test_in_memory_sort_dedup() {
        let got = run_sort(
            &[(9, 0), (1, 0), (5, 0), (1, 0), (9, 0)],
            1000,
            0,
            SortOutput::All,
        );
        assert_eq!(got, vec![(1, 0), (5, 0), (9, 0)]);
    }

    #[test]
    fn test_spilled_sort_dedup() {
        let codes: Vec<(u64, u32)> = (0..500u64).rev().map(|i| (i % 100, 0)).collect();
        let got = run_sort(&codes, 64, 0, SortOutput::All);
        assert_eq!(got, (0..100u64).map(|i| (i, 0)).collect::<Vec<_>>());
    }

    #[test]
    fn test_repeated_only() {
        let codes = [(1u64, 0u32), (2, 0), (2, 0), (3, 0), (3, 0), (3, 0), (4, 0)];
        // in memory
        let got = run_sort(&codes, 1000, 0, SortOutput::Repeated);
        assert_eq!(got, vec![(2, 0), (3, 0)]);
        // spilled: duplicates split across chunks still count
        let got = run_sort(&codes, 2, 0, SortOutput::Repeated);
        assert_eq!(got, vec![(2, 0), (3, 0)]);
    }

    #[test]
    fn test_taxids_fold_on_duplicates() {
        let got = run_sort(
            &[(7, 562), (7, 562), (8, 0), (8, 99)],
            1000,
            FLAG_INCLUDE_TAXID,
            SortOutput::All,
        );
        // without a taxonomy equal taxids survive and 0 is absorbed
        assert_eq!(got, vec![(7, 562), (8, 99)]);
    }
}
