//! Multi-way streaming set operations over sorted .unik readers.
//!
//! All inputs must be sorted ascending; the engine pulls them through a
//! min-heap keyed on code, folds the taxids of equal codes with the LCA,
//! and emits each surviving code exactly once, in ascending order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

use crate::errors::{Result, UnikError};
use crate::header::{
    FLAG_CANONICAL, FLAG_HASHED, FLAG_INCLUDE_TAXID, FLAG_SCALED, FLAG_SORTED,
};
use crate::reader::Reader;
use crate::taxonomy::Taxonomy;
use crate::writer::Writer;

/// Hard cap on input streams per operation; occurrence counters in the
/// common path are 16-bit.
pub const MAX_INPUT_FILES: usize = 65535;

/// Threshold for the common operation: an absolute stream count or a
/// proportion of the input count in (0, 1].
#[derive(Debug, Clone, Copy)]
pub enum Threshold {
    Count(usize),
    Proportion(f64),
}

/// The set operation to perform.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Every distinct code across all inputs.
    Union,
    /// Codes present in every input.
    Intersection,
    /// Codes of the first input present in none of the others.
    Difference,
    /// Codes present in at least T inputs.
    Common(Threshold),
    /// Codes present in at least two inputs.
    Duplicates,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Accept inputs that disagree on the include-taxid flag; inputs
    /// without taxids contribute taxid 0, which the LCA absorbs.
    pub mix_taxid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    code: u64,
    src: u16,
    taxid: u32,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.code, self.src, self.taxid).cmp(&(other.code, other.src, other.taxid))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge engine over sorted readers.
pub struct Merger<R: Read> {
    readers: Vec<Reader<R>>,
    op: Operation,
    threshold: usize,
    out_flags: u32,
    out_global_taxid: u32,
    k: u8,
}

impl<R: Read> Merger<R> {
    /// Validates flag compatibility across the inputs and derives the
    /// output flags. Fails before anything is written.
    pub fn new(readers: Vec<Reader<R>>, op: Operation, opts: MergeOptions) -> Result<Self> {
        if readers.is_empty() {
            return Err(UnikError::InvalidFormat("no input files".into()));
        }
        if readers.len() > MAX_INPUT_FILES {
            return Err(UnikError::TooManyFiles(readers.len()));
        }

        let first = readers[0].header();
        let (k, canonical, hashed, scaled) = (
            first.k,
            first.is_canonical(),
            first.is_hashed(),
            first.is_scaled(),
        );
        let mut any_per_taxid = false;
        let mut globals_agree = true;
        let common_global = first.global_taxid;

        for reader in &readers {
            let h = reader.header();
            if h.k != k {
                return Err(UnikError::KMismatch {
                    expected: k,
                    found: h.k,
                });
            }
            if !h.is_sorted() {
                return Err(UnikError::FlagMismatch("sortedness".into()));
            }
            if h.is_canonical() != canonical {
                return Err(UnikError::FlagMismatch("the canonical flag".into()));
            }
            if h.is_hashed() != hashed {
                return Err(UnikError::FlagMismatch("the hashed flag".into()));
            }
            if h.is_scaled() != scaled {
                return Err(UnikError::FlagMismatch("the scaled flag".into()));
            }
            if h.include_taxid() != first.include_taxid() && !opts.mix_taxid {
                return Err(UnikError::FlagMismatch("the include-taxid flag".into()));
            }
            any_per_taxid |= h.include_taxid();
            globals_agree &= h.global_taxid == common_global;
        }

        // a disagreeing global taxid must be promoted to per-code taxids
        let promote = !globals_agree && readers.iter().any(|r| r.header().global_taxid > 0);
        let mut out_flags = FLAG_SORTED;
        if canonical {
            out_flags |= FLAG_CANONICAL;
        }
        if hashed {
            out_flags |= FLAG_HASHED;
        }
        if scaled {
            out_flags |= FLAG_SCALED;
        }
        if any_per_taxid || promote {
            out_flags |= FLAG_INCLUDE_TAXID;
        }
        let out_global_taxid = if globals_agree { common_global } else { 0 };

        let n = readers.len();
        let threshold = match op {
            Operation::Common(Threshold::Count(t)) => t.max(1),
            Operation::Common(Threshold::Proportion(p)) => (((n as f64) * p) as usize).max(1),
            Operation::Duplicates => 2,
            _ => 0,
        };

        Ok(Self {
            readers,
            op,
            threshold,
            out_flags,
            out_global_taxid,
            k,
        })
    }

    pub fn k(&self) -> u8 {
        self.k
    }

    /// Flags the output writer must carry.
    pub fn output_flags(&self) -> u32 {
        self.out_flags
    }

    /// Global taxid for the output header: the common input global when
    /// all inputs agree, 0 otherwise.
    pub fn output_global_taxid(&self) -> u32 {
        self.out_global_taxid
    }

    fn fold(taxonomy: Option<&Taxonomy>, a: u32, b: u32) -> u32 {
        match taxonomy {
            Some(taxo) => taxo.lca(a, b),
            None => {
                if a == 0 || a == b {
                    b
                } else if b == 0 {
                    a
                } else {
                    0
                }
            }
        }
    }

    /// Runs the merge, writing surviving codes to `out`. Returns the
    /// number of codes emitted.
    pub fn run<W: Write>(
        &mut self,
        taxonomy: Option<&Taxonomy>,
        out: &mut Writer<W>,
    ) -> Result<u64> {
        let n = self.readers.len();
        let with_taxid = self.out_flags & FLAG_INCLUDE_TAXID > 0;

        let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::with_capacity(n);
        for (i, reader) in self.readers.iter_mut().enumerate() {
            if let Some((code, taxid)) = reader.read_code_with_taxid()? {
                heap.push(Reverse(Entry {
                    code,
                    src: i as u16,
                    taxid,
                }));
            }
        }

        let mut emitted = 0u64;
        while let Some(Reverse(head)) = heap.pop() {
            let code = head.code;
            let mut occurrences = 1u16;
            let mut taxid = head.taxid;
            let mut only_first = head.src == 0;

            if let Some((c, t)) = self.readers[head.src as usize].read_code_with_taxid()? {
                heap.push(Reverse(Entry {
                    code: c,
                    src: head.src,
                    taxid: t,
                }));
            }

            // drain every stream holding the same code; inputs are
            // strictly ascending so each contributes at most once
            while let Some(&Reverse(next)) = heap.peek() {
                if next.code != code {
                    break;
                }
                heap.pop();
                occurrences = occurrences.saturating_add(1);
                only_first = false;
                taxid = Self::fold(taxonomy, taxid, next.taxid);
                if let Some((c, t)) = self.readers[next.src as usize].read_code_with_taxid()? {
                    heap.push(Reverse(Entry {
                        code: c,
                        src: next.src,
                        taxid: t,
                    }));
                }
            }

            let keep = match self.op {
                Operation::Union => true,
                Operation::Intersection => occurrences as usize == n,
                Operation::Difference => only_first,
                Operation::Common(_) | Operation::Duplicates => {
                    occurrences as usize >= self.threshold
                }
            };
            if keep {
                if with_taxid {
                    out.write_code_with_taxid(code, taxid)?;
                } else {
                    out.write_code(code)?;
                }
                emitted += 1;
            }
        }

        out.flush()?;
        Ok(emitted)
    }
}
