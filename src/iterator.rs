//! Streaming k-mer iteration over a nucleotide sequence.
//!
//! Two flavors share the same construction parameters: [`KmerIterator`]
//! emits 2-bit packed codes (k <= 32), [`HashIterator`] emits ntHash
//! values and supports longer k. Both take a private copy of the input,
//! so circular extension and strand flipping never touch the caller's
//! buffer.

use crate::errors::{Result, UnikError};
use crate::kmer::{base_to_bits, code_mask, MAX_K};
use crate::nthash::NtHash;

/// IUPAC complement, case-folded to uppercase.
#[inline]
fn comp_base(b: u8) -> u8 {
    match b {
        b'A' | b'a' => b'T',
        b'C' | b'c' => b'G',
        b'G' | b'g' => b'C',
        b'T' | b't' | b'U' | b'u' => b'A',
        b'M' | b'm' => b'K',
        b'K' | b'k' => b'M',
        b'R' | b'r' => b'Y',
        b'Y' | b'y' => b'R',
        b'V' | b'v' => b'B',
        b'B' | b'b' => b'V',
        b'H' | b'h' => b'D',
        b'D' | b'd' => b'H',
        b'W' | b'w' => b'W',
        b'S' | b's' => b'S',
        b'N' | b'n' => b'N',
        other => other,
    }
}

fn reverse_complement_in_place(seq: &mut [u8]) {
    seq.reverse();
    for b in seq.iter_mut() {
        *b = comp_base(*b);
    }
}

/// Copies the sequence, appending the first k-1 bases when circular.
fn owned_buffer(seq: &[u8], k: usize, circular: bool) -> Result<Vec<u8>> {
    if seq.len() < k {
        return Err(UnikError::SeqTooShort {
            len: seq.len(),
            k,
        });
    }
    let mut buf = Vec::with_capacity(seq.len() + if circular { k - 1 } else { 0 });
    buf.extend_from_slice(seq);
    if circular {
        buf.extend_from_slice(&seq[..k - 1]);
    }
    Ok(buf)
}

/// Single-use iterator over the encoded k-mers of a sequence.
///
/// Emits `(code, index)` in position order on the forward strand and,
/// unless canonical is set, again on the reverse-complement strand. An
/// illegal base ends the stream with an error carrying its position.
pub struct KmerIterator {
    seq: Vec<u8>,
    k: usize,
    canonical: bool,
    pos: usize,
    windows: usize,
    code: u64,
    rc: u64,
    started: bool,
    second_strand: bool,
    finished: bool,
}

impl KmerIterator {
    pub fn new(seq: &[u8], k: usize, canonical: bool, circular: bool) -> Result<Self> {
        if k == 0 || k > MAX_K {
            return Err(UnikError::KOverflow(k));
        }
        let buf = owned_buffer(seq, k, circular)?;
        let windows = buf.len() - k + 1;
        Ok(Self {
            seq: buf,
            k,
            canonical,
            pos: 0,
            windows,
            code: 0,
            rc: 0,
            started: false,
            second_strand: false,
            finished: false,
        })
    }

    /// Encodes the window at `self.pos` from scratch.
    fn encode_window(&mut self) -> Result<()> {
        let window = &self.seq[self.pos..self.pos + self.k];
        let mut code = 0u64;
        let mut rc = 0u64;
        for (i, &b) in window.iter().enumerate() {
            let v = base_to_bits(b).ok_or(UnikError::IllegalBase {
                base: b,
                pos: self.pos + i,
            })?;
            code = (code << 2) | v;
            rc |= (v ^ 3) << (i << 1);
        }
        self.code = code;
        self.rc = rc;
        Ok(())
    }

    /// Shifts the incoming base into both strand codes.
    fn roll(&mut self) -> Result<()> {
        let b = self.seq[self.pos + self.k - 1];
        let v = base_to_bits(b).ok_or(UnikError::IllegalBase {
            base: b,
            pos: self.pos + self.k - 1,
        })?;
        self.code = ((self.code << 2) & code_mask(self.k)) | v;
        self.rc = ((v ^ 3) << ((self.k - 1) << 1)) | (self.rc >> 2);
        Ok(())
    }
}

impl Iterator for KmerIterator {
    type Item = Result<(u64, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.pos >= self.windows {
            // canonical codes already cover both strands
            if self.canonical || self.second_strand {
                self.finished = true;
                return None;
            }
            reverse_complement_in_place(&mut self.seq);
            self.second_strand = true;
            self.started = false;
            self.pos = 0;
        }
        let step = if self.started {
            self.roll()
        } else {
            self.started = true;
            self.encode_window()
        };
        if let Err(e) = step {
            self.finished = true;
            return Some(Err(e));
        }
        let emitted = if self.canonical {
            self.code.min(self.rc)
        } else {
            self.code
        };
        let idx = self.pos;
        self.pos += 1;
        Some(Ok((emitted, idx)))
    }
}

/// Single-use iterator over ntHash values of a sequence.
///
/// Illegal bases are tolerated (they hash with a zero seed), so the
/// stream is infallible after construction.
pub struct HashIterator {
    seq: Vec<u8>,
    k: usize,
    canonical: bool,
    pos: usize,
    windows: usize,
    state: NtHash,
}

impl HashIterator {
    pub fn new(seq: &[u8], k: usize, canonical: bool, circular: bool) -> Result<Self> {
        if k == 0 {
            return Err(UnikError::KOverflow(k));
        }
        let buf = owned_buffer(seq, k, circular)?;
        let windows = buf.len() - k + 1;
        let state = NtHash::init(&buf[..k]);
        Ok(Self {
            seq: buf,
            k,
            canonical,
            pos: 0,
            windows,
            state,
        })
    }
}

impl Iterator for HashIterator {
    type Item = (u64, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.windows {
            return None;
        }
        if self.pos > 0 {
            let out = self.seq[self.pos - 1];
            let inb = self.seq[self.pos + self.k - 1];
            self.state.roll(out, inb);
        }
        let hash = if self.canonical {
            self.state.canonical()
        } else {
            self.state.forward()
        };
        let idx = self.pos;
        self.pos += 1;
        Some((hash, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::{canonical, encode};

    fn collect(iter: KmerIterator) -> Vec<(u64, usize)> {
        iter.map(|item| item.unwrap()).collect()
    }

    #[test]
    fn test_linear_forward_windows() {
        let seq = b"ACGTTC";
        let iter = KmerIterator::new(seq, 4, true, false).unwrap();
        let got = collect(iter);
        assert_eq!(got.len(), 3);
        for (i, &(code, idx)) in got.iter().enumerate() {
            assert_eq!(idx, i);
            assert_eq!(code, canonical(encode(&seq[i..i + 4]).unwrap(), 4));
        }
    }

    #[test]
    fn test_both_strands_when_not_canonical() {
        let seq = b"ACGTT";
        let iter = KmerIterator::new(seq, 4, false, false).unwrap();
        let got = collect(iter);
        // 2 forward windows then 2 reverse-complement windows
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], (encode(b"ACGT").unwrap(), 0));
        assert_eq!(got[1], (encode(b"CGTT").unwrap(), 1));
        // revcomp of ACGTT is AACGT
        assert_eq!(got[2], (encode(b"AACG").unwrap(), 0));
        assert_eq!(got[3], (encode(b"ACGT").unwrap(), 1));
    }

    #[test]
    fn test_circular_windows() {
        let seq = b"ACGTA";
        let iter = KmerIterator::new(seq, 4, true, false).unwrap();
        assert_eq!(collect(iter).len(), 2);

        let iter = KmerIterator::new(seq, 4, true, true).unwrap();
        let got = collect(iter);
        assert_eq!(got.len(), 5);
        let expected = [&b"ACGT"[..], b"CGTA", b"GTAA", b"TAAC", b"AACG"];
        for (i, &(code, idx)) in got.iter().enumerate() {
            assert_eq!(idx, i);
            assert_eq!(code, canonical(encode(expected[i]).unwrap(), 4));
        }
    }

    #[test]
    fn test_illegal_base_aborts() {
        let mut iter = KmerIterator::new(b"ACG.TACG", 3, false, false).unwrap();
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap();
        assert!(matches!(
            err,
            Err(UnikError::IllegalBase { base: b'.', pos: 3 })
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_construction_failures() {
        assert!(matches!(
            KmerIterator::new(b"ACGT", 0, false, false),
            Err(UnikError::KOverflow(0))
        ));
        assert!(matches!(
            KmerIterator::new(b"ACG", 4, false, false),
            Err(UnikError::SeqTooShort { len: 3, k: 4 })
        ));
    }

    #[test]
    fn test_hash_iterator_matches_scratch() {
        let seq = b"ACGTCGTCAGTCGATGCAGT";
        let k = 5;
        let got: Vec<_> = HashIterator::new(seq, k, false, false).unwrap().collect();
        assert_eq!(got.len(), seq.len() - k + 1);
        for &(hash, idx) in &got {
            assert_eq!(hash, NtHash::init(&seq[idx..idx + k]).forward());
        }
    }

    #[test]
    fn test_hash_iterator_canonical_strand_neutral() {
        let fwd: Vec<u64> = HashIterator::new(b"ACGGTTAC", 4, true, false)
            .unwrap()
            .map(|(h, _)| h)
            .collect();
        let mut rev: Vec<u64> = HashIterator::new(b"GTAACCGT", 4, true, false)
            .unwrap()
            .map(|(h, _)| h)
            .collect();
        rev.reverse();
        assert_eq!(fwd, rev);
    }
}
