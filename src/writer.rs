use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

use crate::errors::{Result, UnikError};
use crate::header::{Header, FLAG_COMPACT, FLAG_HASHED, FLAG_SORTED};
use crate::kmer::Kmer;
use crate::varint::{self, CTRL_TERMINAL, MAX_PAIR_BYTES};

/// Streaming .unik writer.
///
/// The header is emitted lazily on the first payload write, so the
/// header-only mutators (`set_count`, `set_global_taxid`, `set_max_taxid`,
/// `set_description`) stay usable until then and fail with `CallLate`
/// afterward.
///
/// In sorted mode the caller must feed codes in non-decreasing order;
/// this is a documented contract, not a checked one. `flush` must be
/// called before dropping the writer, otherwise a trailing code may be
/// lost and the file is left detectably incomplete.
pub struct Writer<W: Write> {
    w: W,
    header: Header,
    compact_bytes: usize,
    header_written: bool,
    finished: bool,
    // sorted-mode state: codes are emitted as delta pairs against the
    // running offset, with at most one pending code buffered
    offset: u64,
    pending: Option<(u64, u32)>,
    written: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(w: W, k: usize, flags: u32) -> Result<Self> {
        let max_k = if flags & FLAG_HASHED > 0 { 64 } else { 32 };
        if k == 0 || k > max_k {
            return Err(UnikError::KOverflow(k));
        }
        if flags & FLAG_COMPACT > 0 && flags & FLAG_SORTED > 0 {
            return Err(UnikError::InvalidFormat(
                "compact and sorted flags are exclusive".into(),
            ));
        }
        Ok(Self {
            w,
            header: Header::new(k as u8, flags),
            compact_bytes: (2 * k + 7) / 8,
            header_written: false,
            finished: false,
            offset: 0,
            pending: None,
            written: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of codes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn check_early(&self) -> Result<()> {
        if self.header_written {
            return Err(UnikError::CallLate);
        }
        Ok(())
    }

    /// Declares the nominal code count stored in the header.
    pub fn set_count(&mut self, count: i64) -> Result<()> {
        self.check_early()?;
        self.header.count = count;
        Ok(())
    }

    /// Declares a taxid that applies to every code in the file.
    pub fn set_global_taxid(&mut self, taxid: u32) -> Result<()> {
        self.check_early()?;
        if taxid == 0 {
            return Err(UnikError::InvalidTaxid);
        }
        self.header.global_taxid = taxid;
        Ok(())
    }

    /// Declares the largest per-code taxid; the writer picks the
    /// smallest byte width that fits it (the default is 4).
    pub fn set_max_taxid(&mut self, taxid: u32) -> Result<()> {
        self.check_early()?;
        if taxid == 0 {
            return Err(UnikError::InvalidTaxid);
        }
        let mut width = 1u8;
        while width < 4 && u64::from(taxid) >= 1u64 << (8 * width) {
            width += 1;
        }
        self.header.taxid_width = width;
        Ok(())
    }

    pub fn set_description(&mut self, desc: &[u8]) -> Result<()> {
        self.check_early()?;
        self.header.set_description(desc)
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.header.write_to(&mut self.w)?;
            self.header_written = true;
        }
        Ok(())
    }

    fn write_taxid_at_width(&mut self, taxid: u32) -> Result<()> {
        let width = self.header.taxid_width as usize;
        if width < 4 && u64::from(taxid) >= 1u64 << (8 * width) {
            return Err(UnikError::WrongWriteDataSize);
        }
        for i in 0..width {
            self.w.write_u8((taxid >> ((width - 1 - i) << 3)) as u8)?;
        }
        Ok(())
    }

    /// Writes one code. Fails with `WrongWriteDataSize` when the file
    /// carries per-code taxids, which must come through
    /// [`Writer::write_code_with_taxid`].
    pub fn write_code(&mut self, code: u64) -> Result<()> {
        if self.header.include_taxid() {
            return Err(UnikError::WrongWriteDataSize);
        }
        self.write_pair(code, 0)
    }

    /// Writes one code with its taxid. The taxid is silently ignored
    /// when the include-taxid flag is off.
    pub fn write_code_with_taxid(&mut self, code: u64, taxid: u32) -> Result<()> {
        self.write_pair(code, taxid)
    }

    pub fn write_kmer(&mut self, kmer: &Kmer) -> Result<()> {
        if kmer.k != self.header.k {
            return Err(UnikError::KMismatch {
                expected: self.header.k,
                found: kmer.k,
            });
        }
        self.write_code(kmer.code)
    }

    pub fn write_kmer_with_taxid(&mut self, kmer: &Kmer, taxid: u32) -> Result<()> {
        if kmer.k != self.header.k {
            return Err(UnikError::KMismatch {
                expected: self.header.k,
                found: kmer.k,
            });
        }
        self.write_code_with_taxid(kmer.code, taxid)
    }

    fn write_pair(&mut self, code: u64, taxid: u32) -> Result<()> {
        if self.finished {
            return Err(UnikError::CallOrder);
        }
        self.write_header()?;
        self.written += 1;

        if self.header.is_sorted() {
            match self.pending.take() {
                None => self.pending = Some((code, taxid)),
                Some((prev, prev_taxid)) => {
                    let mut buf = [0u8; MAX_PAIR_BYTES];
                    let (ctrl, n) = varint::put_pair(
                        &mut buf,
                        prev.wrapping_sub(self.offset),
                        code.wrapping_sub(prev),
                    );
                    self.w.write_u8(ctrl)?;
                    self.w.write_all(&buf[..n])?;
                    if self.header.include_taxid() {
                        self.write_taxid_at_width(prev_taxid)?;
                        self.write_taxid_at_width(taxid)?;
                    }
                    self.offset = code;
                }
            }
            return Ok(());
        }

        if self.header.is_compact() {
            let be = code.to_be_bytes();
            self.w.write_all(&be[8 - self.compact_bytes..])?;
        } else {
            self.w.write_u64::<BigEndian>(code)?;
        }
        if self.header.include_taxid() {
            self.write_taxid_at_width(taxid)?;
        }
        Ok(())
    }

    /// Drains the pending sorted code as a terminal record and flushes
    /// the underlying stream. Idempotent.
    pub fn flush(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.write_header()?;
        if let Some((code, taxid)) = self.pending.take() {
            self.w.write_u8(CTRL_TERMINAL)?;
            self.w.write_u64::<BigEndian>(code)?;
            if self.header.include_taxid() {
                self.w.write_u32::<BigEndian>(taxid)?;
            }
        }
        self.w.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Consumes the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.w
    }
}
