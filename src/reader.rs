use byteorder::{BigEndian, ByteOrder};
use std::io::Read;

use crate::errors::{Result, UnikError};
use crate::header::Header;
use crate::kmer::Kmer;
use crate::varint;

/// Streaming .unik reader.
///
/// Codes come out of [`Reader::read_code`] one at a time; when the file
/// carries per-code taxids, each code's taxid is available through
/// [`Reader::read_taxid`] until the next code is read.
pub struct Reader<R: Read> {
    r: R,
    header: Header,
    compact_bytes: usize,
    read_count: u64,
    // taxid attached to the most recent code, consumed by read_taxid
    cur_taxid: Option<u32>,
    // sorted-mode state
    offset: u64,
    pending: Option<(u64, u32)>,
}

impl<R: Read> Reader<R> {
    pub fn new(mut r: R) -> Result<Self> {
        let header = Header::read_from(&mut r)?;
        let compact_bytes = (2 * header.k as usize + 7) / 8;
        Ok(Self {
            r,
            header,
            compact_bytes,
            read_count: 0,
            cur_taxid: None,
            offset: 0,
            pending: None,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn k(&self) -> usize {
        self.header.k as usize
    }

    /// Codes returned so far.
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Reads a single byte, distinguishing clean end-of-stream from a
    /// short read.
    fn read_u8_or_eof(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.r.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                // a decompressor cut off mid-stream reports UnexpectedEof
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(UnikError::Truncated)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fills `buf` completely, or reports a clean EOF when no byte was
    /// available. A partial fill is a truncated body.
    fn fill_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut n = 0;
        while n < buf.len() {
            match self.r.read(&mut buf[n..]) {
                Ok(0) => {
                    if n == 0 {
                        return Ok(false);
                    }
                    return Err(UnikError::Truncated);
                }
                Ok(m) => n += m,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(UnikError::Truncated)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        if !self.fill_or_eof(buf)? {
            return Err(UnikError::Truncated);
        }
        Ok(())
    }

    fn read_taxid_at_width(&mut self) -> Result<u32> {
        let width = self.header.taxid_width as usize;
        let mut buf = [0u8; 4];
        self.fill(&mut buf[..width])?;
        let mut t = 0u32;
        for &b in &buf[..width] {
            t = (t << 8) | b as u32;
        }
        Ok(t)
    }

    /// Clean end-of-stream: an error if the nominal count says there
    /// should have been more.
    fn eof(&self) -> Result<Option<u64>> {
        if self.header.count >= 0 && self.read_count < self.header.count as u64 {
            return Err(UnikError::Truncated);
        }
        Ok(None)
    }

    fn emit(&mut self, code: u64, taxid: Option<u32>) -> Option<u64> {
        self.read_count += 1;
        self.cur_taxid = taxid;
        Some(code)
    }

    /// Returns the next code, or `None` at the end of the stream.
    pub fn read_code(&mut self) -> Result<Option<u64>> {
        if self.header.is_sorted() {
            return self.read_code_sorted();
        }

        let mut buf = [0u8; 8];
        let n = if self.header.is_compact() {
            self.compact_bytes
        } else {
            8
        };
        if !self.fill_or_eof(&mut buf[8 - n..])? {
            return self.eof();
        }
        let code = BigEndian::read_u64(&buf);
        let taxid = if self.header.include_taxid() {
            Some(self.read_taxid_at_width()?)
        } else {
            None
        };
        Ok(self.emit(code, taxid))
    }

    fn read_code_sorted(&mut self) -> Result<Option<u64>> {
        if let Some((code, taxid)) = self.pending.take() {
            return Ok(self.emit(code, Some(taxid)));
        }

        let ctrl = match self.read_u8_or_eof()? {
            Some(ctrl) => ctrl,
            None => return self.eof(),
        };

        if varint::is_terminal(ctrl) {
            let mut buf = [0u8; 8];
            self.fill(&mut buf)?;
            let code = BigEndian::read_u64(&buf);
            let taxid = if self.header.include_taxid() {
                let mut tbuf = [0u8; 4];
                self.fill(&mut tbuf)?;
                Some(BigEndian::read_u32(&tbuf))
            } else {
                None
            };
            return Ok(self.emit(code, taxid));
        }

        let mut buf = [0u8; varint::MAX_PAIR_BYTES];
        let n1 = ((ctrl >> 4) & 0x07) as usize + 1;
        let n2 = (ctrl & 0x07) as usize + 1;
        self.fill(&mut buf[..n1 + n2])?;
        let (d1, d2, _) = varint::get_pair(ctrl, &buf)?;

        let (t1, t2) = if self.header.include_taxid() {
            (self.read_taxid_at_width()?, self.read_taxid_at_width()?)
        } else {
            (0, 0)
        };

        let code1 = self.offset.wrapping_add(d1);
        let code2 = code1.wrapping_add(d2);
        self.offset = code2;
        self.pending = Some((code2, t2));
        let taxid = self.header.include_taxid().then_some(t1);
        Ok(self.emit(code1, taxid))
    }

    /// The taxid of the last code read. Legal only when the
    /// include-taxid flag is set, and only once per code.
    pub fn read_taxid(&mut self) -> Result<u32> {
        if !self.header.include_taxid() {
            return Err(UnikError::CallReadWriteTaxid);
        }
        self.cur_taxid.take().ok_or(UnikError::CallOrder)
    }

    /// Returns the next `(code, taxid)` pair; without per-code taxids
    /// the file's global taxid is reported.
    pub fn read_code_with_taxid(&mut self) -> Result<Option<(u64, u32)>> {
        let code = match self.read_code()? {
            Some(code) => code,
            None => return Ok(None),
        };
        let taxid = if self.header.include_taxid() {
            self.read_taxid()?
        } else {
            self.header.global_taxid
        };
        Ok(Some((code, taxid)))
    }

    /// Returns the next code as a typed k-mer.
    pub fn read_kmer(&mut self) -> Result<Option<Kmer>> {
        Ok(self.read_code()?.map(|code| Kmer {
            code,
            k: self.header.k,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FLAG_COMPACT, FLAG_INCLUDE_TAXID, FLAG_SORTED};
    use crate::writer::Writer;

    fn roundtrip(flags: u32, k: usize, pairs: &[(u64, u32)]) -> Vec<(u64, u32)> {
        let mut w = Writer::new(Vec::new(), k, flags).unwrap();
        for &(code, taxid) in pairs {
            w.write_code_with_taxid(code, taxid).unwrap();
        }
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(buf.as_slice()).unwrap();
        let mut got = Vec::new();
        while let Some(pair) = r.read_code_with_taxid().unwrap() {
            got.push(pair);
        }
        got
    }

    #[test]
    fn test_plain_roundtrip() {
        let pairs: Vec<(u64, u32)> = (0..100u64).map(|i| (i * 37, 0)).collect();
        assert_eq!(roundtrip(0, 21, &pairs), pairs);
    }

    #[test]
    fn test_compact_roundtrip() {
        // S1: k=5 compact, AAAAA AAAAC AAAAT CGTAC
        let pairs = vec![(0u64, 0u32), (1, 0), (3, 0), (396, 0)];
        assert_eq!(roundtrip(FLAG_COMPACT, 5, &pairs), pairs);
    }

    #[test]
    fn test_sorted_roundtrip_even_and_odd() {
        for n in [10000u64, 10001] {
            let pairs: Vec<(u64, u32)> = (0..n).map(|i| (i * i + i, 0)).collect();
            assert_eq!(roundtrip(FLAG_SORTED, 23, &pairs), pairs);
        }
    }

    #[test]
    fn test_sorted_taxid_roundtrip() {
        let pairs: Vec<(u64, u32)> = (0..101u64).map(|i| (i * 1000, 500 + i as u32)).collect();
        let mut w = Writer::new(Vec::new(), 23, FLAG_SORTED | FLAG_INCLUDE_TAXID).unwrap();
        w.set_max_taxid(1000).unwrap();
        for &(code, taxid) in &pairs {
            w.write_code_with_taxid(code, taxid).unwrap();
        }
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(buf.as_slice()).unwrap();
        assert_eq!(r.header().taxid_width, 2);
        let mut got = Vec::new();
        while let Some(code) = r.read_code().unwrap() {
            got.push((code, r.read_taxid().unwrap()));
        }
        assert_eq!(got, pairs);
    }

    #[test]
    fn test_global_taxid_fallback() {
        let mut w = Writer::new(Vec::new(), 7, 0).unwrap();
        w.set_global_taxid(562).unwrap();
        w.write_code(42).unwrap();
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(buf.as_slice()).unwrap();
        assert_eq!(r.read_code_with_taxid().unwrap(), Some((42, 562)));
        assert_eq!(r.read_code_with_taxid().unwrap(), None);
    }

    #[test]
    fn test_taxid_call_order() {
        let mut w = Writer::new(Vec::new(), 7, FLAG_INCLUDE_TAXID).unwrap();
        w.write_code_with_taxid(10, 1).unwrap();
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(buf.as_slice()).unwrap();
        assert!(matches!(r.read_taxid(), Err(UnikError::CallOrder)));
        r.read_code().unwrap();
        assert_eq!(r.read_taxid().unwrap(), 1);
        assert!(matches!(r.read_taxid(), Err(UnikError::CallOrder)));
    }

    #[test]
    fn test_taxid_needs_flag() {
        let mut w = Writer::new(Vec::new(), 7, 0).unwrap();
        w.write_code(10).unwrap();
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(buf.as_slice()).unwrap();
        r.read_code().unwrap();
        assert!(matches!(
            r.read_taxid(),
            Err(UnikError::CallReadWriteTaxid)
        ));
    }

    #[test]
    fn test_truncated_body() {
        let mut w = Writer::new(Vec::new(), 21, 0).unwrap();
        w.set_count(3).unwrap();
        for code in [1u64, 2, 3] {
            w.write_code(code).unwrap();
        }
        w.flush().unwrap();
        let buf = w.into_inner();

        // cut inside the last code
        let mut r = Reader::new(&buf[..buf.len() - 3]).unwrap();
        assert_eq!(r.read_code().unwrap(), Some(1));
        assert_eq!(r.read_code().unwrap(), Some(2));
        assert!(matches!(r.read_code(), Err(UnikError::Truncated)));

        // cut at a record boundary with the count still unsatisfied
        let mut r = Reader::new(&buf[..buf.len() - 8]).unwrap();
        assert_eq!(r.read_code().unwrap(), Some(1));
        assert_eq!(r.read_code().unwrap(), Some(2));
        assert!(matches!(r.read_code(), Err(UnikError::Truncated)));
    }

    #[test]
    fn test_truncated_sorted_terminal() {
        let mut w = Writer::new(Vec::new(), 21, FLAG_SORTED).unwrap();
        for code in [5u64, 10, 20] {
            w.write_code(code).unwrap();
        }
        w.flush().unwrap();
        let buf = w.into_inner();

        let mut r = Reader::new(&buf[..buf.len() - 4]).unwrap();
        assert_eq!(r.read_code().unwrap(), Some(5));
        assert_eq!(r.read_code().unwrap(), Some(10));
        assert!(matches!(r.read_code(), Err(UnikError::Truncated)));
    }
}
