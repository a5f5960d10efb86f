use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::errors::{Result, UnikError};

/// File magic, the first 8 bytes of every .unik file.
pub const MAGIC: &[u8; 8] = b".unikmer";

/// Main format version produced and accepted by this implementation.
pub const MAIN_VERSION: u8 = 5;
pub const MINOR_VERSION: u8 = 0;

/// Total serialized header size.
pub const HEADER_SIZE: usize = 192;

/// Maximum description length in bytes.
pub const MAX_DESCRIPTION: usize = 128;

// Flag bitmap. COMPACT and SORTED shape the body and are mutually
// exclusive; the others are orthogonal assertions.
pub const FLAG_COMPACT: u32 = 1;
pub const FLAG_CANONICAL: u32 = 2;
pub const FLAG_SORTED: u32 = 4;
pub const FLAG_INCLUDE_TAXID: u32 = 8;
pub const FLAG_HASHED: u32 = 16;
pub const FLAG_SCALED: u32 = 32;

const KNOWN_FLAGS: u32 = FLAG_COMPACT
    | FLAG_CANONICAL
    | FLAG_SORTED
    | FLAG_INCLUDE_TAXID
    | FLAG_HASHED
    | FLAG_SCALED;

/// The 192-byte .unik header. All integers are big-endian on disk.
#[derive(Debug, Clone)]
pub struct Header {
    pub minor_version: u8,
    pub k: u8,
    pub flags: u32,
    /// Nominal number of codes in the body, -1 when unknown.
    pub count: i64,
    /// Taxid applying to every code, 0 when absent.
    pub global_taxid: u32,
    /// Byte width of each per-code taxid, in 1..=4.
    pub taxid_width: u8,
    pub description: Vec<u8>,
}

impl Header {
    pub fn new(k: u8, flags: u32) -> Self {
        Self {
            minor_version: MINOR_VERSION,
            k,
            flags,
            count: -1,
            global_taxid: 0,
            taxid_width: 4,
            description: Vec::new(),
        }
    }

    #[inline]
    pub fn is_compact(&self) -> bool {
        self.flags & FLAG_COMPACT > 0
    }

    #[inline]
    pub fn is_canonical(&self) -> bool {
        self.flags & FLAG_CANONICAL > 0
    }

    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.flags & FLAG_SORTED > 0
    }

    #[inline]
    pub fn is_hashed(&self) -> bool {
        self.flags & FLAG_HASHED > 0
    }

    #[inline]
    pub fn is_scaled(&self) -> bool {
        self.flags & FLAG_SCALED > 0
    }

    #[inline]
    pub fn include_taxid(&self) -> bool {
        self.flags & FLAG_INCLUDE_TAXID > 0
    }

    pub fn set_description(&mut self, desc: &[u8]) -> Result<()> {
        if desc.len() > MAX_DESCRIPTION {
            return Err(UnikError::DescriptionTooLong(desc.len()));
        }
        self.description = desc.to_vec();
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_u8(MAIN_VERSION)?;
        w.write_u8(self.minor_version)?;
        w.write_u8(self.k)?;
        w.write_u8(0)?;
        w.write_u32::<BigEndian>(self.flags)?;
        w.write_i64::<BigEndian>(self.count)?;
        w.write_u32::<BigEndian>(self.global_taxid)?;
        w.write_u8(self.taxid_width)?;
        w.write_u8(self.description.len() as u8)?;
        let mut desc = [0u8; MAX_DESCRIPTION];
        desc[..self.description.len()].copy_from_slice(&self.description);
        w.write_all(&desc)?;
        w.write_all(&[0u8; HEADER_SIZE - 158])?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| UnikError::InvalidFormat("file too short for a header".into()))?;
        if &magic != MAGIC {
            return Err(UnikError::InvalidFormat("magic bytes mismatch".into()));
        }
        let main_version = r.read_u8()?;
        if main_version != MAIN_VERSION {
            return Err(UnikError::VersionMismatch {
                found: main_version,
                expected: MAIN_VERSION,
            });
        }
        let minor_version = r.read_u8()?;
        let k = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let flags = r.read_u32::<BigEndian>()?;
        if flags & !KNOWN_FLAGS > 0 {
            return Err(UnikError::InvalidFormat(format!(
                "unknown flag bits: {:#x}",
                flags & !KNOWN_FLAGS
            )));
        }
        let count = r.read_i64::<BigEndian>()?;
        let global_taxid = r.read_u32::<BigEndian>()?;
        let taxid_width = r.read_u8()?;
        if !(1..=4).contains(&taxid_width) {
            return Err(UnikError::InvalidFormat(format!(
                "taxid width {} out of range",
                taxid_width
            )));
        }
        let desc_len = r.read_u8()? as usize;
        if desc_len > MAX_DESCRIPTION {
            return Err(UnikError::InvalidFormat(format!(
                "description length {} out of range",
                desc_len
            )));
        }
        let mut desc = [0u8; MAX_DESCRIPTION];
        r.read_exact(&mut desc)?;
        let mut reserved = [0u8; HEADER_SIZE - 158];
        r.read_exact(&mut reserved)?;

        let header = Self {
            minor_version,
            k,
            flags,
            count,
            global_taxid,
            taxid_width,
            description: desc[..desc_len].to_vec(),
        };
        let max_k = if header.is_hashed() { 64 } else { 32 };
        if k == 0 || k as usize > max_k {
            return Err(UnikError::InvalidFormat(format!("k {} out of range", k)));
        }
        if header.is_compact() && header.is_sorted() {
            return Err(UnikError::InvalidFormat(
                "compact and sorted flags are exclusive".into(),
            ));
        }
        Ok(header)
    }
}
