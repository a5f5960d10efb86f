use std::io;
use thiserror::Error;

/// Errors produced by the codec, the .unik container and the set engine.
#[derive(Debug, Error)]
pub enum UnikError {
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: file has main version {found}, supported is {expected}")]
    VersionMismatch { found: u8, expected: u8 },

    #[error("truncated file body")]
    Truncated,

    #[error("illegal DNA base {base:?} at position {pos}")]
    IllegalBase { base: u8, pos: usize },

    #[error("k ({0}) out of range, must be in 1..=32")]
    KOverflow(usize),

    #[error("sequence too short: {len} bases for k={k}")]
    SeqTooShort { len: usize, k: usize },

    #[error("k mismatch: expected {expected}, found {found}")]
    KMismatch { expected: u8, found: u8 },

    #[error("k-mers are not consecutive")]
    NotConsecutive,

    #[error("taxid must be read or written right after its code")]
    CallOrder,

    #[error("header fields can not be modified after the first write")]
    CallLate,

    #[error("taxid operations need the include-taxid flag")]
    CallReadWriteTaxid,

    #[error("a taxid is required for every code when the include-taxid flag is on")]
    WrongWriteDataSize,

    #[error("description too long: {0} bytes, at most 128 allowed")]
    DescriptionTooLong(usize),

    #[error("taxid 0 is reserved and not allowed here")]
    InvalidTaxid,

    #[error("illegal column index: {0}, column indices are 1-based")]
    IllegalColumnIndex(usize),

    #[error("input files disagree on {0}")]
    FlagMismatch(String),

    #[error("too many input files: {0}, at most 65535 supported")]
    TooManyFiles(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, UnikError>;
