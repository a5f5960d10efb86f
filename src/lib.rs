mod errors;
mod varint;

pub mod header;
pub mod iterator;
pub mod kmer;
pub mod merge;
pub mod nthash;
pub mod reader;
pub mod sorter;
pub mod taxonomy;
pub mod utils;
pub mod writer;

pub use errors::{Result, UnikError};
pub use header::{
    Header, FLAG_CANONICAL, FLAG_COMPACT, FLAG_HASHED, FLAG_INCLUDE_TAXID, FLAG_SCALED,
    FLAG_SORTED,
};
pub use iterator::{HashIterator, KmerIterator};
pub use kmer::Kmer;
pub use merge::{MergeOptions, Merger, Operation, Threshold, MAX_INPUT_FILES};
pub use reader::Reader;
pub use sorter::{ExternalSorter, SortOutput};
pub use taxonomy::Taxonomy;
pub use varint::{get_pair, put_pair};
pub use writer::Writer;
