use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use unikmer::utils::dyn_reader;

/// Minimal FASTA record reader; plain or gzip input.
pub struct FastaReader {
    r: BufReader<Box<dyn Read + Send>>,
    line: String,
    in_record: bool,
}

impl FastaReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            r: BufReader::new(dyn_reader(path)?),
            line: String::new(),
            in_record: false,
        })
    }

    /// Returns the next record's sequence, newlines stripped and case
    /// preserved. Header lines are skipped; `None` at end of input.
    pub fn next_seq(&mut self) -> io::Result<Option<Vec<u8>>> {
        // skip until the first header
        while !self.in_record {
            self.line.clear();
            if self.r.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            if self.line.starts_with('>') {
                self.in_record = true;
            }
        }

        let mut seq = Vec::new();
        loop {
            self.line.clear();
            if self.r.read_line(&mut self.line)? == 0 {
                self.in_record = false;
                break;
            }
            if self.line.starts_with('>') {
                // leave in_record set: the next call starts here
                break;
            }
            seq.extend(
                self.line
                    .as_bytes()
                    .iter()
                    .filter(|&&b| b != b'\n' && b != b'\r'),
            );
        }
        Ok(Some(seq))
    }
}
