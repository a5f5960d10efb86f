use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use unikmer::kmer::decode;
use unikmer::utils::dyn_reader;
use unikmer::{Reader, Result};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Decode a .unik file to text, one k-mer per line")]
pub struct Args {
    /// Input .unik file
    pub input: PathBuf,

    /// Print the taxid column even when every taxid is 0
    #[arg(long)]
    pub show_taxid: bool,
}

pub fn run(args: Args) -> Result<()> {
    let mut reader = Reader::new(dyn_reader(&args.input)?)?;
    let k = reader.k();
    let hashed = reader.header().is_hashed();
    let with_taxid =
        args.show_taxid || reader.header().include_taxid() || reader.header().global_taxid > 0;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    while let Some((code, taxid)) = reader.read_code_with_taxid()? {
        if hashed {
            write!(out, "{}", code)?;
        } else {
            out.write_all(&decode(code, k))?;
        }
        if with_taxid {
            write!(out, "\t{}", taxid)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
