use clap::Parser;
use dashmap::DashSet;
use rayon::prelude::*;
use std::path::PathBuf;

use crate::fasta::FastaReader;
use unikmer::utils::dyn_writer;
use unikmer::{
    HashIterator, KmerIterator, Result, Writer, FLAG_CANONICAL, FLAG_HASHED, FLAG_SORTED,
};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Count k-mers from FASTA sequences into a sorted .unik file")]
pub struct Args {
    /// Input FASTA files, gzip allowed
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output .unik file
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// K-mer length
    #[arg(short = 'k', default_value_t = 21)]
    pub k: usize,

    /// Keep the strand as given instead of canonicalizing
    #[arg(long)]
    pub non_canonical: bool,

    /// Treat every sequence as circular
    #[arg(long)]
    pub circular: bool,

    /// Store ntHash hashes instead of encoded k-mers
    #[arg(long)]
    pub hashed: bool,

    /// Taxid applying to every k-mer of the input
    #[arg(long)]
    pub taxid: Option<u32>,

    /// Description stored in the output header
    #[arg(short, long)]
    pub description: Option<String>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Write the output without gzip compression
    #[arg(long)]
    pub plain: bool,
}

pub fn run(args: Args) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .ok();

    let canonical = !args.non_canonical;
    let mut seqs = Vec::new();
    for input in &args.inputs {
        let mut reader = FastaReader::open(input)?;
        while let Some(seq) = reader.next_seq()? {
            if seq.len() >= args.k {
                seqs.push(seq);
            }
        }
    }
    eprintln!("scanning {} sequences", seqs.len());

    let set: DashSet<u64> = DashSet::new();
    seqs.par_iter().try_for_each(|seq| -> Result<()> {
        if args.hashed {
            for (hash, _) in HashIterator::new(seq, args.k, canonical, args.circular)? {
                set.insert(hash);
            }
        } else {
            for item in KmerIterator::new(seq, args.k, canonical, args.circular)? {
                let (code, _) = item?;
                set.insert(code);
            }
        }
        Ok(())
    })?;

    let mut codes: Vec<u64> = set.into_iter().collect();
    codes.par_sort_unstable();

    let mut flags = FLAG_SORTED;
    if canonical {
        flags |= FLAG_CANONICAL;
    }
    if args.hashed {
        flags |= FLAG_HASHED;
    }
    let mut writer = Writer::new(dyn_writer(&args.output, args.plain)?, args.k, flags)?;
    writer.set_count(codes.len() as i64)?;
    if let Some(taxid) = args.taxid {
        writer.set_global_taxid(taxid)?;
    }
    if let Some(desc) = &args.description {
        writer.set_description(desc.as_bytes())?;
    }
    for code in &codes {
        writer.write_code(*code)?;
    }
    writer.flush()?;

    eprintln!("{} distinct k-mers saved to {:?}", codes.len(), args.output);
    Ok(())
}
