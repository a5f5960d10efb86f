use clap::Parser;
use std::fs;
use std::path::PathBuf;

use crate::cli::{self, TaxonomyArgs};
use unikmer::utils::{dyn_writer, parse_size};
use unikmer::{
    ExternalSorter, Result, SortOutput, UnikError, Writer, FLAG_CANONICAL, FLAG_HASHED,
    FLAG_INCLUDE_TAXID, FLAG_SCALED, FLAG_SORTED,
};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Sort and deduplicate .unik files, folding taxids with the LCA")]
pub struct Args {
    /// Input .unik files or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output .unik file
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// In-memory buffer size before spilling a sorted chunk to disk
    #[arg(short = 'm', long, value_parser = parse_size, default_value = "128M")]
    pub chunk_size: usize,

    /// Keep only k-mers that occurred at least twice
    #[arg(short = 'd', long)]
    pub repeated: bool,

    /// Directory for temporary chunk files
    #[arg(long)]
    pub chunk_dir: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Write the output without gzip compression
    #[arg(long)]
    pub plain: bool,

    #[clap(flatten)]
    pub taxonomy: TaxonomyArgs,
}

pub fn run(args: Args) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .ok();

    let mut readers = cli::open_readers(&args.inputs)?;
    if readers.is_empty() {
        return Err(UnikError::InvalidFormat("no input files".into()));
    }

    let first = readers[0].header().clone();
    let mut any_per_taxid = false;
    let mut globals_agree = true;
    for reader in &readers {
        let h = reader.header();
        if h.k != first.k {
            return Err(UnikError::KMismatch {
                expected: first.k,
                found: h.k,
            });
        }
        if h.is_canonical() != first.is_canonical() {
            return Err(UnikError::FlagMismatch("the canonical flag".into()));
        }
        if h.is_hashed() != first.is_hashed() {
            return Err(UnikError::FlagMismatch("the hashed flag".into()));
        }
        if h.is_scaled() != first.is_scaled() {
            return Err(UnikError::FlagMismatch("the scaled flag".into()));
        }
        any_per_taxid |= h.include_taxid();
        globals_agree &= h.global_taxid == first.global_taxid;
    }

    let include_taxid = any_per_taxid || !globals_agree;
    let mut flags = FLAG_SORTED;
    if first.is_canonical() {
        flags |= FLAG_CANONICAL;
    }
    if first.is_hashed() {
        flags |= FLAG_HASHED;
    }
    if first.is_scaled() {
        flags |= FLAG_SCALED;
    }
    if include_taxid {
        flags |= FLAG_INCLUDE_TAXID;
    }

    let taxonomy = args.taxonomy.load()?;
    let chunk_dir = args
        .chunk_dir
        .clone()
        .unwrap_or_else(|| args.output.with_extension("chunks"));
    // 16 bytes per buffered pair
    let max_chunk = (args.chunk_size / 16).max(1024);

    let mut sorter = ExternalSorter::new(
        &chunk_dir,
        first.k as usize,
        flags,
        max_chunk,
        taxonomy.as_ref(),
    )?;
    for reader in readers.iter_mut() {
        while let Some((code, taxid)) = reader.read_code_with_taxid()? {
            sorter.push(code, taxid)?;
        }
    }
    eprintln!("sorting {} k-mers", sorter.total());

    let mut writer = Writer::new(dyn_writer(&args.output, args.plain)?, first.k as usize, flags)?;
    if include_taxid {
        if let Some(taxo) = &taxonomy {
            writer.set_max_taxid(taxo.max_taxid())?;
        }
    } else if first.global_taxid > 0 {
        writer.set_global_taxid(first.global_taxid)?;
    }
    let keep = if args.repeated {
        SortOutput::Repeated
    } else {
        SortOutput::All
    };
    let emitted = sorter.finish(&mut writer, keep)?;
    fs::remove_dir(&chunk_dir).ok();

    eprintln!("{} k-mers saved to {:?}", emitted, args.output);
    Ok(())
}
