use clap::Parser;
use std::path::PathBuf;

use crate::cli::{self, TaxonomyArgs};
use unikmer::utils::dyn_writer;
use unikmer::{
    MergeOptions, Merger, Operation, Result, Threshold, Writer, FLAG_INCLUDE_TAXID,
};

#[derive(Parser, Debug, Clone)]
pub struct SetArgs {
    /// Input sorted .unik files or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output .unik file
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Allow mixing inputs with and without taxids
    #[arg(long)]
    pub mix_taxid: bool,

    /// Description stored in the output header
    #[arg(short, long)]
    pub description: Option<String>,

    /// Write the output without gzip compression
    #[arg(long)]
    pub plain: bool,

    #[clap(flatten)]
    pub taxonomy: TaxonomyArgs,
}

fn proportion_in_range(s: &str) -> std::result::Result<f64, String> {
    let p: f64 = s.parse().map_err(|_| format!("not a number: {}", s))?;
    if p > 0.0 && p <= 1.0 {
        Ok(p)
    } else {
        Err(format!("proportion {} not in (0, 1]", p))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[clap(flatten)]
    pub set: SetArgs,

    /// Keep k-mers present in at least this many input files
    #[arg(short = 'n', long, conflicts_with = "proportion")]
    pub threshold: Option<usize>,

    /// Keep k-mers present in at least this fraction of the input files
    #[arg(short, long, value_parser = proportion_in_range)]
    pub proportion: Option<f64>,
}

pub fn run_common(args: CommonArgs) -> Result<()> {
    let op = match (args.threshold, args.proportion) {
        (Some(t), _) => Operation::Common(Threshold::Count(t)),
        (None, Some(p)) => Operation::Common(Threshold::Proportion(p)),
        (None, None) => Operation::Common(Threshold::Count(2)),
    };
    run(args.set, op)
}

pub fn run(args: SetArgs, op: Operation) -> Result<()> {
    let taxonomy = args.taxonomy.load()?;
    let readers = cli::open_readers(&args.inputs)?;
    eprintln!("merging {} files", readers.len());

    let mut merger = Merger::new(
        readers,
        op,
        MergeOptions {
            mix_taxid: args.mix_taxid,
        },
    )?;

    let flags = merger.output_flags();
    let mut writer = Writer::new(
        dyn_writer(&args.output, args.plain)?,
        merger.k() as usize,
        flags,
    )?;
    if let Some(desc) = &args.description {
        writer.set_description(desc.as_bytes())?;
    }
    if merger.output_global_taxid() > 0 {
        writer.set_global_taxid(merger.output_global_taxid())?;
    }
    if flags & FLAG_INCLUDE_TAXID > 0 {
        if let Some(taxo) = &taxonomy {
            writer.set_max_taxid(taxo.max_taxid())?;
        }
    }

    let emitted = merger.run(taxonomy.as_ref(), &mut writer)?;
    eprintln!("{} k-mers saved to {:?}", emitted, args.output);
    Ok(())
}
