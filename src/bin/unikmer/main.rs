use clap::{Parser, Subcommand};
use std::time::Instant;
use unikmer::Operation;

mod cli;
mod count;
mod fasta;
mod setop;
mod sort;
mod stats;
mod view;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Toolkit for k-mer manipulation with taxonomic information",
    long_about = None
)]
struct Args {
    #[clap(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count k-mers from FASTA sequences into a sorted .unik file
    Count(count::Args),
    /// Decode a .unik file to text
    View(view::Args),
    /// Summarize the headers of .unik files
    Stats(stats::Args),
    /// Sort and deduplicate .unik files
    Sort(sort::Args),
    /// Union of sorted .unik files
    Union(setop::SetArgs),
    /// Intersection of sorted .unik files
    Inter(setop::SetArgs),
    /// K-mers of the first file absent from all other files
    Diff(setop::SetArgs),
    /// K-mers shared by at least a number of files
    Common(setop::CommonArgs),
    /// K-mers present in at least two files
    Dup(setop::SetArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let start = Instant::now();

    match args.cmd {
        Commands::Count(cmd_args) => count::run(cmd_args)?,
        Commands::View(cmd_args) => view::run(cmd_args)?,
        Commands::Stats(cmd_args) => stats::run(cmd_args)?,
        Commands::Sort(cmd_args) => sort::run(cmd_args)?,
        Commands::Union(cmd_args) => setop::run(cmd_args, Operation::Union)?,
        Commands::Inter(cmd_args) => setop::run(cmd_args, Operation::Intersection)?,
        Commands::Diff(cmd_args) => setop::run(cmd_args, Operation::Difference)?,
        Commands::Common(cmd_args) => setop::run_common(cmd_args)?,
        Commands::Dup(cmd_args) => setop::run(cmd_args, Operation::Duplicates)?,
    }

    eprintln!("elapsed time: {:?}", start.elapsed());
    Ok(())
}
