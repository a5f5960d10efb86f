use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use unikmer::utils::{dyn_reader, find_unik_files};
use unikmer::{Reader, Result};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Summarize the headers of .unik files")]
pub struct Args {
    /// Input .unik files or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FileStats {
    file: String,
    k: u8,
    mode: &'static str,
    canonical: bool,
    hashed: bool,
    scaled: bool,
    include_taxid: bool,
    global_taxid: u32,
    count: i64,
    description: String,
}

pub fn run(args: Args) -> Result<()> {
    let mut all = Vec::new();
    for file in find_unik_files(&args.inputs) {
        let reader = Reader::new(dyn_reader(&file)?)?;
        let h = reader.header();
        all.push(FileStats {
            file: file.display().to_string(),
            k: h.k,
            mode: if h.is_sorted() {
                "sorted"
            } else if h.is_compact() {
                "compact"
            } else {
                "plain"
            },
            canonical: h.is_canonical(),
            hashed: h.is_hashed(),
            scaled: h.is_scaled(),
            include_taxid: h.include_taxid(),
            global_taxid: h.global_taxid,
            count: h.count,
            description: String::from_utf8_lossy(&h.description).into_owned(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&all).unwrap());
        return Ok(());
    }

    println!(
        "{:<40} {:>3} {:>8} {:>6} {:>6} {:>7} {:>12} {:>10}",
        "file", "k", "mode", "canon", "taxid", "global", "count", "desc"
    );
    for s in &all {
        println!(
            "{:<40} {:>3} {:>8} {:>6} {:>6} {:>7} {:>12} {:>10}",
            s.file, s.k, s.mode, s.canonical, s.include_taxid, s.global_taxid, s.count,
            s.description
        );
    }
    Ok(())
}
