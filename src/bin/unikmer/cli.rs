use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

use unikmer::utils::{dyn_reader, find_unik_files, get_file_limit, set_fd_limit};
use unikmer::{Reader, Result, Taxonomy};

#[derive(Parser, Debug, Clone)]
pub struct TaxonomyArgs {
    /// Taxonomy nodes file, NCBI nodes.dmp or any tab-separated
    /// child/parent table
    #[arg(long)]
    pub taxdump: Option<PathBuf>,

    /// 1-based column holding the child taxid
    #[arg(long, default_value_t = 1)]
    pub child_col: usize,

    /// 1-based column holding the parent taxid
    #[arg(long, default_value_t = 3)]
    pub parent_col: usize,
}

impl TaxonomyArgs {
    pub fn load(&self) -> Result<Option<Taxonomy>> {
        match &self.taxdump {
            Some(path) => {
                let taxo =
                    Taxonomy::from_file(path, self.child_col, self.parent_col)?.with_cache();
                eprintln!("loaded {} taxonomy nodes from {:?}", taxo.node_count(), path);
                Ok(Some(taxo))
            }
            None => Ok(None),
        }
    }
}

/// Expands the given paths into .unik files and opens a reader for each,
/// raising the fd limit first when the input set is wide.
pub fn open_readers(paths: &[PathBuf]) -> Result<Vec<Reader<Box<dyn Read + Send>>>> {
    let files = find_unik_files(paths);
    let need = files.len() + 16;
    if need > get_file_limit() {
        set_fd_limit(need as u64)?;
    }
    let mut readers = Vec::with_capacity(files.len());
    for file in &files {
        readers.push(Reader::new(dyn_reader(file)?)?);
    }
    Ok(readers)
}
