use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;

use crate::errors::{Result, UnikError};
use crate::utils::open_file;

/// Default column layout of NCBI `nodes.dmp`: child taxid in column 1,
/// parent taxid in column 3 (1-based, tab-separated).
pub const DEFAULT_CHILD_COLUMN: usize = 1;
pub const DEFAULT_PARENT_COLUMN: usize = 3;

/// In-memory taxon tree: a child -> parent map with a self-loop at the
/// root. Immutable after construction and shared by the set engine.
pub struct Taxonomy {
    parents: HashMap<u32, u32>,
    root: u32,
    max_taxid: u32,
    cache: Option<Mutex<HashMap<u64, u32>>>,
}

impl Taxonomy {
    /// Loads a tab-separated child/parent file, `nodes.dmp` or
    /// equivalent. Column indices are 1-based.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        child_col: usize,
        parent_col: usize,
    ) -> Result<Self> {
        if child_col == 0 {
            return Err(UnikError::IllegalColumnIndex(child_col));
        }
        if parent_col == 0 {
            return Err(UnikError::IllegalColumnIndex(parent_col));
        }
        let reader = BufReader::new(open_file(path)?);
        let need = child_col.max(parent_col);

        let mut parents = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<_> = line.split('\t').collect();
            if fields.len() < need {
                continue;
            }
            let child = match fields[child_col - 1].trim().parse::<u32>() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let parent = match fields[parent_col - 1].trim().parse::<u32>() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if child == 0 || parent == 0 {
                return Err(UnikError::InvalidTaxid);
            }
            parents.insert(child, parent);
        }

        let root = parents
            .iter()
            .find(|(c, p)| c == p)
            .map(|(&c, _)| c)
            .ok_or_else(|| UnikError::InvalidFormat("taxonomy has no root node".into()))?;
        let max_taxid = parents.keys().copied().max().unwrap_or(0);

        Ok(Self {
            parents,
            root,
            max_taxid,
            cache: None,
        })
    }

    /// Enables LCA memoization, keyed on the unordered taxid pair.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn parent(&self, taxid: u32) -> Option<u32> {
        self.parents.get(&taxid).copied()
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn max_taxid(&self) -> u32 {
        self.max_taxid
    }

    pub fn node_count(&self) -> usize {
        self.parents.len()
    }

    pub fn contains(&self, taxid: u32) -> bool {
        self.parents.contains_key(&taxid)
    }

    /// Lowest common ancestor. Zero absorbs into the other argument;
    /// taxids unknown to the tree yield 0.
    pub fn lca(&self, a: u32, b: u32) -> u32 {
        if a == 0 || b == 0 || a == b {
            return if a != 0 { a } else { b };
        }

        let key = ((a.min(b) as u64) << 32) | a.max(b) as u64;
        if let Some(cache) = &self.cache {
            if let Some(&hit) = cache.lock().unwrap().get(&key) {
                return hit;
            }
        }

        let lca = self.walk_lca(a, b);
        if let Some(cache) = &self.cache {
            cache.lock().unwrap().insert(key, lca);
        }
        lca
    }

    fn walk_lca(&self, a: u32, b: u32) -> u32 {
        // record the ancestor chain of a up to the root self-loop
        let mut visited = HashSet::new();
        let mut cur = a;
        loop {
            visited.insert(cur);
            match self.parents.get(&cur) {
                Some(&p) => {
                    if p == b {
                        return b;
                    }
                    if p == cur {
                        break;
                    }
                    cur = p;
                }
                None => break,
            }
        }

        // first of b's ancestors that a also passed through
        let mut cur = b;
        loop {
            if visited.contains(&cur) {
                return cur;
            }
            match self.parents.get(&cur) {
                Some(&p) => {
                    if p == cur {
                        return 0;
                    }
                    cur = p;
                }
                None => return 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_taxonomy() -> Taxonomy {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (child, parent) in [
            (1u32, 1u32),
            (131567, 1),
            (2, 131567),
            (1224, 2),
            (1236, 1224),
            (91347, 1236),
            (543, 91347),
            (561, 543),
            (562, 561),
            (585057, 562),
            (511145, 562),
            (9606, 131567),
        ] {
            writeln!(file, "{}\t|\t{}\t|\tno rank\t|", child, parent).unwrap();
        }
        Taxonomy::from_file(file.path(), DEFAULT_CHILD_COLUMN, DEFAULT_PARENT_COLUMN).unwrap()
    }

    #[test]
    fn test_load_and_structure() {
        let taxo = sample_taxonomy();
        assert_eq!(taxo.root(), 1);
        assert_eq!(taxo.max_taxid(), 585057);
        assert_eq!(taxo.parent(562), Some(561));
        assert_eq!(taxo.parent(7), None);
        assert_eq!(taxo.node_count(), 12);
    }

    #[test]
    fn test_lca_basics() {
        let taxo = sample_taxonomy();
        assert_eq!(taxo.lca(585057, 511145), 562);
        assert_eq!(taxo.lca(511145, 585057), 562);
        assert_eq!(taxo.lca(562, 562), 562);
        assert_eq!(taxo.lca(0, 562), 562);
        assert_eq!(taxo.lca(562, 0), 562);
        assert_eq!(taxo.lca(9606, 562), 131567);
    }

    #[test]
    fn test_lca_ancestor_shortcut() {
        let taxo = sample_taxonomy();
        // ancestor on either side wins
        assert_eq!(taxo.lca(561, 585057), 561);
        assert_eq!(taxo.lca(585057, 561), 561);
        assert_eq!(taxo.lca(1, 511145), 1);
    }

    #[test]
    fn test_lca_unknown_taxid() {
        let taxo = sample_taxonomy();
        assert_eq!(taxo.lca(99999, 562), 0);
    }

    #[test]
    fn test_lca_cached() {
        let taxo = sample_taxonomy().with_cache();
        assert_eq!(taxo.lca(585057, 511145), 562);
        assert_eq!(taxo.lca(511145, 585057), 562);
    }

    #[test]
    fn test_column_validation() {
        assert!(matches!(
            Taxonomy::from_file("nodes.dmp", 0, 3),
            Err(UnikError::IllegalColumnIndex(0))
        ));
    }
}
