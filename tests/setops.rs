//! End-to-end set operations over .unik files on disk, with taxid
//! folding through a small taxonomy.

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use unikmer::utils::{dyn_reader, dyn_writer};
use unikmer::{
    ExternalSorter, MergeOptions, Merger, Operation, Reader, SortOutput, Taxonomy, Threshold,
    Writer, FLAG_INCLUDE_TAXID, FLAG_SORTED,
};

fn write_sorted(dir: &Path, name: &str, flags: u32, pairs: &[(u64, u32)]) -> PathBuf {
    let path = dir.join(name);
    let mut w = Writer::new(dyn_writer(&path, false).unwrap(), 21, FLAG_SORTED | flags).unwrap();
    w.set_count(pairs.len() as i64).unwrap();
    for &(code, taxid) in pairs {
        w.write_code_with_taxid(code, taxid).unwrap();
    }
    w.flush().unwrap();
    path
}

fn read_all(path: &Path) -> Vec<(u64, u32)> {
    let mut r = Reader::new(dyn_reader(path).unwrap()).unwrap();
    let mut got = Vec::new();
    while let Some(pair) = r.read_code_with_taxid().unwrap() {
        got.push(pair);
    }
    got
}

fn run_op(paths: &[PathBuf], op: Operation, taxonomy: Option<&Taxonomy>) -> Vec<(u64, u32)> {
    let readers: Vec<_> = paths
        .iter()
        .map(|p| Reader::new(dyn_reader(p).unwrap()).unwrap())
        .collect();
    let mut merger = Merger::new(readers, op, MergeOptions::default()).unwrap();
    let mut out = Writer::new(Vec::new(), merger.k() as usize, merger.output_flags()).unwrap();
    merger.run(taxonomy, &mut out).unwrap();

    let buf = out.into_inner();
    let mut r = Reader::new(buf.as_slice()).unwrap();
    let mut got = Vec::new();
    while let Some(pair) = r.read_code_with_taxid().unwrap() {
        got.push(pair);
    }
    got
}

fn ecoli_taxonomy(dir: &Path) -> Taxonomy {
    let path = dir.join("nodes.dmp");
    let mut file = std::fs::File::create(&path).unwrap();
    for (child, parent) in [
        (1u32, 1u32),
        (131567, 1),
        (2, 131567),
        (561, 2),
        (562, 561),
        (585057, 562),
        (511145, 562),
    ] {
        writeln!(file, "{}\t|\t{}\t|\tno rank\t|", child, parent).unwrap();
    }
    Taxonomy::from_file(&path, 1, 3).unwrap().with_cache()
}

#[test]
fn intersection_folds_taxids_to_lca() {
    let dir = tempfile::tempdir().unwrap();
    let taxo = ecoli_taxonomy(dir.path());
    let a = write_sorted(
        dir.path(),
        "a.unik",
        FLAG_INCLUDE_TAXID,
        &[(100, 585057), (200, 585057), (300, 585057)],
    );
    let b = write_sorted(
        dir.path(),
        "b.unik",
        FLAG_INCLUDE_TAXID,
        &[(200, 511145), (300, 511145), (400, 511145)],
    );

    let got = run_op(&[a, b], Operation::Intersection, Some(&taxo));
    assert_eq!(got, vec![(200, 562), (300, 562)]);
}

#[test]
fn common_across_three_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_sorted(dir.path(), "a.unik", 0, &[(1, 0), (2, 0), (3, 0)]);
    let b = write_sorted(dir.path(), "b.unik", 0, &[(2, 0), (3, 0), (4, 0)]);
    let c = write_sorted(dir.path(), "c.unik", 0, &[(3, 0), (4, 0), (5, 0)]);
    let inputs = [a, b, c];

    let got = run_op(&inputs, Operation::Common(Threshold::Count(2)), None);
    assert_eq!(got, vec![(2, 0), (3, 0), (4, 0)]);

    let got = run_op(&inputs, Operation::Common(Threshold::Count(3)), None);
    assert_eq!(got, vec![(3, 0)]);

    let got = run_op(&inputs, Operation::Union, None);
    assert_eq!(got, vec![(1, 0), (2, 0), (3, 0), (4, 0), (5, 0)]);
}

#[test]
fn union_and_intersection_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let pairs: Vec<(u64, u32)> = (0..2000u64).map(|i| (i * 13, 0)).collect();
    let a = write_sorted(dir.path(), "a.unik", 0, &pairs);

    for op in [Operation::Union, Operation::Intersection] {
        assert_eq!(run_op(&[a.clone(), a.clone()], op, None), read_all(&a));
    }
    assert!(run_op(&[a.clone(), a.clone()], Operation::Difference, None).is_empty());
}

#[test]
fn external_sort_spills_chunks_and_folds_taxids() {
    let dir = tempfile::tempdir().unwrap();
    let taxo = ecoli_taxonomy(dir.path());

    // overlapping unsorted inputs, one taxid per file
    let mut sorter = ExternalSorter::new(
        dir.path().join("chunks"),
        21,
        FLAG_SORTED | FLAG_INCLUDE_TAXID,
        100,
        Some(&taxo),
    )
    .unwrap();
    for &(lo, taxid) in &[(0u64, 585057u32), (250, 511145)] {
        for i in (lo..lo + 500).rev() {
            sorter.push(i, taxid).unwrap();
        }
    }

    let out_path = dir.path().join("sorted.unik");
    let mut out = Writer::new(
        dyn_writer(&out_path, false).unwrap(),
        21,
        FLAG_SORTED | FLAG_INCLUDE_TAXID,
    )
    .unwrap();
    let emitted = sorter.finish(&mut out, SortOutput::All).unwrap();
    drop(out);
    assert_eq!(emitted, 750);

    let got = read_all(&out_path);
    assert_eq!(got.len(), 750);
    for (i, &(code, taxid)) in got.iter().enumerate() {
        assert_eq!(code, i as u64);
        // the overlap of the two ranges folds to the common ancestor
        let expected = if code < 250 {
            585057
        } else if code < 500 {
            562
        } else {
            511145
        };
        assert_eq!(taxid, expected, "taxid at code {}", code);
    }
}
