//! Merge phase: fragment files → one posting file per bucket → the
//! global dictionary.
//!
//! Buckets are independent of each other; within one bucket the
//! pairwise reduction is strictly sequential, each merge consuming the
//! previous iteration's output. Correctness rests on every fragment
//! being pre-sorted by the same case-insensitive term order.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::persist::{write_json_line, DictEntry, IndexPaths, TermLine};

pub fn list_buckets(paths: &IndexPaths) -> Result<Vec<String>> {
    let mut buckets = Vec::new();
    for entry in fs::read_dir(paths.mini_dir())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            buckets.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    buckets.sort();
    Ok(buckets)
}

/// Reduces one bucket's fragment files to a single sorted posting
/// file via repeated pairwise streaming merges.
pub fn merge_bucket(paths: &IndexPaths, bucket: &str) -> Result<()> {
    let dir = paths.mini_dir().join(bucket);
    let mut queue: VecDeque<PathBuf> = sorted_files(&dir)?.into();
    let mut seq = 0usize;
    while queue.len() > 1 {
        let (Some(a), Some(b)) = (queue.pop_front(), queue.pop_front()) else {
            break;
        };
        let out = paths.combine_dir().join(format!("{bucket}_{seq}.txt"));
        seq += 1;
        merge_pair(&a, &b, &out)
            .with_context(|| format!("merging {} and {}", a.display(), b.display()))?;
        queue.push_back(out);
    }
    if let Some(last) = queue.pop_front() {
        fs::copy(&last, paths.bucket_file(bucket))?;
    }
    tracing::debug!(bucket, passes = seq, "bucket merged");
    Ok(())
}

/// Streams two sorted fragment files into one: the smaller term's
/// line passes through untouched; equal terms concatenate their
/// appearance arrays, lower-casing the name when the casings differ.
fn merge_pair(a: &Path, b: &Path, out: &Path) -> Result<()> {
    let mut ra = BufReader::new(File::open(a)?).lines();
    let mut rb = BufReader::new(File::open(b)?).lines();
    let mut w = BufWriter::new(File::create(out)?);

    let mut la = ra.next().transpose()?;
    let mut lb = rb.next().transpose()?;
    while let (Some(x), Some(y)) = (la.as_deref(), lb.as_deref()) {
        let tx: TermLine = serde_json::from_str(x)?;
        let ty: TermLine = serde_json::from_str(y)?;
        match tx.name.to_lowercase().cmp(&ty.name.to_lowercase()) {
            Ordering::Less => {
                writeln!(w, "{x}")?;
                la = ra.next().transpose()?;
            }
            Ordering::Greater => {
                writeln!(w, "{y}")?;
                lb = rb.next().transpose()?;
            }
            Ordering::Equal => {
                let mut combined = tx;
                if combined.name != ty.name {
                    combined.name = combined.name.to_lowercase();
                }
                combined.appearances.extend(ty.appearances);
                write_json_line(&mut w, &combined)?;
                la = ra.next().transpose()?;
                lb = rb.next().transpose()?;
            }
        }
    }
    while let Some(x) = la.as_deref() {
        writeln!(w, "{x}")?;
        la = ra.next().transpose()?;
    }
    while let Some(y) = lb.as_deref() {
        writeln!(w, "{y}")?;
        lb = rb.next().transpose()?;
    }
    w.flush()?;
    Ok(())
}

/// Concatenates the per-worker document metadata files into `docs.txt`
/// and returns the document count.
pub fn combine_docs(paths: &IndexPaths) -> Result<u64> {
    let out = File::create(paths.docs_file())?;
    let mut w = BufWriter::new(out);
    let mut num_docs = 0u64;
    for file in sorted_files(&paths.docs_dir())? {
        let reader = BufReader::new(File::open(&file)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            writeln!(w, "{line}")?;
            num_docs += 1;
        }
    }
    w.flush()?;
    Ok(num_docs)
}

/// Merges the per-worker city side-indexes by city name. Positions
/// from later shards are appended; the first non-empty metadata wins.
pub fn combine_cities(paths: &IndexPaths) -> Result<()> {
    let mut all = std::collections::HashMap::new();
    for file in sorted_files(&paths.cities_dir())? {
        let cities = crate::persist::load_cities(&file)?;
        for (name, record) in cities {
            match all.entry(name) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let merged = slot.get_mut();
                    merged.docs.extend(record.docs);
                    if merged.metadata.is_none() {
                        merged.metadata = record.metadata;
                    }
                }
            }
        }
    }
    crate::persist::save_cities(&paths.cities_file(), &all)
}

/// Streams every merged bucket file once, in bucket order, emitting
/// one dictionary record per term with its aggregate appearance count
/// and row offset. Returns the number of distinct terms.
pub fn build_dictionary(paths: &IndexPaths) -> Result<u64> {
    let out = File::create(paths.dictionary())?;
    let mut w = BufWriter::new(out);
    let mut num_terms = 0u64;
    for file in sorted_files(&paths.postings_dir())? {
        let reader = BufReader::new(File::open(&file)?);
        for (row, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let term: TermLine = serde_json::from_str(&line)?;
            let total: u64 = term.appearances.iter().map(|(_, tf)| u64::from(*tf)).sum();
            write_json_line(
                &mut w,
                &DictEntry { term: term.name, appearances: total, ptr: row as u64 },
            )?;
            num_terms += 1;
        }
    }
    w.flush()?;
    Ok(num_terms)
}

/// Directory listing sorted by file name, for deterministic merge
/// order across runs.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
