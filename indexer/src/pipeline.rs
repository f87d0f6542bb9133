//! Full index build: partition the corpus, run shard workers in
//! parallel, then merge fragments into the final bucket files and
//! dictionary.
//!
//! A build runs to completion or fails as a whole; there is no partial
//! or incremental rebuild. Malformed corpus files are skipped with a
//! warning rather than aborting the workers.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

use gazette_core::classify::NumberFormat;
use gazette_core::index::{CityEnrich, CityIndex, ShardIndex};
use gazette_core::merge::{
    build_dictionary, combine_cities, combine_docs, list_buckets, merge_bucket,
};
use gazette_core::normalize::Parser;
use gazette_core::persist::{save_cities, save_meta, write_json_line, IndexPaths, MetaFile};
use gazette_core::source::read_jsonl;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_FLUSH_EVERY: usize = 20;
const INDEX_VERSION: u32 = 1;

/// Everything one build needs up front.
pub struct BuildConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub workers: usize,
    /// Corpus files each worker indexes between fragment flushes.
    pub flush_every: usize,
    pub stem: bool,
    pub stop_words: HashSet<String>,
    pub format: NumberFormat,
}

#[derive(Debug)]
pub struct BuildStats {
    pub num_docs: u64,
    pub num_terms: u64,
    pub elapsed: Duration,
}

/// Builds a complete index at `config.output` from the JSONL corpus at
/// `config.input`.
pub fn build_index(config: &BuildConfig, enrich: &dyn CityEnrich) -> Result<BuildStats> {
    let started = Instant::now();
    if !config.input.exists() {
        bail!("corpus path {} does not exist", config.input.display());
    }
    let paths = IndexPaths::new(&config.output);
    paths.create_all()?;

    let files = corpus_files(&config.input);
    if files.is_empty() {
        bail!("no .jsonl corpus files under {}", config.input.display());
    }
    let partitions = partition(files, config.workers.max(1));
    tracing::info!(
        workers = partitions.len(),
        "indexing corpus at {}",
        config.input.display()
    );

    partitions
        .par_iter()
        .enumerate()
        .try_for_each(|(worker, task)| run_worker(config, &paths, worker, task, enrich))?;

    let num_docs = combine_docs(&paths)?;
    combine_cities(&paths)?;
    let buckets = list_buckets(&paths)?;
    buckets
        .par_iter()
        .try_for_each(|bucket| merge_bucket(&paths, bucket))?;
    let num_terms = build_dictionary(&paths)?;

    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    save_meta(
        &paths,
        &MetaFile { num_docs, num_terms, created_at, version: INDEX_VERSION },
    )?;

    let elapsed = started.elapsed();
    tracing::info!(num_docs, num_terms, ?elapsed, "index build complete");
    Ok(BuildStats { num_docs, num_terms, elapsed })
}

/// Every `.jsonl` file under the corpus root, sorted for a stable
/// partitioning across runs.
fn corpus_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path().extension().and_then(|s| s.to_str()) == Some("jsonl")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Splits the file list into at most `workers` contiguous tasks of
/// near-equal size.
fn partition(files: Vec<PathBuf>, workers: usize) -> Vec<Vec<PathBuf>> {
    let per_worker = files.len().div_ceil(workers);
    files
        .chunks(per_worker.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// One worker's pass over its corpus files: normalize and ingest every
/// document, flushing fragment files on the configured cadence and a
/// final time before the worker exits.
fn run_worker(
    config: &BuildConfig,
    paths: &IndexPaths,
    worker: usize,
    task: &[PathBuf],
    enrich: &dyn CityEnrich,
) -> Result<()> {
    let parser = Parser::new(config.stem, config.stop_words.clone(), config.format.clone());
    let mut shard = ShardIndex::new();
    let mut cities = CityIndex::new();
    let mut flushes = 0usize;

    let doc_path = paths.docs_dir().join(format!("{worker}.txt"));
    let mut docs_w = BufWriter::new(
        File::create(&doc_path).with_context(|| format!("creating {}", doc_path.display()))?,
    );

    for (i, file) in task.iter().enumerate() {
        let docs = match read_jsonl(file) {
            Ok(docs) => docs,
            Err(err) => {
                tracing::warn!(file = %file.display(), %err, "skipping corpus file");
                continue;
            }
        };
        for doc in docs {
            let terms = parser.normalize(&doc.text);
            if terms.is_empty() {
                continue;
            }
            let record =
                shard.ingest(&doc, &file.to_string_lossy(), &terms, &mut cities, enrich);
            write_json_line(&mut docs_w, &record)?;
        }
        if (i + 1) % config.flush_every.max(1) == 0 {
            shard.flush(&paths.mini_dir(), &format!("{worker}_{flushes}"))?;
            flushes += 1;
        }
    }
    if !shard.is_empty() {
        shard.flush(&paths.mini_dir(), &format!("{worker}_{flushes}"))?;
    }
    docs_w.flush()?;
    save_cities(&paths.cities_dir().join(format!("{worker}.json")), &cities.cities)?;
    tracing::debug!(worker, files = task.len(), "worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_core::index::NoEnrich;
    use gazette_core::persist::{load_dictionary, load_docs, load_meta};
    use gazette_core::rank::Ranker;
    use gazette_core::search::{NoSimilarity, SearchOptions, Searcher};
    use gazette_core::source::JsonlSource;
    use gazette_core::stopwords;
    use std::io::Write as _;

    #[test]
    fn partition_balances_and_preserves_order() {
        let files: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("f{i}"))).collect();
        let parts = partition(files.clone(), 4);
        assert!(parts.len() <= 4);
        let flat: Vec<PathBuf> = parts.into_iter().flatten().collect();
        assert_eq!(flat, files);
    }

    #[test]
    fn partition_with_more_workers_than_files() {
        let files = vec![PathBuf::from("only.jsonl")];
        let parts = partition(files, 8);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 1);
    }

    #[test]
    fn build_then_search_round_trip() {
        let corpus = tempfile::tempdir().unwrap();
        let mut f1 = File::create(corpus.path().join("a.jsonl")).unwrap();
        writeln!(
            f1,
            r#"{{"id":"d1","text":"The zebra trade grew quickly","city":"london uk","title":"Zebra trade"}}"#
        )
        .unwrap();
        writeln!(f1, r#"{{"id":"d2","text":"Trade talks continued yesterday"}}"#).unwrap();
        let mut f2 = File::create(corpus.path().join("b.jsonl")).unwrap();
        writeln!(f2, r#"{{"id":"d3","text":"A quiet market day without trade news"}}"#)
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            input: corpus.path().to_path_buf(),
            output: out.path().to_path_buf(),
            workers: 2,
            flush_every: 1,
            stem: false,
            stop_words: stopwords::builtin(),
            format: NumberFormat::default(),
        };
        let stats = build_index(&config, &NoEnrich).unwrap();
        assert_eq!(stats.num_docs, 3);

        let paths = IndexPaths::new(out.path());
        let meta = load_meta(&paths).unwrap();
        assert_eq!(meta.num_docs, 3);
        assert_eq!(meta.num_terms, stats.num_terms);

        let dictionary = load_dictionary(&paths).unwrap();
        assert_eq!(dictionary["trade"].appearances, 3);
        let docs = load_docs(&paths).unwrap();
        assert_eq!(docs["d1"].city.as_deref(), Some("LONDON"));
        assert_eq!(docs["d1"].title.as_deref(), Some("Zebra trade"));

        let searcher = Searcher::new(
            dictionary,
            paths,
            Ranker::new(docs),
            stopwords::builtin(),
            Box::new(NoSimilarity),
            Box::new(JsonlSource),
        );
        let result = searcher.search("trade", &SearchOptions::default());
        let found: Vec<&str> = result.results.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(found.len(), 3);
        for doc in ["d1", "d2", "d3"] {
            assert!(found.contains(&doc));
        }
    }

    #[test]
    fn rebuild_writes_identical_dictionary() {
        let corpus = tempfile::tempdir().unwrap();
        let mut f1 = File::create(corpus.path().join("a.jsonl")).unwrap();
        writeln!(f1, r#"{{"id":"d1","text":"Zebra herds crossed the river","city":"nairobi"}}"#)
            .unwrap();
        writeln!(f1, r#"{{"id":"d2","text":"Traders watched zebra prices"}}"#).unwrap();
        let mut f2 = File::create(corpus.path().join("b.jsonl")).unwrap();
        writeln!(f2, r#"{{"id":"d3","text":"Between 1980 and 1990 prices doubled"}}"#).unwrap();
        let mut f3 = File::create(corpus.path().join("c.jsonl")).unwrap();
        writeln!(f3, r#"{{"id":"d4","text":"River Traders met on May 14"}}"#).unwrap();

        let build = |out: &std::path::Path| {
            let config = BuildConfig {
                input: corpus.path().to_path_buf(),
                output: out.to_path_buf(),
                workers: 3,
                flush_every: 1,
                stem: true,
                stop_words: stopwords::builtin(),
                format: NumberFormat::default(),
            };
            build_index(&config, &NoEnrich).unwrap();
            std::fs::read(IndexPaths::new(out).dictionary()).unwrap()
        };

        let first = build(tempfile::tempdir().unwrap().path());
        let second = build(tempfile::tempdir().unwrap().path());
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
