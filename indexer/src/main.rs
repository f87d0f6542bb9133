use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use gazette_core::classify::NumberFormat;
use gazette_core::index::NoEnrich;
use gazette_core::persist::{load_dictionary, load_docs, IndexPaths};
use gazette_core::rank::Ranker;
use gazette_core::search::{
    write_trec_results, NeighborFile, NoSimilarity, SearchOptions, Searcher, Similarity,
};
use gazette_core::source::JsonlSource;
use gazette_core::stopwords;

mod enrich;
mod pipeline;

use enrich::RestCountries;
use pipeline::{build_index, BuildConfig, DEFAULT_FLUSH_EVERY, DEFAULT_WORKERS};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a bucketed inverted index and run batch queries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of JSONL corpus files
    Build {
        /// Corpus path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Number of parallel shard workers
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Corpus files per worker between fragment flushes
        #[arg(long, default_value_t = DEFAULT_FLUSH_EVERY)]
        flush_every: usize,
        /// Stem capitalized terms during normalization
        #[arg(long, default_value_t = false)]
        stem: bool,
        /// Fetch city metadata from the restcountries API
        #[arg(long, default_value_t = false)]
        enrich_cities: bool,
        /// Stop-word file (one word per line); defaults to the built-in list
        #[arg(long)]
        stop_words: Option<PathBuf>,
    },
    /// Run a query batch against an existing index, one query per line
    Search {
        /// Index directory produced by `build`
        #[arg(long)]
        index: PathBuf,
        /// Query file: `<query_id><TAB><query>` or a bare query per line
        #[arg(long)]
        queries: PathBuf,
        /// Results file in TREC run format; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        /// Expand queries through the neighbor file
        #[arg(long, default_value_t = false)]
        semantic: bool,
        /// JSON file mapping a term to its similar terms
        #[arg(long)]
        neighbors: Option<PathBuf>,
        /// Run tag for the TREC output lines
        #[arg(long, default_value = "mt")]
        run_tag: String,
        /// Stop-word file; defaults to the built-in list
        #[arg(long)]
        stop_words: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            workers,
            flush_every,
            stem,
            enrich_cities,
            stop_words,
        } => {
            let config = BuildConfig {
                input,
                output,
                workers,
                flush_every,
                stem,
                stop_words: load_stop_words(stop_words)?,
                format: NumberFormat::default(),
            };
            let stats = if enrich_cities {
                build_index(&config, &RestCountries::new()?)?
            } else {
                build_index(&config, &NoEnrich)?
            };
            println!(
                "indexed {} docs, {} terms in {:.1}s",
                stats.num_docs,
                stats.num_terms,
                stats.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Commands::Search {
            index,
            queries,
            output,
            semantic,
            neighbors,
            run_tag,
            stop_words,
        } => run_queries(
            &index,
            &queries,
            output.as_deref(),
            semantic,
            neighbors.as_deref(),
            &run_tag,
            stop_words,
        ),
    }
}

fn load_stop_words(path: Option<PathBuf>) -> Result<HashSet<String>> {
    match path {
        Some(path) => stopwords::load(&path)
            .with_context(|| format!("loading stop words from {}", path.display())),
        None => Ok(stopwords::builtin()),
    }
}

fn run_queries(
    index: &std::path::Path,
    queries: &std::path::Path,
    output: Option<&std::path::Path>,
    semantic: bool,
    neighbors: Option<&std::path::Path>,
    run_tag: &str,
    stop_words: Option<PathBuf>,
) -> Result<()> {
    let paths = IndexPaths::new(index);
    let dictionary = load_dictionary(&paths)?;
    let docs = load_docs(&paths)?;
    let similarity: Box<dyn Similarity> = match neighbors {
        Some(path) => Box::new(NeighborFile::load(path)?),
        None => Box::new(NoSimilarity),
    };
    let searcher = Searcher::new(
        dictionary,
        paths,
        Ranker::new(docs),
        load_stop_words(stop_words)?,
        similarity,
        Box::new(JsonlSource),
    );

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let opts = SearchOptions { semantic, ..Default::default() };
    let file = File::open(queries)
        .with_context(|| format!("opening {}", queries.display()))?;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (query_id, query) = match line.split_once('\t') {
            Some((id, q)) => (id.to_string(), q.to_string()),
            None => ((i + 1).to_string(), line),
        };
        let result = searcher.search(&query, &opts);
        tracing::info!(query_id = %query_id, hits = result.results.len(), "query answered");
        write_trec_results(&mut out, &query_id, &result.results, run_tag)?;
    }
    out.flush()?;
    Ok(())
}
