//! Query-time search over a loaded index.
//!
//! A query term is expanded two ways before ranking: a substring scan
//! over the whole in-memory dictionary (an accepted O(dictionary) cost
//! per term), and an optional external similarity capability. Both
//! feed weighted appearance counts into the same per-query-term map
//! the ranker consumes.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::classify::is_alpha;
use crate::normalize::split_terms;
use crate::persist::{read_bucket_row, DictEntry, IndexPaths};
use crate::rank::{Appearances, Ranker};
use crate::source::DocTextSource;

const TOP_K: usize = 50;
const TOP_ENTITIES: usize = 5;
const SUBSTRING_WEIGHT: f64 = 15.0;
const SEMANTIC_NEIGHBORS: usize = 3;
const SEMANTIC_WEIGHT: f64 = 1.0;

/// External term-similarity capability. `None` means the term is
/// unknown to the model.
pub trait Similarity: Send + Sync {
    fn similar(&self, term: &str, top_n: usize) -> Option<Vec<String>>;
}

pub struct NoSimilarity;

impl Similarity for NoSimilarity {
    fn similar(&self, _term: &str, _top_n: usize) -> Option<Vec<String>> {
        None
    }
}

/// File-backed similarity: a JSON object mapping a term to its
/// pre-computed neighbor list.
pub struct NeighborFile {
    neighbors: HashMap<String, Vec<String>>,
}

impl NeighborFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self { neighbors: serde_json::from_str(&text)? })
    }
}

impl Similarity for NeighborFile {
    fn similar(&self, term: &str, top_n: usize) -> Option<Vec<String>> {
        let hits = self.neighbors.get(term)?;
        Some(hits.iter().take(top_n).cloned().collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub semantic: bool,
    pub entities: bool,
    pub cities: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SearchOutput {
    pub results: Vec<(String, f64)>,
    pub entities: HashMap<String, Vec<(String, u32)>>,
}

pub struct Searcher {
    dictionary: HashMap<String, DictEntry>,
    paths: IndexPaths,
    ranker: Ranker,
    stop_words: HashSet<String>,
    similarity: Box<dyn Similarity>,
    text_source: Box<dyn DocTextSource>,
}

impl Searcher {
    pub fn new(
        dictionary: HashMap<String, DictEntry>,
        paths: IndexPaths,
        ranker: Ranker,
        stop_words: HashSet<String>,
        similarity: Box<dyn Similarity>,
        text_source: Box<dyn DocTextSource>,
    ) -> Self {
        Self { dictionary, paths, ranker, stop_words, similarity, text_source }
    }

    pub fn num_docs(&self) -> usize {
        self.ranker.num_docs()
    }

    pub fn num_terms(&self) -> usize {
        self.dictionary.len()
    }

    pub fn doc_record(&self, doc: &str) -> Option<&crate::index::DocRecord> {
        self.ranker.docs().get(doc)
    }

    /// Answers one query: expand terms, gather candidates, rank, and
    /// keep the top fifty by score, document id breaking ties.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> SearchOutput {
        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|t| !self.stop_words.contains(&t.to_lowercase()))
            .map(str::to_string)
            .collect();

        let appearances = self.gather_appearances(&terms, opts.semantic);

        let mut candidates: HashSet<&String> = HashSet::new();
        for docs in appearances.values() {
            candidates.extend(docs.keys());
        }
        if !opts.cities.is_empty() {
            candidates.retain(|doc| {
                self.ranker
                    .docs()
                    .get(*doc)
                    .and_then(|d| d.city.as_deref())
                    .is_some_and(|c| opts.cities.iter().any(|want| want == c))
            });
        }

        let ranks = self.ranker.rank(&terms, &appearances, candidates);
        let mut results: Vec<(String, f64)> = ranks.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(TOP_K);

        let mut entities = HashMap::new();
        if opts.entities {
            for (doc, _) in &results {
                entities.insert(doc.clone(), self.doc_entities(doc));
            }
        }
        SearchOutput { results, entities }
    }

    /// Step one of a search: for every query term, fold in the
    /// postings of every dictionary term containing it, weighted by
    /// how much of the dictionary term the query term covers, then
    /// optionally the similarity neighbors of each matched term at a
    /// flat weight.
    fn gather_appearances(&self, terms: &[String], semantic: bool) -> Appearances {
        let mut ans: Appearances = HashMap::new();
        let mut matched: Vec<(String, String)> = Vec::new();

        for term in terms {
            let slot = ans.entry(term.clone()).or_default();
            let term_lower = term.to_lowercase();
            let term_len = term.chars().count() as f64;
            for key in self.dictionary.keys() {
                let key_lower = key.to_lowercase();
                if key_lower.contains(&term_lower) {
                    matched.push((term.clone(), key_lower));
                    let weight = SUBSTRING_WEIGHT * term_len / key.chars().count() as f64;
                    merge_weighted(slot, &self.term_appearances(key), weight);
                }
            }
        }

        if semantic {
            for (term, key_lower) in &matched {
                let probe = key_lower.replace('-', " ");
                let Some(neighbors) = self.similarity.similar(&probe, SEMANTIC_NEIGHBORS)
                else {
                    continue;
                };
                let slot = ans.entry(term.clone()).or_default();
                for neighbor in neighbors {
                    for part in neighbor.split('_') {
                        merge_weighted(slot, &self.term_appearances(part), SEMANTIC_WEIGHT);
                    }
                }
            }
        }
        ans
    }

    /// Dictionary lookup trying the lower-cased key first, then the
    /// upper-cased entity form.
    fn find_entry(&self, term: &str) -> Option<(String, &DictEntry)> {
        let lower = term.to_lowercase();
        if let Some(entry) = self.dictionary.get(&lower) {
            return Some((lower, entry));
        }
        let upper = term.to_uppercase();
        let entry = self.dictionary.get(&upper)?;
        Some((upper, entry))
    }

    /// One term's raw postings, fetched by row into its bucket file.
    /// Unknown terms and unreadable rows yield an empty map.
    fn term_appearances(&self, term: &str) -> HashMap<String, u32> {
        let Some((cased, entry)) = self.find_entry(term) else {
            return HashMap::new();
        };
        let bucket = match cased.chars().next() {
            Some(c) => c.to_ascii_uppercase().to_string(),
            None => return HashMap::new(),
        };
        match read_bucket_row(&self.paths, &bucket, entry.ptr) {
            Some(line) => line.appearances.into_iter().collect(),
            None => HashMap::new(),
        }
    }

    /// Re-opens a result document and extracts its top entities:
    /// capitalized non-stop-word tokens, discarding any form also
    /// written lower-cased in the same document.
    fn doc_entities(&self, doc: &str) -> Vec<(String, u32)> {
        let Some(record) = self.ranker.docs().get(doc) else {
            return Vec::new();
        };
        let Some(text) = self
            .text_source
            .doc_text(Path::new(&record.path), doc)
        else {
            return Vec::new();
        };

        let words: Vec<&str> = split_terms(&text).collect();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for word in &words {
            let capitalized = word.chars().next().is_some_and(|c| !c.is_lowercase());
            if capitalized && is_alpha(word) && !self.stop_words.contains(&word.to_lowercase())
            {
                *counts.entry(word.to_uppercase()).or_insert(0) += 1;
            }
        }
        for word in &words {
            if word.chars().next().is_some_and(|c| !c.is_uppercase()) {
                counts.remove(&word.to_uppercase());
            }
        }

        let mut entities: Vec<(String, u32)> = counts.into_iter().collect();
        entities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entities.truncate(TOP_ENTITIES);
        entities
    }
}

fn merge_weighted(slot: &mut HashMap<String, f64>, add: &HashMap<String, u32>, weight: f64) {
    for (doc, tf) in add {
        *slot.entry(doc.clone()).or_insert(0.0) += weight * f64::from(*tf);
    }
}

/// Writes one query's results in the standard TREC run format:
/// `<query_id> 0 <doc_id> <rank> 1.0 <run_tag>`, rank starting at 1.
pub fn write_trec_results<W: Write>(
    w: &mut W,
    query_id: &str,
    results: &[(String, f64)],
    run_tag: &str,
) -> Result<()> {
    for (rank, (doc, _)) in results.iter().enumerate() {
        writeln!(w, "{query_id} 0 {doc} {} 1.0 {run_tag}", rank + 1)?;
    }
    Ok(())
}
