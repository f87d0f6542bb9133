//! Per-shard in-memory index state.
//!
//! Each worker owns one `ShardIndex`. Ingesting a document folds its
//! normalized terms into letter buckets under the case-reconciliation
//! rule and records city mentions in a side index; `flush` serializes
//! the buckets as sorted fragment files and resets the shard.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::classify::is_alpha;
use crate::persist::TermLineRef;
use crate::source::SourceDoc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRecord {
    pub name: String,
    pub length: usize,
    pub max_tf: u32,
    pub unique_terms: usize,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityMetadata {
    pub country: String,
    pub currency: String,
    pub population: String,
}

/// External city-metadata lookup. Implementations must degrade to
/// `None` on any failure.
pub trait CityEnrich: Sync {
    fn enrich(&self, city: &str) -> Option<CityMetadata>;
}

pub struct NoEnrich;

impl CityEnrich for NoEnrich {
    fn enrich(&self, _city: &str) -> Option<CityMetadata> {
        None
    }
}

/// A city's side-index entry: enrichment metadata plus the token
/// positions of the city name per mentioning document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityRecord {
    pub name: String,
    pub metadata: Option<CityMetadata>,
    pub docs: HashMap<String, Vec<usize>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CityIndex {
    pub cities: HashMap<String, CityRecord>,
}

impl CityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a document's mentions of a city, enriching on the
    /// first sighting of that city name.
    pub fn observe(
        &mut self,
        city: &str,
        doc: &str,
        positions: Vec<usize>,
        enrich: &dyn CityEnrich,
    ) {
        let record = self
            .cities
            .entry(city.to_string())
            .or_insert_with(|| CityRecord {
                name: city.to_string(),
                metadata: enrich.enrich(city),
                docs: HashMap::new(),
            });
        record.docs.insert(doc.to_string(), positions);
    }
}

/// One worker's private partial inverted index: first-letter bucket →
/// term → posting list.
#[derive(Debug, Default)]
pub struct ShardIndex {
    buckets: HashMap<char, HashMap<String, Vec<(String, u32)>>>,
}

impl ShardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one document's normalized terms into the shard and
    /// returns its metadata record. `terms` must be non-empty.
    pub fn ingest(
        &mut self,
        doc: &SourceDoc,
        path: &str,
        terms: &[String],
        cities: &mut CityIndex,
        enrich: &dyn CityEnrich,
    ) -> DocRecord {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for term in terms {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
        let max_tf = counts.values().copied().max().unwrap_or(0);
        let record = DocRecord {
            name: doc.id.clone(),
            length: doc.length(),
            max_tf,
            unique_terms: counts.len(),
            path: path.to_string(),
            city: non_empty(&doc.city),
            date: non_empty(&doc.date),
            title: non_empty(&doc.title),
            language: non_empty(&doc.language),
        };

        for (term, tf) in counts {
            let key = if is_alpha(term) {
                let key = self.term_key(term);
                if let Some(city) = record.city.as_deref() {
                    if key.to_uppercase() == city {
                        let positions = terms
                            .iter()
                            .enumerate()
                            .filter(|(_, t)| t.to_uppercase() == city)
                            .map(|(i, _)| i)
                            .collect();
                        cities.observe(city, &doc.id, positions, enrich);
                    }
                }
                key
            } else {
                term.to_string()
            };
            let bucket = bucket_of(&key);
            self.buckets
                .entry(bucket)
                .or_default()
                .entry(key)
                .or_default()
                .push((doc.id.clone(), tf));
        }
        record
    }

    /// The case-reconciliation rule. Within a bucket exactly one
    /// casing wins: the lower-case key if it already exists; an
    /// upper-cased entity form for terms written capitalized; else
    /// lower-case, renaming a previously-seen upper-case key forward.
    fn term_key(&mut self, term: &str) -> String {
        let lower = term.to_lowercase();
        let bucket = self.buckets.entry(bucket_of(term)).or_default();
        if bucket.contains_key(&lower) {
            return lower;
        }
        if term.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return term.to_uppercase();
        }
        let upper = term.to_uppercase();
        if let Some(postings) = bucket.remove(&upper) {
            bucket.insert(lower.clone(), postings);
        }
        lower
    }

    /// Writes every bucket as a case-insensitively sorted fragment
    /// file under `mini_dir/<bucket>/<shard_tag>.txt`, then resets
    /// the shard.
    pub fn flush(&mut self, mini_dir: &Path, shard_tag: &str) -> Result<()> {
        for (bucket, terms) in &self.buckets {
            let dir = mini_dir.join(bucket.to_string());
            fs::create_dir_all(&dir)?;
            let mut keys: Vec<&String> = terms.keys().collect();
            keys.sort_by_key(|k| k.to_lowercase());
            let file = File::create(dir.join(format!("{shard_tag}.txt")))?;
            let mut w = BufWriter::new(file);
            for key in keys {
                let line = serde_json::to_string(&TermLineRef {
                    name: key,
                    appearances: &terms[key],
                })?;
                writeln!(w, "{line}")?;
            }
            w.flush()?;
        }
        self.buckets.clear();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// A term's bucket is its upper-cased first character.
fn bucket_of(term: &str) -> char {
    term.chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('_')
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
