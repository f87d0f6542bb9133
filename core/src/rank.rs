//! BM25 document ranking.
//!
//! Score = `0.9 * Σ BM25 term scores + 0.1 * 4 * (title hits / query
//! terms)` with `k = 1.7`, `b = 0.5` and the unsmoothed IDF
//! `ln((N - n_q + 0.5) / (n_q + 0.5))`. A term present in all or none
//! of the documents can push IDF non-positive; that is accepted
//! behavior, not special-cased.

use std::collections::HashMap;

use crate::index::DocRecord;

const K: f64 = 1.7;
const B: f64 = 0.5;
const W_BM25: f64 = 0.9;
const W_TITLE: f64 = 0.1;
const TITLE_SCALE: f64 = 4.0;

/// Per-query-term weighted appearance counts: term → document id →
/// accumulated (possibly weighted) frequency.
pub type Appearances = HashMap<String, HashMap<String, f64>>;

pub struct Ranker {
    docs: HashMap<String, DocRecord>,
    avg_doc_len: f64,
}

impl Ranker {
    pub fn new(docs: HashMap<String, DocRecord>) -> Self {
        let total: u64 = docs.values().map(|d| d.length as u64).sum();
        let avg = (total / docs.len().max(1) as u64).max(1) as f64;
        Self { docs, avg_doc_len: avg }
    }

    pub fn docs(&self) -> &HashMap<String, DocRecord> {
        &self.docs
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn rank<'a, I>(
        &self,
        terms: &[String],
        appearances: &Appearances,
        candidates: I,
    ) -> HashMap<String, f64>
    where
        I: IntoIterator<Item = &'a String>,
    {
        candidates
            .into_iter()
            .map(|doc| (doc.clone(), self.score(terms, appearances, doc)))
            .collect()
    }

    /// One document's combined BM25 + title score.
    pub fn score(&self, terms: &[String], appearances: &Appearances, doc: &str) -> f64 {
        if terms.is_empty() {
            return 0.0;
        }
        let Some(record) = self.docs.get(doc) else {
            return 0.0;
        };
        let n = self.docs.len() as f64;
        let doc_len = record.length as f64;
        let title = record.title.as_deref().map(str::to_lowercase);

        let mut sum = 0.0;
        let mut title_hits = 0usize;
        for term in terms {
            let term_docs = appearances.get(term);
            let nq = term_docs.map_or(0.0, |m| m.len() as f64);
            let f = term_docs
                .and_then(|m| m.get(doc))
                .copied()
                .unwrap_or(0.0);
            if f > 0.0 {
                if let Some(title) = &title {
                    if title.contains(&term.to_lowercase()) {
                        title_hits += 1;
                    }
                }
            }
            let idf = ((n - nq + 0.5) / (nq + 0.5)).ln();
            sum += idf * (f * (K + 1.0))
                / (f + K * (1.0 - B + B * (doc_len / self.avg_doc_len)));
        }
        W_BM25 * sum + W_TITLE * (title_hits as f64 / terms.len() as f64) * TITLE_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, length: usize, title: Option<&str>) -> DocRecord {
        DocRecord {
            name: name.to_string(),
            length,
            max_tf: 1,
            unique_terms: 1,
            path: "f".to_string(),
            city: None,
            date: None,
            title: title.map(str::to_string),
            language: None,
        }
    }

    fn ranker_with(docs: Vec<DocRecord>) -> Ranker {
        Ranker::new(docs.into_iter().map(|d| (d.name.clone(), d)).collect())
    }

    fn single_term(term: &str, counts: &[(&str, f64)]) -> Appearances {
        let mut inner = HashMap::new();
        for (doc, f) in counts {
            inner.insert(doc.to_string(), *f);
        }
        let mut out = HashMap::new();
        out.insert(term.to_string(), inner);
        out
    }

    /// A corpus large enough that a two-document term keeps a
    /// positive IDF.
    fn ten_docs() -> Ranker {
        ranker_with((1..=10).map(|i| record(&format!("d{i}"), 100, None)).collect())
    }

    #[test]
    fn higher_frequency_scores_strictly_higher() {
        let ranker = ten_docs();
        let terms = vec!["trade".to_string()];
        let apps = single_term("trade", &[("d1", 1.0), ("d2", 5.0)]);
        let low = ranker.score(&terms, &apps, "d1");
        let high = ranker.score(&terms, &apps, "d2");
        assert!(high > low, "tf=5 ({high}) must beat tf=1 ({low})");
    }

    #[test]
    fn score_is_monotone_in_term_frequency() {
        let ranker = ten_docs();
        let terms = vec!["trade".to_string()];
        let mut prev = f64::NEG_INFINITY;
        for f in [0.0, 1.0, 2.0, 10.0, 100.0] {
            let apps = single_term("trade", &[("d1", f), ("d2", 1.0)]);
            let score = ranker.score(&terms, &apps, "d1");
            assert!(score >= prev, "f={f} dropped the score");
            prev = score;
        }
    }

    #[test]
    fn title_match_adds_bonus() {
        let ranker = ranker_with(vec![
            record("d1", 100, Some("Trade agreement signed")),
            record("d2", 100, None),
            record("d3", 100, None),
        ]);
        let terms = vec!["trade".to_string()];
        let apps = single_term("trade", &[("d1", 2.0), ("d2", 2.0)]);
        let titled = ranker.score(&terms, &apps, "d1");
        let untitled = ranker.score(&terms, &apps, "d2");
        assert!(titled > untitled);
        let bonus = titled - untitled;
        assert!((bonus - 0.4).abs() < 1e-9, "bonus was {bonus}");
    }

    #[test]
    fn absent_term_contributes_zero() {
        let ranker = ranker_with(vec![record("d1", 100, None), record("d2", 100, None)]);
        let terms = vec!["trade".to_string(), "ghost".to_string()];
        let mut apps = single_term("trade", &[("d1", 1.0)]);
        apps.insert("ghost".to_string(), HashMap::new());
        let with_ghost = ranker.score(&terms, &apps, "d1");
        let alone = ranker.score(&["trade".to_string()], &apps, "d1");
        assert!((with_ghost - alone).abs() < 1e-9);
    }

    #[test]
    fn unknown_document_scores_zero() {
        let ranker = ranker_with(vec![record("d1", 100, None)]);
        let apps = single_term("trade", &[("d1", 1.0)]);
        assert_eq!(ranker.score(&["trade".to_string()], &apps, "nope"), 0.0);
    }
}
