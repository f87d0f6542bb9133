//! Document source capability.
//!
//! The pipeline treats corpus access as an opaque capability: given a
//! corpus file, return ordered `{id, text, city, date, title,
//! language}` records. The shipped implementation reads JSONL files;
//! any splitter producing the same record shape can stand in.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One raw document as produced by the source capability. The city
/// tag is normalized to its first word, upper-cased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDoc {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub language: String,
}

impl SourceDoc {
    /// Length is the character count of the text, not bytes.
    pub fn length(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn read_jsonl(path: &Path) -> Result<Vec<SourceDoc>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut docs = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut doc: SourceDoc = serde_json::from_str(&line)
            .with_context(|| format!("malformed document record in {}", path.display()))?;
        doc.city = doc
            .city
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_uppercase();
        docs.push(doc);
    }
    Ok(docs)
}

/// Re-opens a source document by its indexed path and id, for
/// query-time entity extraction.
pub trait DocTextSource: Send + Sync {
    fn doc_text(&self, path: &Path, doc_id: &str) -> Option<String>;
}

pub struct JsonlSource;

impl DocTextSource for JsonlSource {
    fn doc_text(&self, path: &Path, doc_id: &str) -> Option<String> {
        read_jsonl(path)
            .ok()?
            .into_iter()
            .find(|d| d.id == doc_id)
            .map(|d| d.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_records_and_normalizes_city() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"id":"d1","text":"hello there","city":"london uk","title":"Greetings"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"id":"d2","text":"goodbye"}}"#).unwrap();

        let docs = read_jsonl(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].city, "LONDON");
        assert_eq!(docs[0].title, "Greetings");
        assert_eq!(docs[0].length(), 11);
        assert_eq!(docs[1].city, "");
    }

    #[test]
    fn text_source_finds_doc_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"id":"d1","text":"first"}}"#).unwrap();
        writeln!(f, r#"{{"id":"d2","text":"second"}}"#).unwrap();

        assert_eq!(JsonlSource.doc_text(&path, "d2").as_deref(), Some("second"));
        assert!(JsonlSource.doc_text(&path, "d9").is_none());
    }
}
