//! On-disk index layout and line-record serialization.
//!
//! Every artifact is line-oriented JSON so posting rows stay
//! row-addressable:
//!
//! - `mini/<bucket>/<shard>.txt`: sorted fragment files awaiting merge
//! - `postings/<bucket>.txt`: one merged posting file per bucket
//! - `dictionary.txt`: `{term, appearances, ptr}` per line
//! - `docs.txt`: one document metadata record per line
//! - `cities.json`: the merged city side-index
//! - `meta.json`: build summary

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::index::{CityRecord, DocRecord};

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn mini_dir(&self) -> PathBuf {
        self.root.join("mini")
    }
    pub fn combine_dir(&self) -> PathBuf {
        self.root.join("combine")
    }
    pub fn postings_dir(&self) -> PathBuf {
        self.root.join("postings")
    }
    pub fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }
    pub fn cities_dir(&self) -> PathBuf {
        self.root.join("cities")
    }
    pub fn bucket_file(&self, bucket: &str) -> PathBuf {
        self.postings_dir().join(format!("{bucket}.txt"))
    }
    pub fn dictionary(&self) -> PathBuf {
        self.root.join("dictionary.txt")
    }
    pub fn docs_file(&self) -> PathBuf {
        self.root.join("docs.txt")
    }
    pub fn cities_file(&self) -> PathBuf {
        self.root.join("cities.json")
    }
    pub fn meta(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn create_all(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.mini_dir(),
            self.combine_dir(),
            self.postings_dir(),
            self.docs_dir(),
            self.cities_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermLine {
    pub name: String,
    pub appearances: Vec<(String, u32)>,
}

/// Borrowed form of [`TermLine`].
#[derive(Serialize)]
pub struct TermLineRef<'a> {
    pub name: &'a str,
    pub appearances: &'a [(String, u32)],
}

/// One dictionary line: aggregate appearance count and the row offset
/// into the term's bucket posting file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictEntry {
    pub term: String,
    pub appearances: u64,
    pub ptr: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u64,
    pub num_terms: u64,
    pub created_at: String,
    pub version: u32,
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(paths.meta(), json)?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let text = fs::read_to_string(paths.meta())?;
    Ok(serde_json::from_str(&text)?)
}

/// Loads the whole dictionary file into a term-keyed map. This is the
/// only structure read wholesale into memory at query time.
pub fn load_dictionary(paths: &IndexPaths) -> Result<HashMap<String, DictEntry>> {
    let file = File::open(paths.dictionary())
        .with_context(|| format!("opening {}", paths.dictionary().display()))?;
    let mut dict = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: DictEntry = serde_json::from_str(&line)?;
        dict.insert(entry.term.clone(), entry);
    }
    Ok(dict)
}

pub fn load_docs(paths: &IndexPaths) -> Result<HashMap<String, DocRecord>> {
    let file = File::open(paths.docs_file())
        .with_context(|| format!("opening {}", paths.docs_file().display()))?;
    let mut docs = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DocRecord = serde_json::from_str(&line)?;
        docs.insert(record.name.clone(), record);
    }
    Ok(docs)
}

pub fn save_cities(path: &Path, cities: &HashMap<String, CityRecord>) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(file, cities)?;
    Ok(())
}

pub fn load_cities(path: &Path) -> Result<HashMap<String, CityRecord>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Random row lookup into a bucket posting file. A missing file or an
/// out-of-range row yields `None` rather than an error.
pub fn read_bucket_row(paths: &IndexPaths, bucket: &str, row: u64) -> Option<TermLine> {
    let file = File::open(paths.bucket_file(bucket)).ok()?;
    let line = BufReader::new(file)
        .lines()
        .nth(row as usize)?
        .ok()?;
    serde_json::from_str(&line).ok()
}

pub fn write_json_line<W: Write, T: Serialize>(w: &mut W, value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    writeln!(w, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_row_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        paths.create_all().unwrap();
        let mut f = File::create(paths.bucket_file("D")).unwrap();
        writeln!(f, r#"{{"name":"dig","appearances":[["d1",1]]}}"#).unwrap();
        writeln!(f, r#"{{"name":"dog","appearances":[["d1",2],["d2",1]]}}"#).unwrap();

        let line = read_bucket_row(&paths, "D", 1).unwrap();
        assert_eq!(line.name, "dog");
        assert_eq!(line.appearances, vec![("d1".to_string(), 2), ("d2".to_string(), 1)]);

        assert!(read_bucket_row(&paths, "D", 9).is_none());
        assert!(read_bucket_row(&paths, "Q", 0).is_none());
    }

    #[test]
    fn dictionary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        paths.create_all().unwrap();
        let mut f = File::create(paths.dictionary()).unwrap();
        write_json_line(&mut f, &DictEntry { term: "dog".into(), appearances: 3, ptr: 1 })
            .unwrap();
        let dict = load_dictionary(&paths).unwrap();
        assert_eq!(dict["dog"].appearances, 3);
        assert_eq!(dict["dog"].ptr, 1);
    }

    #[test]
    fn meta_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        paths.create_all().unwrap();
        let meta = MetaFile {
            num_docs: 7,
            num_terms: 42,
            created_at: "2024-06-01T00:00:00Z".into(),
            version: 1,
        };
        save_meta(&paths, &meta).unwrap();
        let loaded = load_meta(&paths).unwrap();
        assert_eq!(loaded.num_docs, 7);
        assert_eq!(loaded.num_terms, 42);
    }
}
