//! Stop-word set handling.
//!
//! A corpus can ship its own `stop_words.txt` (one word per line); when
//! it does not, the built-in English list is used.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Result;

const BUILTIN: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an",
    "and", "any", "are", "aren't", "as", "at", "be", "because", "been",
    "before", "being", "below", "between", "both", "but", "by", "can",
    "can't", "cannot", "could", "couldn't", "did", "didn't", "do", "does",
    "doesn't", "doing", "don't", "down", "during", "each", "few", "for",
    "from", "further", "had", "hadn't", "has", "hasn't", "have", "haven't",
    "having", "he", "he'd", "he'll", "he's", "her", "here", "here's",
    "hers", "herself", "him", "himself", "his", "how", "how's", "i", "i'd",
    "i'll", "i'm", "i've", "if", "in", "into", "is", "isn't", "it", "it's",
    "its", "itself", "let's", "may", "me", "more", "most", "mustn't", "my",
    "myself", "no", "nor", "not", "of", "off", "on", "once", "only", "or",
    "other", "ought", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "she'd", "she'll", "she's", "should", "shouldn't", "so",
    "some", "such", "than", "that", "that's", "the", "their", "theirs",
    "them", "themselves", "then", "there", "there's", "these", "they",
    "they'd", "they'll", "they're", "they've", "this", "those", "through",
    "to", "too", "under", "until", "up", "very", "was", "wasn't", "we",
    "we'd", "we'll", "we're", "we've", "were", "weren't", "what", "what's",
    "when", "when's", "where", "where's", "which", "while", "who", "who's",
    "whom", "why", "why's", "with", "won't", "would", "wouldn't", "you",
    "you'd", "you'll", "you're", "you've", "your", "yours", "yourself",
    "yourselves",
];

pub fn builtin() -> HashSet<String> {
    BUILTIN.iter().map(|w| w.to_string()).collect()
}

/// Loads a stop-word file, one word per line. Blank lines are ignored.
pub fn load(path: &Path) -> Result<HashSet<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_lowercase())
        .collect())
}

/// Loads `stop_words.txt` from the given directory when present,
/// falling back to the built-in list.
pub fn load_or_builtin(dir: &Path) -> HashSet<String> {
    let path = dir.join("stop_words.txt");
    if path.is_file() {
        match load(&path) {
            Ok(words) => return words,
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "failed to read stop words, using built-in list");
            }
        }
    }
    builtin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_contains_common_words() {
        let words = builtin();
        assert!(words.contains("the"));
        assert!(words.contains("between"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop_words.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Alpha\n\nbeta").unwrap();
        let words = load(&path).unwrap();
        assert!(words.contains("alpha"));
        assert!(words.contains("beta"));
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let words = load_or_builtin(dir.path());
        assert!(words.contains("the"));
    }
}
