//! Term classification and normalization.
//!
//! The parser turns one document's raw text into its final term
//! sequence in three passes over immutable token arrays:
//!
//! 1. split on the delimiter set and classify every surviving term
//!    into a typed token,
//! 2. compose numbers with their connecting tokens (scale words,
//!    fractions, `$` prefixes) into finished number units,
//! 3. combine adjacent units (hyphen compounds, month/day, ranges,
//!    prices, percentages) into the emitted term strings.
//!
//! A term that matches no rule is dropped; normalization never fails.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::classify::{
    format_magnitude, format_grouped, format_short, is_alpha, is_fraction,
    parse_grouped_number, parse_number, NumberFormat,
};

lazy_static! {
    static ref SPLIT_RE: Regex =
        Regex::new(r#"[\s"':;\[\]\(\)\{\}!\?]+"#).expect("valid delimiter set");
    static ref MONTHS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        for (name, code) in [
            ("january", "01"), ("jan", "01"),
            ("february", "02"), ("feb", "02"),
            ("march", "03"), ("mar", "03"),
            ("april", "04"), ("apr", "04"),
            ("may", "05"),
            ("june", "06"), ("jun", "06"),
            ("july", "07"), ("jul", "07"),
            ("august", "08"), ("aug", "08"),
            ("september", "09"), ("sep", "09"),
            ("october", "10"), ("oct", "10"),
            ("november", "11"), ("nov", "11"),
            ("december", "12"), ("dec", "12"),
        ] {
            m.insert(name, code);
        }
        m
    };
    static ref WORD_NUMBERS: HashMap<&'static str, f64> = {
        let mut m = HashMap::new();
        m.insert("thousand", 1e3);
        m.insert("million", 1e6);
        m.insert("m", 1e6);
        m.insert("billion", 1e9);
        m.insert("bn", 1e9);
        m.insert("trillion", 1e12);
        m.insert("tr", 1e12);
        m
    };
}

/// Splits text on the fixed delimiter set shared by the normalizer and
/// the entity extractor.
pub fn split_terms(text: &str) -> impl Iterator<Item = &str> {
    SPLIT_RE.split(text)
}

/// A numeric literal as classified from the source text.
#[derive(Debug, Clone, PartialEq)]
enum NumLit {
    /// A plain numeric value (grouped integers are folded in here).
    Val(f64),
    /// Numeric text that must not be rescaled, e.g. a fraction behind
    /// a `%` suffix.
    Text(String),
}

/// One classified token. Exactly one variant per source term (or per
/// hyphen-expanded segment).
#[derive(Debug, Clone, PartialEq)]
enum Classified {
    Word(String),
    Month(String),
    WordNumber(String),
    Fraction(String),
    Number(NumLit),
    Between,
    And,
    Percent,
    Dollars,
    Us,
    Hyphen,
    DollarNumber(f64),
    DollarGrouped(i64),
    None,
}

/// A finished number unit: the magnitude-formatted display text plus,
/// for plain integers, the original value. Date and range rules read
/// the integer; every other rule reads the display text.
#[derive(Debug, Clone, PartialEq)]
struct Num {
    display: String,
    int: Option<i64>,
}

impl Num {
    fn scaled(display: String) -> Self {
        Self { display, int: None }
    }

    fn plain(value: f64) -> Self {
        let int = (value.fract() == 0.0 && value.abs() < 9e15).then_some(value as i64);
        Self { display: format_magnitude(value), int }
    }

    /// The integer text when the source wrote a plain integer, the
    /// display text otherwise.
    fn range_text(&self) -> String {
        match self.int {
            Some(v) => v.to_string(),
            None => self.display.clone(),
        }
    }
}

/// A token after number composition. Numbers are finished units from
/// here on.
#[derive(Debug, Clone, PartialEq)]
enum Unit {
    Word(String),
    Month(String),
    WordNumber(String),
    Number(Num),
    /// A grouped dollar amount; always followed by a `Dollars` unit.
    GroupedDollars(String),
    Between,
    And,
    Percent,
    Dollars,
    Us,
    Hyphen,
    None,
}

impl Unit {
    fn text(&self) -> Option<&str> {
        match self {
            Unit::Word(w) | Unit::Month(w) | Unit::WordNumber(w) => Some(w),
            Unit::Number(n) => Some(&n.display),
            _ => None,
        }
    }
}

/// The tokenizer/normalizer. One instance per worker; construction
/// removes the grammar keywords from the stop-word set so they survive
/// into classification.
pub struct Parser {
    stem: bool,
    stemmer: Stemmer,
    stop_words: HashSet<String>,
    format: NumberFormat,
}

impl Parser {
    pub fn new(stem: bool, mut stop_words: HashSet<String>, format: NumberFormat) -> Self {
        for kw in ["between", "and", "percent", "percentage", "dollars", "u.s."] {
            stop_words.remove(kw);
        }
        for month in MONTHS.keys() {
            stop_words.remove(*month);
        }
        for word in WORD_NUMBERS.keys() {
            stop_words.remove(*word);
        }
        Self {
            stem,
            stemmer: Stemmer::create(Algorithm::English),
            stop_words,
            format,
        }
    }

    /// Normalizes one document's text into its final term sequence.
    /// Always returns a (possibly empty) sequence.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let classified = self.classify(text);
        let units = compose_numbers(&classified, &self.format);
        self.combine(&units)
    }

    fn classify(&self, text: &str) -> Vec<Classified> {
        let mut out = Vec::new();
        for raw in SPLIT_RE.split(text) {
            let term = strip_trailing_punct(raw);
            if term.is_empty() || self.stop_words.contains(&term.to_lowercase()) {
                continue;
            }
            if let Some(tok) = self.basic(term) {
                out.push(tok);
            } else if term.contains('-') {
                self.classify_hyphenated(term, &mut out);
            } else if term.len() > 1 && term.starts_with('$') {
                self.classify_dollar(&term[1..], &mut out);
            } else if term.len() > 1 && term.ends_with('%') {
                self.classify_percent(&term[..term.len() - 1], &mut out);
            } else if term.len() > 2 && term.ends_with("th") {
                if let Some(tok @ Classified::Number(_)) = self.basic(&term[..term.len() - 2]) {
                    out.push(tok);
                }
            } else if term.len() > 1 && term.starts_with('#') {
                if let Some(tok @ Classified::Number(_)) = self.basic(&term[1..]) {
                    out.push(tok);
                }
            } else {
                // Unrecognized; keeps a slot so combination lookahead
                // does not see false neighbors.
                out.push(Classified::None);
            }
        }
        out
    }

    /// `-`-joined terms of 2 or 3 classifiable segments expand into
    /// alternating (segment, hyphen) tokens. Anything else emits no
    /// token at all.
    fn classify_hyphenated(&self, term: &str, out: &mut Vec<Classified>) {
        let parts: Vec<&str> = term.split('-').collect();
        if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return;
        }
        let Some(toks) = parts
            .iter()
            .map(|p| self.basic(p))
            .collect::<Option<Vec<_>>>()
        else {
            return;
        };
        let last = toks.len() - 1;
        for tok in &toks[..last] {
            out.push(tok.clone());
            out.push(Classified::Hyphen);
        }
        out.push(toks[last].clone());
    }

    fn classify_dollar(&self, rest: &str, out: &mut Vec<Classified>) {
        if let Some(Classified::Number(NumLit::Val(v))) = self.basic(rest) {
            if let Some(int) = parse_grouped_number(rest, &self.format) {
                out.push(Classified::DollarGrouped(int));
            } else {
                out.push(Classified::DollarNumber(v));
            }
        }
    }

    fn classify_percent(&self, rest: &str, out: &mut Vec<Classified>) {
        match self.basic(rest) {
            Some(tok @ Classified::Number(_)) => {
                out.push(tok);
                out.push(Classified::Percent);
            }
            Some(Classified::Fraction(f)) => {
                out.push(Classified::Number(NumLit::Text(f)));
                out.push(Classified::Percent);
            }
            _ => {}
        }
    }

    /// Classifies a single basic segment: keyword, month, scale word,
    /// plain word, `u.s.`, number, fraction, or grouped number.
    fn basic(&self, term: &str) -> Option<Classified> {
        if is_alpha(term) {
            let lower = term.to_lowercase();
            return Some(match lower.as_str() {
                "between" => Classified::Between,
                "and" => Classified::And,
                "percent" | "percentage" => Classified::Percent,
                "dollars" => Classified::Dollars,
                _ if MONTHS.contains_key(lower.as_str()) => Classified::Month(lower),
                _ if WORD_NUMBERS.contains_key(lower.as_str()) => Classified::WordNumber(lower),
                _ => Classified::Word(term.to_string()),
            });
        }
        let lower = term.to_lowercase();
        // The delimiter strip removes one trailing dot, so the literal
        // arrives as either "u.s." or "u.s".
        if lower == "u.s." || lower == "u.s" {
            return Some(Classified::Us);
        }
        let term = strip_trailing_punct(term);
        if let Some(v) = parse_number(term, &self.format) {
            return Some(Classified::Number(NumLit::Val(v)));
        }
        if is_fraction(term) {
            return Some(Classified::Fraction(term.to_string()));
        }
        if let Some(int) = parse_grouped_number(term, &self.format) {
            return Some(Classified::Number(NumLit::Val(int as f64)));
        }
        None
    }

    /// The unit-combination pass: walks the composed tokens once,
    /// consuming matched neighbors and emitting the final terms.
    fn combine(&self, units: &[Unit]) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < units.len() {
            match &units[i] {
                Unit::Word(w) => i += self.combine_word(w, units, i, &mut out),
                Unit::WordNumber(w) => {
                    out.push(w.clone());
                    i += 1;
                }
                Unit::Month(m) => i += combine_month(m, units, i, &mut out),
                Unit::Between => i += combine_between(units, i, &mut out),
                Unit::Number(n) => i += combine_number(n, units, i, &mut out),
                Unit::GroupedDollars(n) => {
                    out.push(format!("{n} Dollars"));
                    // Skip the Dollars unit the composition pass
                    // synthesized right behind.
                    i += 2;
                }
                Unit::None
                | Unit::And
                | Unit::Percent
                | Unit::Dollars
                | Unit::Us
                | Unit::Hyphen => i += 1,
            }
        }
        out
    }

    /// Word: hyphen compound (2- or 3-way), otherwise a plain word
    /// that is stemmed only when written capitalized. Returns the
    /// number of consumed units.
    fn combine_word(&self, word: &str, units: &[Unit], i: usize, out: &mut Vec<String>) -> usize {
        let hyphen_follows = matches!(units.get(i + 1), Some(Unit::Hyphen))
            && matches!(units.get(i + 2), Some(Unit::Word(_)) | Some(Unit::Number(_)));
        if hyphen_follows {
            let second = units[i + 2].text().unwrap_or_default();
            if matches!(units.get(i + 3), Some(Unit::Hyphen))
                && matches!(units.get(i + 4), Some(Unit::Word(_)))
            {
                let third = units[i + 4].text().unwrap_or_default();
                out.push(format!("{word}-{second}-{third}").to_lowercase());
                return 5;
            }
            out.push(format!("{word}-{second}").to_lowercase());
            return 3;
        }
        let capitalized = word.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if self.stem && capitalized {
            out.push(self.stemmer.stem(word).to_string());
        } else {
            out.push(word.to_string());
        }
        1
    }
}

/// The number-composition pass: a cursor over the classified tokens
/// that produces a fresh unit sequence, never splicing in place.
fn compose_numbers(toks: &[Classified], fmt: &NumberFormat) -> Vec<Unit> {
    let mut out = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        match &toks[i] {
            Classified::Number(NumLit::Val(n)) => match toks.get(i + 1) {
                Some(Classified::WordNumber(w)) => {
                    let scaled = n * WORD_NUMBERS[w.as_str()];
                    out.push(Unit::Number(Num::scaled(format_magnitude(scaled))));
                    i += 2;
                }
                Some(Classified::Fraction(f)) => {
                    out.push(Unit::Number(Num::scaled(format!(
                        "{} {f}",
                        format_magnitude(*n)
                    ))));
                    i += 2;
                }
                _ => {
                    out.push(Unit::Number(Num::plain(*n)));
                    i += 1;
                }
            },
            Classified::Number(NumLit::Text(t)) => {
                out.push(Unit::Number(Num::scaled(t.clone())));
                i += 1;
            }
            Classified::Fraction(f) => {
                out.push(Unit::Number(Num::scaled(f.clone())));
                i += 1;
            }
            Classified::DollarNumber(n) => {
                let value = match toks.get(i + 1) {
                    Some(Classified::WordNumber(w)) => {
                        i += 2;
                        n * WORD_NUMBERS[w.as_str()]
                    }
                    _ => {
                        i += 1;
                        *n
                    }
                };
                out.push(Unit::Number(Num::scaled(format_magnitude(value))));
                out.push(Unit::Dollars);
            }
            Classified::DollarGrouped(n) => {
                let value = match toks.get(i + 1) {
                    Some(Classified::WordNumber(w)) => {
                        i += 2;
                        (*n as f64 * WORD_NUMBERS[w.as_str()]) as i64
                    }
                    _ => {
                        i += 1;
                        *n
                    }
                };
                out.push(Unit::GroupedDollars(format_grouped(value, fmt)));
                out.push(Unit::Dollars);
            }
            other => {
                out.push(map_unit(other));
                i += 1;
            }
        }
    }
    out
}

fn map_unit(tok: &Classified) -> Unit {
    match tok {
        Classified::Word(w) => Unit::Word(w.clone()),
        Classified::Month(m) => Unit::Month(m.clone()),
        Classified::WordNumber(w) => Unit::WordNumber(w.clone()),
        Classified::Between => Unit::Between,
        Classified::And => Unit::And,
        Classified::Percent => Unit::Percent,
        Classified::Dollars => Unit::Dollars,
        Classified::Us => Unit::Us,
        Classified::Hyphen => Unit::Hyphen,
        Classified::None => Unit::None,
        // Number variants are handled by the composition cursor.
        _ => Unit::None,
    }
}

/// Month followed by a number becomes `MM-DD` for days or `YYYY-MM`
/// for years; a lone month emits the month word.
fn combine_month(month: &str, units: &[Unit], i: usize, out: &mut Vec<String>) -> usize {
    let code = MONTHS[month];
    if let Some(Unit::Number(n)) = units.get(i + 1) {
        if let Some(num) = n.int.filter(|&v| v != 0) {
            if (1..=31).contains(&num) {
                out.push(format!("{code}-{num:02}"));
                return 2;
            }
            if num > 0 {
                out.push(format!("{num:04}-{code}"));
                return 2;
            }
        }
        // Number present but not usable as day or year; the month
        // produces nothing and the number is handled on its own.
        return 1;
    }
    out.push(month.to_string());
    1
}

/// `between NUMBER and NUMBER` collapses into a `lo-hi` range.
fn combine_between(units: &[Unit], i: usize, out: &mut Vec<String>) -> usize {
    if let (Some(Unit::Number(lo)), Some(Unit::And), Some(Unit::Number(hi))) =
        (units.get(i + 1), units.get(i + 2), units.get(i + 3))
    {
        out.push(format!("{}-{}", lo.range_text(), hi.range_text()).to_lowercase());
        return 4;
    }
    out.push("between".to_string());
    1
}

/// The number branch of the combination grammar. A number always
/// additionally emits its bare text (suffix-stripped when a price
/// suffix was consumed), so `10%` documents still match `10`.
fn combine_number(num: &Num, units: &[Unit], i: usize, out: &mut Vec<String>) -> usize {
    let display = num.display.as_str();
    let mut bare = display.to_string();
    let consumed = match (units.get(i + 1), units.get(i + 2)) {
        (Some(Unit::Dollars), _) => {
            if display.ends_with('M') || display.ends_with('B') {
                let body = &display[..display.len() - 1];
                if let Ok(v) = body.parse::<f64>() {
                    let millions = if display.ends_with('B') { v * 1_000.0 } else { v };
                    out.push(format!("{} M Dollars", format_short(millions)));
                }
                bare = body.to_string();
            } else {
                out.push(format!("{display} Dollars"));
            }
            2
        }
        (Some(Unit::Us), Some(Unit::Dollars)) => {
            out.push(format!("{display} Dollars"));
            3
        }
        (Some(Unit::Percent), _) => {
            out.push(format!("{display}%"));
            2
        }
        (Some(Unit::Hyphen), Some(second))
            if matches!(second, Unit::Number(_) | Unit::Word(_)) =>
        {
            let text = second.text().unwrap_or_default();
            out.push(format!("{display}-{text}").to_lowercase());
            3
        }
        (Some(Unit::Month(m)), _) => match num.int.filter(|&v| v != 0) {
            Some(day) => {
                if (1..=31).contains(&day) {
                    out.push(format!("{}-{day:02}", MONTHS[m.as_str()]));
                }
                2
            }
            None => 1,
        },
        _ => 1,
    };
    out.push(bare);
    consumed
}

fn strip_trailing_punct(term: &str) -> &str {
    term.strip_suffix(['.', ',']).unwrap_or(term)
}
