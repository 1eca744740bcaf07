//! # Category classifier
//!
//! Multinomial naive Bayes over headline tokens, trained at startup from a
//! small labelled seed (`classifier_seed.json`, embedded at compile time).
//!
//! - Tokens: lower-cased word characters, stopwords dropped, light suffix stemming.
//! - Laplace smoothing; words never seen in training are ignored.
//! - Ties resolve to the label that appeared first in the training data.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{IngestError, Result};

/// Category stored when the classifier itself fails.
pub const FALLBACK_CATEGORY: &str = "General";

static SEED: &str = include_str!("../classifier_seed.json");

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

pub trait Classifier: Send + Sync {
    /// Return the best category for `text`.
    fn classify(&self, text: &str) -> Result<String>;
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LabeledText {
    pub text: String,
    pub label: String,
}

#[derive(Debug, Default)]
struct LabelStats {
    docs: usize,
    tokens: usize,
    counts: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct NaiveBayes {
    /// Training order; used as the tie-breaker.
    labels: Vec<String>,
    stats: HashMap<String, LabelStats>,
    vocab_size: usize,
    total_docs: usize,
}

impl NaiveBayes {
    pub fn train(examples: &[LabeledText]) -> Self {
        let mut labels = Vec::new();
        let mut stats: HashMap<String, LabelStats> = HashMap::new();
        let mut vocab: HashMap<String, ()> = HashMap::new();

        for ex in examples {
            let label = ex.label.trim();
            if label.is_empty() {
                continue;
            }
            if !stats.contains_key(label) {
                labels.push(label.to_string());
            }
            let st = stats.entry(label.to_string()).or_default();
            st.docs += 1;
            for tok in tokenize(&ex.text) {
                st.tokens += 1;
                *st.counts.entry(tok.clone()).or_insert(0) += 1;
                vocab.insert(tok, ());
            }
        }

        let total_docs = stats.values().map(|s| s.docs).sum();
        Self {
            labels,
            stats,
            vocab_size: vocab.len(),
            total_docs,
        }
    }

    /// Model trained on the embedded seed.
    pub fn from_seed() -> Self {
        let examples: Vec<LabeledText> =
            serde_json::from_str(SEED).expect("valid embedded classifier seed");
        Self::train(&examples)
    }

    /// Train from a JSON file of `{text, label}` objects.
    /// Falls back to the embedded seed when the file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<LabeledText>>(&s).ok())
        {
            Some(examples) if !examples.is_empty() => Self::train(&examples),
            _ => {
                tracing::warn!(path = %path.display(), "classifier seed unreadable, using embedded seed");
                Self::from_seed()
            }
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn known(&self, tok: &str) -> bool {
        self.stats.values().any(|s| s.counts.contains_key(tok))
    }

    /// Log-probability per label, in training order.
    pub fn scores(&self, text: &str) -> Vec<(String, f64)> {
        let toks: Vec<String> = tokenize(text).filter(|t| self.known(t)).collect();
        let v = self.vocab_size.max(1) as f64;

        self.labels
            .iter()
            .map(|label| {
                let st = &self.stats[label];
                let mut lp = (st.docs as f64 / self.total_docs.max(1) as f64).ln();
                let denom = st.tokens as f64 + v;
                for t in &toks {
                    let c = st.counts.get(t).copied().unwrap_or(0) as f64;
                    lp += ((c + 1.0) / denom).ln();
                }
                (label.clone(), lp)
            })
            .collect()
    }
}

impl Classifier for NaiveBayes {
    fn classify(&self, text: &str) -> Result<String> {
        let mut best: Option<(String, f64)> = None;
        for (label, lp) in self.scores(text) {
            // strict > keeps the earliest label on ties
            let better = match &best {
                None => true,
                Some((_, b)) => lp > *b,
            };
            if better {
                best = Some((label, lp));
            }
        }
        best.map(|(l, _)| l)
            .ok_or_else(|| IngestError::Classification("model has no labels".into()))
    }
}

fn is_stopword(tok: &str) -> bool {
    matches!(
        tok,
        "a" | "an"
            | "and"
            | "are"
            | "as"
            | "at"
            | "be"
            | "by"
            | "for"
            | "from"
            | "in"
            | "is"
            | "it"
            | "of"
            | "on"
            | "or"
            | "the"
            | "to"
            | "was"
            | "with"
    )
}

fn stem(tok: &str) -> String {
    let n = tok.chars().count();
    if n > 5 {
        if let Some(s) = tok.strip_suffix("ing") {
            return s.to_string();
        }
        if let Some(s) = tok.strip_suffix("ed") {
            return s.to_string();
        }
    }
    if n > 4 {
        if let Some(s) = tok.strip_suffix("ies") {
            return format!("{s}y");
        }
        if let Some(s) = tok.strip_suffix("es") {
            return s.to_string();
        }
    }
    if n > 3 && !tok.ends_with("ss") {
        if let Some(s) = tok.strip_suffix('s') {
            return s.to_string();
        }
    }
    tok.to_string()
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| !is_stopword(t))
        .map(|t| stem(&t))
}
