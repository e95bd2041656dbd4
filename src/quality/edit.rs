//! Edit cost: per-row divergence of a candidate from a reference dataset.
//!
//! Each column contributes a divergence in `[0, 1]`, divided by the column
//! count, so a row scores in `[0, 1]`. Identical cells contribute 0. A cell
//! missing or empty on one side only contributes a full column share.
//! Otherwise the column's metric decides:
//!
//! - `edit`: normalized Levenshtein distance of the rendered values
//! - `jaccard`: 1 minus the Jaccard index of lowercase whitespace tokens
//! - `semantic`: 1 minus the mean embedding similarity over token pairs,
//!   each similarity rescaled from `[-1, 1]` to `[0, 1]` (lookup misses
//!   count 0, no pairs at all counts as full divergence)

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    io::BufRead,
    path::Path,
    str::FromStr,
    sync::Arc,
};

use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};

use super::QualityFunction;
use crate::{
    error::{Error, Result},
    value::{all_columns, Value},
};

/// Per-column similarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Normalized Levenshtein distance.
    #[default]
    Edit,
    /// Token-set Jaccard distance.
    Jaccard,
    /// Embedding distance over token pairs.
    Semantic,
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "edit" => Ok(Self::Edit),
            "jaccard" => Ok(Self::Jaccard),
            "semantic" => Ok(Self::Semantic),
            other => Err(Error::invalid_config(format!(
                "unknown similarity metric '{}'",
                other
            ))),
        }
    }
}

/// Word similarity provider.
pub trait Embedding: Send + Sync + fmt::Debug {
    /// Similarity in `[-1, 1]`, or `None` when a word is unknown.
    fn similarity(&self, a: &str, b: &str) -> Option<f64>;
}

/// In-memory word vectors with cosine similarity.
#[derive(Debug, Clone, Default)]
pub struct VectorTable {
    vectors: HashMap<String, Vec<f32>>,
    dimension: Option<usize>,
}

impl VectorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a word vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the vector is empty or its
    /// dimension differs from earlier vectors.
    pub fn insert(&mut self, word: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let word = word.into();
        match self.dimension {
            _ if vector.is_empty() => {
                return Err(Error::invalid_config(format!(
                    "empty vector for '{}'",
                    word
                )))
            }
            Some(d) if d != vector.len() => {
                return Err(Error::invalid_config(format!(
                    "vector for '{}' has dimension {}, expected {}",
                    word,
                    vector.len(),
                    d
                )))
            }
            _ => self.dimension = Some(vector.len()),
        }
        self.vectors.insert(word, vector);
        Ok(())
    }

    /// Reads the whitespace-separated text format, one `word f1 f2 ...`
    /// per line. A leading `count dimension` header line is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable input or malformed numbers.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut table = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::Io {
                path: None,
                source: e,
            })?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let rest: Vec<&str> = parts.collect();
            if lineno == 0 && rest.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }
            let vector = rest
                .iter()
                .map(|x| {
                    x.parse::<f32>().map_err(|_| {
                        Error::invalid_config(format!(
                            "line {}: '{}' is not a number",
                            lineno + 1,
                            x
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            table.insert(word, vector)?;
        }
        Ok(table)
    }

    /// Loads the text format from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if the table has no words.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

impl Embedding for VectorTable {
    fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        let (va, vb) = (self.vectors.get(a)?, self.vectors.get(b)?);
        let dot: f64 = va
            .iter()
            .zip(vb)
            .map(|(x, y)| f64::from(*x) * f64::from(*y))
            .sum();
        let na = va.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        let nb = vb.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
        if na == 0.0 || nb == 0.0 {
            return None;
        }
        Some((dot / (na * nb)).clamp(-1.0, 1.0))
    }
}

/// Character-level Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Levenshtein distance divided by the longer length, in `[0, 1]`.
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    levenshtein(a, b) as f64 / longest as f64
}

fn tokens(s: &str) -> BTreeSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// One minus the Jaccard index of lowercase whitespace tokens.
pub fn jaccard_distance(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    1.0 - ta.intersection(&tb).count() as f64 / union as f64
}

/// One minus the mean rescaled similarity over all token pairs.
pub fn semantic_distance(a: &str, b: &str, embedding: &dyn Embedding) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    let pairs = ta.len() * tb.len();
    if pairs == 0 {
        return 1.0;
    }
    let total: f64 = ta
        .iter()
        .flat_map(|x| tb.iter().map(move |y| (x, y)))
        .map(|(x, y)| embedding.similarity(x, y).map_or(0.0, |s| (s + 1.0) / 2.0))
        .sum();
    1.0 - total / pairs as f64
}

/// Divergence penalty against a fixed reference dataset.
#[derive(Debug, Clone)]
pub struct EditCost {
    reference: Vec<Vec<Value>>,
    rows: usize,
    metrics: Vec<SimilarityMetric>,
    names: Vec<String>,
    embedding: Option<Arc<dyn Embedding>>,
}

impl EditCost {
    /// Creates an edit cost against `reference`.
    ///
    /// Columns not named in `similarity` use [`SimilarityMetric::Edit`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnNotFound`] for a metric on an unknown column
    /// and [`Error::InvalidConfig`] for a semantic metric without an
    /// embedding.
    pub fn new(
        reference: &RecordBatch,
        similarity: &BTreeMap<String, SimilarityMetric>,
        embedding: Option<Arc<dyn Embedding>>,
    ) -> Result<Self> {
        let schema = reference.schema();
        let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

        if let Some(unknown) = similarity.keys().find(|c| !names.contains(c)) {
            return Err(Error::column_not_found(unknown.as_str()));
        }
        if embedding.is_none() && similarity.values().any(|m| *m == SimilarityMetric::Semantic) {
            return Err(Error::invalid_config(
                "semantic similarity requires an embedding",
            ));
        }

        let metrics = names
            .iter()
            .map(|n| similarity.get(n).copied().unwrap_or_default())
            .collect();

        Ok(Self {
            reference: all_columns(reference)?,
            rows: reference.num_rows(),
            metrics,
            names,
            embedding,
        })
    }

    /// Divergence of one cell pair under `metric`, in `[0, 1]`.
    pub fn divergence(&self, candidate: &Value, reference: &Value, metric: SimilarityMetric) -> f64 {
        if candidate == reference {
            return 0.0;
        }
        match (candidate.is_blank(), reference.is_blank()) {
            (true, true) => return 0.0,
            (true, false) | (false, true) => return 1.0,
            (false, false) => {}
        }
        let (c, r) = (candidate.to_string(), reference.to_string());
        if c == r {
            return 0.0;
        }
        match metric {
            SimilarityMetric::Edit => normalized_levenshtein(&c, &r),
            SimilarityMetric::Jaccard => jaccard_distance(&c, &r),
            SimilarityMetric::Semantic => match &self.embedding {
                Some(e) => semantic_distance(&c, &r, e.as_ref()),
                None => normalized_levenshtein(&c, &r),
            },
        }
    }
}

impl QualityFunction for EditCost {
    fn name(&self) -> String {
        "EditCost".to_string()
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let n = batch.num_rows();
        if n != self.rows || batch.num_columns() != self.reference.len() {
            return Ok(vec![1.0; n]);
        }
        if self.reference.is_empty() {
            return Ok(vec![0.0; n]);
        }

        let p = self.reference.len() as f64;
        let candidate = all_columns(batch)?;
        let mut scores = vec![0.0; n];
        for ((cand, refr), metric) in candidate.iter().zip(&self.reference).zip(&self.metrics) {
            for (i, score) in scores.iter_mut().enumerate() {
                *score += self.divergence(&cand[i], &refr[i], *metric) / p;
            }
        }
        Ok(scores)
    }

    fn hint(&self) -> BTreeSet<String> {
        self.names.iter().cloned().collect()
    }
}
