//! Integrity constraints: functional dependencies, table shape and
//! dictionary membership.

use std::collections::{BTreeMap, BTreeSet};

use arrow::array::RecordBatch;

use super::{predicate_scores, Constraint, HintParams, QualityFunction};
use crate::{
    error::Result,
    value::{column_values, Row, Value},
};

/// `source → target`: every source tuple maps to one target tuple.
///
/// Each row scores `(fanout(source) - 1) / max_fanout`, where `fanout` is
/// the number of distinct target tuples seen with the row's source tuple.
#[derive(Debug, Clone)]
pub struct FunctionalDependency {
    source: Vec<String>,
    target: Vec<String>,
}

impl FunctionalDependency {
    /// Creates a dependency between two column lists.
    pub fn new<S, T>(source: S, target: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            source: source.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    fn tuples(batch: &RecordBatch, columns: &[String]) -> Result<Vec<Row>> {
        let cols = columns
            .iter()
            .map(|c| column_values(batch, c))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..batch.num_rows())
            .map(|i| cols.iter().map(|c| c[i].clone()).collect())
            .collect())
    }
}

impl QualityFunction for FunctionalDependency {
    fn name(&self) -> String {
        format!("FD({} -> {})", self.source.join(","), self.target.join(","))
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let sources = Self::tuples(batch, &self.source)?;
        let targets = Self::tuples(batch, &self.target)?;

        let mut fanout: BTreeMap<&Row, BTreeSet<&Row>> = BTreeMap::new();
        for (s, t) in sources.iter().zip(&targets) {
            fanout.entry(s).or_default().insert(t);
        }
        let max_fanout = fanout.values().map(BTreeSet::len).max().unwrap_or(1);

        #[allow(clippy::cast_precision_loss)]
        Ok(sources
            .iter()
            .map(|s| {
                let n = fanout.get(s).map_or(1, BTreeSet::len);
                (n - 1) as f64 / max_fanout as f64
            })
            .collect())
    }

    fn hint(&self) -> BTreeSet<String> {
        self.source.iter().chain(&self.target).cloned().collect()
    }
}

/// A bidirectional dependency: `FD(a → b) * FD(b → a)`.
pub fn one_to_one<A, B>(a: A, b: B) -> Constraint
where
    A: IntoIterator,
    A::Item: Into<String>,
    B: IntoIterator,
    B::Item: Into<String>,
{
    let a: Vec<String> = a.into_iter().map(Into::into).collect();
    let b: Vec<String> = b.into_iter().map(Into::into).collect();
    Constraint::atom(FunctionalDependency::new(a.clone(), b.clone()))
        * Constraint::atom(FunctionalDependency::new(b, a))
}

/// Every row scores 1 unless the table has exactly this shape.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    rows: usize,
    columns: usize,
}

impl Shape {
    /// Creates a shape constraint.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }
}

impl QualityFunction for Shape {
    fn name(&self) -> String {
        format!("Shape({}, {})", self.rows, self.columns)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let ok = batch.num_rows() == self.rows && batch.num_columns() == self.columns;
        Ok(vec![if ok { 0.0 } else { 1.0 }; batch.num_rows()])
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Values of a column must come from a codebook.
#[derive(Debug, Clone)]
pub struct DictValue {
    column: String,
    codebook: BTreeSet<Value>,
    threshold: Option<f64>,
}

impl DictValue {
    /// Creates a dictionary constraint.
    pub fn new(column: impl Into<String>, codebook: impl IntoIterator<Item = Value>) -> Self {
        Self {
            column: column.into(),
            codebook: codebook.into_iter().collect(),
            threshold: None,
        }
    }

    /// Sets the similarity threshold offered to the sampler.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

impl QualityFunction for DictValue {
    fn name(&self) -> String {
        format!("DictValue({}, {} values)", self.column, self.codebook.len())
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        predicate_scores(batch, &self.column, |v| self.codebook.contains(v))
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }

    fn hint_params(&self) -> HintParams {
        HintParams {
            codebook: Some(self.codebook.clone()),
            threshold: self.threshold,
        }
    }
}
