//! Constraint quality functions and their algebra.
//!
//! A quality function maps a dataset to one non-negative score per row,
//! with 0 meaning the row locally satisfies the constraint. [`Constraint`]
//! combines quality functions:
//!
//! - `a + b` averages the per-row scores
//! - `a * k` rescales by a scalar
//! - `a * b` takes the elementwise maximum
//!
//! Hints and hint parameters union under every operator, with the right
//! operand winning parameter conflicts.
//!
//! # Example
//!
//! ```ignore
//! use datarepair::quality::{Constraint, FunctionalDependency, Pattern};
//!
//! let fd = Constraint::atom(FunctionalDependency::new(["zip"], ["city"]));
//! let zip = Constraint::atom(Pattern::new("zip", r"\d{5}")?);
//! let both = fd * 2.0 + zip;
//! let scores = both.evaluate(&batch)?;
//! ```

// Statistical computation
#![allow(clippy::cast_precision_loss)]

mod dependency;
pub mod edit;
mod pattern;
mod statistical;

#[cfg(test)]
mod tests;

use std::{
    collections::BTreeSet,
    fmt,
    ops::{Add, Mul},
    sync::Arc,
};

use arrow::array::RecordBatch;

pub use dependency::{one_to_one, DictValue, FunctionalDependency, Shape};
pub use edit::{EditCost, Embedding, SimilarityMetric, VectorTable};
pub use pattern::{Date, Float, Pattern};
pub use statistical::{Correlation, CorrelationKind, NonParametric, Parametric};

use crate::{
    error::{Error, Result},
    transform::Step,
    value::Value,
};

/// Optional parameters a constraint offers the sampler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HintParams {
    /// Allowed domain of the constrained column.
    pub codebook: Option<BTreeSet<Value>>,
    /// Similarity threshold for near-duplicate pruning.
    pub threshold: Option<f64>,
}

impl HintParams {
    /// Unions two parameter sets; `other` wins on conflicts.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            codebook: other.codebook.or(self.codebook),
            threshold: other.threshold.or(self.threshold),
        }
    }
}

/// A per-row scoring rule over a dataset.
pub trait QualityFunction: Send + Sync + fmt::Debug {
    /// Short name for logs and reports.
    fn name(&self) -> String;

    /// Scores every row. Scores must be finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset lacks a required column.
    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>>;

    /// Columns the constraint depends on.
    fn hint(&self) -> BTreeSet<String>;

    /// Sampler parameters, empty by default.
    fn hint_params(&self) -> HintParams {
        HintParams::default()
    }

    /// A normalization step to run before searching on this constraint.
    fn format_cast(&self) -> Option<Arc<dyn Step>> {
        None
    }
}

/// A constraint expression over quality functions.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// A single quality function.
    Atom(Arc<dyn QualityFunction>),
    /// Per-row mean of two constraints.
    Mean(Box<Constraint>, Box<Constraint>),
    /// Per-row scores multiplied by a weight.
    Scaled(Box<Constraint>, f64),
    /// Per-row maximum of two constraints.
    Max(Box<Constraint>, Box<Constraint>),
}

impl Constraint {
    /// Wraps a quality function.
    pub fn atom(qf: impl QualityFunction + 'static) -> Self {
        Self::Atom(Arc::new(qf))
    }

    /// Raw per-row scores, without validation.
    ///
    /// # Errors
    ///
    /// Propagates quality function errors.
    pub fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        match self {
            Self::Atom(qf) => qf.score(batch),
            Self::Mean(a, b) => {
                let (a, b) = (a.score(batch)?, b.score(batch)?);
                zip_scores(&a, &b, |x, y| (x + y) / 2.0)
            }
            Self::Scaled(c, k) => Ok(c.score(batch)?.into_iter().map(|s| s * k).collect()),
            Self::Max(a, b) => {
                let (a, b) = (a.score(batch)?, b.score(batch)?);
                zip_scores(&a, &b, f64::max)
            }
        }
    }

    /// Per-row scores, checked for length and range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if a score is negative or not finite
    /// or the vector length does not match the row count.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let scores = self.score(batch)?;
        if scores.len() != batch.num_rows() {
            return Err(Error::evaluation(format!(
                "{}: expected {} scores, got {}",
                self,
                batch.num_rows(),
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(Error::evaluation(format!(
                "{}: invalid score {}",
                self, bad
            )));
        }
        Ok(scores)
    }

    /// Sum of validated scores.
    ///
    /// # Errors
    ///
    /// Same as [`Constraint::evaluate`].
    pub fn total(&self, batch: &RecordBatch) -> Result<f64> {
        Ok(self.evaluate(batch)?.iter().sum())
    }

    /// Union of the operand hints.
    pub fn hint(&self) -> BTreeSet<String> {
        match self {
            Self::Atom(qf) => qf.hint(),
            Self::Scaled(c, _) => c.hint(),
            Self::Mean(a, b) | Self::Max(a, b) => {
                let mut hint = a.hint();
                hint.extend(b.hint());
                hint
            }
        }
    }

    /// Merged hint parameters.
    pub fn hint_params(&self) -> HintParams {
        match self {
            Self::Atom(qf) => qf.hint_params(),
            Self::Scaled(c, _) => c.hint_params(),
            Self::Mean(a, b) | Self::Max(a, b) => a.hint_params().merge(b.hint_params()),
        }
    }

    /// Format casts declared by the atoms, left to right.
    pub fn format_casts(&self) -> Vec<Arc<dyn Step>> {
        match self {
            Self::Atom(qf) => qf.format_cast().into_iter().collect(),
            Self::Scaled(c, _) => c.format_casts(),
            Self::Mean(a, b) | Self::Max(a, b) => {
                let mut casts = a.format_casts();
                casts.extend(b.format_casts());
                casts
            }
        }
    }
}

fn zip_scores(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Result<Vec<f64>> {
    if a.len() != b.len() {
        return Err(Error::evaluation(format!(
            "operand score lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect())
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(qf) => write!(f, "{}", qf.name()),
            Self::Mean(a, b) => write!(f, "({} + {})", a, b),
            Self::Scaled(c, k) => write!(f, "{} * {}", c, k),
            Self::Max(a, b) => write!(f, "max({}, {})", a, b),
        }
    }
}

impl Add for Constraint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::Mean(Box::new(self), Box::new(rhs))
    }
}

impl Mul<f64> for Constraint {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::Scaled(Box::new(self), rhs)
    }
}

impl Mul for Constraint {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::Max(Box::new(self), Box::new(rhs))
    }
}

/// Scores a value column row by row: missing → 0.01, passing → 0, else 1.
pub(crate) fn predicate_scores(
    batch: &RecordBatch,
    column: &str,
    check: impl Fn(&Value) -> bool,
) -> Result<Vec<f64>> {
    Ok(crate::value::column_values(batch, column)?
        .iter()
        .map(|v| {
            if v.is_null() {
                MISSING_SCORE
            } else if check(v) {
                0.0
            } else {
                1.0
            }
        })
        .collect())
}

/// Score of a missing cell under a predicate-like constraint.
pub const MISSING_SCORE: f64 = 0.01;
