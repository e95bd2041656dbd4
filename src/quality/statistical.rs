//! Statistical constraints on numeric columns.
//!
//! Non-numeric and missing cells never fire.

use std::collections::BTreeSet;

use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};

use super::QualityFunction;
use crate::{error::Result, value::column_values};

fn numbers(batch: &RecordBatch, column: &str) -> Result<Vec<Option<f64>>> {
    Ok(column_values(batch, column)?
        .iter()
        .map(|v| v.as_f64().filter(|f| !f.is_nan()))
        .collect())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Flags cells farther than `tolerance` deviations from `center`.
fn outliers(values: &[Option<f64>], center: f64, spread: f64, tolerance: f64) -> Vec<f64> {
    values
        .iter()
        .map(|v| match v {
            Some(x) if (x - center).abs() > spread * tolerance => 1.0,
            _ => 0.0,
        })
        .collect()
}

/// Gaussian outlier rule: outside mean ± tolerance·σ scores 1.
#[derive(Debug, Clone)]
pub struct Parametric {
    column: String,
    tolerance: f64,
}

impl Parametric {
    /// Creates the constraint.
    pub fn new(column: impl Into<String>, tolerance: f64) -> Self {
        Self {
            column: column.into(),
            tolerance,
        }
    }
}

impl QualityFunction for Parametric {
    fn name(&self) -> String {
        format!("Parametric({}, {})", self.column, self.tolerance)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let values = numbers(batch, &self.column)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Ok(vec![0.0; values.len()]);
        }
        Ok(outliers(
            &values,
            mean(&present),
            std_dev(&present),
            self.tolerance,
        ))
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }
}

/// Robust outlier rule: outside median ± tolerance·MAD scores 1.
#[derive(Debug, Clone)]
pub struct NonParametric {
    column: String,
    tolerance: f64,
}

impl NonParametric {
    /// Creates the constraint.
    pub fn new(column: impl Into<String>, tolerance: f64) -> Self {
        Self {
            column: column.into(),
            tolerance,
        }
    }
}

impl QualityFunction for NonParametric {
    fn name(&self) -> String {
        format!("NonParametric({}, {})", self.column, self.tolerance)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let values = numbers(batch, &self.column)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Ok(vec![0.0; values.len()]);
        }
        let center = median(&present);
        let deviations: Vec<f64> = present.iter().map(|v| (v - center).abs()).collect();
        Ok(outliers(&values, center, median(&deviations), self.tolerance))
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }
}

/// Expected sign of a correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    /// Both columns rise together.
    #[default]
    Positive,
    /// One column falls as the other rises.
    Negative,
}

/// Soft correlation hint between two numeric columns.
///
/// Rows whose median-centered product has the wrong sign score
/// `|a - med a| + |b - med b|`, normalized by the largest such score.
#[derive(Debug, Clone)]
pub struct Correlation {
    a: String,
    b: String,
    kind: CorrelationKind,
}

impl Correlation {
    /// Creates the constraint.
    pub fn new(a: impl Into<String>, b: impl Into<String>, kind: CorrelationKind) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            kind,
        }
    }
}

impl QualityFunction for Correlation {
    fn name(&self) -> String {
        format!("Correlation({}, {}, {:?})", self.a, self.b, self.kind)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        let xs = numbers(batch, &self.a)?;
        let ys = numbers(batch, &self.b)?;
        let px: Vec<f64> = xs.iter().flatten().copied().collect();
        let py: Vec<f64> = ys.iter().flatten().copied().collect();
        if px.is_empty() || py.is_empty() {
            return Ok(vec![0.0; xs.len()]);
        }
        let (mx, my) = (median(&px), median(&py));

        let mut scores: Vec<f64> = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => {
                    let (dx, dy) = (x - mx, y - my);
                    let wrong = match self.kind {
                        CorrelationKind::Positive => dx * dy < 0.0,
                        CorrelationKind::Negative => dx * dy > 0.0,
                    };
                    if wrong {
                        dx.abs() + dy.abs()
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            })
            .collect();

        let max = scores.iter().copied().fold(0.0, f64::max);
        if max > 0.0 {
            for s in &mut scores {
                *s /= max;
            }
        }
        Ok(scores)
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.a.clone(), self.b.clone()])
    }
}
