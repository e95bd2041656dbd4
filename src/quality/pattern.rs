//! Single-column format constraints. Each declares the cast that
//! normalizes its column before the search runs.

use std::{collections::BTreeSet, sync::Arc};

use arrow::array::RecordBatch;
use chrono::format::{parse, Parsed, StrftimeItems};
use regex::Regex;

use super::{predicate_scores, QualityFunction, MISSING_SCORE};
use crate::{
    error::{Error, Result},
    transform::{valid_strftime, DatetimeCast, FloatCast, PatternCast, Step},
    value::column_values,
};

/// Cells must match a regex at their start.
#[derive(Debug, Clone)]
pub struct Pattern {
    column: String,
    pattern: String,
    anchored: Regex,
}

impl Pattern {
    /// Creates a pattern constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid regex.
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let anchored = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| Error::invalid_config(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            column: column.into(),
            pattern,
            anchored,
        })
    }
}

impl QualityFunction for Pattern {
    fn name(&self) -> String {
        format!("Pattern({}, '{}')", self.column, self.pattern)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        predicate_scores(batch, &self.column, |v| {
            let text = v.to_string();
            !text.is_empty() && self.anchored.is_match(&text)
        })
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }

    fn format_cast(&self) -> Option<Arc<dyn Step>> {
        PatternCast::new(&self.column, &self.pattern)
            .ok()
            .map(|c| Arc::new(c) as Arc<dyn Step>)
    }
}

/// Cells must parse with a strftime format.
#[derive(Debug, Clone)]
pub struct Date {
    column: String,
    format: String,
}

impl Date {
    /// Creates a date constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a malformed format string.
    pub fn new(column: impl Into<String>, format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        if !valid_strftime(&format) {
            return Err(Error::invalid_config(format!(
                "invalid date format '{}'",
                format
            )));
        }
        Ok(Self {
            column: column.into(),
            format,
        })
    }

    fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let mut parsed = Parsed::new();
        parse(&mut parsed, text, StrftimeItems::new(&self.format)).is_ok()
    }
}

impl QualityFunction for Date {
    fn name(&self) -> String {
        format!("Date({}, '{}')", self.column, self.format)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        predicate_scores(batch, &self.column, |v| self.matches(&v.to_string()))
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }

    fn format_cast(&self) -> Option<Arc<dyn Step>> {
        DatetimeCast::new(&self.column, &self.format)
            .ok()
            .map(|c| Arc::new(c) as Arc<dyn Step>)
    }
}

/// Cells must be numbers inside an inclusive range.
#[derive(Debug, Clone)]
pub struct Float {
    column: String,
    min: f64,
    max: f64,
}

impl Float {
    /// Creates an unbounded numeric constraint.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Restricts the allowed range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

impl QualityFunction for Float {
    fn name(&self) -> String {
        format!("Float({}, [{}, {}])", self.column, self.min, self.max)
    }

    fn score(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
        // NaN is a missing number, not a malformed one.
        Ok(column_values(batch, &self.column)?
            .iter()
            .map(|v| match v.as_f64() {
                _ if v.is_null() || v.is_nan() => MISSING_SCORE,
                Some(f) if f >= self.min && f <= self.max => 0.0,
                _ => 1.0,
            })
            .collect())
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.column.clone()])
    }

    fn format_cast(&self) -> Option<Arc<dyn Step>> {
        Some(Arc::new(FloatCast::new(&self.column, self.min, self.max)))
    }
}
