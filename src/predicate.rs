//! Row-scoping predicates derived from constraint scores.
//!
//! A predicate `(column, values, rows)` admits a row when the row's value in
//! `column` is one of `values` and the full row tuple is one of `rows`. The
//! sampler derives them from the split of a dataset into satisfied rows
//! (score ≈ 0) and violating rows.

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use arrow::array::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    value::{all_columns, quoted, row_tuples, transpose, Row, Value},
};

/// Scores at or below this are treated as satisfied.
pub const SATISFIED_TOLERANCE: f64 = 1e-9;

/// Which side of the score split predicates are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateScope {
    /// Values found only in satisfied rows, scoped to satisfied rows.
    Satisfied,
    /// Values found in violating rows, scoped to violating rows.
    Violated,
    /// Both derivations, satisfied first.
    #[default]
    Both,
}

/// A row-scoping predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Predicate {
    column: String,
    values: BTreeSet<Value>,
    rows: Arc<BTreeSet<Row>>,
}

impl Predicate {
    /// Creates a predicate.
    pub fn new(
        column: impl Into<String>,
        values: BTreeSet<Value>,
        rows: Arc<BTreeSet<Row>>,
    ) -> Self {
        Self {
            column: column.into(),
            values,
            rows,
        }
    }

    /// The scoped column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Allowed values of the scoped column.
    pub fn values(&self) -> &BTreeSet<Value> {
        &self.values
    }

    /// Permissible full row tuples.
    pub fn rows(&self) -> &BTreeSet<Row> {
        &self.rows
    }

    /// Structural rendering used in step keys.
    ///
    /// Extends the display form with the row-scope size and a fingerprint
    /// of the row tuples, so predicates that differ only in the rows they
    /// admit never share a key.
    pub fn scope_key(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.rows.hash(&mut hasher);
        format!("{}@{}#{:016x}", self, self.rows.len(), hasher.finish())
    }

    /// Returns true if the predicate is scoped on a missing value.
    pub fn scopes_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_null() || v.is_nan())
    }

    /// Per-row admission mask over a batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnNotFound`] if the scoped column is missing.
    pub fn mask(&self, batch: &RecordBatch) -> Result<Vec<bool>> {
        let idx = batch
            .schema()
            .index_of(&self.column)
            .map_err(|_| Error::column_not_found(&self.column))?;
        let rows = row_tuples(batch)?;

        Ok(rows
            .iter()
            .map(|row| self.values.contains(&row[idx]) && self.rows.contains(row))
            .collect())
    }

    /// Derives the predicates on `column` for the given side of the score
    /// split.
    ///
    /// `Satisfied` emits one predicate per value that appears only in
    /// satisfied rows, scoped to the satisfied row tuples. `Violated` emits
    /// one predicate per value seen in a violating row, scoped to the
    /// violating row tuples. Output is sorted by value.
    ///
    /// # Errors
    ///
    /// Returns an error if `scores` does not match the batch length or the
    /// column is missing.
    pub fn derive(
        batch: &RecordBatch,
        scores: &[f64],
        column: &str,
        scope: PredicateScope,
    ) -> Result<Vec<Self>> {
        let split = ScoreSplit::new(batch, scores)?;
        split.predicates(column, scope)
    }

    /// Derives predicates for several columns, in column order, sharing one
    /// score split.
    ///
    /// # Errors
    ///
    /// Same as [`Predicate::derive`].
    pub fn derive_all<'a>(
        batch: &RecordBatch,
        scores: &[f64],
        columns: impl IntoIterator<Item = &'a str>,
        scope: PredicateScope,
    ) -> Result<Vec<Self>> {
        let split = ScoreSplit::new(batch, scores)?;
        let mut out = Vec::new();
        for column in columns {
            out.extend(split.predicates(column, scope)?);
        }
        Ok(out)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(quoted).collect();
        write!(f, "('{}', {{{}}})", self.column, values.join(", "))
    }
}

/// Rows of a batch split by score sign.
struct ScoreSplit {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
    satisfied: Vec<bool>,
    satisfied_rows: Arc<BTreeSet<Row>>,
    violating_rows: Arc<BTreeSet<Row>>,
}

impl ScoreSplit {
    fn new(batch: &RecordBatch, scores: &[f64]) -> Result<Self> {
        if scores.len() != batch.num_rows() {
            return Err(Error::evaluation(format!(
                "expected {} scores, got {}",
                batch.num_rows(),
                scores.len()
            )));
        }

        let columns = all_columns(batch)?;
        let rows = transpose(&columns, batch.num_rows());
        let satisfied: Vec<bool> = scores.iter().map(|s| *s <= SATISFIED_TOLERANCE).collect();

        let mut satisfied_rows = BTreeSet::new();
        let mut violating_rows = BTreeSet::new();
        for (row, ok) in rows.into_iter().zip(&satisfied) {
            if *ok {
                satisfied_rows.insert(row);
            } else {
                violating_rows.insert(row);
            }
        }

        Ok(Self {
            names: batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect(),
            columns,
            satisfied,
            satisfied_rows: Arc::new(satisfied_rows),
            violating_rows: Arc::new(violating_rows),
        })
    }

    fn predicates(&self, column: &str, scope: PredicateScope) -> Result<Vec<Predicate>> {
        let idx = self
            .names
            .iter()
            .position(|n| n == column)
            .ok_or_else(|| Error::column_not_found(column))?;

        // value -> (seen in satisfied row, seen in violating row)
        let mut sides: BTreeMap<&Value, (bool, bool)> = BTreeMap::new();
        for (value, ok) in self.columns[idx].iter().zip(&self.satisfied) {
            let entry = sides.entry(value).or_default();
            if *ok {
                entry.0 = true;
            } else {
                entry.1 = true;
            }
        }

        let mut out = Vec::new();
        if matches!(scope, PredicateScope::Satisfied | PredicateScope::Both) {
            out.extend(
                sides
                    .iter()
                    .filter(|(_, (inside, outside))| *inside && !*outside)
                    .map(|(v, _)| self.single(column, v, &self.satisfied_rows)),
            );
        }
        if matches!(scope, PredicateScope::Violated | PredicateScope::Both) {
            out.extend(
                sides
                    .iter()
                    .filter(|(_, (_, outside))| *outside)
                    .map(|(v, _)| self.single(column, v, &self.violating_rows)),
            );
        }
        Ok(out)
    }

    fn single(&self, column: &str, value: &Value, rows: &Arc<BTreeSet<Row>>) -> Predicate {
        Predicate::new(column, BTreeSet::from([value.clone()]), Arc::clone(rows))
    }
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::StringArray,
        datatypes::{DataType, Field, Schema},
    };

    use super::*;

    fn batch(xs: &[&str], ys: &[&str]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("X", DataType::Utf8, true),
            Field::new("Y", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(xs.to_vec())),
                Arc::new(StringArray::from(ys.to_vec())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_satisfied_derivation_excludes_violating_values() {
        let b = batch(&["A", "B", "A", "C"], &["1", "2", "3", "4"]);
        let scores = [0.0, 1.0, 0.0, 1.0];

        let preds = Predicate::derive(&b, &scores, "X", PredicateScope::Satisfied).unwrap();
        assert_eq!(preds.len(), 1);
        let p = &preds[0];
        assert_eq!(p.column(), "X");
        assert_eq!(p.values(), &BTreeSet::from([Value::str("A")]));
        assert_eq!(p.rows().len(), 2);
        assert!(p.rows().iter().all(|r| r[0] == Value::str("A")));
    }

    #[test]
    fn test_shared_value_is_not_satisfied_only() {
        let b = batch(&["A", "A"], &["1", "2"]);
        let preds = Predicate::derive(&b, &[0.0, 0.5], "X", PredicateScope::Satisfied).unwrap();
        assert!(preds.is_empty());

        let violated = Predicate::derive(&b, &[0.0, 0.5], "X", PredicateScope::Violated).unwrap();
        assert_eq!(violated.len(), 1);
        assert_eq!(violated[0].rows().len(), 1);
    }

    #[test]
    fn test_both_lists_satisfied_first() {
        let b = batch(&["A", "B"], &["1", "2"]);
        let preds = Predicate::derive(&b, &[0.0, 1.0], "X", PredicateScope::Both).unwrap();
        assert_eq!(preds.len(), 2);
        assert!(preds[0].values().contains(&Value::str("A")));
        assert!(preds[1].values().contains(&Value::str("B")));
    }

    #[test]
    fn test_mask_requires_value_and_tuple() {
        let b = batch(&["A", "B", "A"], &["1", "2", "3"]);
        let preds = Predicate::derive(&b, &[1.0, 0.0, 0.0], "X", PredicateScope::Violated).unwrap();
        assert_eq!(preds.len(), 1);
        // row 2 has X = A but its tuple is not a violating tuple
        assert_eq!(preds[0].mask(&b).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn test_score_length_mismatch() {
        let b = batch(&["A"], &["1"]);
        assert!(Predicate::derive(&b, &[0.0, 0.0], "X", PredicateScope::Both).is_err());
    }

    #[test]
    fn test_unknown_column() {
        let b = batch(&["A"], &["1"]);
        assert!(matches!(
            Predicate::derive(&b, &[0.0], "Z", PredicateScope::Both),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_display() {
        let p = Predicate::new(
            "state",
            BTreeSet::from([Value::str("NY")]),
            Arc::new(BTreeSet::new()),
        );
        assert_eq!(p.to_string(), "('state', {'NY'})");
        assert!(p.scope_key().starts_with("('state', {'NY'})@0#"));
        assert!(!p.scopes_missing());
    }

    #[test]
    fn test_scope_key_tracks_rows() {
        let b = batch(&["A", "A"], &["1", "2"]);
        let first = Predicate::derive(&b, &[1.0, 0.0], "X", PredicateScope::Violated).unwrap();
        let second = Predicate::derive(&b, &[0.0, 1.0], "X", PredicateScope::Violated).unwrap();

        assert_eq!(first[0].to_string(), second[0].to_string());
        assert_ne!(first[0].scope_key(), second[0].scope_key());
        assert_eq!(first[0].scope_key(), first[0].clone().scope_key());
    }
}
