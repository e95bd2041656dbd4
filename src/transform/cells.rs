//! Cell-level repair steps: value substitution, deletion, substring
//! replacement and group majority.

use std::collections::BTreeMap;

use arrow::{array::RecordBatch, datatypes::DataType};

use super::{Step, StepKey, Transform};
use crate::{
    error::{Error, Result},
    predicate::Predicate,
    value::{all_columns, column_values, quoted, replace_column, transpose, Row, Value},
};

/// Sets `column` to `value` on every row admitted by `predicate`.
#[derive(Debug, Clone)]
pub struct Swap {
    column: String,
    predicate: Predicate,
    value: Value,
}

impl Swap {
    /// Creates a swap step.
    pub fn new(column: impl Into<String>, predicate: Predicate, value: Value) -> Self {
        Self {
            column: column.into(),
            predicate,
            value,
        }
    }
}

impl Transform for Swap {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let mask = self.predicate.mask(&batch)?;
        let mut values = column_values(&batch, &self.column)?;
        for (cell, hit) in values.iter_mut().zip(mask) {
            if hit {
                *cell = self.value.clone();
            }
        }
        replace_column(&batch, &self.column, &values, None)
    }
}

impl Step for Swap {
    fn key(&self) -> StepKey {
        StepKey::new(
            "swap",
            format!(
                "'{}',{},{}",
                self.column,
                quoted(&self.value),
                self.predicate.scope_key()
            ),
        )
    }
}

/// Sets `column` to missing on every row admitted by `predicate`.
#[derive(Debug, Clone)]
pub struct Delete {
    column: String,
    predicate: Predicate,
}

impl Delete {
    /// Creates a delete step.
    pub fn new(column: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            column: column.into(),
            predicate,
        }
    }
}

impl Transform for Delete {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let mask = self.predicate.mask(&batch)?;
        let mut values = column_values(&batch, &self.column)?;
        for (cell, hit) in values.iter_mut().zip(mask) {
            if hit {
                *cell = Value::Null;
            }
        }
        replace_column(&batch, &self.column, &values, None)
    }
}

impl Step for Delete {
    fn key(&self) -> StepKey {
        StepKey::new(
            "delete",
            format!("'{}',{}", self.column, self.predicate.scope_key()),
        )
    }
}

/// Replaces every occurrence of `from` with `to` in the string cells of
/// `column`.
#[derive(Debug, Clone)]
pub struct Replace {
    column: String,
    from: String,
    to: String,
}

impl Replace {
    /// Creates a find-and-replace step.
    pub fn new(column: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Transform for Replace {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let idx = batch
            .schema()
            .index_of(&self.column)
            .map_err(|_| Error::column_not_found(&self.column))?;
        let data_type = batch.schema().field(idx).data_type().clone();
        if data_type != DataType::Utf8 {
            return Err(Error::transform(format!(
                "cannot replace substrings in {} column '{}'",
                data_type, self.column
            )));
        }
        if self.from.is_empty() {
            return Err(Error::transform("empty search substring"));
        }

        let values: Vec<Value> = column_values(&batch, &self.column)?
            .into_iter()
            .map(|v| match v {
                Value::Str(s) => Value::Str(s.replace(&self.from, &self.to)),
                other => other,
            })
            .collect();
        replace_column(&batch, &self.column, &values, None)
    }
}

impl Step for Replace {
    fn key(&self) -> StepKey {
        StepKey::new(
            "replace",
            format!("'{}','{}','{}'", self.column, self.from, self.to),
        )
    }
}

/// Within each group of rows sharing the `key` tuple, sets `column` to the
/// group's most frequent non-missing value. Ties go to the smallest value.
#[derive(Debug, Clone)]
pub struct Majority {
    key: Vec<String>,
    column: String,
}

impl Majority {
    /// Creates a majority-vote step.
    pub fn new(key: Vec<String>, column: impl Into<String>) -> Self {
        Self {
            key,
            column: column.into(),
        }
    }

    fn index_of(batch: &RecordBatch, name: &str) -> Result<usize> {
        batch
            .schema()
            .index_of(name)
            .map_err(|_| Error::column_not_found(name))
    }
}

impl Transform for Majority {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        if self.key.is_empty() {
            return Err(Error::transform("majority vote needs at least one key column"));
        }
        let target = Self::index_of(&batch, &self.column)?;
        let key_idx = self
            .key
            .iter()
            .map(|k| Self::index_of(&batch, k))
            .collect::<Result<Vec<_>>>()?;

        let columns = all_columns(&batch)?;
        let rows = transpose(&columns, batch.num_rows());
        let group_of = |row: &Row| -> Row { key_idx.iter().map(|&i| row[i].clone()).collect() };

        let mut counts: BTreeMap<Row, BTreeMap<&Value, usize>> = BTreeMap::new();
        for row in &rows {
            let cell = &row[target];
            if cell.is_null() {
                continue;
            }
            *counts
                .entry(group_of(row))
                .or_default()
                .entry(cell)
                .or_default() += 1;
        }

        // BTreeMap iteration is ascending, so the first maximum is the
        // smallest value.
        let winners: BTreeMap<Row, Value> = counts
            .into_iter()
            .filter_map(|(group, tally)| {
                let mut best: Option<(&Value, usize)> = None;
                for (value, count) in tally {
                    if best.map_or(true, |(_, c)| count > c) {
                        best = Some((value, count));
                    }
                }
                best.map(|(v, _)| (group, v.clone()))
            })
            .collect();

        let values: Vec<Value> = rows
            .iter()
            .map(|row| {
                winners
                    .get(&group_of(row))
                    .cloned()
                    .unwrap_or_else(|| row[target].clone())
            })
            .collect();
        replace_column(&batch, &self.column, &values, None)
    }
}

impl Step for Majority {
    fn key(&self) -> StepKey {
        let key: Vec<String> = self.key.iter().map(|k| format!("'{}'", k)).collect();
        StepKey::new("majority", format!("[{}],'{}'", key.join(", "), self.column))
    }
}
