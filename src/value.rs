//! Cell values and conversion between Arrow arrays and plain values.
//!
//! Search code reasons about individual cells (distinct values, row tuples,
//! substitutions), so columns are read into [`Value`]s and rebuilt into
//! Arrow arrays of the column's type after an edit.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
        RecordBatch, StringArray,
    },
    compute::cast,
    datatypes::{DataType, Field, Schema},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single cell.
///
/// `Null` is the missing value. It is distinct from `Float(NaN)` and from
/// `Str("")`. Values are totally ordered (by variant, then by content) and
/// NaN compares equal to itself, so they can live in ordered sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Integer cell (all Arrow integer widths are read as i64).
    Int(i64),
    /// Floating point cell.
    Float(f64),
    /// String cell.
    Str(String),
}

/// A full row, one value per column in schema order.
pub type Row = Vec<Value>;

impl Value {
    /// Convenience constructor for string cells.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Returns true for the missing value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for a floating point NaN.
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Returns true for a missing value or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numeric view of integer and float cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view that also parses string cells.
    pub fn parse_f64(&self) -> Option<f64> {
        match self {
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
    }

    /// String view of string cells.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
        }
    }

    fn float_key(f: f64) -> f64 {
        if f.is_nan() {
            f64::NAN
        } else {
            f
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => {
                Self::float_key(*a).total_cmp(&Self::float_key(*b))
            }
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => Self::float_key(*f).to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Short quoted rendering used in operation names.
pub(crate) fn quoted(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Str(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn collect<A, F>(array: &dyn Array, read: F) -> Result<Vec<Value>>
where
    A: Array + 'static,
    F: Fn(&A, usize) -> Value,
{
    let typed = array.as_any().downcast_ref::<A>().ok_or_else(|| {
        Error::schema_mismatch(format!("unexpected array layout for {}", array.data_type()))
    })?;

    Ok((0..typed.len())
        .map(|i| {
            if typed.is_null(i) {
                Value::Null
            } else {
                read(typed, i)
            }
        })
        .collect())
}

/// Reads every cell of an Arrow array.
///
/// Narrow integer types are widened to `Int`, other types without a native
/// [`Value`] variant are read through a cast to Utf8.
///
/// # Errors
///
/// Returns an error if the array cannot be cast to a readable type.
pub fn values_of(array: &dyn Array) -> Result<Vec<Value>> {
    match array.data_type() {
        DataType::Utf8 => collect::<StringArray, _>(array, |a, i| Value::Str(a.value(i).to_string())),
        DataType::Int64 => collect::<Int64Array, _>(array, |a, i| Value::Int(a.value(i))),
        DataType::Int32 => collect::<Int32Array, _>(array, |a, i| Value::Int(i64::from(a.value(i)))),
        DataType::Float64 => collect::<Float64Array, _>(array, |a, i| Value::Float(a.value(i))),
        DataType::Float32 => {
            collect::<Float32Array, _>(array, |a, i| Value::Float(f64::from(a.value(i))))
        }
        DataType::Boolean => collect::<BooleanArray, _>(array, |a, i| Value::Bool(a.value(i))),
        DataType::Null => Ok(vec![Value::Null; array.len()]),
        DataType::Int8
        | DataType::Int16
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let widened = cast(array, &DataType::Int64)?;
            values_of(widened.as_ref())
        }
        _ => {
            let text = cast(array, &DataType::Utf8)?;
            values_of(text.as_ref())
        }
    }
}

fn mismatch(column: &str, value: &Value, data_type: &DataType) -> Error {
    Error::TypeMismatch {
        column: column.to_string(),
        value: quoted(value),
        data_type: data_type.to_string(),
    }
}

/// Builds an Arrow array of `data_type` from cells.
///
/// Integers widen into float columns and any value may be stored in a Utf8
/// column (rendered with `Display`). Every other mismatch is an error.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] when a value does not fit the type.
pub fn array_of(column: &str, values: &[Value], data_type: &DataType) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::Str(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<Option<String>>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(i) => Ok(Some(*i)),
                    other => Err(mismatch(column, other, data_type)),
                })
                .collect::<Result<Vec<Option<i64>>>>()?,
        )),
        DataType::Int32 => Arc::new(Int32Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(i) => i32::try_from(*i)
                        .map(Some)
                        .map_err(|_| mismatch(column, v, data_type)),
                    other => Err(mismatch(column, other, data_type)),
                })
                .collect::<Result<Vec<Option<i32>>>>()?,
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(_) | Value::Float(_) => Ok(v.as_f64()),
                    other => Err(mismatch(column, other, data_type)),
                })
                .collect::<Result<Vec<Option<f64>>>>()?,
        )),
        #[allow(clippy::cast_possible_truncation)]
        DataType::Float32 => Arc::new(Float32Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(_) | Value::Float(_) => Ok(v.as_f64().map(|f| f as f32)),
                    other => Err(mismatch(column, other, data_type)),
                })
                .collect::<Result<Vec<Option<f32>>>>()?,
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Bool(b) => Ok(Some(*b)),
                    other => Err(mismatch(column, other, data_type)),
                })
                .collect::<Result<Vec<Option<bool>>>>()?,
        )),
        other => {
            let text = array_of(column, values, &DataType::Utf8)?;
            cast(text.as_ref(), other)?
        }
    };

    Ok(array)
}

/// Reads one column of a batch by name.
///
/// # Errors
///
/// Returns [`Error::ColumnNotFound`] if the column does not exist.
pub fn column_values(batch: &RecordBatch, column: &str) -> Result<Vec<Value>> {
    let idx = batch
        .schema()
        .index_of(column)
        .map_err(|_| Error::column_not_found(column))?;
    values_of(batch.column(idx).as_ref())
}

/// Reads every column of a batch, in schema order.
///
/// # Errors
///
/// Returns an error if any column cannot be read.
pub fn all_columns(batch: &RecordBatch) -> Result<Vec<Vec<Value>>> {
    batch
        .columns()
        .iter()
        .map(|c| values_of(c.as_ref()))
        .collect()
}

/// Transposes a batch into full row tuples.
///
/// # Errors
///
/// Returns an error if any column cannot be read.
pub fn row_tuples(batch: &RecordBatch) -> Result<Vec<Row>> {
    let columns = all_columns(batch)?;
    Ok(transpose(&columns, batch.num_rows()))
}

pub(crate) fn transpose(columns: &[Vec<Value>], num_rows: usize) -> Vec<Row> {
    (0..num_rows)
        .map(|i| columns.iter().map(|c| c[i].clone()).collect())
        .collect()
}

/// Returns a new batch with one column replaced by `values`.
///
/// The column keeps its Arrow type unless `data_type` is given. Other
/// columns are shared with the input batch.
///
/// # Errors
///
/// Returns an error if the column is missing or a value does not fit.
pub fn replace_column(
    batch: &RecordBatch,
    column: &str,
    values: &[Value],
    data_type: Option<&DataType>,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let idx = schema
        .index_of(column)
        .map_err(|_| Error::column_not_found(column))?;
    if values.len() != batch.num_rows() {
        return Err(Error::schema_mismatch(format!(
            "column '{}' has {} values for {} rows",
            column,
            values.len(),
            batch.num_rows()
        )));
    }

    let target = data_type
        .cloned()
        .unwrap_or_else(|| schema.field(idx).data_type().clone());
    let array = array_of(column, values, &target)?;

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(column, target, true);
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[idx] = array;

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Error::Arrow)
}
