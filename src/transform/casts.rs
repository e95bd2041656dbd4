//! Format casts run ahead of pattern searches.
//!
//! Each cast is total over malformed cells: a cell it cannot normalize
//! becomes missing.

use std::fmt::Write as _;

use arrow::{array::RecordBatch, datatypes::DataType};
use chrono::{
    format::{Item, StrftimeItems},
    NaiveDate, NaiveDateTime, NaiveTime,
};
use regex::Regex;

use super::{Step, StepKey, Transform};
use crate::{
    error::{Error, Result},
    value::{column_values, replace_column, Value},
};

/// Replaces each cell with the first match of a regex, or missing.
#[derive(Debug, Clone)]
pub struct PatternCast {
    column: String,
    regex: Regex,
}

impl PatternCast {
    /// Creates a pattern cast.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid regex.
    pub fn new(column: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::invalid_config(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            column: column.into(),
            regex,
        })
    }
}

impl Transform for PatternCast {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let values: Vec<Value> = column_values(&batch, &self.column)?
            .into_iter()
            .map(|v| {
                if v.is_null() {
                    return Value::Null;
                }
                let text = v.to_string();
                match self.regex.find(&text) {
                    Some(m) if !m.as_str().is_empty() => Value::str(m.as_str()),
                    _ => Value::Null,
                }
            })
            .collect();
        replace_column(&batch, &self.column, &values, Some(&DataType::Utf8))
    }
}

impl Step for PatternCast {
    fn key(&self) -> StepKey {
        StepKey::new(
            "pattern",
            format!("'{}','{}'", self.column, self.regex.as_str()),
        )
    }
}

/// Input layouts tried when normalizing dates.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%d %b %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%Y%m%d",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"];

/// Returns true if a strftime format string is well formed.
pub(crate) fn valid_strftime(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

fn parse_with(text: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, format) {
        return Some(d.and_time(NaiveTime::MIN));
    }
    if let Ok(t) = NaiveTime::parse_from_str(text, format) {
        return NaiveDate::from_ymd_opt(1900, 1, 1).map(|d| d.and_time(t));
    }
    None
}

/// Parses a date, time, or datetime in any known layout.
fn parse_loose(text: &str, preferred: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    std::iter::once(preferred)
        .chain(DATETIME_FORMATS.iter().copied())
        .chain(DATE_FORMATS.iter().copied())
        .chain(TIME_FORMATS.iter().copied())
        .find_map(|f| parse_with(text, f))
}

/// Re-renders every parseable date in a column with a strftime format.
#[derive(Debug, Clone)]
pub struct DatetimeCast {
    column: String,
    format: String,
}

impl DatetimeCast {
    /// Creates a datetime cast.
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

    fn render(&self, dt: &NaiveDateTime) -> Option<String> {
        let mut out = String::new();
        write!(out, "{}", dt.format(&self.format)).ok()?;
        Some(out)
    }
}

impl Transform for DatetimeCast {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let values: Vec<Value> = column_values(&batch, &self.column)?
            .into_iter()
            .map(|v| {
                if v.is_null() {
                    return Value::Null;
                }
                parse_loose(&v.to_string(), &self.format)
                    .and_then(|dt| self.render(&dt))
                    .map_or(Value::Null, Value::Str)
            })
            .collect();
        replace_column(&batch, &self.column, &values, Some(&DataType::Utf8))
    }
}

impl Step for DatetimeCast {
    fn key(&self) -> StepKey {
        StepKey::new("dateparse", format!("'{}','{}'", self.column, self.format))
    }
}

/// Parses cells as numbers, keeping those inside an inclusive range.
#[derive(Debug, Clone)]
pub struct FloatCast {
    column: String,
    min: f64,
    max: f64,
}

impl FloatCast {
    /// Creates a numeric cast over `[min, max]`.
    pub fn new(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }
}

impl Transform for FloatCast {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let values: Vec<Value> = column_values(&batch, &self.column)?
            .into_iter()
            .map(|v| match v.parse_f64() {
                Some(f) if f >= self.min && f <= self.max => Value::Float(f),
                _ => Value::Null,
            })
            .collect();
        replace_column(&batch, &self.column, &values, Some(&DataType::Float64))
    }
}

impl Step for FloatCast {
    fn key(&self) -> StepKey {
        StepKey::new(
            "numparse",
            format!("'{}',{},{}", self.column, self.min, self.max),
        )
    }
}
