//! Parameter schemas and bindings for operation templates.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    predicate::Predicate,
    value::{quoted, Value},
};

/// The domain a template parameter draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A single column from the constraint hint.
    Column,
    /// A value from the codebook or the bound column.
    Value,
    /// A token from the configured substring set.
    Substr,
    /// A row-scoping predicate.
    Predicate,
    /// A combination of hint columns.
    Columns,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Column => "column",
            Self::Value => "value",
            Self::Substr => "substr",
            Self::Predicate => "predicate",
            Self::Columns => "columns",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ParamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "column" => Ok(Self::Column),
            "value" => Ok(Self::Value),
            "substr" => Ok(Self::Substr),
            "predicate" => Ok(Self::Predicate),
            "columns" => Ok(Self::Columns),
            other => Err(Error::invalid_config(format!(
                "unknown parameter kind '{}'",
                other
            ))),
        }
    }
}

/// Ordered parameter declarations of a template.
///
/// Declaration order is the order in which the sampler enumerates the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSchema {
    params: Vec<(String, ParamKind)>,
}

impl ParamSchema {
    /// Creates a schema, rejecting empty or duplicate parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid declaration.
    pub fn new<I, S>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ParamKind)>,
        S: Into<String>,
    {
        let mut out: Vec<(String, ParamKind)> = Vec::new();
        for (name, kind) in params {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(Error::invalid_config("parameter name must not be empty"));
            }
            if out.iter().any(|(n, _)| *n == name) {
                return Err(Error::invalid_config(format!(
                    "parameter '{}' declared twice",
                    name
                )));
            }
            out.push((name, kind));
        }
        Ok(Self { params: out })
    }

    /// Creates a schema from textual kind descriptors such as
    /// `("column", "column")`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unknown kind.
    pub fn parse(descriptors: &[(&str, &str)]) -> Result<Self> {
        let params = descriptors
            .iter()
            .map(|(name, kind)| Ok((*name, kind.parse::<ParamKind>()?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(params)
    }

    /// Builtin schemas are known-valid.
    pub(crate) fn fixed(params: &[(&str, ParamKind)]) -> Self {
        Self {
            params: params
                .iter()
                .map(|(n, k)| ((*n).to_string(), *k))
                .collect(),
        }
    }

    /// Iterates over `(name, kind)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamKind)> {
        self.params.iter().map(|(n, k)| (n.as_str(), *k))
    }

    /// Returns the kind of a parameter.
    pub fn kind(&self, name: &str) -> Option<ParamKind> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, k)| *k)
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if the template takes no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Checks that a binding assigns every declared parameter a value of
    /// the declared kind and nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBinding`] describing the first mismatch.
    pub fn validate(&self, template: &str, binding: &Binding) -> Result<()> {
        for (name, kind) in self.iter() {
            match binding.get(name) {
                None => {
                    return Err(Error::invalid_binding(
                        template,
                        format!("missing parameter '{}'", name),
                    ))
                }
                Some(param) if param.kind() != kind => {
                    return Err(Error::invalid_binding(
                        template,
                        format!(
                            "parameter '{}' expects {}, got {}",
                            name,
                            kind,
                            param.kind()
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = binding.keys().find(|k| self.kind(k).is_none()) {
            return Err(Error::invalid_binding(
                template,
                format!("parameter '{}' not defined", extra),
            ));
        }
        Ok(())
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Param {
    /// Bound column name.
    Column(String),
    /// Bound cell value.
    Value(Value),
    /// Bound substring.
    Substr(String),
    /// Bound row-scoping predicate.
    Predicate(Predicate),
    /// Bound column combination.
    Columns(Vec<String>),
}

impl Param {
    /// The kind this parameter satisfies.
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Column(_) => ParamKind::Column,
            Self::Value(_) => ParamKind::Value,
            Self::Substr(_) => ParamKind::Substr,
            Self::Predicate(_) => ParamKind::Predicate,
            Self::Columns(_) => ParamKind::Columns,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(c) | Self::Substr(c) => write!(f, "'{}'", c),
            Self::Value(v) => write!(f, "{}", quoted(v)),
            Self::Predicate(p) => f.write_str(&p.scope_key()),
            Self::Columns(cols) => {
                let cols: Vec<String> = cols.iter().map(|c| format!("'{}'", c)).collect();
                write!(f, "[{}]", cols.join(", "))
            }
        }
    }
}

/// Parameter name to bound value.
pub type Binding = BTreeMap<String, Param>;

/// Reads a bound parameter, checking its kind.
pub(crate) fn bound<'a>(template: &str, binding: &'a Binding, name: &str) -> Result<&'a Param> {
    binding
        .get(name)
        .ok_or_else(|| Error::invalid_binding(template, format!("missing parameter '{}'", name)))
}

pub(crate) fn bound_column(template: &str, binding: &Binding, name: &str) -> Result<String> {
    match bound(template, binding, name)? {
        Param::Column(c) => Ok(c.clone()),
        other => Err(kind_error(template, name, ParamKind::Column, other)),
    }
}

pub(crate) fn bound_value(template: &str, binding: &Binding, name: &str) -> Result<Value> {
    match bound(template, binding, name)? {
        Param::Value(v) => Ok(v.clone()),
        other => Err(kind_error(template, name, ParamKind::Value, other)),
    }
}

pub(crate) fn bound_substr(template: &str, binding: &Binding, name: &str) -> Result<String> {
    match bound(template, binding, name)? {
        Param::Substr(s) => Ok(s.clone()),
        other => Err(kind_error(template, name, ParamKind::Substr, other)),
    }
}

pub(crate) fn bound_predicate(template: &str, binding: &Binding, name: &str) -> Result<Predicate> {
    match bound(template, binding, name)? {
        Param::Predicate(p) => Ok(p.clone()),
        other => Err(kind_error(template, name, ParamKind::Predicate, other)),
    }
}

pub(crate) fn bound_columns(template: &str, binding: &Binding, name: &str) -> Result<Vec<String>> {
    match bound(template, binding, name)? {
        Param::Columns(c) => Ok(c.clone()),
        other => Err(kind_error(template, name, ParamKind::Columns, other)),
    }
}

fn kind_error(template: &str, name: &str, expected: ParamKind, got: &Param) -> Error {
    Error::invalid_binding(
        template,
        format!(
            "parameter '{}' expects {}, got {}",
            name,
            expected,
            got.kind()
        ),
    )
}

/// Canonical rendering of a binding, used in cache keys and names.
pub(crate) fn render(schema: &ParamSchema, binding: &Binding) -> String {
    schema
        .iter()
        .filter_map(|(name, _)| binding.get(name).map(ToString::to_string))
        .collect::<Vec<_>>()
        .join(",")
}
