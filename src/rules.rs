//! JSON rule files.
//!
//! A rule file names the constraints to enforce, an optional partition
//! column and the solver configuration:
//!
//! ```json
//! {
//!   "patterns": [{"type": "pattern", "column": "zip", "regex": "\\d{5}"}],
//!   "dependencies": [
//!     {"type": "functional_dependency", "source": ["zip"], "target": ["city"]}
//!   ],
//!   "partition": "state",
//!   "config": {"dependency": {"depth": 5}}
//! }
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::SolverConfig,
    dataset::ArrowDataset,
    error::{Error, Result},
    quality::{
        one_to_one, Constraint, Correlation, CorrelationKind, Date, DictValue, Float,
        FunctionalDependency, NonParametric, Parametric, Pattern, Shape, VectorTable,
    },
    solve::{solve, Repair},
    value::Value,
};

fn default_tolerance() -> f64 {
    5.0
}

/// A serializable constraint expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintSpec {
    /// [`FunctionalDependency`].
    FunctionalDependency {
        /// Determining columns.
        source: Vec<String>,
        /// Determined columns.
        target: Vec<String>,
    },
    /// [`one_to_one`].
    OneToOne {
        /// First column set.
        left: Vec<String>,
        /// Second column set.
        right: Vec<String>,
    },
    /// [`Shape`].
    Shape {
        /// Expected row count.
        rows: usize,
        /// Expected column count.
        columns: usize,
    },
    /// [`DictValue`].
    DictValue {
        /// Constrained column.
        column: String,
        /// Allowed values.
        codebook: Vec<Value>,
        /// Near-duplicate similarity threshold.
        #[serde(default)]
        threshold: Option<f64>,
    },
    /// [`Pattern`].
    Pattern {
        /// Constrained column.
        column: String,
        /// Regex the cells must match at their start.
        regex: String,
    },
    /// [`Date`].
    Date {
        /// Constrained column.
        column: String,
        /// strftime format.
        format: String,
    },
    /// [`Float`].
    Float {
        /// Constrained column.
        column: String,
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
    /// [`Parametric`].
    Parametric {
        /// Constrained column.
        column: String,
        /// Allowed deviations from the mean.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    /// [`NonParametric`].
    NonParametric {
        /// Constrained column.
        column: String,
        /// Allowed deviations from the median.
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    /// [`Correlation`].
    Correlation {
        /// First column.
        a: String,
        /// Second column.
        b: String,
        /// Expected sign.
        #[serde(default)]
        kind: CorrelationKind,
    },
    /// A constraint scaled by a weight.
    Weighted {
        /// Score multiplier.
        weight: f64,
        /// Scaled constraint.
        constraint: Box<ConstraintSpec>,
    },
    /// Elementwise maximum of the operands.
    All {
        /// Operands.
        constraints: Vec<ConstraintSpec>,
    },
    /// Left-to-right `+` of the operands.
    Blend {
        /// Operands.
        constraints: Vec<ConstraintSpec>,
    },
}

fn non_empty(kind: &str, columns: &[String]) -> Result<()> {
    if columns.is_empty() || columns.iter().any(|c| c.trim().is_empty()) {
        return Err(Error::invalid_config(format!(
            "{} needs non-empty column names",
            kind
        )));
    }
    Ok(())
}

fn fold(
    kind: &str,
    specs: &[ConstraintSpec],
    combine: impl Fn(Constraint, Constraint) -> Constraint,
) -> Result<Constraint> {
    let mut compiled = specs.iter().map(ConstraintSpec::compile);
    let first = compiled
        .next()
        .ok_or_else(|| Error::invalid_config(format!("{} needs at least one constraint", kind)))??;
    compiled.try_fold(first, |acc, next| Ok(combine(acc, next?)))
}

impl ConstraintSpec {
    /// Builds the constraint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for empty column lists, empty
    /// combinators, invalid regexes or date formats, and non-finite
    /// weights.
    pub fn compile(&self) -> Result<Constraint> {
        Ok(match self {
            Self::FunctionalDependency { source, target } => {
                non_empty("functional_dependency", source)?;
                non_empty("functional_dependency", target)?;
                Constraint::atom(FunctionalDependency::new(source.clone(), target.clone()))
            }
            Self::OneToOne { left, right } => {
                non_empty("one_to_one", left)?;
                non_empty("one_to_one", right)?;
                one_to_one(left.clone(), right.clone())
            }
            Self::Shape { rows, columns } => Constraint::atom(Shape::new(*rows, *columns)),
            Self::DictValue {
                column,
                codebook,
                threshold,
            } => {
                let dict = DictValue::new(column, codebook.iter().cloned());
                Constraint::atom(match threshold {
                    Some(t) => dict.with_threshold(*t),
                    None => dict,
                })
            }
            Self::Pattern { column, regex } => Constraint::atom(Pattern::new(column, regex)?),
            Self::Date { column, format } => Constraint::atom(Date::new(column, format)?),
            Self::Float { column, min, max } => Constraint::atom(Float::new(column).with_range(
                min.unwrap_or(f64::NEG_INFINITY),
                max.unwrap_or(f64::INFINITY),
            )),
            Self::Parametric { column, tolerance } => {
                Constraint::atom(Parametric::new(column, *tolerance))
            }
            Self::NonParametric { column, tolerance } => {
                Constraint::atom(NonParametric::new(column, *tolerance))
            }
            Self::Correlation { a, b, kind } => Constraint::atom(Correlation::new(a, b, *kind)),
            Self::Weighted { weight, constraint } => {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(Error::invalid_config(format!(
                        "weight must be a non-negative number, got {}",
                        weight
                    )));
                }
                constraint.compile()? * *weight
            }
            Self::All { constraints } => fold("all", constraints, |a, b| a * b)?,
            Self::Blend { constraints } => fold("blend", constraints, |a, b| a + b)?,
        })
    }
}

/// Constraints compiled from a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct CompiledRules {
    /// Pattern constraints, in file order.
    pub patterns: Vec<Constraint>,
    /// Dependency constraints, in file order.
    pub dependencies: Vec<Constraint>,
}

/// A parsed rule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Pattern constraints.
    pub patterns: Vec<ConstraintSpec>,
    /// Dependency constraints.
    pub dependencies: Vec<ConstraintSpec>,
    /// Column to partition on.
    pub partition: Option<String>,
    /// Word vector file for semantic similarity, relative paths resolved
    /// against the working directory.
    pub embedding: Option<PathBuf>,
    /// Solver configuration.
    pub config: SolverConfig,
}

impl RuleSet {
    /// Parses a rule set from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed JSON or unknown
    /// constraint types.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_config(e.to_string()))
    }

    /// Reads a rule file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_json_str(&json)
    }

    /// Compiles every constraint.
    ///
    /// # Errors
    ///
    /// Returns the first compilation error.
    pub fn compile(&self) -> Result<CompiledRules> {
        Ok(CompiledRules {
            patterns: self
                .patterns
                .iter()
                .map(ConstraintSpec::compile)
                .collect::<Result<_>>()?,
            dependencies: self
                .dependencies
                .iter()
                .map(ConstraintSpec::compile)
                .collect::<Result<_>>()?,
        })
    }

    /// The solver configuration with the embedding file loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding file cannot be read.
    pub fn solver_config(&self) -> Result<SolverConfig> {
        match &self.embedding {
            Some(path) => {
                let table = VectorTable::from_path(path)?;
                Ok(self.config.clone().with_embedding(Arc::new(table)))
            }
            None => Ok(self.config.clone()),
        }
    }

    /// Compiles the rules and repairs `dataset`.
    ///
    /// # Errors
    ///
    /// Returns compilation, configuration and setup errors.
    pub fn solve(&self, dataset: &ArrowDataset) -> Result<Repair> {
        let rules = self.compile()?;
        let config = self.solver_config()?;
        solve(
            dataset,
            &rules.patterns,
            &rules.dependencies,
            self.partition.as_deref(),
            &config,
        )
    }
}
