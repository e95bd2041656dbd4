//! Dataset operations for datarepair.
//!
//! An [`Operation`] is an immutable sequence of atomic [`Step`]s. Operations
//! compose with `*` (run the left operand, then the right), and the empty
//! sequence is NOOP, the identity. Running an operation never mutates its
//! input: Arrow arrays are immutable, and steps build new columns only for
//! the cells they change.

use std::{fmt, ops::Mul, sync::Arc};

use arrow::array::RecordBatch;

use crate::error::Result;

mod casts;
mod cells;
pub mod params;
pub mod templates;

pub(crate) use casts::valid_strftime;
pub use casts::{DatetimeCast, FloatCast, PatternCast};
pub use cells::{Delete, Majority, Replace, Swap};
pub use params::{Binding, Param, ParamKind, ParamSchema};
pub use templates::{
    DeleteTemplate, MajorityTemplate, OperationKind, OperationTemplate, ReplaceTemplate,
    SwapTemplate,
};

/// A transform that can be applied to RecordBatches.
///
/// # Thread Safety
///
/// All transforms must be thread-safe (Send + Sync) so that blocks can be
/// repaired in parallel.
pub trait Transform: Send + Sync {
    /// Applies the transform to a RecordBatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform cannot be applied to the batch.
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch>;
}

/// Structural identity of a step: template id plus rendered binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepKey {
    /// Template identifier.
    pub template: String,
    /// Canonical rendering of the parameter binding.
    pub binding: String,
}

impl StepKey {
    /// Creates a key.
    pub fn new(template: impl Into<String>, binding: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            binding: binding.into(),
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(df,{})", self.template, self.binding)
    }
}

/// An atomic, replayable dataset edit.
pub trait Step: Transform + fmt::Debug {
    /// Structural key used by the bad-operation cache and provenance checks.
    fn key(&self) -> StepKey;

    /// Human-readable line for operation names.
    fn describe(&self) -> String {
        format!("df = {}", self.key())
    }
}

/// A composable sequence of steps.
///
/// # Example
///
/// ```ignore
/// use datarepair::transform::{Operation, Delete};
///
/// let op = Operation::from_step(delete_zip) * Operation::from_step(delete_city);
/// assert_eq!(op.depth(), 2);
/// let cleaned = op.run(&batch)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Operation {
    steps: Vec<Arc<dyn Step>>,
}

impl Operation {
    /// The identity operation.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Wraps a single step.
    pub fn from_step(step: impl Step + 'static) -> Self {
        Self {
            steps: vec![Arc::new(step)],
        }
    }

    /// Wraps a shared step.
    pub fn from_arc(step: Arc<dyn Step>) -> Self {
        Self { steps: vec![step] }
    }

    /// Runs every step in order on a snapshot of `batch`.
    ///
    /// # Errors
    ///
    /// Returns the first step error.
    pub fn run(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        self.steps
            .iter()
            .try_fold(batch.clone(), |acc, step| step.apply(acc))
    }

    /// Returns true for NOOP.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of atomic steps, at least 1.
    pub fn depth(&self) -> usize {
        self.steps.len().max(1)
    }

    /// The atomic steps in execution order.
    pub fn provenance(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// Keys of the atomic steps in execution order.
    pub fn keys(&self) -> Vec<StepKey> {
        self.steps.iter().map(|s| s.key()).collect()
    }

    /// Returns true if a step with `key` is part of this operation.
    pub fn contains(&self, key: &StepKey) -> bool {
        self.steps.iter().any(|s| s.key() == *key)
    }

    /// Multi-line name, one step per line.
    pub fn name(&self) -> String {
        if self.steps.is_empty() {
            return "df = df".to_string();
        }
        self.steps
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Sequential composition: `self` then `other`.
    #[must_use]
    pub fn then(&self, other: &Self) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + other.steps.len());
        steps.extend(self.steps.iter().cloned());
        steps.extend(other.steps.iter().cloned());
        Self { steps }
    }

    /// `k`-fold self-composition. `repeat(0)` is NOOP.
    #[must_use]
    pub fn repeat(&self, k: usize) -> Self {
        (0..k).fold(Self::noop(), |acc, _| acc.then(self))
    }
}

impl Mul for Operation {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.then(&rhs)
    }
}

impl Mul for &Operation {
    type Output = Operation;

    fn mul(self, rhs: Self) -> Operation {
        self.then(rhs)
    }
}

impl Transform for Operation {
    fn apply(&self, batch: RecordBatch) -> Result<RecordBatch> {
        self.run(&batch)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
