//! Best-first greedy tree search for one constraint.
//!
//! Each iteration expands the incumbent operation with every sampled
//! candidate, applied to the incumbent's output, and keeps the cheapest
//! result. The cost of a dataset is
//!
//! ```text
//! (Σ constraint scores + edit · Σ edit-cost scores) / rows
//! ```
//!
//! where the edit cost measures divergence from the search input.

// Statistical computation
#![allow(clippy::cast_precision_loss)]

use std::{collections::HashSet, sync::Arc};

use arrow::array::RecordBatch;
use tracing::{debug, trace};

use crate::{
    config::SearchConfig,
    error::Result,
    quality::{Constraint, EditCost, QualityFunction},
    sampler::ParameterSampler,
    transform::{Operation, OperationTemplate, StepKey},
};

/// Cost of the incumbent before any candidate has been scored.
pub const INITIAL_COST: f64 = 2.0;

/// Result of one search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The best operation found, NOOP if nothing improved.
    pub operation: Operation,
    /// The operation's output.
    pub batch: RecordBatch,
    /// The operation's cost.
    pub cost: f64,
    /// Incumbent cost after each iteration, non-increasing.
    pub history: Vec<f64>,
    /// Candidates applied and scored.
    pub evaluated: usize,
    /// Candidates whose application failed.
    pub failed: usize,
    /// Distinct step keys in the bad-operation cache.
    pub bad_ops: usize,
    /// Iterations run.
    pub iterations: usize,
}

impl SearchOutcome {
    /// Returns true if the search found a zero-cost repair.
    pub fn is_exact(&self) -> bool {
        self.cost == 0.0
    }
}

/// Tree search engine.
///
/// # Example
///
/// ```ignore
/// use datarepair::{SearchConfig, TreeSearch};
///
/// let search = TreeSearch::new(&SearchConfig::default())?;
/// let outcome = search.run(&batch, &fd)?;
/// println!("{}", outcome.operation);
/// ```
#[derive(Debug, Clone)]
pub struct TreeSearch {
    config: SearchConfig,
    templates: Vec<Arc<dyn OperationTemplate>>,
}

/// The best state found so far.
struct Incumbent {
    cost: f64,
    operation: Operation,
    batch: RecordBatch,
}

impl TreeSearch {
    /// Creates a search engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the configuration is
    /// invalid.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            templates: config.resolve_templates(),
            config: config.clone(),
        })
    }

    /// The search configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Cost of `batch` under `constraint`, `+∞` if the constraint fails.
    fn cost(&self, constraint: &Constraint, edit: &EditCost, batch: &RecordBatch) -> f64 {
        let rows = batch.num_rows() as f64;
        let quality = match constraint.total(batch) {
            Ok(total) => total,
            Err(e) => {
                trace!(error = %e, "Constraint evaluation failed");
                return f64::INFINITY;
            }
        };
        let divergence = if self.config.edit > 0.0 {
            match edit.score(batch) {
                Ok(scores) => scores.iter().sum::<f64>(),
                Err(e) => {
                    trace!(error = %e, "Edit cost evaluation failed");
                    return f64::INFINITY;
                }
            }
        } else {
            0.0
        };
        (quality + self.config.edit * divergence) / rows
    }

    /// Searches for a repair of `batch` under `constraint`.
    ///
    /// Candidate failures never abort the search: a failing step is cached
    /// and skipped, and a failing constraint evaluation scores `+∞`.
    ///
    /// # Errors
    ///
    /// Returns an error only during setup, for a similarity metric naming
    /// a column the batch does not have.
    pub fn run(&self, batch: &RecordBatch, constraint: &Constraint) -> Result<SearchOutcome> {
        let edit = EditCost::new(
            batch,
            &self.config.similarity,
            self.config.embedding.clone(),
        )?;

        let mut best = Incumbent {
            cost: INITIAL_COST,
            operation: Operation::noop(),
            batch: batch.clone(),
        };
        let mut bad_ops: HashSet<StepKey> = HashSet::new();
        let mut history = Vec::with_capacity(self.config.depth);
        let (mut evaluated, mut failed, mut iterations) = (0, 0, 0);

        debug!(constraint = %constraint, depth = self.config.depth, "Starting search");

        'search: for iteration in 0..self.config.depth {
            let depth = best.operation.depth() as f64;
            if (best.cost - depth) > best.cost * self.config.gamma {
                debug!(iteration, cost = best.cost, "Pruned");
                break;
            }
            iterations += 1;

            let base_op = best.operation.clone();
            let base = best.batch.clone();
            let scores = constraint.evaluate(&base).ok();
            let sampler =
                match ParameterSampler::new(&base, constraint, scores.as_deref(), &self.config) {
                    Ok(sampler) => sampler,
                    Err(e) => {
                        debug!(iteration, error = %e, "Sampler failed");
                        break;
                    }
                };

            let mut improved = false;
            for candidate in sampler.candidates(&self.templates) {
                let keys = candidate.keys();
                if keys
                    .iter()
                    .any(|k| bad_ops.contains(k) || base_op.contains(k))
                {
                    continue;
                }

                let output = match candidate.run(&base) {
                    Ok(output) => output,
                    Err(e) => {
                        trace!(operation = %candidate, error = %e, "Caching bad operation");
                        failed += 1;
                        bad_ops.extend(keys);
                        continue;
                    }
                };
                if output.num_rows() == 0 || output.num_columns() == 0 {
                    continue;
                }

                evaluated += 1;
                let cost = self.cost(constraint, &edit, &output);
                if cost < best.cost {
                    trace!(cost, operation = %candidate, "New incumbent");
                    best = Incumbent {
                        cost,
                        operation: &base_op * &candidate,
                        batch: output,
                    };
                    improved = true;
                    if cost == 0.0 {
                        history.push(best.cost);
                        debug!(iteration, "Exact repair found");
                        break 'search;
                    }
                }
            }

            history.push(best.cost);
            debug!(
                iteration,
                cost = best.cost,
                depth = best.operation.depth(),
                "Iteration complete"
            );
            if !improved {
                break;
            }
        }

        debug!(
            cost = best.cost,
            evaluated,
            failed,
            bad_ops = bad_ops.len(),
            "Search finished"
        );

        Ok(SearchOutcome {
            operation: best.operation,
            batch: best.batch,
            cost: best.cost,
            history,
            evaluated,
            failed,
            bad_ops: bad_ops.len(),
            iterations,
        })
    }
}
