//! Orchestration of a full repair.
//!
//! Pattern constraints run first, each preceded by the format cast it
//! declares, then dependency constraints. Every search starts from the
//! output of the previous one. With a partition column the dataset is
//! split into blocks that are repaired independently in parallel and
//! written back by row position.

use std::fmt;

use arrow::array::RecordBatch;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    config::SolverConfig,
    dataset::{ArrowDataset, Block},
    error::Result,
    quality::Constraint,
    search::{SearchOutcome, TreeSearch},
    transform::Operation,
    value::Value,
};

/// The phase a constraint was enforced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pattern constraints, after their format casts.
    Pattern,
    /// Dependency constraints.
    Dependency,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => write!(f, "pattern"),
            Self::Dependency => write!(f, "dependency"),
        }
    }
}

/// Search telemetry for one constraint in one block.
#[derive(Debug, Clone)]
pub struct ConstraintOutcome {
    /// Enforcement phase.
    pub stage: Stage,
    /// Rendered constraint.
    pub constraint: String,
    /// Format casts applied before the search.
    pub casts: Operation,
    /// Operation found by the search.
    pub operation: Operation,
    /// Final search cost.
    pub cost: f64,
    /// Per-iteration best cost.
    pub history: Vec<f64>,
    /// Candidates scored.
    pub evaluated: usize,
    /// Candidates that failed to apply.
    pub failed: usize,
    /// Bad-operation cache size.
    pub bad_ops: usize,
    /// Iterations run.
    pub iterations: usize,
}

impl ConstraintOutcome {
    fn new(stage: Stage, constraint: &Constraint, casts: Operation, search: SearchOutcome) -> Self {
        Self {
            stage,
            constraint: constraint.to_string(),
            casts,
            operation: search.operation,
            cost: search.cost,
            history: search.history,
            evaluated: search.evaluated,
            failed: search.failed,
            bad_ops: search.bad_ops,
            iterations: search.iterations,
        }
    }
}

/// Repair report for one block.
#[derive(Debug, Clone)]
pub struct BlockReport {
    /// Partition value, `None` without partitioning.
    pub key: Option<Value>,
    /// Number of rows in the block.
    pub rows: usize,
    /// Everything applied to the block, casts included.
    pub operation: Operation,
    /// Per-constraint telemetry, in enforcement order.
    pub constraints: Vec<ConstraintOutcome>,
}

/// Result of [`solve`].
#[derive(Debug, Clone)]
pub struct Repair {
    /// Block operations composed in block order.
    pub operation: Operation,
    /// The repaired dataset.
    pub dataset: ArrowDataset,
    /// Per-block reports, in block order.
    pub blocks: Vec<BlockReport>,
}

impl Repair {
    /// Candidates scored across all blocks and constraints.
    pub fn evaluated(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| &b.constraints)
            .map(|c| c.evaluated)
            .sum()
    }
}

/// Searches for one block.
struct Solver {
    pattern: TreeSearch,
    dependency: TreeSearch,
}

impl Solver {
    fn repair(
        &self,
        batch: &RecordBatch,
        patterns: &[Constraint],
        dependencies: &[Constraint],
    ) -> Result<(Operation, RecordBatch, Vec<ConstraintOutcome>)> {
        let mut operation = Operation::noop();
        let mut current = batch.clone();
        let mut outcomes = Vec::with_capacity(patterns.len() + dependencies.len());

        for constraint in patterns {
            let mut casts = Operation::noop();
            for cast in constraint.format_casts() {
                let step = Operation::from_arc(cast);
                match step.run(&current) {
                    Ok(out) => {
                        current = out;
                        casts = casts * step;
                    }
                    Err(e) => warn!(cast = %step, error = %e, "Skipping format cast"),
                }
            }
            let search = self.pattern.run(&current, constraint)?;
            operation = operation * casts.clone() * search.operation.clone();
            current = search.batch.clone();
            outcomes.push(ConstraintOutcome::new(Stage::Pattern, constraint, casts, search));
        }

        for constraint in dependencies {
            let search = self.dependency.run(&current, constraint)?;
            operation = &operation * &search.operation;
            current = search.batch.clone();
            outcomes.push(ConstraintOutcome::new(
                Stage::Dependency,
                constraint,
                Operation::noop(),
                search,
            ));
        }

        Ok((operation, current, outcomes))
    }
}

/// Repairs `dataset` against pattern and dependency constraints.
///
/// # Errors
///
/// Returns a configuration error for an invalid config, an unknown
/// partition column, or a similarity metric naming an unknown column.
/// Candidate failures inside a search are never errors.
///
/// # Example
///
/// ```ignore
/// use datarepair::{solve, quality::{Constraint, FunctionalDependency}, SolverConfig};
///
/// let fd = Constraint::atom(FunctionalDependency::new(["zip"], ["city"]));
/// let repair = solve(&dataset, &[], &[fd], Some("state"), &SolverConfig::default())?;
/// repair.dataset.to_csv("clean.csv")?;
/// ```
pub fn solve(
    dataset: &ArrowDataset,
    patterns: &[Constraint],
    dependencies: &[Constraint],
    partition: Option<&str>,
    config: &SolverConfig,
) -> Result<Repair> {
    config.validate()?;
    let solver = Solver {
        pattern: TreeSearch::new(&config.pattern)?,
        dependency: TreeSearch::new(&config.dependency)?,
    };

    let Some(column) = partition else {
        let batch = dataset.to_batch()?;
        info!(
            rows = batch.num_rows(),
            patterns = patterns.len(),
            dependencies = dependencies.len(),
            "Repairing dataset"
        );
        let (operation, repaired, constraints) = solver.repair(&batch, patterns, dependencies)?;
        let report = BlockReport {
            key: None,
            rows: batch.num_rows(),
            operation: operation.clone(),
            constraints,
        };
        return Ok(Repair {
            operation,
            dataset: ArrowDataset::from_batch(repaired)?,
            blocks: vec![report],
        });
    };

    let blocks: Vec<Block> = dataset.partition_by(column)?;
    info!(
        partition = column,
        blocks = blocks.len(),
        rows = dataset.to_batch()?.num_rows(),
        "Repairing partitioned dataset"
    );

    let results = blocks
        .par_iter()
        .map(|block| {
            debug!(key = %block.key, rows = block.rows.len(), "Repairing block");
            solver
                .repair(&block.batch, patterns, dependencies)
                .map(|(operation, repaired, constraints)| (block, operation, repaired, constraints))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut operation = Operation::noop();
    let mut written = Vec::with_capacity(results.len());
    let mut reports = Vec::with_capacity(results.len());
    for (block, block_op, repaired, constraints) in results {
        operation = &operation * &block_op;
        written.push((block.rows.clone(), repaired));
        reports.push(BlockReport {
            key: Some(block.key.clone()),
            rows: block.rows.len(),
            operation: block_op,
            constraints,
        });
    }

    Ok(Repair {
        operation,
        dataset: dataset.scatter(&written)?,
        blocks: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        quality::{FunctionalDependency, Pattern},
        value::Value,
    };

    fn hospital() -> ArrowDataset {
        ArrowDataset::from_csv_str(
            "state,zip,city\nNY,10001,New York\nNY,10001,New York\nNY,10001,Nwe York\nMA,02134,Boston\nMA,02134,Boston\n",
        )
        .unwrap()
    }

    fn zip_city() -> Constraint {
        Constraint::atom(FunctionalDependency::new(["zip"], ["city"]))
    }

    #[test]
    fn test_solve_repairs_dependency() {
        let repair = solve(&hospital(), &[], &[zip_city()], None, &SolverConfig::default()).unwrap();
        let city = repair.dataset.column("city").unwrap();
        assert_eq!(city[2], Value::str("New York"));
        assert_eq!(repair.blocks.len(), 1);
        assert_eq!(repair.blocks[0].constraints[0].stage, Stage::Dependency);
        assert!(repair.evaluated() > 0);
    }

    #[test]
    fn test_partitioned_solve_keeps_row_order() {
        let repair = solve(
            &hospital(),
            &[],
            &[zip_city()],
            Some("state"),
            &SolverConfig::default(),
        )
        .unwrap();
        let state = repair.dataset.column("state").unwrap();
        assert_eq!(state[0], Value::str("NY"));
        assert_eq!(state[3], Value::str("MA"));
        assert_eq!(repair.blocks.len(), 2);
        // blocks are ordered by key
        assert_eq!(repair.blocks[0].key, Some(Value::str("MA")));
        assert_eq!(
            repair.dataset.column("city").unwrap()[2],
            Value::str("New York")
        );
    }

    #[test]
    fn test_unknown_partition_column() {
        let err = solve(&hospital(), &[], &[zip_city()], Some("county"), &SolverConfig::default())
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_pattern_stage_applies_cast() {
        let dataset =
            ArrowDataset::from_csv_str("code\nA-100\nref A-200\nA-300\n").unwrap();
        let pattern = Constraint::atom(Pattern::new("code", r"A-\d+").unwrap());
        let repair = solve(&dataset, &[pattern], &[], None, &SolverConfig::default()).unwrap();

        let outcome = &repair.blocks[0].constraints[0];
        assert_eq!(outcome.stage, Stage::Pattern);
        assert_eq!(outcome.casts.depth(), 1);
        assert_eq!(repair.dataset.column("code").unwrap()[1], Value::str("A-200"));
    }
}
