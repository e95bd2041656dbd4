//! datarepair - Constraint-Driven Data Repair in Pure Rust
//!
//! Searches for a minimal-cost sequence of row and column edits that turns
//! a dirty table into one satisfying declared data-quality constraints,
//! while penalizing divergence from the original values.
//!
//! # Design Principles
//!
//! 1. **Constraints as scores** - every rule maps a table to per-row
//!    violation scores; rules combine with `+`, `*`
//! 2. **Operations as values** - repairs are immutable, composable,
//!    replayable step sequences
//! 3. **Zero-copy** - Arrow `RecordBatch` snapshots throughout
//! 4. **Explicit configuration** - no global defaults
//!
//! # Quick Start
//!
//! ```no_run
//! use datarepair::{
//!     quality::{Constraint, FunctionalDependency},
//!     solve, ArrowDataset, SolverConfig,
//! };
//!
//! let dataset = ArrowDataset::from_csv("hospital.csv").unwrap();
//! let fd = Constraint::atom(FunctionalDependency::new(["zip"], ["city"]));
//!
//! let repair = solve(&dataset, &[], &[fd], None, &SolverConfig::default()).unwrap();
//! println!("{}", repair.operation);
//! repair.dataset.to_csv("hospital.clean.csv").unwrap();
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Allow common test patterns
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::cast_precision_loss,
        clippy::float_cmp,
        clippy::similar_names
    )
)]
// Allow some pedantic lints for cleaner code
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::map_unwrap_or)]

/// CLI module for command-line interface
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod predicate;
pub mod quality;
pub mod rules;
pub mod sampler;
pub mod search;
pub mod solve;
pub mod transform;
pub mod value;

// Re-exports for convenience
pub use arrow::{
    array::RecordBatch,
    datatypes::{Schema, SchemaRef},
};
pub use config::{SearchConfig, SolverConfig};
pub use dataset::{ArrowDataset, Block, CsvOptions, Dataset};
pub use error::{Error, Result};
pub use predicate::{Predicate, PredicateScope};
pub use quality::{Constraint, EditCost, Embedding, QualityFunction, SimilarityMetric, VectorTable};
pub use rules::{CompiledRules, ConstraintSpec, RuleSet};
pub use sampler::ParameterSampler;
pub use search::{SearchOutcome, TreeSearch};
pub use solve::{solve, BlockReport, ConstraintOutcome, Repair, Stage};
pub use transform::{Operation, OperationKind, OperationTemplate, Step, StepKey, Transform};
pub use value::Value;
