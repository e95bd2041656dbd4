//! Candidate generation for the tree search.
//!
//! The sampler enumerates a bounded grid of parameter bindings per
//! template, prunes bindings that cannot help, and instantiates the rest.
//! Every domain is enumerated in a deterministic order, so two samplers
//! built from the same inputs produce the same candidate list.

use std::{collections::BTreeSet, sync::Arc};

use arrow::array::RecordBatch;
use tracing::{debug, trace};

use crate::{
    config::SearchConfig,
    error::Result,
    predicate::Predicate,
    quality::{Constraint, HintParams},
    transform::{params::render, Binding, Operation, OperationTemplate, Param, ParamKind},
    value::{column_values, Value},
};

/// Enumerates candidate operations for one search iteration.
#[derive(Debug)]
pub struct ParameterSampler<'a> {
    batch: &'a RecordBatch,
    config: &'a SearchConfig,
    hint: Vec<String>,
    params: HintParams,
    predicates: Vec<Predicate>,
}

impl<'a> ParameterSampler<'a> {
    /// Creates a sampler over `batch`.
    ///
    /// `scores` are the constraint scores of `batch`. Without them no
    /// predicates are derived and predicate-scoped templates produce
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if `scores` does not match the batch length.
    pub fn new(
        batch: &'a RecordBatch,
        constraint: &Constraint,
        scores: Option<&[f64]>,
        config: &'a SearchConfig,
    ) -> Result<Self> {
        let schema = batch.schema();
        // BTreeSet iteration keeps the hint sorted
        let hint: Vec<String> = constraint
            .hint()
            .into_iter()
            .filter(|c| schema.index_of(c).is_ok())
            .collect();

        let predicates = match scores {
            Some(scores) => Predicate::derive_all(
                batch,
                scores,
                hint.iter().map(String::as_str),
                config.predicate_scope,
            )?,
            None => Vec::new(),
        };
        trace!(
            hint = ?hint,
            predicates = predicates.len(),
            "Sampler ready"
        );

        Ok(Self {
            batch,
            config,
            hint,
            params: constraint.hint_params(),
            predicates,
        })
    }

    /// Hint columns present in the batch, sorted.
    pub fn hint(&self) -> &[String] {
        &self.hint
    }

    /// Derived row-scoping predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Column combinations for COLUMNS parameters, smallest first.
    ///
    /// Sizes run from 1 up to but excluding `min(|hint|, scope_limit)`, so
    /// a key never spans the whole hint.
    pub fn column_sets(&self) -> Vec<Vec<String>> {
        let bound = self.config.scope_limit.min(self.hint.len());
        (1..bound)
            .flat_map(|size| combinations(&self.hint, size))
            .collect()
    }

    /// Values offered for a VALUE parameter bound next to `column`.
    fn values(&self, column: Option<&str>) -> Result<Vec<Value>> {
        if let Some(codebook) = &self.params.codebook {
            return Ok(codebook.iter().cloned().collect());
        }
        match column {
            Some(column) => Ok(column_values(self.batch, column)?
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn domain(&self, kind: ParamKind, column: Option<&str>) -> Result<Vec<Param>> {
        Ok(match kind {
            ParamKind::Column => self.hint.iter().cloned().map(Param::Column).collect(),
            ParamKind::Value => self.values(column)?.into_iter().map(Param::Value).collect(),
            ParamKind::Substr => self
                .config
                .substrings
                .iter()
                .cloned()
                .map(Param::Substr)
                .collect(),
            ParamKind::Predicate => self
                .predicates
                .iter()
                .cloned()
                .map(Param::Predicate)
                .collect(),
            ParamKind::Columns => self.column_sets().into_iter().map(Param::Columns).collect(),
        })
    }

    /// The pruned binding grid of one template.
    ///
    /// The first COLUMN parameter drives the outer loop over hint columns;
    /// the remaining parameters form a cartesian product in declaration
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound column cannot be read.
    pub fn bindings(&self, template: &dyn OperationTemplate) -> Result<Vec<Binding>> {
        let schema = template.schema();
        let driver = schema
            .iter()
            .find(|(_, kind)| *kind == ParamKind::Column)
            .map(|(name, _)| name.to_string());

        let seeds: Vec<(Option<&str>, Binding)> = match &driver {
            Some(name) => self
                .hint
                .iter()
                .map(|c| {
                    let mut binding = Binding::new();
                    binding.insert(name.clone(), Param::Column(c.clone()));
                    (Some(c.as_str()), binding)
                })
                .collect(),
            None => vec![(None, Binding::new())],
        };

        let mut out = Vec::new();
        for (column, seed) in seeds {
            let mut grid = vec![seed];
            for (name, kind) in schema.iter() {
                if Some(name) == driver.as_deref() {
                    continue;
                }
                let domain = self.domain(kind, column)?;
                grid = grid
                    .iter()
                    .flat_map(|partial| {
                        domain.iter().map(move |param| {
                            let mut next = partial.clone();
                            next.insert(name.to_string(), param.clone());
                            next
                        })
                    })
                    .collect();
                if grid.is_empty() {
                    break;
                }
            }
            out.extend(grid.into_iter().filter(|b| !self.pruned(b)));
        }
        Ok(out)
    }

    /// Returns true if a binding cannot produce a useful candidate.
    fn pruned(&self, binding: &Binding) -> bool {
        let columns: Vec<&str> = binding
            .values()
            .filter_map(|p| match p {
                Param::Column(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        let values: Vec<&Value> = binding
            .values()
            .filter_map(|p| match p {
                Param::Value(v) => Some(v),
                _ => None,
            })
            .collect();
        let predicates: Vec<&Predicate> = binding
            .values()
            .filter_map(|p| match p {
                Param::Predicate(p) => Some(p),
                _ => None,
            })
            .collect();
        let substrs: Vec<&str> = binding
            .values()
            .filter_map(|p| match p {
                Param::Substr(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();

        if values.iter().any(|v| v.is_null() || v.is_nan()) {
            return true;
        }
        if predicates
            .iter()
            .any(|p| p.values().is_empty() || p.scopes_missing())
        {
            return true;
        }
        for p in &predicates {
            if columns.contains(&p.column()) && values.iter().any(|v| p.values().contains(*v)) {
                return true;
            }
            if values.iter().any(|v| self.near_duplicate(v, p)) {
                return true;
            }
        }
        if substrs.len() > 1 && substrs.iter().skip(1).all(|s| *s == substrs[0]) {
            return true;
        }
        binding.values().any(|p| match p {
            Param::Columns(key) => key.iter().any(|k| columns.contains(&k.as_str())),
            _ => false,
        })
    }

    /// A value too similar to the scoped value would not change its meaning.
    fn near_duplicate(&self, value: &Value, predicate: &Predicate) -> bool {
        let (Some(_), Some(threshold), Some(embedding)) = (
            &self.params.codebook,
            self.params.threshold,
            &self.config.embedding,
        ) else {
            return false;
        };
        let candidate = value.to_string();
        predicate.values().iter().any(|target| {
            embedding
                .similarity(&candidate, &target.to_string())
                .is_some_and(|s| s > threshold)
        })
    }

    /// Instantiates every surviving binding of every template, in template
    /// order, followed by NOOP.
    ///
    /// Bindings a template rejects are logged and dropped.
    pub fn candidates(&self, templates: &[Arc<dyn OperationTemplate>]) -> Vec<Operation> {
        let mut out = Vec::new();
        for template in templates {
            let bindings = match self.bindings(template.as_ref()) {
                Ok(bindings) => bindings,
                Err(e) => {
                    debug!(template = template.id(), error = %e, "Skipping template");
                    continue;
                }
            };
            for binding in bindings {
                match template.instantiate(&binding) {
                    Ok(op) => out.push(op),
                    Err(e) => debug!(
                        template = template.id(),
                        binding = %render(template.schema(), &binding),
                        error = %e,
                        "Dropping binding"
                    ),
                }
            }
        }
        out.push(Operation::noop());
        debug!(candidates = out.len(), "Generated candidates");
        out
    }
}

/// All `size`-element combinations of `items`, in lexicographic order.
fn combinations(items: &[String], size: usize) -> Vec<Vec<String>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    if items.len() < size {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (i, head) in items.iter().enumerate() {
        for mut tail in combinations(&items[i + 1..], size - 1) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}
