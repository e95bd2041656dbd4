//! Search and solver configuration.
//!
//! Configuration is an explicit value passed to every search; there are no
//! global defaults. Serializable fields load from JSON rule files; custom
//! templates and the embedding provider are attached in code.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    predicate::PredicateScope,
    quality::{Embedding, SimilarityMetric},
    transform::{OperationKind, OperationTemplate},
};

/// Settings for one tree search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Iteration budget.
    pub depth: usize,
    /// Pruning inflation factor.
    pub gamma: f64,
    /// Weight of the edit cost.
    pub edit: f64,
    /// Builtin templates, in generation order.
    pub operations: Vec<OperationKind>,
    /// Per-column similarity metric for the edit cost.
    pub similarity: BTreeMap<String, SimilarityMetric>,
    /// Largest column combination offered for COLUMNS parameters.
    pub scope_limit: usize,
    /// Tokens offered for SUBSTR parameters.
    pub substrings: Vec<String>,
    /// Which side of the score split predicates come from.
    pub predicate_scope: PredicateScope,
    /// Extra templates, generated after the builtin ones.
    #[serde(skip)]
    pub templates: Vec<Arc<dyn OperationTemplate>>,
    /// Word embedding for semantic similarity and near-duplicate pruning.
    #[serde(skip)]
    pub embedding: Option<Arc<dyn Embedding>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            gamma: 5.0,
            edit: 1.0,
            operations: vec![OperationKind::Swap],
            similarity: BTreeMap::new(),
            scope_limit: 3,
            substrings: vec!["-".to_string(), "/".to_string()],
            predicate_scope: PredicateScope::Both,
            templates: Vec::new(),
            embedding: None,
        }
    }
}

impl SearchConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration budget.
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the pruning inflation factor.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the edit cost weight.
    #[must_use]
    pub fn with_edit(mut self, edit: f64) -> Self {
        self.edit = edit;
        self
    }

    /// Replaces the builtin template list.
    #[must_use]
    pub fn with_operations(mut self, operations: Vec<OperationKind>) -> Self {
        self.operations = operations;
        self
    }

    /// Sets the similarity metric of one column.
    #[must_use]
    pub fn with_similarity(mut self, column: impl Into<String>, metric: SimilarityMetric) -> Self {
        self.similarity.insert(column.into(), metric);
        self
    }

    /// Sets the COLUMNS combination limit.
    #[must_use]
    pub fn with_scope_limit(mut self, scope_limit: usize) -> Self {
        self.scope_limit = scope_limit;
        self
    }

    /// Replaces the substring token set.
    #[must_use]
    pub fn with_substrings(mut self, substrings: Vec<String>) -> Self {
        self.substrings = substrings;
        self
    }

    /// Sets the predicate derivation side.
    #[must_use]
    pub fn with_predicate_scope(mut self, scope: PredicateScope) -> Self {
        self.predicate_scope = scope;
        self
    }

    /// Appends a custom template.
    #[must_use]
    pub fn with_template(mut self, template: Arc<dyn OperationTemplate>) -> Self {
        self.templates.push(template);
        self
    }

    /// Attaches an embedding provider.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Arc<dyn Embedding>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// All templates in generation order: builtins, then custom ones.
    pub fn resolve_templates(&self) -> Vec<Arc<dyn OperationTemplate>> {
        self.operations
            .iter()
            .map(|kind| kind.template())
            .chain(self.templates.iter().cloned())
            .collect()
    }

    /// Checks the configuration before any search runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a negative or non-finite weight,
    /// a zero scope limit, no templates, or a semantic metric without an
    /// embedding.
    pub fn validate(&self) -> Result<()> {
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(Error::invalid_config(format!(
                "gamma must be a non-negative number, got {}",
                self.gamma
            )));
        }
        if !self.edit.is_finite() || self.edit < 0.0 {
            return Err(Error::invalid_config(format!(
                "edit weight must be a non-negative number, got {}",
                self.edit
            )));
        }
        if self.scope_limit == 0 {
            return Err(Error::invalid_config("scope_limit must be at least 1"));
        }
        if self.operations.is_empty() && self.templates.is_empty() {
            return Err(Error::invalid_config("no operation templates configured"));
        }
        if self.embedding.is_none()
            && self
                .similarity
                .values()
                .any(|m| *m == SimilarityMetric::Semantic)
        {
            return Err(Error::invalid_config(
                "semantic similarity requires an embedding",
            ));
        }
        Ok(())
    }
}

/// Settings for the two solver stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Search settings for pattern constraints.
    pub pattern: SearchConfig,
    /// Search settings for dependency constraints.
    pub dependency: SearchConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            pattern: SearchConfig::default().with_operations(vec![OperationKind::Delete]),
            dependency: SearchConfig::default().with_operations(vec![OperationKind::Swap]),
        }
    }
}

impl SolverConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed JSON or unknown
    /// operation or metric names.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_config(e.to_string()))
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_json_str(&json)
    }

    /// Applies the same change to both stages.
    #[must_use]
    pub fn map_stages(mut self, f: impl Fn(SearchConfig) -> SearchConfig) -> Self {
        self.pattern = f(self.pattern);
        self.dependency = f(self.dependency);
        self
    }

    /// Attaches an embedding provider to both stages.
    #[must_use]
    pub fn with_embedding(self, embedding: Arc<dyn Embedding>) -> Self {
        self.map_stages(|c| c.with_embedding(Arc::clone(&embedding)))
    }

    /// Validates both stages.
    ///
    /// # Errors
    ///
    /// Returns the first stage error.
    pub fn validate(&self) -> Result<()> {
        self.pattern.validate()?;
        self.dependency.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::VectorTable;

    #[test]
    fn test_defaults() {
        let config = SolverConfig::default();
        assert_eq!(config.pattern.depth, 10);
        assert_eq!(config.pattern.gamma, 5.0);
        assert_eq!(config.pattern.edit, 1.0);
        assert_eq!(config.pattern.operations, vec![OperationKind::Delete]);
        assert_eq!(config.dependency.operations, vec![OperationKind::Swap]);
        assert_eq!(config.dependency.scope_limit, 3);
        assert_eq!(config.dependency.substrings, vec!["-", "/"]);
        assert_eq!(config.dependency.predicate_scope, PredicateScope::Both);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SearchConfig::new()
            .with_depth(3)
            .with_gamma(2.0)
            .with_edit(0.5)
            .with_scope_limit(2)
            .with_predicate_scope(PredicateScope::Violated)
            .with_operations(vec![OperationKind::Swap, OperationKind::Majority]);
        assert_eq!(config.depth, 3);
        assert_eq!(config.resolve_templates().len(), 2);
        assert_eq!(config.resolve_templates()[1].id(), "majority");
    }

    #[test]
    fn test_from_json_partial() {
        let config = SolverConfig::from_json_str(
            r#"{"dependency": {"depth": 4, "operations": ["swap", "replace"],
                "similarity": {"city": "jaccard"}, "predicate_scope": "satisfied"}}"#,
        )
        .unwrap();
        assert_eq!(config.dependency.depth, 4);
        assert_eq!(config.dependency.gamma, 5.0);
        assert_eq!(
            config.dependency.similarity.get("city"),
            Some(&SimilarityMetric::Jaccard)
        );
        assert_eq!(config.dependency.predicate_scope, PredicateScope::Satisfied);
        assert_eq!(config.pattern.operations, vec![OperationKind::Delete]);
    }

    #[test]
    fn test_unknown_metric_is_config_error() {
        let err = SolverConfig::from_json_str(r#"{"pattern": {"similarity": {"c": "cosine"}}}"#)
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_semantic_requires_embedding() {
        let config = SearchConfig::new().with_similarity("city", SimilarityMetric::Semantic);
        assert!(config.validate().is_err());

        let config = config.with_embedding(Arc::new(VectorTable::new()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_weights() {
        assert!(SearchConfig::new().with_gamma(-1.0).validate().is_err());
        assert!(SearchConfig::new().with_edit(f64::NAN).validate().is_err());
        assert!(SearchConfig::new().with_scope_limit(0).validate().is_err());
        assert!(SearchConfig::new()
            .with_operations(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_solver_embedding_reaches_both_stages() {
        let config = SolverConfig::new().with_embedding(Arc::new(VectorTable::new()));
        assert!(config.pattern.embedding.is_some());
        assert!(config.dependency.embedding.is_some());
    }
}
