//! Parametrized operation templates.
//!
//! A template declares a [`ParamSchema`] and builds a step from a
//! [`Binding`]. The sampler enumerates bindings; [`OperationTemplate::instantiate`]
//! validates them against the schema before building.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{
    cells::{Delete, Majority, Replace, Swap},
    params::{
        bound_column, bound_columns, bound_predicate, bound_substr, bound_value, Binding,
        ParamKind, ParamSchema,
    },
    Operation, Step,
};
use crate::error::Result;

/// A template for a family of steps.
pub trait OperationTemplate: Send + Sync + fmt::Debug {
    /// Stable identifier, used in cache keys and logs.
    fn id(&self) -> &str;

    /// Declared parameters.
    fn schema(&self) -> &ParamSchema;

    /// Builds a step from an already validated binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot form a step.
    fn build(&self, binding: &Binding) -> Result<Arc<dyn Step>>;

    /// Validates `binding` and wraps the built step as an operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBinding`] if the binding does not
    /// match the schema.
    fn instantiate(&self, binding: &Binding) -> Result<Operation> {
        self.schema().validate(self.id(), binding)?;
        Ok(Operation::from_arc(self.build(binding)?))
    }
}

/// Builds [`Swap`] steps from `column`, `predicate`, `value`.
#[derive(Debug, Clone)]
pub struct SwapTemplate {
    schema: ParamSchema,
}

impl SwapTemplate {
    /// Creates the template.
    pub fn new() -> Self {
        Self {
            schema: ParamSchema::fixed(&[
                ("column", ParamKind::Column),
                ("predicate", ParamKind::Predicate),
                ("value", ParamKind::Value),
            ]),
        }
    }
}

impl Default for SwapTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTemplate for SwapTemplate {
    fn id(&self) -> &str {
        "swap"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    fn build(&self, binding: &Binding) -> Result<Arc<dyn Step>> {
        Ok(Arc::new(Swap::new(
            bound_column(self.id(), binding, "column")?,
            bound_predicate(self.id(), binding, "predicate")?,
            bound_value(self.id(), binding, "value")?,
        )))
    }
}

/// Builds [`Delete`] steps from `column`, `predicate`.
#[derive(Debug, Clone)]
pub struct DeleteTemplate {
    schema: ParamSchema,
}

impl DeleteTemplate {
    /// Creates the template.
    pub fn new() -> Self {
        Self {
            schema: ParamSchema::fixed(&[
                ("column", ParamKind::Column),
                ("predicate", ParamKind::Predicate),
            ]),
        }
    }
}

impl Default for DeleteTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTemplate for DeleteTemplate {
    fn id(&self) -> &str {
        "delete"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    fn build(&self, binding: &Binding) -> Result<Arc<dyn Step>> {
        Ok(Arc::new(Delete::new(
            bound_column(self.id(), binding, "column")?,
            bound_predicate(self.id(), binding, "predicate")?,
        )))
    }
}

/// Builds [`Replace`] steps from `column`, `substr1`, `substr2`.
#[derive(Debug, Clone)]
pub struct ReplaceTemplate {
    schema: ParamSchema,
}

impl ReplaceTemplate {
    /// Creates the template.
    pub fn new() -> Self {
        Self {
            schema: ParamSchema::fixed(&[
                ("column", ParamKind::Column),
                ("substr1", ParamKind::Substr),
                ("substr2", ParamKind::Substr),
            ]),
        }
    }
}

impl Default for ReplaceTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTemplate for ReplaceTemplate {
    fn id(&self) -> &str {
        "replace"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    fn build(&self, binding: &Binding) -> Result<Arc<dyn Step>> {
        Ok(Arc::new(Replace::new(
            bound_column(self.id(), binding, "column")?,
            bound_substr(self.id(), binding, "substr1")?,
            bound_substr(self.id(), binding, "substr2")?,
        )))
    }
}

/// Builds [`Majority`] steps from `column`, `key`.
#[derive(Debug, Clone)]
pub struct MajorityTemplate {
    schema: ParamSchema,
}

impl MajorityTemplate {
    /// Creates the template.
    pub fn new() -> Self {
        Self {
            schema: ParamSchema::fixed(&[
                ("column", ParamKind::Column),
                ("key", ParamKind::Columns),
            ]),
        }
    }
}

impl Default for MajorityTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTemplate for MajorityTemplate {
    fn id(&self) -> &str {
        "majority"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    fn build(&self, binding: &Binding) -> Result<Arc<dyn Step>> {
        Ok(Arc::new(Majority::new(
            bound_columns(self.id(), binding, "key")?,
            bound_column(self.id(), binding, "column")?,
        )))
    }
}

/// Builtin templates, nameable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// [`SwapTemplate`].
    Swap,
    /// [`DeleteTemplate`].
    Delete,
    /// [`ReplaceTemplate`].
    Replace,
    /// [`MajorityTemplate`].
    Majority,
}

impl OperationKind {
    /// Creates the template for this kind.
    pub fn template(self) -> Arc<dyn OperationTemplate> {
        match self {
            Self::Swap => Arc::new(SwapTemplate::new()),
            Self::Delete => Arc::new(DeleteTemplate::new()),
            Self::Replace => Arc::new(ReplaceTemplate::new()),
            Self::Majority => Arc::new(MajorityTemplate::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        error::Error,
        predicate::Predicate,
        transform::params::Param,
        value::Value,
    };

    fn predicate() -> Predicate {
        Predicate::new(
            "state",
            BTreeSet::from([Value::str("NY")]),
            Arc::new(BTreeSet::new()),
        )
    }

    #[test]
    fn test_swap_instantiate() {
        let template = SwapTemplate::new();
        let mut binding = Binding::new();
        binding.insert("column".into(), Param::Column("city".into()));
        binding.insert("predicate".into(), Param::Predicate(predicate()));
        binding.insert("value".into(), Param::Value(Value::str("New York")));

        let op = template.instantiate(&binding).unwrap();
        assert_eq!(op.depth(), 1);
        assert_eq!(op.keys()[0].template, "swap");
    }

    #[test]
    fn test_instantiate_rejects_wrong_kind() {
        let template = DeleteTemplate::new();
        let mut binding = Binding::new();
        binding.insert("column".into(), Param::Column("city".into()));
        binding.insert("predicate".into(), Param::Value(Value::str("NY")));

        assert!(matches!(
            template.instantiate(&binding),
            Err(Error::InvalidBinding { .. })
        ));
    }

    #[test]
    fn test_operation_kind_serde() {
        let kinds: Vec<OperationKind> =
            serde_json::from_str(r#"["swap", "delete", "replace", "majority"]"#).unwrap();
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[0].template().id(), "swap");
        assert_eq!(kinds[3].template().schema().len(), 2);
        assert!(serde_json::from_str::<OperationKind>(r#""merge""#).is_err());
    }
}
