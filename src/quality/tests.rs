//! Tests for the quality module.

use std::sync::Arc;

use arrow::{
    array::{Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};

use super::*;

fn pairs(a: &[&str], b: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("A", DataType::Utf8, true),
        Field::new("B", DataType::Int64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(a.to_vec())),
            Arc::new(Int64Array::from(b.to_vec())),
        ],
    )
    .ok()
    .unwrap_or_else(|| panic!("Failed to create test batch"))
}

fn text(column: &str, values: Vec<Option<&str>>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(values))])
        .ok()
        .unwrap_or_else(|| panic!("Failed to create test batch"))
}

fn numbers(column: &str, values: Vec<Option<f64>>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Float64, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(values))])
        .ok()
        .unwrap_or_else(|| panic!("Failed to create test batch"))
}

fn scores(c: &Constraint, batch: &RecordBatch) -> Vec<f64> {
    c.evaluate(batch)
        .ok()
        .unwrap_or_else(|| panic!("evaluation failed for {}", c))
}

/// Scores a fixed vector, for algebra tests.
#[derive(Debug)]
struct Fixed(Vec<f64>, &'static str, HintParams);

impl QualityFunction for Fixed {
    fn name(&self) -> String {
        self.1.to_string()
    }

    fn score(&self, _batch: &RecordBatch) -> crate::Result<Vec<f64>> {
        Ok(self.0.clone())
    }

    fn hint(&self) -> BTreeSet<String> {
        BTreeSet::from([self.1.to_string()])
    }

    fn hint_params(&self) -> HintParams {
        self.2.clone()
    }
}

fn fixed(scores: &[f64], name: &'static str) -> Constraint {
    Constraint::atom(Fixed(scores.to_vec(), name, HintParams::default()))
}

// ========== Functional dependencies ==========

#[test]
fn test_fd_violation_and_repair() {
    let fd = Constraint::atom(FunctionalDependency::new(["A"], ["B"]));

    let dirty = pairs(&["x", "x"], &[1, 2]);
    let s = scores(&fd, &dirty);
    assert!(s.iter().all(|v| *v > 0.0));

    let clean = pairs(&["x", "x"], &[1, 1]);
    assert_eq!(scores(&fd, &clean), vec![0.0, 0.0]);
}

#[test]
fn test_fd_normalized_by_max_fanout() {
    let fd = Constraint::atom(FunctionalDependency::new(["A"], ["B"]));
    let batch = pairs(&["x", "x", "x", "y", "y", "z"], &[1, 2, 3, 1, 2, 9]);
    let s = scores(&fd, &batch);
    assert_eq!(s[0], 2.0 / 3.0);
    assert_eq!(s[3], 1.0 / 3.0);
    assert_eq!(s[5], 0.0);
}

#[test]
fn test_fd_missing_column_is_an_error() {
    let fd = Constraint::atom(FunctionalDependency::new(["A"], ["C"]));
    assert!(fd.evaluate(&pairs(&["x"], &[1])).is_err());
}

#[test]
fn test_one_to_one_takes_both_directions() {
    let c = one_to_one(["A"], ["B"]);
    // B -> A is violated, A -> B holds
    let batch = pairs(&["x", "y"], &[1, 1]);
    assert!(scores(&c, &batch).iter().all(|s| *s > 0.0));
    assert_eq!(c.hint(), BTreeSet::from(["A".to_string(), "B".to_string()]));
}

// ========== Algebra ==========

#[test]
fn test_add_averages() {
    let batch = pairs(&["x", "y"], &[1, 2]);
    let c = fixed(&[0.0, 1.0], "p") + fixed(&[1.0, 1.0], "q");
    assert_eq!(scores(&c, &batch), vec![0.5, 1.0]);
    assert_eq!(c.to_string(), "(p + q)");
}

#[test]
fn test_scalar_and_max() {
    let batch = pairs(&["x", "y"], &[1, 2]);
    let scaled = fixed(&[0.5, 1.0], "p") * 2.0;
    assert_eq!(scores(&scaled, &batch), vec![1.0, 2.0]);

    let both = fixed(&[0.2, 0.9], "p") * fixed(&[0.7, 0.1], "q");
    assert_eq!(scores(&both, &batch), vec![0.7, 0.9]);
}

#[test]
fn test_hints_union_and_params_right_wins() {
    let left = Constraint::atom(Fixed(
        vec![0.0],
        "p",
        HintParams {
            codebook: Some(BTreeSet::from([Value::str("a")])),
            threshold: Some(0.3),
        },
    ));
    let right = Constraint::atom(Fixed(
        vec![0.0],
        "q",
        HintParams {
            codebook: Some(BTreeSet::from([Value::str("b")])),
            threshold: None,
        },
    ));
    let c = left + right;

    assert_eq!(c.hint(), BTreeSet::from(["p".to_string(), "q".to_string()]));
    let params = c.hint_params();
    assert_eq!(params.codebook, Some(BTreeSet::from([Value::str("b")])));
    assert_eq!(params.threshold, Some(0.3));
}

#[test]
fn test_evaluate_rejects_bad_scores() {
    let batch = pairs(&["x", "y"], &[1, 2]);
    assert!(fixed(&[0.0], "short").evaluate(&batch).is_err());
    assert!(fixed(&[0.0, -1.0], "neg").evaluate(&batch).is_err());
    assert!(fixed(&[0.0, f64::NAN], "nan").evaluate(&batch).is_err());
    assert!(fixed(&[0.0, f64::INFINITY], "inf").evaluate(&batch).is_err());
    assert!((fixed(&[0.5, 0.25], "ok").total(&batch).unwrap_or(-1.0) - 0.75).abs() < 1e-12);
}

// ========== Predicate-like constraints ==========

#[test]
fn test_dict_value_scores_and_params() {
    let dict = DictValue::new("state", [Value::str("NY"), Value::str("CA")]).with_threshold(0.2);
    let params = dict.hint_params();
    let c = Constraint::atom(dict);

    let batch = text("state", vec![Some("NY"), Some("N.Y."), None]);
    assert_eq!(scores(&c, &batch), vec![0.0, 1.0, MISSING_SCORE]);
    assert_eq!(params.codebook.map(|c| c.len()), Some(2));
    assert_eq!(params.threshold, Some(0.2));
}

#[test]
fn test_pattern_is_start_anchored() {
    let pattern = Pattern::new("zip", r"\d{5}")
        .ok()
        .unwrap_or_else(|| panic!("valid regex"));
    assert!(pattern.format_cast().is_some());
    let c = Constraint::atom(pattern);

    let batch = text("zip", vec![Some("10001"), Some("x10001"), Some(""), None]);
    assert_eq!(scores(&c, &batch), vec![0.0, 1.0, 1.0, MISSING_SCORE]);
    assert_eq!(c.format_casts().len(), 1);
}

#[test]
fn test_pattern_invalid_regex() {
    assert!(Pattern::new("zip", "[").is_err());
}

#[test]
fn test_date_constraint() {
    let c = Constraint::atom(
        Date::new("day", "%Y-%m-%d")
            .ok()
            .unwrap_or_else(|| panic!("valid format")),
    );
    let batch = text("day", vec![Some("2024-01-31"), Some("31/01/2024"), Some("  "), None]);
    assert_eq!(scores(&c, &batch), vec![0.0, 1.0, 1.0, MISSING_SCORE]);
    assert_eq!(c.format_casts()[0].key().template, "dateparse");
}

#[test]
fn test_float_constraint_range() {
    let c = Constraint::atom(Float::new("temp").with_range(-50.0, 60.0));
    let batch = numbers("temp", vec![Some(21.5), Some(300.0), None, Some(f64::NAN)]);
    assert_eq!(scores(&c, &batch), vec![0.0, 1.0, MISSING_SCORE, MISSING_SCORE]);

    let strings = text("temp", vec![Some("21.5")]);
    assert_eq!(scores(&c, &strings), vec![1.0]);
}

#[test]
fn test_shape() {
    let batch = pairs(&["x", "y"], &[1, 2]);
    assert_eq!(scores(&Constraint::atom(Shape::new(2, 2)), &batch), vec![0.0, 0.0]);
    assert_eq!(scores(&Constraint::atom(Shape::new(3, 2)), &batch), vec![1.0, 1.0]);
}

// ========== Statistical constraints ==========

#[test]
fn test_parametric_flags_outlier() {
    let mut values: Vec<Option<f64>> = vec![Some(10.0); 20];
    values.push(Some(1000.0));
    values.push(None);
    let c = Constraint::atom(Parametric::new("x", 3.0));
    let s = scores(&c, &numbers("x", values));
    assert_eq!(s[20], 1.0);
    assert_eq!(s[21], 0.0);
    assert!(s[..20].iter().all(|v| *v == 0.0));
}

#[test]
fn test_parametric_constant_column_is_clean() {
    let c = Constraint::atom(Parametric::new("x", 3.0));
    let s = scores(&c, &numbers("x", vec![Some(5.0); 4]));
    assert_eq!(s, vec![0.0; 4]);
}

#[test]
fn test_non_parametric_uses_median() {
    let c = Constraint::atom(NonParametric::new("x", 5.0));
    let batch = numbers(
        "x",
        vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(500.0)],
    );
    let s = scores(&c, &batch);
    assert_eq!(s[5], 1.0);
    assert_eq!(s[..5].iter().sum::<f64>(), 0.0);
}

#[test]
fn test_correlation_positive() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Float64, true),
        Field::new("b", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0, 5.0])),
            Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0, -10.0])),
        ],
    )
    .ok()
    .unwrap_or_else(|| panic!("batch"));

    let c = Constraint::atom(Correlation::new("a", "b", CorrelationKind::Positive));
    let s = scores(&c, &batch);
    assert_eq!(s[4], 1.0);
    assert_eq!(s[..4].iter().sum::<f64>(), 0.0);

    let negative = Constraint::atom(Correlation::new("a", "b", CorrelationKind::Negative));
    assert!(scores(&negative, &batch)[0] > 0.0);
}
