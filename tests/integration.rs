//! Integration tests for datarepair.

#![allow(clippy::uninlined_format_args, clippy::float_cmp)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arrow::{
    array::{RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use datarepair::{
    quality::{Constraint, DictValue, FunctionalDependency},
    solve,
    transform::{Binding, Param, ParamKind, ParamSchema},
    ArrowDataset, Dataset, Error, Operation, OperationTemplate, RuleSet, SearchConfig,
    SearchOutcome, SolverConfig, Step, StepKey, Transform, TreeSearch, Value,
};

const HOSPITAL: &str = "state,zip,city\n\
NY,10001,New York\n\
NY,10001,New York\n\
NY,10001,Nwe York\n\
MA,02134,Boston\n\
MA,02134,Boston\n\
MA,02134,Bostn\n\
MA,02134,Boston\n";

fn hospital() -> ArrowDataset {
    ArrowDataset::from_csv_str(HOSPITAL)
        .ok()
        .unwrap_or_else(|| panic!("Should parse hospital data"))
}

fn zip_city() -> Constraint {
    Constraint::atom(FunctionalDependency::new(["zip"], ["city"]))
}

fn run_search(config: &SearchConfig, batch: &RecordBatch) -> SearchOutcome {
    TreeSearch::new(config)
        .ok()
        .unwrap_or_else(|| panic!("Should build search"))
        .run(batch, &zip_city())
        .ok()
        .unwrap_or_else(|| panic!("Search should not fail after setup"))
}

fn text_batch(columns: &[(&str, Vec<&str>)]) -> RecordBatch {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as _)
        .collect();
    RecordBatch::try_new(schema, arrays)
        .ok()
        .unwrap_or_else(|| panic!("Should create batch"))
}

#[test]
fn test_end_to_end_dependency_repair() {
    let repair = solve(&hospital(), &[], &[zip_city()], None, &SolverConfig::default())
        .ok()
        .unwrap_or_else(|| panic!("Should solve"));

    let city = repair
        .dataset
        .column("city")
        .ok()
        .unwrap_or_else(|| panic!("Should read city"));
    assert_eq!(city[2], Value::str("New York"));
    assert_eq!(city[5], Value::str("Boston"));
    assert_eq!(repair.dataset.len(), 7);

    let batch = repair
        .dataset
        .to_batch()
        .ok()
        .unwrap_or_else(|| panic!("Should build batch"));
    assert_eq!(zip_city().total(&batch).ok(), Some(0.0));
}

#[test]
fn test_operation_replays_on_input() {
    let dataset = hospital();
    let repair = solve(&dataset, &[], &[zip_city()], None, &SolverConfig::default())
        .ok()
        .unwrap_or_else(|| panic!("Should solve"));

    let input = dataset
        .to_batch()
        .ok()
        .unwrap_or_else(|| panic!("Should build input batch"));
    let replayed = repair
        .operation
        .run(&input)
        .ok()
        .unwrap_or_else(|| panic!("Should replay operation"));
    let expected = repair
        .dataset
        .to_batch()
        .ok()
        .unwrap_or_else(|| panic!("Should build repaired batch"));
    for name in ["state", "zip", "city"] {
        assert_eq!(
            datarepair::value::column_values(&replayed, name).ok(),
            datarepair::value::column_values(&expected, name).ok(),
            "column {} differs",
            name
        );
    }
}

const TWO_BLOCKS: &str = "p,zip,city\n\
a,10001,New York\n\
a,10001,New York\n\
a,10001,Nwe York\n\
a,10002,Albany\n\
a,10002,Albany\n\
b,02134,Boston\n\
b,02134,Boston\n\
b,02134,Bostn\n\
b,02139,Cambridge\n\
b,02139,Cambridge\n";

#[test]
fn test_partitioned_search_matches_per_block_search() {
    let config = SolverConfig::default();
    let dataset = ArrowDataset::from_csv_str(TWO_BLOCKS)
        .ok()
        .unwrap_or_else(|| panic!("Should parse two-block data"));
    assert_eq!(dataset.len(), 10);

    let partitioned = solve(&dataset, &[], &[zip_city()], Some("p"), &config)
        .ok()
        .unwrap_or_else(|| panic!("Should solve partitioned"));
    let actual = partitioned
        .dataset
        .column("city")
        .ok()
        .unwrap_or_else(|| panic!("Should read city"));

    let blocks = dataset
        .partition_by("p")
        .ok()
        .unwrap_or_else(|| panic!("Should partition"));
    assert_eq!(blocks.len(), 2);
    assert_eq!(partitioned.blocks.len(), 2);

    let mut checked = 0;
    for block in blocks {
        let alone = ArrowDataset::from_batch(block.batch.clone())
            .ok()
            .unwrap_or_else(|| panic!("Should wrap block"));
        let single = solve(&alone, &[], &[zip_city()], None, &config)
            .ok()
            .unwrap_or_else(|| panic!("Should solve block"));
        let expected = single
            .dataset
            .column("city")
            .ok()
            .unwrap_or_else(|| panic!("Should read block city"));
        for (i, row) in block.rows.iter().enumerate() {
            assert_eq!(actual[*row], expected[i], "row {} of block {}", row, block.key);
            checked += 1;
        }
    }
    assert_eq!(checked, 10);
    assert_eq!(actual[2], Value::str("New York"));
    assert_eq!(actual[7], Value::str("Boston"));
}

#[test]
fn test_pattern_stage_deletes_out_of_domain_values() {
    let dataset = ArrowDataset::from_batch(text_batch(&[("state", vec!["NY", "NY", "XX"])]))
        .ok()
        .unwrap_or_else(|| panic!("Should create dataset"));
    let dict = Constraint::atom(DictValue::new("state", [Value::str("NY")]));
    let config = SolverConfig::default().map_stages(|c| c.with_edit(0.5));

    let repair = solve(&dataset, &[dict], &[], None, &config)
        .ok()
        .unwrap_or_else(|| panic!("Should solve pattern stage"));
    let state = repair
        .dataset
        .column("state")
        .ok()
        .unwrap_or_else(|| panic!("Should read state"));
    assert_eq!(state[0], Value::str("NY"));
    assert_eq!(state[2], Value::Null);
    assert_eq!(repair.operation.keys()[0].template, "delete");
}

// ========== Bad-operation cache ==========

#[derive(Debug)]
struct Explode {
    column: String,
    calls: Arc<AtomicUsize>,
}

impl Transform for Explode {
    fn apply(&self, _batch: RecordBatch) -> datarepair::Result<RecordBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::transform(format!("cannot explode '{}'", self.column)))
    }
}

impl Step for Explode {
    fn key(&self) -> StepKey {
        StepKey::new("explode", format!("'{}'", self.column))
    }
}

#[derive(Debug)]
struct ExplodeTemplate {
    schema: ParamSchema,
    calls: Arc<AtomicUsize>,
}

impl OperationTemplate for ExplodeTemplate {
    fn id(&self) -> &str {
        "explode"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    fn build(&self, binding: &Binding) -> datarepair::Result<Arc<dyn Step>> {
        match binding.get("column") {
            Some(Param::Column(column)) => Ok(Arc::new(Explode {
                column: column.clone(),
                calls: Arc::clone(&self.calls),
            })),
            _ => Err(Error::invalid_binding("explode", "missing column")),
        }
    }
}

#[test]
fn test_failing_step_runs_once_per_instantiation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let template = ExplodeTemplate {
        schema: ParamSchema::new([("column", ParamKind::Column)])
            .ok()
            .unwrap_or_else(|| panic!("Should build schema")),
        calls: Arc::clone(&calls),
    };
    let config = SearchConfig::default()
        .with_operations(vec![])
        .with_template(Arc::new(template))
        .with_depth(6);

    let batch = hospital()
        .to_batch()
        .ok()
        .unwrap_or_else(|| panic!("Should build batch"));
    let outcome = run_search(&config, &batch);

    // hint is {city, zip}: two distinct instantiations
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.bad_ops, 2);
    assert!(outcome.operation.is_noop());
}

// ========== Search properties ==========

#[test]
fn test_zero_cost_terminates_immediately() {
    let clean = text_batch(&[("zip", vec!["1", "2"]), ("city", vec!["a", "b"])]);
    let outcome = run_search(&SearchConfig::default(), &clean);
    assert_eq!(outcome.cost, 0.0);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.history, vec![0.0]);
}

#[test]
fn test_history_never_increases() {
    let batch = text_batch(&[
        ("zip", vec!["1", "1", "1", "2", "2", "3"]),
        ("city", vec!["a", "b", "c", "d", "e", "f"]),
    ]);
    let config = SearchConfig::default().with_depth(6);
    let outcome = run_search(&config, &batch);

    assert!(outcome.history.windows(2).all(|w| w[1] <= w[0]));
    assert!(outcome.cost <= outcome.history[0]);
    assert!(outcome.iterations <= 6);
}

#[test]
fn test_heavy_edit_weight_keeps_data() {
    let batch = text_batch(&[("zip", vec!["1", "1"]), ("city", vec!["a", "b"])]);
    // edit cost so heavy that no repair pays off
    let config = SearchConfig::default().with_edit(100.0);
    let outcome = run_search(&config, &batch);
    assert_eq!(outcome.cost, 0.5);
    assert_eq!(
        datarepair::value::column_values(&outcome.batch, "city").ok(),
        Some(vec![Value::str("a"), Value::str("b")])
    );
}

// ========== Rule files ==========

#[test]
fn test_rule_file_round_trip() {
    let dir = tempfile::tempdir()
        .ok()
        .unwrap_or_else(|| panic!("Should create temp dir"));
    let path = dir.path().join("rules.json");
    std::fs::write(
        &path,
        r#"{
            "dependencies": [
                {"type": "functional_dependency", "source": ["zip"], "target": ["city"]}
            ],
            "partition": "state",
            "config": {"dependency": {"depth": 4, "operations": ["swap"]}}
        }"#,
    )
    .ok()
    .unwrap_or_else(|| panic!("Should write rules"));

    let rules = RuleSet::from_path(&path)
        .ok()
        .unwrap_or_else(|| panic!("Should load rules"));
    let repair = rules
        .solve(&hospital())
        .ok()
        .unwrap_or_else(|| panic!("Should solve rules"));
    assert_eq!(repair.blocks.len(), 2);
    let city = repair
        .dataset
        .column("city")
        .ok()
        .unwrap_or_else(|| panic!("Should read city"));
    assert_eq!(city[5], Value::str("Boston"));

    let out = dir.path().join("clean.parquet");
    assert!(repair.dataset.save(&out).is_ok());
    let reloaded = ArrowDataset::load(&out)
        .ok()
        .unwrap_or_else(|| panic!("Should reload parquet"));
    assert_eq!(reloaded.len(), 7);
}

#[test]
fn test_rule_file_with_bad_regex_fails_setup() {
    let rules = RuleSet::from_json_str(
        r#"{"patterns": [{"type": "pattern", "column": "zip", "regex": "\\d{5"}]}"#,
    )
    .ok()
    .unwrap_or_else(|| panic!("Should parse rule file"));
    let err = rules
        .solve(&hospital())
        .err()
        .unwrap_or_else(|| panic!("Bad regex should fail setup"));
    assert!(err.is_config_error());
}

#[test]
fn test_noop_identity_on_real_data() {
    let batch = hospital()
        .to_batch()
        .ok()
        .unwrap_or_else(|| panic!("Should build batch"));
    let out = Operation::noop()
        .run(&batch)
        .ok()
        .unwrap_or_else(|| panic!("NOOP should run"));
    assert_eq!(out.num_rows(), batch.num_rows());
    assert_eq!(out.schema(), batch.schema());
}
