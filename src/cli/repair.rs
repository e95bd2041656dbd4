//! Repair and scoring commands.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::{
    dataset::{ArrowDataset, CsvOptions, Dataset},
    error::Error,
    rules::RuleSet,
    solve::Stage,
};

/// CSV dialect of the input and output files.
#[derive(Args, Debug, Clone, Copy)]
pub(crate) struct CsvArgs {
    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    pub(crate) delimiter: char,
    /// CSV files have no header row
    #[arg(long)]
    pub(crate) no_header: bool,
}

impl Default for CsvArgs {
    fn default() -> Self {
        Self {
            delimiter: ',',
            no_header: false,
        }
    }
}

impl CsvArgs {
    fn options(self) -> crate::Result<CsvOptions> {
        let delimiter = u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "delimiter '{}' is not an ASCII character",
                    self.delimiter
                ))
            })?;
        Ok(CsvOptions::new()
            .with_delimiter(delimiter)
            .with_header(!self.no_header))
    }
}

/// Command-line overrides applied on top of a rule file.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) partition: Option<String>,
    pub(crate) depth: Option<usize>,
    pub(crate) gamma: Option<f64>,
    pub(crate) edit: Option<f64>,
}

impl Overrides {
    fn apply(self, mut rules: RuleSet) -> RuleSet {
        if let Some(partition) = self.partition {
            rules.partition = Some(partition);
        }
        let (depth, gamma, edit) = (self.depth, self.gamma, self.edit);
        rules.config = rules.config.map_stages(|mut stage| {
            if let Some(depth) = depth {
                stage.depth = depth;
            }
            if let Some(gamma) = gamma {
                stage.gamma = gamma;
            }
            if let Some(edit) = edit {
                stage.edit = edit;
            }
            stage
        });
        rules
    }
}

/// Default output path: `<stem>.clean.<ext>` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("csv");
    input.with_file_name(format!("{}.clean.{}", stem, ext))
}

/// Repair a dataset and write the result.
pub(crate) fn cmd_clean(
    input: &Path,
    rules: &Path,
    output: Option<&Path>,
    overrides: Overrides,
    show_operation: bool,
    csv: CsvArgs,
) -> crate::Result<()> {
    let csv = csv.options()?;
    let dataset = ArrowDataset::load_with(input, &csv)?;
    let rules = overrides.apply(RuleSet::from_path(rules)?);
    let repair = rules.solve(&dataset)?;

    let output = output.map_or_else(|| default_output(input), Path::to_path_buf);
    repair.dataset.save_with(&output, &csv)?;

    println!(
        "Repaired {} -> {} ({} rows, {} blocks, {} candidates scored)",
        input.display(),
        output.display(),
        repair.dataset.len(),
        repair.blocks.len(),
        repair.evaluated()
    );
    for block in &repair.blocks {
        let key = block
            .key
            .as_ref()
            .map_or_else(|| "all".to_string(), ToString::to_string);
        for outcome in &block.constraints {
            println!(
                "  [{}] {} {}: cost {:.4} after {} iterations",
                key, outcome.stage, outcome.constraint, outcome.cost, outcome.iterations
            );
        }
    }
    if show_operation {
        println!();
        println!("{}", repair.operation);
    }

    Ok(())
}

/// Print per-constraint costs of a dataset.
pub(crate) fn cmd_score(input: &Path, rules: &Path, csv: CsvArgs) -> crate::Result<()> {
    let dataset = ArrowDataset::load_with(input, &csv.options()?)?;
    let compiled = RuleSet::from_path(rules)?.compile()?;
    let batch = dataset.to_batch()?;
    let rows = batch.num_rows().max(1) as f64;

    let stages = compiled
        .patterns
        .iter()
        .map(|c| (Stage::Pattern, c))
        .chain(compiled.dependencies.iter().map(|c| (Stage::Dependency, c)));

    let mut total = 0.0;
    println!("{:<12} {:>10} {:>10}  CONSTRAINT", "STAGE", "TOTAL", "PER ROW");
    for (stage, constraint) in stages {
        let cost = constraint.total(&batch)?;
        total += cost;
        println!(
            "{:<12} {:>10.4} {:>10.4}  {}",
            stage.to_string(),
            cost,
            cost / rows,
            constraint
        );
    }
    println!("{:<12} {:>10.4} {:>10.4}", "total", total, total / rows);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/data/hospital.csv")),
            PathBuf::from("/data/hospital.clean.csv")
        );
    }

    #[test]
    fn test_overrides_reach_both_stages() {
        let rules = Overrides {
            partition: Some("state".into()),
            depth: Some(2),
            gamma: None,
            edit: Some(0.5),
        }
        .apply(RuleSet::default());
        assert_eq!(rules.partition.as_deref(), Some("state"));
        assert_eq!(rules.config.pattern.depth, 2);
        assert_eq!(rules.config.dependency.edit, 0.5);
        assert_eq!(rules.config.dependency.gamma, 5.0);
    }

    #[test]
    fn test_clean_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hospital.csv");
        let rules = dir.path().join("rules.json");
        std::fs::write(
            &input,
            "zip,city\n10001,New York\n10001,New York\n10001,Nwe York\n",
        )
        .unwrap();
        std::fs::write(
            &rules,
            r#"{"dependencies": [{"type": "functional_dependency", "source": ["zip"], "target": ["city"]}]}"#,
        )
        .unwrap();

        cmd_clean(&input, &rules, None, Overrides::default(), true, CsvArgs::default()).unwrap();
        let repaired = ArrowDataset::load(dir.path().join("hospital.clean.csv")).unwrap();
        assert_eq!(repaired.len(), 3);
        cmd_score(&input, &rules, CsvArgs::default()).unwrap();
    }

    #[test]
    fn test_clean_keeps_csv_dialect() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hospital.csv");
        let rules = dir.path().join("rules.json");
        std::fs::write(&input, "10001;New York\n10001;New York\n10001;Nwe York\n").unwrap();
        std::fs::write(
            &rules,
            r#"{"dependencies": [{"type": "functional_dependency", "source": ["column_1"], "target": ["column_2"]}]}"#,
        )
        .unwrap();
        let csv = CsvArgs {
            delimiter: ';',
            no_header: true,
        };

        cmd_clean(&input, &rules, None, Overrides::default(), false, csv).unwrap();
        let written = std::fs::read_to_string(dir.path().join("hospital.clean.csv")).unwrap();
        assert_eq!(written, "10001;New York\n10001;New York\n10001;New York\n");
    }

    #[test]
    fn test_non_ascii_delimiter_is_rejected() {
        let csv = CsvArgs {
            delimiter: '→',
            no_header: false,
        };
        assert!(csv.options().unwrap_err().is_config_error());
    }
}
