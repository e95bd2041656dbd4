//! datarepair CLI - constraint-driven data repair
//!
//! Command-line interface over rule files and tabular datasets.

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use repair::CsvArgs;

mod repair;

/// datarepair - search for minimal edits that satisfy data-quality rules
#[derive(Parser)]
#[command(name = "datarepair")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair a dataset against a rule file
    Clean {
        /// Input file path (csv, json, jsonl, parquet)
        input: PathBuf,
        /// Rule file (JSON)
        #[arg(short, long)]
        rules: PathBuf,
        /// Output file path; the input format is kept when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Partition column, overriding the rule file
        #[arg(short, long)]
        partition: Option<String>,
        /// Iteration budget for both stages
        #[arg(long)]
        depth: Option<usize>,
        /// Pruning inflation for both stages
        #[arg(long)]
        gamma: Option<f64>,
        /// Edit cost weight for both stages
        #[arg(long)]
        edit: Option<f64>,
        /// Print the repair operation
        #[arg(long)]
        show_operation: bool,
        #[command(flatten)]
        csv: CsvArgs,
    },
    /// Score a dataset against a rule file
    Score {
        /// Input file path (csv, json, jsonl, parquet)
        input: PathBuf,
        /// Rule file (JSON)
        #[arg(short, long)]
        rules: PathBuf,
        #[command(flatten)]
        csv: CsvArgs,
    },
}

/// Parses arguments and runs the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Clean {
            input,
            rules,
            output,
            partition,
            depth,
            gamma,
            edit,
            show_operation,
            csv,
        } => repair::cmd_clean(
            &input,
            &rules,
            output.as_deref(),
            repair::Overrides {
                partition,
                depth,
                gamma,
                edit,
            },
            show_operation,
            csv,
        ),
        Commands::Score { input, rules, csv } => repair::cmd_score(&input, &rules, csv),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
