//! Optimize command: consolidate local files and write artifacts without
//! contacting the report server

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use super::download::ConsolidateArgs;
use super::{report, Cli, CliError, OutputFormat};
use crate::consolidate::Consolidator;
use crate::downloader::{ConsolidationSummary, ModuleReport, RunMode, RunStatus, RunSummary};
use crate::identifier::Module;
use crate::output::{discover_report_files, is_staged_report, Optimizer};

/// Optimize command arguments
#[derive(Parser, Debug)]
pub struct OptimizeArgs {
    /// Module the files belong to; names the artifacts
    #[arg(long)]
    pub module: Module,

    /// Report files or directories of report files; default the module's
    /// staging directory
    #[arg(long, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Consolidation and artifact settings
    #[command(flatten)]
    pub consolidate: ConsolidateArgs,
}

impl OptimizeArgs {
    /// Input files in argument order; directories expand to their sorted
    /// report files
    pub fn input_files(&self, cli: &Cli) -> Result<Vec<PathBuf>, CliError> {
        let inputs = if self.input.is_empty() {
            vec![cli.layout().module_staging_dir(&self.module)]
        } else {
            self.input.clone()
        };

        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                files.extend(discover_report_files(&input)?);
            } else if input.is_file() {
                if !is_staged_report(&input) {
                    return Err(CliError::InvalidArgument(format!(
                        "{} is not a csv or Excel file",
                        input.display()
                    )));
                }
                files.push(input);
            } else {
                return Err(CliError::InvalidArgument(format!(
                    "{} does not exist",
                    input.display()
                )));
            }
        }
        if files.is_empty() {
            return Err(CliError::InvalidArgument(
                "no report files found in the given inputs".to_string(),
            ));
        }
        Ok(files)
    }

    /// Execute the optimize command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let started = Instant::now();
        let files = self.input_files(cli)?;
        let formats = self.consolidate.formats()?;
        let consolidator = Consolidator::new(self.consolidate.options());
        let optimizer = Optimizer::new(cli.layout()).with_batch_size(self.consolidate.batch_size);
        let module = self.module.clone();
        info!(module = %module, files = files.len(), "Optimizing local files");

        let module_report = tokio::task::spawn_blocking(move || {
            let dataset = consolidator.consolidate(&module, &files)?;
            let artifacts = optimizer.optimize(&dataset, &formats);
            Ok::<_, CliError>(ModuleReport {
                consolidation: Ok(ConsolidationSummary {
                    rows: dataset.row_count(),
                    columns: dataset.column_count(),
                    files: dataset.sources.len(),
                    malformed_rows: dataset.malformed_rows(),
                    warnings: dataset.warnings,
                }),
                artifacts,
                module,
            })
        })
        .await
        .map_err(|e| CliError::InvalidArgument(format!("optimize task failed: {e}")))??;

        let status = if module_report.is_success() {
            RunStatus::AllSucceeded
        } else {
            RunStatus::Partial
        };
        let summary = RunSummary {
            mode: RunMode::ConsolidateOnly,
            modules: BTreeMap::new(),
            failures: Vec::new(),
            processing: vec![module_report],
            elapsed: started.elapsed(),
            status,
            results: Vec::new(),
            ledger_error: None,
        };

        match cli.output_format {
            OutputFormat::Json => report::print_summary_json(&summary),
            OutputFormat::Human => report::print_summary_human(&summary),
        }

        match summary.status {
            RunStatus::AllSucceeded => Ok(()),
            status => Err(CliError::RunIncomplete(status)),
        }
    }
}
