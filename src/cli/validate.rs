//! Validation subcommand: directory layout and fetch ledger integrity

use clap::Parser;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};
use crate::identifier::Module;
use crate::registry::ModuleRegistry;
use crate::resume::{FetchLedger, Verification};

/// Check the staging layout and audit recorded fetches
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// Modules whose directories to check; default every registered module
    #[arg(long)]
    pub modules: Option<String>,

    /// Create missing directories instead of reporting them
    #[arg(long, default_value_t = false)]
    pub create: bool,
}

impl ValidateCommand {
    /// Execute the validation command
    ///
    /// Fails when directories are missing (without `--create`) or when any
    /// ledger record no longer matches its staged file.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let registry = ModuleRegistry::load_embedded()?;
        let modules: Vec<Module> = match &self.modules {
            Some(list) => Module::parse_list(list)?,
            None => registry.entries().map(|(m, _)| m.clone()).collect(),
        };
        let layout = cli.layout();
        let check_hash = cli.verify_hash;

        let (missing, created) = if self.create {
            (Vec::new(), layout.ensure_layout(&modules)?)
        } else {
            (layout.missing_directories(&modules), Vec::new())
        };

        let ledger = FetchLedger::load_or_default(&layout.ledger_path())?;
        let audit = ledger.audit(check_hash);
        let invalid: Vec<_> = audit
            .iter()
            .filter(|(_, verification)| !verification.is_valid())
            .collect();

        match cli.output_format {
            OutputFormat::Json => {
                let document = json!({
                    "staging_root": layout.staging_root().display().to_string(),
                    "output_root": layout.output_root().display().to_string(),
                    "missing_directories": missing
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                    "created_directories": created
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                    "ledger_records": audit.len(),
                    "invalid_records": invalid
                        .iter()
                        .map(|(record, verification)| json!({
                            "path": record.local_path().display().to_string(),
                            "problem": describe(verification),
                        }))
                        .collect::<Vec<_>>(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&document)
                        .map_err(|e| CliError::InvalidArgument(e.to_string()))?
                );
            }
            OutputFormat::Human => {
                println!("Staging root: {}", layout.staging_root().display());
                println!("Output root:  {}", layout.output_root().display());
                for dir in &created {
                    println!("  created {}", dir.display());
                }
                for dir in &missing {
                    println!("  missing {}", dir.display());
                }
                println!(
                    "Ledger: {} record(s), {} invalid",
                    audit.len(),
                    invalid.len()
                );
                for (record, verification) in &invalid {
                    println!(
                        "  - {} ({})",
                        record.local_path().display(),
                        describe(verification)
                    );
                }
            }
        }

        if !missing.is_empty() {
            return Err(CliError::ValidationFailed(format!(
                "{} required director{} missing (rerun with --create)",
                missing.len(),
                if missing.len() == 1 { "y is" } else { "ies are" }
            )));
        }
        if !invalid.is_empty() {
            return Err(CliError::ValidationFailed(format!(
                "{} ledger record(s) do not match their staged files",
                invalid.len()
            )));
        }
        Ok(())
    }
}

fn describe(verification: &Verification) -> String {
    match verification {
        Verification::Valid => "valid".to_string(),
        Verification::Missing => "file missing".to_string(),
        Verification::Empty => "file empty".to_string(),
        Verification::SizeMismatch { expected, actual } => {
            format!("size {actual} bytes, recorded {expected}")
        }
        Verification::HashMismatch => "content hash changed".to_string(),
    }
}
