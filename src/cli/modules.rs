//! Listing of registered report modules

use clap::Args;
use serde_json::json;

use super::{CliError, OutputFormat};
use crate::identifier::Module;
use crate::registry::ModuleRegistry;

/// Modules subcommand
#[derive(Debug, Args)]
pub struct ModulesCommand {
    /// Only show these modules (e.g. CCM,SOL)
    #[arg(long)]
    pub modules: Option<String>,
}

impl ModulesCommand {
    /// Print the registry, filtered by `--modules`
    pub fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let registry = ModuleRegistry::load_embedded()?;
        let selected: Vec<Module> = match &self.modules {
            Some(list) => Module::parse_list(list)?,
            None => registry.entries().map(|(m, _)| m.clone()).collect(),
        };

        let mut rows = Vec::with_capacity(selected.len());
        for module in &selected {
            let entry = registry.get(module)?;
            rows.push((module, entry));
        }

        match format {
            OutputFormat::Json => {
                let listing: Vec<_> = rows
                    .iter()
                    .map(|(module, entry)| {
                        json!({
                            "module": module.to_string(),
                            "name": entry.name(),
                            "code": entry.code(),
                            "description": entry.description(),
                            "report_path": entry.report_path(),
                        })
                    })
                    .collect();
                let document = json!({
                    "modules": listing,
                    "default_variants": registry.default_variants(),
                    "default_years": registry.default_years(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&document)
                        .map_err(|e| CliError::InvalidArgument(e.to_string()))?
                );
            }
            OutputFormat::Human => {
                println!("{} registered modules:\n", rows.len());
                for (module, entry) in &rows {
                    println!("{:<6} code={:<5} {}", module.as_str(), entry.code(), entry.description());
                }
                let (first, last) = registry.default_years();
                println!(
                    "\nDefault variants: {}",
                    registry.default_variants().join(",")
                );
                println!("Default years: {first}-{last}");
            }
        }
        Ok(())
    }
}
