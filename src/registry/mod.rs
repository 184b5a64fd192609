//! Module registry with report server metadata
//!
//! The registry maps each report [`Module`] to the numeric procedure code and
//! report path the report server expects, plus the default variant codes and
//! year span used when the caller does not narrow the request.

use crate::identifier::Module;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Embedded registry data
const REGISTRY_JSON: &str = include_str!("modules.json");

/// Global registry instance (loaded once)
static REGISTRY: Lazy<Result<ModuleRegistry, RegistryError>> =
    Lazy::new(|| ModuleRegistry::from_json(REGISTRY_JSON));

/// Registry of known report modules
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    #[allow(dead_code)]
    schema_version: String,
    default_variants: Vec<String>,
    default_years: (i32, i32),
    entries: BTreeMap<Module, ModuleEntry>,
}

impl ModuleRegistry {
    /// Load the embedded registry
    ///
    /// This is a singleton operation - the registry is loaded once and cached.
    pub fn load() -> Result<&'static Self, &'static RegistryError> {
        REGISTRY.as_ref()
    }

    /// Load embedded registry, returning an owned copy
    pub fn load_embedded() -> Result<Self, RegistryError> {
        Self::from_json(REGISTRY_JSON)
    }

    /// Parse registry from JSON string
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse registry: {e}")))?;

        if raw.default_first_year > raw.default_last_year {
            return Err(RegistryError::ParseError(format!(
                "default year span {}..{} is inverted",
                raw.default_first_year, raw.default_last_year
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in raw.modules {
            let module: Module = entry
                .name
                .parse()
                .map_err(|e| RegistryError::ParseError(format!("{e}")))?;
            if entries.insert(module.clone(), entry).is_some() {
                return Err(RegistryError::ParseError(format!(
                    "duplicate module entry {module}"
                )));
            }
        }

        Ok(Self {
            schema_version: raw.schema_version,
            default_variants: raw.default_variants,
            default_years: (raw.default_first_year, raw.default_last_year),
            entries,
        })
    }

    /// All entries ordered by module
    pub fn entries(&self) -> impl Iterator<Item = (&Module, &ModuleEntry)> {
        self.entries.iter()
    }

    /// Look up a module
    pub fn get(&self, module: &Module) -> Result<&ModuleEntry, RegistryError> {
        self.entries
            .get(module)
            .ok_or_else(|| RegistryError::NotFound(module.to_string()))
    }

    /// Variant codes requested when none are given
    pub fn default_variants(&self) -> &[String] {
        &self.default_variants
    }

    /// Inclusive year span requested when none is given
    pub fn default_years(&self) -> (i32, i32) {
        self.default_years
    }
}

/// A single module entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    name: String,
    code: u32,
    description: String,
    report_path: String,
}

impl ModuleEntry {
    /// Module name as registered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Procedure code passed to the report server
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Human description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// URL-encoded report path on the report server
    pub fn report_path(&self) -> &str {
        &self.report_path
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    schema_version: String,
    #[allow(dead_code)]
    last_updated: String,
    default_variants: Vec<String>,
    default_first_year: i32,
    default_last_year: i32,
    modules: Vec<ModuleEntry>,
}

/// Errors that can occur when working with the registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Failed to parse registry JSON
    #[error("registry parse error: {0}")]
    ParseError(String),

    /// Module not found in registry
    #[error("module not registered: {0}")]
    NotFound(String),
}
