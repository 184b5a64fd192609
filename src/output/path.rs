//! Staging and artifact path layout
//!
//! Two roots, one directory per module under each:
//!
//! ```text
//! <staging>/<MODULE>/<date_key>.csv               raw staged report files
//! <staging>/.fetch-ledger.json                    fetch ledger
//! <output>/<MODULE>/<module>_consolidated.<ext>   artifacts, one per format
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use report_downloader::identifier::{DateKey, Module, Period};
//! use report_downloader::output::{ArtifactFormat, StagingLayout};
//!
//! let layout = StagingLayout::new("staging", "output");
//! let key = DateKey::with_variant(Period::Year(2024), "A").unwrap();
//!
//! let staged = layout.staged_file(&Module::Ccm, &key);
//! assert!(staged.ends_with("CCM/2024_A.csv"));
//!
//! let artifact = layout.artifact_path(&Module::Ccm, ArtifactFormat::Columnar);
//! assert!(artifact.ends_with("CCM/ccm_consolidated.parquet"));
//! ```

use std::path::{Path, PathBuf};

use super::ArtifactFormat;
use crate::identifier::{DateKey, Module};
use crate::resume::LEDGER_FILE_NAME;

/// Extensions picked up as staged report files
const STAGED_EXTENSIONS: [&str; 4] = ["csv", "xlsx", "xls", "xlsm"];

/// Directory layout shared by the downloader, consolidator, and optimizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    staging_root: PathBuf,
    output_root: PathBuf,
}

impl StagingLayout {
    /// Layout over the given roots
    pub fn new(staging_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Root of the raw staged files
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Root of the optimized artifacts
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<staging>/<MODULE>`
    pub fn module_staging_dir(&self, module: &Module) -> PathBuf {
        self.staging_root.join(module_dir_name(module))
    }

    /// `<staging>/<MODULE>/<date_key>.csv`
    pub fn staged_file(&self, module: &Module, date_key: &DateKey) -> PathBuf {
        self.module_staging_dir(module)
            .join(format!("{}.csv", sanitize_component(&date_key.to_string())))
    }

    /// `<output>/<MODULE>`
    pub fn module_output_dir(&self, module: &Module) -> PathBuf {
        self.output_root.join(module_dir_name(module))
    }

    /// `<output>/<MODULE>/<module>_consolidated.<ext>`
    pub fn artifact_path(&self, module: &Module, format: ArtifactFormat) -> PathBuf {
        self.module_output_dir(module).join(format!(
            "{}_consolidated.{}",
            module_dir_name(module).to_lowercase(),
            format.extension()
        ))
    }

    /// Fetch ledger location
    pub fn ledger_path(&self) -> PathBuf {
        self.staging_root.join(LEDGER_FILE_NAME)
    }

    /// Staged report files of `module`, sorted by file name
    ///
    /// Hidden files (temp files, the ledger, the lock) are ignored. A missing
    /// module directory yields an empty list.
    pub fn discover_staged_files(&self, module: &Module) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.module_staging_dir(module);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        discover_report_files(&dir)
    }

    /// Every directory a run over `modules` writes into
    pub fn required_directories(&self, modules: &[Module]) -> Vec<PathBuf> {
        let mut dirs = vec![self.staging_root.clone(), self.output_root.clone()];
        for module in modules {
            dirs.push(self.module_staging_dir(module));
            dirs.push(self.module_output_dir(module));
        }
        dirs
    }

    /// Required directories that do not exist yet
    pub fn missing_directories(&self, modules: &[Module]) -> Vec<PathBuf> {
        self.required_directories(modules)
            .into_iter()
            .filter(|dir| !dir.is_dir())
            .collect()
    }

    /// Create every required directory, returning the ones that were created
    pub fn ensure_layout(&self, modules: &[Module]) -> std::io::Result<Vec<PathBuf>> {
        let missing = self.missing_directories(modules);
        for dir in &missing {
            std::fs::create_dir_all(dir)?;
        }
        Ok(missing)
    }
}

/// Report files directly inside `dir`, sorted by file name
///
/// Hidden files and unsupported extensions are ignored.
pub fn discover_report_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_staged_report(&path) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Whether `path` looks like a staged report (csv or Excel, not hidden)
pub fn is_staged_report(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| STAGED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn module_dir_name(module: &Module) -> String {
    sanitize_component(module.as_str())
}

/// Replace path separators and parent references so a name stays one component
fn sanitize_component(name: &str) -> String {
    name.replace("..", "__").replace(['/', '\\', ':'], "_")
}
