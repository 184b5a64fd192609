//! Run orchestration: task expansion, download, and post-processing
//!
//! [`Orchestrator::run`] expands a [`DownloadRequest`] into tasks, holds the
//! staging lock for the whole run, seeds the deduplicator from the fetch
//! ledger, drives the [`DownloadExecutor`], persists the ledger, and finally
//! consolidates and optimizes every module that gained files. Modules are
//! post-processed on the same [`WorkerPool`] abstraction the downloads use.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::DownloadConfig;
use super::executor::DownloadExecutor;
use super::job::{DownloadTask, SkipReason, TaskOutcome, TaskResult};
use super::pool::WorkerPool;
use super::progress::{LoggingObserver, ProgressObserver};
use super::DownloadError;
use crate::consolidate::{ConsolidateOptions, ConsolidationError, ConsolidationWarning, Consolidator};
use crate::fetcher::{Credentials, FetchError, Transport};
use crate::identifier::{DateKey, DateRange, Module};
use crate::output::{ArtifactFormat, ArtifactResult, Optimizer, StagingLayout, DEFAULT_BATCH_SIZE};
use crate::resolver::{RemoteResolver, TemplateResolver};
use crate::resume::{Deduplicator, FetchLedger, StagingLock};
use crate::shutdown::{self, SharedShutdown};

/// How a run treats staged files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Resume: skip tasks whose staged file verifies
    #[default]
    Missing,
    /// Re-download everything
    All,
    /// No network; consolidate and optimize what is already staged
    ConsolidateOnly,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Missing => "missing",
            RunMode::All => "all",
            RunMode::ConsolidateOnly => "consolidate-only",
        })
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "missing" => Ok(RunMode::Missing),
            "all" => Ok(RunMode::All),
            "consolidate-only" | "consolidate" => Ok(RunMode::ConsolidateOnly),
            other => Err(format!(
                "unknown mode '{other}' (expected missing, all, or consolidate-only)"
            )),
        }
    }
}

/// What to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Modules, in processing order
    pub modules: Vec<Module>,
    /// Periods to fetch
    pub date_range: DateRange,
    /// Report variant codes; empty means no variant dimension
    pub variants: Vec<String>,
    /// Resume behavior
    pub mode: RunMode,
}

impl DownloadRequest {
    /// Request without variants in [`RunMode::Missing`]
    pub fn new(modules: Vec<Module>, date_range: DateRange) -> Self {
        Self {
            modules,
            date_range,
            variants: Vec::new(),
            mode: RunMode::Missing,
        }
    }

    /// Fetch each period once per variant
    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    /// Set the run mode
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Per-module task counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCounts {
    /// Files transferred
    pub succeeded: usize,
    /// Tasks skipped for any reason
    pub skipped: usize,
    /// Tasks that gave up
    pub failed: usize,
}

impl ModuleCounts {
    /// All tasks of the module
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// No task produced a file and at least one failed
    NothingDownloaded,
    /// Some tasks failed
    Partial,
    /// No task failed
    AllSucceeded,
    /// Stopped by a cancellation request
    Cancelled,
    /// Stopped by an authentication failure
    Aborted,
}

impl RunStatus {
    /// Classify a finished set of results
    pub fn from_results(results: &[TaskResult], cancelled: bool) -> Self {
        let auth_failure = results
            .iter()
            .any(|r| matches!(&r.outcome, TaskOutcome::Failed(e) if e.is_auth()));
        if auth_failure {
            return RunStatus::Aborted;
        }
        let cancelled = cancelled
            || results
                .iter()
                .any(|r| r.outcome == TaskOutcome::Skipped(SkipReason::Cancelled));
        if cancelled {
            return RunStatus::Cancelled;
        }

        let failed = results.iter().filter(|r| r.outcome.is_failure()).count();
        let produced = results.iter().filter(|r| r.local_file().is_some()).count();
        if failed == 0 {
            RunStatus::AllSucceeded
        } else if produced == 0 {
            RunStatus::NothingDownloaded
        } else {
            RunStatus::Partial
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::NothingDownloaded => "nothing downloaded",
            RunStatus::Partial => "some files failed",
            RunStatus::AllSucceeded => "all succeeded",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Aborted => "aborted",
        })
    }
}

/// Consolidation statistics of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationSummary {
    /// Rows in the dataset
    pub rows: usize,
    /// Columns in the dataset
    pub columns: usize,
    /// Files that contributed rows
    pub files: usize,
    /// Rows dropped for a wrong field count
    pub malformed_rows: usize,
    /// Excluded files
    pub warnings: Vec<ConsolidationWarning>,
}

/// Post-processing outcome of one module
#[derive(Debug, Clone)]
pub struct ModuleReport {
    /// The module
    pub module: Module,
    /// Consolidation result
    pub consolidation: Result<ConsolidationSummary, ConsolidationError>,
    /// One entry per requested format; empty when consolidation failed
    pub artifacts: Vec<ArtifactResult>,
}

impl ModuleReport {
    fn failed(module: Module, error: ConsolidationError) -> Self {
        Self {
            module,
            consolidation: Err(error),
            artifacts: Vec::new(),
        }
    }

    /// Consolidated and every artifact written
    pub fn is_success(&self) -> bool {
        self.consolidation.is_ok() && self.artifacts.iter().all(Result::is_ok)
    }

    /// One-line summary for logs and terminal output
    pub fn format_line(&self) -> String {
        match &self.consolidation {
            Ok(summary) => {
                let written = self.artifacts.iter().filter(|a| a.is_ok()).count();
                let mut line = format!(
                    "{}: {} rows from {} files, {}/{} artifacts written",
                    self.module,
                    summary.rows,
                    summary.files,
                    written,
                    self.artifacts.len()
                );
                if !summary.warnings.is_empty() {
                    line.push_str(&format!(" ({} files excluded)", summary.warnings.len()));
                }
                line
            }
            Err(e) => format!("{}: consolidation failed: {e}", self.module),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Mode the run executed in
    pub mode: RunMode,
    /// Task counts per module
    pub modules: BTreeMap<Module, ModuleCounts>,
    /// Failed task labels with their causes, in task order
    pub failures: Vec<(String, FetchError)>,
    /// Post-processing outcomes, in module order
    pub processing: Vec<ModuleReport>,
    /// Wall time of the whole run
    pub elapsed: Duration,
    /// Overall status
    pub status: RunStatus,
    /// One result per task, in task order
    pub results: Vec<TaskResult>,
    /// Why the fetch ledger could not be saved, if it could not
    ///
    /// Files on disk are intact; the next run re-verifies them by probe or
    /// downloads them again.
    pub ledger_error: Option<String>,
}

impl RunSummary {
    fn from_results(
        mode: RunMode,
        results: Vec<TaskResult>,
        cancelled: bool,
        elapsed: Duration,
    ) -> Self {
        let mut modules: BTreeMap<Module, ModuleCounts> = BTreeMap::new();
        let mut failures = Vec::new();
        for result in &results {
            let counts = modules.entry(result.task.module.clone()).or_default();
            match &result.outcome {
                TaskOutcome::Success { .. } => counts.succeeded += 1,
                TaskOutcome::Skipped(_) => counts.skipped += 1,
                TaskOutcome::Failed(error) => {
                    counts.failed += 1;
                    failures.push((result.task.label(), error.clone()));
                }
            }
        }

        Self {
            mode,
            modules,
            failures,
            processing: Vec::new(),
            elapsed,
            status: RunStatus::from_results(&results, cancelled),
            results,
            ledger_error: None,
        }
    }

    /// Tasks that transferred a file
    pub fn succeeded(&self) -> usize {
        self.modules.values().map(|c| c.succeeded).sum()
    }

    /// Tasks skipped
    pub fn skipped(&self) -> usize {
        self.modules.values().map(|c| c.skipped).sum()
    }

    /// Tasks failed
    pub fn failed(&self) -> usize {
        self.modules.values().map(|c| c.failed).sum()
    }
}

/// Drives complete runs over one staging layout
pub struct Orchestrator {
    config: DownloadConfig,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn RemoteResolver>,
    layout: StagingLayout,
    consolidate_options: ConsolidateOptions,
    formats: Vec<ArtifactFormat>,
    batch_size: usize,
    shutdown: Option<SharedShutdown>,
    observer: Arc<dyn ProgressObserver>,
    reconsolidate_skipped: bool,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("formats", &self.formats)
            .field("batch_size", &self.batch_size)
            .field("reconsolidate_skipped", &self.reconsolidate_skipped)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator using the report-server URL convention
    ///
    /// Fails if `config` is invalid or the module registry cannot be loaded.
    pub fn new(
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
        layout: StagingLayout,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let resolver = TemplateResolver::report_server(config.base_url.clone())?;
        Ok(Self {
            config,
            transport,
            resolver: Arc::new(resolver),
            layout,
            consolidate_options: ConsolidateOptions::default(),
            formats: ArtifactFormat::ALL.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown: shutdown::get_global_shutdown(),
            observer: Arc::new(LoggingObserver),
            reconsolidate_skipped: false,
        })
    }

    /// Replace the URL resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn RemoteResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Consolidation settings
    pub fn with_consolidate_options(mut self, options: ConsolidateOptions) -> Self {
        self.consolidate_options = options;
        self
    }

    /// Artifact formats written per module
    pub fn with_formats(mut self, formats: Vec<ArtifactFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Rows per batch for columnar and binary artifacts
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Cancellation handle
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Also post-process modules whose files were all skipped as verified
    pub fn with_reconsolidate_skipped(mut self, enabled: bool) -> Self {
        self.reconsolidate_skipped = enabled;
        self
    }

    /// Directory layout
    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    /// Active configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Expand a request into tasks: modules × periods × variants
    ///
    /// Duplicate identities are dropped, keeping the first occurrence.
    pub fn expand(&self, request: &DownloadRequest) -> Result<Vec<DownloadTask>, DownloadError> {
        let periods = request.date_range.periods();
        let mut date_keys = Vec::with_capacity(periods.len() * request.variants.len().max(1));
        for period in &periods {
            if request.variants.is_empty() {
                date_keys.push(DateKey::new(*period));
            } else {
                for variant in &request.variants {
                    date_keys.push(DateKey::with_variant(*period, variant)?);
                }
            }
        }

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(request.modules.len() * date_keys.len());
        for module in &request.modules {
            for date_key in &date_keys {
                let url = self.resolver.resolve(module, date_key)?;
                let destination = self.layout.staged_file(module, date_key);
                let task = DownloadTask::new(module.clone(), date_key.clone(), url, destination);
                if seen.insert(task.identity()) {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }

    fn cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Staging root and every task's parent directory must already exist
    fn preflight(&self, tasks: &[DownloadTask]) -> Result<(), DownloadError> {
        let root = self.layout.staging_root();
        if !root.is_dir() {
            return Err(DownloadError::MissingDirectory(root.to_path_buf()));
        }
        let mut checked: HashSet<PathBuf> = HashSet::new();
        for task in tasks {
            let Some(parent) = task.destination.parent() else {
                continue;
            };
            if checked.insert(parent.to_path_buf()) && !parent.is_dir() {
                return Err(DownloadError::MissingDirectory(parent.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Execute a request end to end
    pub async fn run(
        &self,
        request: &DownloadRequest,
        credentials: &Credentials,
    ) -> Result<RunSummary, DownloadError> {
        let span = info_span!(
            "run",
            mode = %request.mode,
            modules = request.modules.len()
        );
        async move {
            if request.mode == RunMode::ConsolidateOnly {
                return self.consolidate_only(&request.modules).await;
            }

            let started = Instant::now();
            let tasks = self.expand(request)?;
            self.preflight(&tasks)?;
            info!(tasks = tasks.len(), "Request expanded");

            let mut lock = StagingLock::open(self.layout.staging_root())?;
            let _guard = lock.try_acquire()?;

            let ledger_path = self.layout.ledger_path();
            let ledger = FetchLedger::load_or_default(&ledger_path)?;
            let dedup = Arc::new(Deduplicator::from_ledger(&ledger));
            debug!(records = dedup.len(), "Fetch ledger loaded");

            let config = self
                .config
                .clone()
                .with_force(self.config.force || request.mode == RunMode::All);
            let mut executor =
                DownloadExecutor::new(self.transport.clone(), config).with_deduplicator(dedup.clone());
            if let Some(shutdown) = &self.shutdown {
                executor = executor.with_shutdown(shutdown.clone());
            }

            let results = executor.run(tasks, credentials, self.observer.clone()).await;

            let mut summary =
                RunSummary::from_results(request.mode, results, self.cancelled(), Duration::ZERO);
            if let Err(e) = dedup.to_ledger().save(&ledger_path) {
                error!(path = %ledger_path.display(), error = %e, "Failed to save fetch ledger");
                summary.ledger_error = Some(e.to_string());
            }

            match summary.status {
                RunStatus::Cancelled | RunStatus::Aborted => {
                    warn!(status = %summary.status, "Skipping consolidation");
                }
                _ => {
                    let modules = self.modules_to_process(&request.modules, &summary.results);
                    summary.processing = self.process_modules(modules).await;
                }
            }

            summary.elapsed = started.elapsed();
            info!(
                status = %summary.status,
                succeeded = summary.succeeded(),
                skipped = summary.skipped(),
                failed = summary.failed(),
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Run finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Modules with at least one new file (or a verified skip when enabled)
    fn modules_to_process(&self, modules: &[Module], results: &[TaskResult]) -> Vec<Module> {
        let eligible = |result: &TaskResult| match &result.outcome {
            TaskOutcome::Success { .. } => true,
            TaskOutcome::Skipped(reason) => self.reconsolidate_skipped && reason.has_local_file(),
            TaskOutcome::Failed(_) => false,
        };

        let mut selected: Vec<Module> = Vec::new();
        for module in modules {
            if selected.contains(module) {
                continue;
            }
            if results.iter().any(|r| r.task.module == *module && eligible(r)) {
                selected.push(module.clone());
            }
        }
        selected
    }

    /// Consolidate and optimize every staged file of `modules` without
    /// contacting the server
    pub async fn consolidate_only(&self, modules: &[Module]) -> Result<RunSummary, DownloadError> {
        let started = Instant::now();
        let root = self.layout.staging_root();
        if !root.is_dir() {
            return Err(DownloadError::MissingDirectory(root.to_path_buf()));
        }
        let mut lock = StagingLock::open(root)?;
        let _guard = lock.try_acquire()?;

        let mut unique: Vec<Module> = Vec::with_capacity(modules.len());
        for module in modules {
            if !unique.contains(module) {
                unique.push(module.clone());
            }
        }

        let processing = self.process_modules(unique).await;
        let status = if self.cancelled() {
            RunStatus::Cancelled
        } else if processing.iter().all(ModuleReport::is_success) {
            RunStatus::AllSucceeded
        } else if processing.iter().any(|r| r.consolidation.is_ok()) {
            RunStatus::Partial
        } else {
            RunStatus::NothingDownloaded
        };

        Ok(RunSummary {
            mode: RunMode::ConsolidateOnly,
            modules: BTreeMap::new(),
            failures: Vec::new(),
            processing,
            elapsed: started.elapsed(),
            status,
            results: Vec::new(),
            ledger_error: None,
        })
    }

    /// Post-process modules concurrently, one blocking job per module
    async fn process_modules(&self, modules: Vec<Module>) -> Vec<ModuleReport> {
        if modules.is_empty() {
            return Vec::new();
        }
        let originals = modules.clone();
        let pool = WorkerPool::new(self.config.max_workers.min(modules.len()));
        let job = Arc::new(ModuleJob {
            layout: self.layout.clone(),
            consolidator: Consolidator::new(self.consolidate_options.clone()),
            optimizer: Optimizer::new(self.layout.clone()).with_batch_size(self.batch_size),
            formats: self.formats.clone(),
        });
        let observer = self.observer.clone();

        let output = pool
            .run(modules, move |_, module| {
                let job = job.clone();
                let observer = observer.clone();
                async move {
                    let fallback = module.clone();
                    let report = tokio::task::spawn_blocking(move || job.process(module))
                        .await
                        .unwrap_or_else(|e| {
                            ModuleReport::failed(
                                fallback.clone(),
                                ConsolidationError::Interrupted {
                                    module: fallback,
                                    reason: e.to_string(),
                                },
                            )
                        });
                    observer.on_module_processed(&report);
                    report
                }
            })
            .await;

        let mut reports: Vec<Option<ModuleReport>> = originals.iter().map(|_| None).collect();
        for (index, report) in output.completed {
            reports[index] = Some(report);
        }
        for index in output.lost {
            let module = originals[index].clone();
            reports[index] = Some(ModuleReport::failed(
                module.clone(),
                ConsolidationError::Interrupted {
                    module,
                    reason: "worker terminated".to_string(),
                },
            ));
        }
        reports.into_iter().flatten().collect()
    }
}

/// Everything a blocking post-processing job needs
struct ModuleJob {
    layout: StagingLayout,
    consolidator: Consolidator,
    optimizer: Optimizer,
    formats: Vec<ArtifactFormat>,
}

impl ModuleJob {
    fn process(&self, module: Module) -> ModuleReport {
        let files = match self.layout.discover_staged_files(&module) {
            Ok(files) => files,
            Err(e) => {
                let error = ConsolidationError::Staging {
                    module: module.clone(),
                    reason: e.to_string(),
                };
                return ModuleReport::failed(module, error);
            }
        };

        let dataset = match self.consolidator.consolidate(&module, &files) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(module = %module, error = %e, "Consolidation failed");
                return ModuleReport::failed(module, e);
            }
        };

        let artifacts = self.optimizer.optimize(&dataset, &self.formats);
        ModuleReport {
            consolidation: Ok(ConsolidationSummary {
                rows: dataset.row_count(),
                columns: dataset.column_count(),
                files: dataset.sources.len(),
                malformed_rows: dataset.malformed_rows(),
                warnings: dataset.warnings,
            }),
            artifacts,
            module,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchResult, RemoteBody, RemoteMetadata};
    use crate::identifier::Period;
    use crate::shutdown::ShutdownCoordinator;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn probe(&self, _url: &str, _c: &Credentials) -> FetchResult<RemoteMetadata> {
            Err(FetchError::Network("unreachable".into()))
        }

        async fn open(&self, _url: &str, _c: &Credentials) -> FetchResult<RemoteBody> {
            Err(FetchError::Network("unreachable".into()))
        }
    }

    fn orchestrator(dir: &std::path::Path) -> Orchestrator {
        let config = DownloadConfig::default()
            .with_delay(Duration::ZERO)
            .with_base_url("http://reports.local/ReportServer");
        Orchestrator::new(
            config,
            Arc::new(Unreachable),
            StagingLayout::new(dir.join("staging"), dir.join("output")),
        )
        .unwrap()
        .with_shutdown(ShutdownCoordinator::shared())
    }

    #[test]
    fn test_expand_modules_periods_variants() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let request = DownloadRequest::new(
            vec![Module::Ccm, Module::Prr, Module::Ccm],
            DateRange::years(2020, 2021).unwrap(),
        )
        .with_variants(["A", "P"]);

        let tasks = orch.expand(&request).unwrap();
        assert_eq!(tasks.len(), 8);
        assert_eq!(tasks[0].date_key.to_string(), "2020_A");
        assert_eq!(tasks[1].date_key.to_string(), "2020_P");
        assert!(tasks[0].destination.ends_with("CCM/2020_A.csv"));
        assert!(tasks[0].remote_identity.contains("nidtipoTramite=58"));
        assert_eq!(tasks[7].module, Module::Prr);
    }

    #[test]
    fn test_status_classification() {
        let task = DownloadTask::new(
            Module::Sol,
            DateKey::new(Period::Year(2020)),
            "u",
            "/tmp/x.csv",
        );
        let result = |outcome| TaskResult::new(task.clone(), outcome, 1, Duration::ZERO);
        let ok = result(TaskOutcome::Success {
            bytes_written: 1,
            local_path: "/tmp/x.csv".into(),
        });
        let failed = result(TaskOutcome::Failed(FetchError::EmptyBody));
        let auth = result(TaskOutcome::Failed(FetchError::Auth {
            status: 401,
            message: "denied".into(),
        }));

        assert_eq!(RunStatus::from_results(&[], false), RunStatus::AllSucceeded);
        assert_eq!(RunStatus::from_results(&[ok.clone()], false), RunStatus::AllSucceeded);
        assert_eq!(
            RunStatus::from_results(&[ok.clone(), failed.clone()], false),
            RunStatus::Partial
        );
        assert_eq!(
            RunStatus::from_results(&[failed.clone()], false),
            RunStatus::NothingDownloaded
        );
        assert_eq!(RunStatus::from_results(&[ok, auth], false), RunStatus::Aborted);
        assert_eq!(RunStatus::from_results(&[failed], true), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_directory_fails_before_any_transfer() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = orchestrator(dir.path());
        let request = DownloadRequest::new(vec![Module::Ccm], DateRange::years(2020, 2020).unwrap())
            .with_variants(["A"]);
        let credentials = Credentials::new("user", "pw").unwrap();

        let err = orch.run(&request, &credentials).await.unwrap_err();
        assert!(matches!(err, DownloadError::MissingDirectory(_)));
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("ALL".parse::<RunMode>().unwrap(), RunMode::All);
        assert_eq!(
            "consolidate-only".parse::<RunMode>().unwrap(),
            RunMode::ConsolidateOnly
        );
        assert!("sometimes".parse::<RunMode>().is_err());
    }
}
