//! Resume behavior: ledger skips, re-verification, forced runs, locking

use super::support::*;
use async_trait::async_trait;
use report_downloader::fetcher::{Credentials, FetchResult, RemoteBody, RemoteMetadata, Transport};
use report_downloader::downloader::{
    DownloadError, DownloadRequest, Orchestrator, RunMode, RunStatus, SkipReason, TaskOutcome,
};
use report_downloader::identifier::{DateRange, Module};
use report_downloader::resume::{FetchLedger, ResumeError, StagingLock};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn request() -> DownloadRequest {
    DownloadRequest::new(vec![Module::Prr], DateRange::years(2019, 2021).unwrap())
        .with_variants(["A", "B"])
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), layout.clone(), 2, fresh_shutdown());

    let first = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(first.succeeded(), 6);
    assert_eq!(transport.opens(), 6);

    let ledger = FetchLedger::load(&layout.ledger_path()).unwrap();
    assert_eq!(ledger.records().len(), 6);

    let second = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(second.status, RunStatus::AllSucceeded);
    assert_eq!(transport.opens(), 6);
    assert!(second
        .results
        .iter()
        .all(|r| r.outcome == TaskOutcome::Skipped(SkipReason::AlreadyFetched)));
    assert!(second.processing.is_empty());
}

#[tokio::test]
async fn test_skipped_modules_reconsolidated_on_request() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), layout, 2, fresh_shutdown());
    orch.run(&request(), &credentials()).await.unwrap();

    let orch = orch.with_reconsolidate_skipped(true);
    let summary = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(transport.opens(), 6);
    assert_eq!(summary.processing.len(), 1);
    assert_eq!(summary.processing[0].consolidation.as_ref().unwrap().rows, 12);
}

#[tokio::test]
async fn test_deleted_file_is_fetched_again() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), layout.clone(), 2, fresh_shutdown());
    orch.run(&request(), &credentials()).await.unwrap();

    std::fs::remove_file(layout.module_staging_dir(&Module::Prr).join("2020_B.csv")).unwrap();

    let summary = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(transport.opens(), 7);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.skipped(), 5);
    assert!(layout
        .module_staging_dir(&Module::Prr)
        .join("2020_B.csv")
        .is_file());
}

#[tokio::test]
async fn test_mode_all_downloads_again() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), layout, 2, fresh_shutdown());
    orch.run(&request(), &credentials()).await.unwrap();

    let summary = orch
        .run(&request().with_mode(RunMode::All), &credentials())
        .await
        .unwrap();
    assert_eq!(summary.succeeded(), 6);
    assert_eq!(transport.opens(), 12);
}

#[tokio::test]
async fn test_unrecorded_file_verified_by_probe() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = Orchestrator::new(
        fast_config(2).with_direct_download(false),
        transport.clone(),
        layout,
    )
    .unwrap()
    .with_shutdown(fresh_shutdown());

    let tasks = orch.expand(&request()).unwrap();
    let existing = &tasks[0];
    std::fs::write(&existing.destination, report_body(&existing.remote_identity)).unwrap();

    let summary = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(
        summary.results[0].outcome,
        TaskOutcome::Skipped(SkipReason::VerifiedExisting)
    );
    assert_eq!(transport.opens(), 5);
    assert_eq!(summary.status, RunStatus::AllSucceeded);
}

#[tokio::test]
async fn test_locked_staging_area_refuses_run() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), layout.clone(), 2, fresh_shutdown());

    let mut lock = StagingLock::open(layout.staging_root()).unwrap();
    let _guard = lock.try_acquire().unwrap();

    let err = orch.run(&request(), &credentials()).await.unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Resume(ResumeError::StagingLocked(_))
    ));
    assert_eq!(transport.opens(), 0);
}

#[tokio::test]
async fn test_consolidate_only_respects_staging_lock() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let orch = orchestrator(Arc::new(ScriptedTransport::new()), layout.clone(), 2, fresh_shutdown());

    let mut lock = StagingLock::open(layout.staging_root()).unwrap();
    let _guard = lock.try_acquire().unwrap();

    let err = orch.consolidate_only(&[Module::Prr]).await.unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Resume(ResumeError::StagingLocked(_))
    ));
}

/// Turns the ledger path into a non-empty directory once the first
/// transfer starts, so saving the ledger at the end of the run fails
struct LedgerBlockingTransport {
    inner: ScriptedTransport,
    ledger: PathBuf,
}

#[async_trait]
impl Transport for LedgerBlockingTransport {
    async fn probe(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteMetadata> {
        self.inner.probe(url, credentials).await
    }

    async fn open(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteBody> {
        std::fs::create_dir_all(self.ledger.join("occupied")).unwrap();
        self.inner.open(url, credentials).await
    }
}

#[tokio::test]
async fn test_unsaved_ledger_keeps_summary_and_consolidation() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Prr]);
    let transport = Arc::new(LedgerBlockingTransport {
        inner: ScriptedTransport::new(),
        ledger: layout.ledger_path(),
    });
    let orch = Orchestrator::new(fast_config(2), transport, layout.clone())
        .unwrap()
        .with_shutdown(fresh_shutdown());

    let summary = orch.run(&request(), &credentials()).await.unwrap();
    assert_eq!(summary.succeeded(), 6);
    assert_eq!(summary.status, RunStatus::AllSucceeded);
    assert!(summary.ledger_error.is_some());
    assert_eq!(summary.processing.len(), 1);
    assert_eq!(summary.processing[0].consolidation.as_ref().unwrap().rows, 12);
}
