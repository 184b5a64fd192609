//! Cooperative cancellation of runs

use super::support::*;
use report_downloader::downloader::{DownloadRequest, RunStatus, SkipReason, TaskOutcome};
use report_downloader::identifier::{DateRange, Module};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn request() -> DownloadRequest {
    DownloadRequest::new(vec![Module::Ccm], DateRange::years(2010, 2025).unwrap())
        .with_variants(["A"])
}

#[tokio::test]
async fn test_cancel_before_start_transfers_nothing() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(ScriptedTransport::new());
    let shutdown = fresh_shutdown();
    shutdown.request_shutdown();
    let orch = orchestrator(transport.clone(), layout.clone(), 2, shutdown);

    let summary = orch.run(&request(), &credentials()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(transport.opens(), 0);
    assert!(summary
        .results
        .iter()
        .all(|r| r.outcome == TaskOutcome::Skipped(SkipReason::Cancelled)));
    assert!(summary.processing.is_empty());
    assert!(layout.discover_staged_files(&Module::Ccm).unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_run_keeps_only_complete_files() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(40)));
    let shutdown = fresh_shutdown();
    let orch = orchestrator(transport.clone(), layout.clone(), 2, shutdown.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.request_shutdown();
    });
    let summary = orch.run(&request(), &credentials()).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.results.len(), 16);
    assert!(transport.opens() < 16);
    assert!(summary.processing.is_empty());

    let staged = layout.discover_staged_files(&Module::Ccm).unwrap();
    assert_eq!(staged.len(), summary.succeeded());
    for path in staged {
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.ends_with('\n'), "{} is truncated", path.display());
    }
    let hidden: Vec<_> = std::fs::read_dir(layout.module_staging_dir(&Module::Ccm))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(hidden.is_empty(), "temp files must not survive");
}
