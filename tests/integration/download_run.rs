//! End-to-end runs against a scripted report server

use super::support::*;
use report_downloader::consolidate::Value;
use report_downloader::downloader::{DownloadRequest, RunStatus, TaskOutcome};
use report_downloader::fetcher::FetchError;
use report_downloader::identifier::{DateRange, Module};
use report_downloader::output::{load_binary, ArtifactFormat};
use std::sync::Arc;
use tempfile::TempDir;

fn ten_task_request() -> DownloadRequest {
    DownloadRequest::new(vec![Module::Ccm], DateRange::years(2020, 2024).unwrap())
        .with_variants(["A", "P"])
}

#[tokio::test]
async fn test_flaky_files_retry_and_everything_lands() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(
        ScriptedTransport::new()
            .flaky("anio=2020&EstadoTramite=A", 2)
            .flaky("anio=2022&EstadoTramite=P", 2)
            .flaky("anio=2024&EstadoTramite=A", 2),
    );
    let orch = orchestrator(transport.clone(), layout.clone(), 2, fresh_shutdown());

    let started = std::time::Instant::now();
    let summary = orch.run(&ten_task_request(), &credentials()).await.unwrap();

    assert_eq!(summary.status, RunStatus::AllSucceeded);
    assert_eq!(summary.results.len(), 10);
    assert_eq!(summary.succeeded(), 10);
    assert_eq!(transport.opens(), 16);
    // two backoffs of at least 1ms and 2ms each
    assert!(started.elapsed() >= std::time::Duration::from_millis(3));
    let retried: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.attempts == 3)
        .map(|r| r.task.date_key.to_string())
        .collect();
    assert_eq!(retried, vec!["2020_A", "2022_P", "2024_A"]);

    let staged = layout.discover_staged_files(&Module::Ccm).unwrap();
    assert_eq!(staged.len(), 10);
    assert!(staged[0].ends_with("CCM/2020_A.csv"));
    let content = std::fs::read_to_string(&staged[0]).unwrap();
    assert!(content.contains("LM2020A1,2020,A,10.5"));
}

#[tokio::test]
async fn test_new_files_are_consolidated_and_optimized() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport, layout.clone(), 2, fresh_shutdown());

    let summary = orch.run(&ten_task_request(), &credentials()).await.unwrap();

    assert_eq!(summary.processing.len(), 1);
    let report = &summary.processing[0];
    assert!(report.is_success(), "{}", report.format_line());
    let consolidation = report.consolidation.as_ref().unwrap();
    assert_eq!(consolidation.rows, 20);
    assert_eq!(consolidation.columns, 4);
    assert_eq!(consolidation.files, 10);
    assert!(consolidation.warnings.is_empty());
    assert_eq!(report.artifacts.len(), 3);

    let binary_path = layout.artifact_path(&Module::Ccm, ArtifactFormat::CompactBinary);
    let reloaded = load_binary(&binary_path).unwrap();
    assert_eq!(reloaded.row_count(), 20);
    assert_eq!(
        reloaded.column_names(),
        vec!["NumeroTramite", "Anio", "Estado", "Monto"]
    );
    assert_eq!(reloaded.rows[0][0], Value::Text("LM2020A1".into()));
    assert_eq!(reloaded.rows[0][1], Value::Integer(2020));
    assert_eq!(reloaded.rows[0][3], Value::Float(10.5));
    assert_eq!(reloaded.rows[1][3], Value::Null);

    assert!(layout
        .artifact_path(&Module::Ccm, ArtifactFormat::Columnar)
        .is_file());
    let csv = std::fs::read(layout.artifact_path(&Module::Ccm, ArtifactFormat::DelimitedText))
        .unwrap();
    assert!(csv.starts_with(b"\xEF\xBB\xBFNumeroTramite;Anio;Estado;Monto"));
}

#[tokio::test]
async fn test_exhausted_retries_mark_run_partial() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(ScriptedTransport::new().flaky("anio=2021&EstadoTramite=P", 50));
    let orch = orchestrator(transport, layout.clone(), 2, fresh_shutdown());

    let summary = orch.run(&ten_task_request(), &credentials()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.contains("2021_P"));
    assert!(matches!(summary.failures[0].1, FetchError::Network(_)));
    assert!(!layout
        .module_staging_dir(&Module::Ccm)
        .join("2021_P.csv")
        .exists());

    let consolidation = summary.processing[0].consolidation.as_ref().unwrap();
    assert_eq!(consolidation.files, 9);
}

#[tokio::test]
async fn test_auth_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    let transport = Arc::new(
        ScriptedTransport::new()
            .rejecting_auth()
            .with_latency(std::time::Duration::from_millis(5)),
    );
    let orch = orchestrator(transport.clone(), layout, 1, fresh_shutdown());

    let summary = orch.run(&ten_task_request(), &credentials()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(transport.opens(), 1);
    assert_eq!(summary.results.len(), 10);
    assert!(summary
        .results
        .iter()
        .all(|r| matches!(&r.outcome, TaskOutcome::Failed(e) if e.is_auth())));
    assert!(summary.processing.is_empty());
}

#[tokio::test]
async fn test_multiple_modules_processed_independently() {
    let dir = TempDir::new().unwrap();
    let modules = [Module::Ccm, Module::Sol];
    let layout = prepared_layout(dir.path(), &modules);
    let orch = orchestrator(
        Arc::new(ScriptedTransport::new()),
        layout.clone(),
        3,
        fresh_shutdown(),
    );
    let request = DownloadRequest::new(modules.to_vec(), DateRange::years(2023, 2024).unwrap())
        .with_variants(["A"]);

    let summary = orch.run(&request, &credentials()).await.unwrap();

    assert_eq!(summary.modules.len(), 2);
    assert_eq!(summary.modules[&Module::Sol].succeeded, 2);
    let processed: Vec<_> = summary.processing.iter().map(|r| r.module.clone()).collect();
    assert_eq!(processed, vec![Module::Ccm, Module::Sol]);
    assert!(layout
        .artifact_path(&Module::Sol, ArtifactFormat::Columnar)
        .is_file());
}
