//! Consolidate-only runs over hand-staged files

use super::support::*;
use report_downloader::consolidate::{ConsolidateOptions, ConsolidationError, ConsolidationWarning};
use report_downloader::downloader::{DownloadError, RunMode, RunStatus};
use report_downloader::identifier::Module;
use report_downloader::output::{load_binary, ArtifactFormat, StagingLayout};
use std::sync::Arc;
use tempfile::TempDir;

const PREAMBLE: &str = "Reporte\nFiltros: ninguno\n\n";

fn stage(layout: &StagingLayout, module: &Module, name: &str, csv: &str) {
    let path = layout.module_staging_dir(module).join(name);
    std::fs::write(path, format!("{PREAMBLE}{csv}")).unwrap();
}

#[tokio::test]
async fn test_mismatched_file_excluded_from_merge() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Sol]);
    for year in 2020..2024 {
        stage(
            &layout,
            &Module::Sol,
            &format!("{year}_A.csv"),
            &format!("Id,Fecha,Monto\n{year}1,01/02/{year} 10:00,5\n{year}2,03/04/{year} 11:30,7\n"),
        );
    }
    stage(
        &layout,
        &Module::Sol,
        "2024_A.csv",
        "Id,Fecha,Monto,Oficina\n20241,01/01/2024 00:00,9,Norte\n",
    );

    let orch = orchestrator(
        Arc::new(ScriptedTransport::new()),
        layout.clone(),
        2,
        fresh_shutdown(),
    );
    let summary = orch.consolidate_only(&[Module::Sol]).await.unwrap();

    assert_eq!(summary.mode, RunMode::ConsolidateOnly);
    assert_eq!(summary.status, RunStatus::AllSucceeded);
    let consolidation = summary.processing[0].consolidation.as_ref().unwrap();
    assert_eq!(consolidation.files, 4);
    assert_eq!(consolidation.rows, 8);
    assert_eq!(consolidation.warnings.len(), 1);
    assert!(matches!(
        &consolidation.warnings[0],
        ConsolidationWarning::SchemaMismatch { path, found, .. }
            if path.ends_with("2024_A.csv") && found.len() == 4
    ));

    let reloaded =
        load_binary(&layout.artifact_path(&Module::Sol, ArtifactFormat::CompactBinary)).unwrap();
    assert_eq!(reloaded.row_count(), 8);
    assert_eq!(reloaded.column_names(), vec!["Id", "Fecha", "Monto"]);
}

#[tokio::test]
async fn test_module_without_files_fails_alone() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm, Module::Prr]);
    stage(&layout, &Module::Ccm, "2024.csv", "a,b\n1,2\n");

    let orch = orchestrator(
        Arc::new(ScriptedTransport::new()),
        layout,
        2,
        fresh_shutdown(),
    );
    let summary = orch
        .consolidate_only(&[Module::Ccm, Module::Prr])
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    assert!(summary.processing[0].is_success());
    assert!(matches!(
        summary.processing[1].consolidation,
        Err(ConsolidationError::NoReadableFiles {
            attempted: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn test_source_column_and_filter_applied() {
    let dir = TempDir::new().unwrap();
    let layout = prepared_layout(dir.path(), &[Module::Ccm]);
    stage(
        &layout,
        &Module::Ccm,
        "2023_A.csv",
        "NumeroTramite,Monto\nLM1,1\nXX2,2\nLM3,3\n",
    );

    let options = ConsolidateOptions {
        row_filter: Some("NumeroTramite=LM".parse().unwrap()),
        source_column: Some("archivo".to_string()),
        ..ConsolidateOptions::default()
    };
    let orch = orchestrator(
        Arc::new(ScriptedTransport::new()),
        layout.clone(),
        1,
        fresh_shutdown(),
    )
    .with_consolidate_options(options);
    let summary = orch.consolidate_only(&[Module::Ccm]).await.unwrap();

    let consolidation = summary.processing[0].consolidation.as_ref().unwrap();
    assert_eq!(consolidation.rows, 2);
    assert_eq!(consolidation.columns, 3);
}

#[tokio::test]
async fn test_missing_staging_root_is_an_error() {
    let dir = TempDir::new().unwrap();
    let layout = StagingLayout::new(dir.path().join("absent"), dir.path().join("out"));
    let orch = orchestrator(
        Arc::new(ScriptedTransport::new()),
        layout,
        1,
        fresh_shutdown(),
    );
    assert!(matches!(
        orch.consolidate_only(&[Module::Ccm]).await,
        Err(DownloadError::MissingDirectory(_))
    ));
}
