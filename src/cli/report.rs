//! Run summary rendering for the terminal and for JSON consumers

use serde_json::{json, Value};

use crate::downloader::{ModuleReport, RunSummary};
use crate::downloader::progress::format_duration;
use crate::output::OptimizedArtifact;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Summary as a JSON document
pub fn summary_json(summary: &RunSummary) -> Value {
    let modules: serde_json::Map<String, Value> = summary
        .modules
        .iter()
        .map(|(module, counts)| {
            (
                module.to_string(),
                json!({
                    "succeeded": counts.succeeded,
                    "skipped": counts.skipped,
                    "failed": counts.failed,
                }),
            )
        })
        .collect();

    let failures: Vec<Value> = summary
        .failures
        .iter()
        .map(|(task, error)| {
            json!({
                "task": task,
                "kind": error.kind(),
                "error": error.to_string(),
            })
        })
        .collect();

    let processing: Vec<Value> = summary.processing.iter().map(module_json).collect();

    json!({
        "mode": summary.mode.to_string(),
        "status": summary.status.to_string(),
        "elapsed_secs": summary.elapsed.as_secs_f64(),
        "succeeded": summary.succeeded(),
        "skipped": summary.skipped(),
        "failed": summary.failed(),
        "modules": modules,
        "failures": failures,
        "processing": processing,
        "ledger_error": summary.ledger_error,
    })
}

fn module_json(report: &ModuleReport) -> Value {
    let artifacts: Vec<Value> = report
        .artifacts
        .iter()
        .map(|artifact| match artifact {
            Ok(a) => json!({
                "format": a.format.name(),
                "path": a.path.display().to_string(),
                "rows": a.rows,
                "bytes": a.bytes,
                "duration_ms": a.duration.as_millis() as u64,
            }),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();

    match &report.consolidation {
        Ok(c) => json!({
            "module": report.module.to_string(),
            "rows": c.rows,
            "columns": c.columns,
            "files": c.files,
            "malformed_rows": c.malformed_rows,
            "warnings": c.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "artifacts": artifacts,
        }),
        Err(e) => json!({
            "module": report.module.to_string(),
            "error": e.to_string(),
        }),
    }
}

/// Print [`summary_json`] to stdout
pub fn print_summary_json(summary: &RunSummary) {
    match serde_json::to_string_pretty(&summary_json(summary)) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Failed to serialize summary: {e}"),
    }
}

/// Print a human-readable summary to stdout
pub fn print_summary_human(summary: &RunSummary) {
    println!();
    println!(
        "Run {} ({}) in {}",
        summary.status,
        summary.mode,
        format_duration(summary.elapsed)
    );

    if !summary.modules.is_empty() {
        println!(
            "  {} downloaded, {} skipped, {} failed",
            summary.succeeded(),
            summary.skipped(),
            summary.failed()
        );
        for (module, counts) in &summary.modules {
            println!(
                "  {:<6} {:>5} ok {:>5} skipped {:>5} failed",
                module.as_str(),
                counts.succeeded,
                counts.skipped,
                counts.failed
            );
        }
    }

    if let Some(reason) = &summary.ledger_error {
        println!("  Warning: fetch ledger not saved ({reason})");
    }

    if !summary.failures.is_empty() {
        println!("\nFailures:");
        for (task, error) in &summary.failures {
            println!("  - {task}: {error}");
        }
    }

    for report in &summary.processing {
        println!("\n{}", report.format_line());
        if let Ok(consolidation) = &report.consolidation {
            for warning in &consolidation.warnings {
                println!("  excluded {warning}");
            }
        }
        for artifact in &report.artifacts {
            if let Err(e) = artifact {
                println!("  ! {e}");
            }
        }
        print_artifact_table(report);
    }
}

/// Written artifacts of one module, smallest first
fn print_artifact_table(report: &ModuleReport) {
    let mut written: Vec<&OptimizedArtifact> =
        report.artifacts.iter().filter_map(|a| a.as_ref().ok()).collect();
    if written.is_empty() {
        return;
    }
    written.sort_by_key(|a| a.bytes);

    let largest = written.last().map(|a| a.bytes).unwrap_or(0).max(1);
    println!(
        "  {:<20} {:>12} {:>8} {:>10}  path",
        "format", "size (MiB)", "ratio", "time (ms)"
    );
    for artifact in written {
        println!(
            "  {:<20} {:>12.2} {:>7.1}% {:>10}  {}",
            artifact.format.name(),
            artifact.bytes as f64 / BYTES_PER_MIB,
            artifact.bytes as f64 / largest as f64 * 100.0,
            artifact.duration.as_millis(),
            artifact.path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{ConsolidationSummary, RunMode, RunStatus};
    use crate::identifier::Module;
    use crate::output::{ArtifactFormat, OptimizationError};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn summary() -> RunSummary {
        RunSummary {
            mode: RunMode::ConsolidateOnly,
            modules: BTreeMap::new(),
            failures: Vec::new(),
            processing: vec![ModuleReport {
                module: Module::Ccm,
                consolidation: Ok(ConsolidationSummary {
                    rows: 3,
                    columns: 2,
                    files: 1,
                    malformed_rows: 0,
                    warnings: Vec::new(),
                }),
                artifacts: vec![
                    Ok(OptimizedArtifact {
                        format: ArtifactFormat::Columnar,
                        path: PathBuf::from("out/CCM/ccm_consolidated.parquet"),
                        module: Module::Ccm,
                        rows: 3,
                        bytes: 512,
                        duration: Duration::from_millis(4),
                    }),
                    Err(OptimizationError::WriteFailure {
                        format: "csv".into(),
                        cause: "disk full".into(),
                    }),
                ],
            }],
            elapsed: Duration::from_secs(2),
            status: RunStatus::Partial,
            results: Vec::new(),
            ledger_error: None,
        }
    }

    #[test]
    fn test_summary_json_shape() {
        let value = summary_json(&summary());
        assert_eq!(value["status"], "some files failed");
        assert_eq!(value["mode"], "consolidate-only");
        let module = &value["processing"][0];
        assert_eq!(module["rows"], 3);
        assert_eq!(module["artifacts"][0]["bytes"], 512);
        assert!(module["artifacts"][1]["error"]
            .as_str()
            .unwrap()
            .contains("disk full"));
        assert!(value["ledger_error"].is_null());
    }

    #[test]
    fn test_summary_json_carries_ledger_error() {
        let mut summary = summary();
        summary.ledger_error = Some("read-only".into());
        assert_eq!(summary_json(&summary)["ledger_error"], "read-only");
    }
}
