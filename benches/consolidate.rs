//! Consolidation throughput over staged csv files

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use report_downloader::consolidate::{ConsolidateOptions, Consolidator};
use report_downloader::identifier::Module;
use std::fmt::Write as _;
use std::path::PathBuf;
use tempfile::TempDir;

fn stage_files(dir: &TempDir, files: usize, rows_per_file: usize) -> Vec<PathBuf> {
    (0..files)
        .map(|i| {
            let mut body = String::from("Reporte\n\n\nNumeroTramite,Fecha,Monto,Estado\n");
            for r in 0..rows_per_file {
                let _ = writeln!(
                    body,
                    "LM{i}{r},{:02}/03/2024 10:15,{}.25,A",
                    r % 28 + 1,
                    r * 3
                );
            }
            let path = dir.path().join(format!("{}_A.csv", 2000 + i));
            std::fs::write(&path, body).unwrap();
            path
        })
        .collect()
}

fn bench_consolidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate");
    let consolidator = Consolidator::new(ConsolidateOptions::default());

    for &(files, rows) in &[(8usize, 1_000usize), (8, 10_000)] {
        let dir = TempDir::new().unwrap();
        let paths = stage_files(&dir, files, rows);
        group.throughput(Throughput::Elements((files * rows) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{files}x{rows}")),
            &paths,
            |b, paths| {
                b.iter(|| consolidator.consolidate(&Module::Ccm, paths).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_consolidate);
criterion_main!(benches);
