//! Terminal progress rendering

use indicatif::{ProgressBar, ProgressStyle};

use crate::downloader::progress::format_duration;
use crate::downloader::{
    DownloadTask, ModuleReport, ProgressObserver, RunSnapshot, TaskOutcome, TaskResult,
};

/// Progress bar fed by run events
///
/// Failures and module reports are printed above the bar so they stay
/// visible after it is cleared.
#[derive(Debug)]
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    /// Bar with an unknown length; callers set it once tasks are expanded
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    /// The underlying bar
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_task_result(&self, result: &TaskResult) {
        self.bar.inc(1);
        if let TaskOutcome::Failed(error) = &result.outcome {
            self.bar
                .println(format!("FAILED {}: {error}", result.task.label()));
        }
    }

    fn on_snapshot(&self, snapshot: &RunSnapshot) {
        let eta = snapshot
            .estimate_remaining()
            .map(|d| format!(", ETA {}", format_duration(d)))
            .unwrap_or_default();
        self.bar.set_message(format!(
            "{} ok, {} skipped, {} failed{eta}",
            snapshot.done, snapshot.skipped, snapshot.failed
        ));
    }

    fn on_transfer_progress(&self, task: &DownloadTask, bytes: u64, _total: Option<u64>) {
        self.bar
            .set_message(format!("{} {} KiB", task.label(), bytes / 1024));
    }

    fn on_module_processed(&self, report: &ModuleReport) {
        self.bar.println(report.format_line());
    }
}
