//! Fixed-size worker pool over a FIFO queue
//!
//! Generic over the item and result types so the same pool drives report
//! downloads and per-module post-processing.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use crate::shutdown::SharedShutdown;

/// What a pool run produced
#[derive(Debug)]
pub struct PoolOutput<T, R> {
    /// Results keyed by input index, ascending
    pub completed: Vec<(usize, R)>,
    /// Items never pulled because a stop signal fired, by input index
    pub not_started: Vec<(usize, T)>,
    /// Indices whose handler panicked
    pub lost: Vec<usize>,
}

/// Spawns exactly `workers` tasks that pull items in FIFO order
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    stop_signals: Vec<SharedShutdown>,
}

impl WorkerPool {
    /// Pool with `workers` workers (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            stop_signals: Vec::new(),
        }
    }

    /// Stop pulling new items once `signal` fires
    ///
    /// May be called more than once; any signal stops the pool.
    pub fn with_stop_signal(mut self, signal: SharedShutdown) -> Self {
        self.stop_signals.push(signal);
        self
    }

    /// Worker count
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn should_stop(signals: &[SharedShutdown]) -> bool {
        signals.iter().any(|s| s.is_shutdown_requested())
    }

    /// Run `handler(worker_id, item)` for every item
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, handler: F) -> PoolOutput<T, R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let results: Arc<Mutex<Vec<(usize, R)>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let handler = Arc::new(handler);
        let signals: Arc<[SharedShutdown]> = self.stop_signals.clone().into();

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let queue = queue.clone();
            let results = results.clone();
            let handler = handler.clone();
            let signals = signals.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if Self::should_stop(&signals) {
                        debug!(worker_id, "Stop signal observed, worker exiting");
                        break;
                    }
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };
                    let result = (*handler)(worker_id, item).await;
                    results
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((index, result));
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }

        let mut completed = std::mem::take(&mut *results.lock().unwrap_or_else(|e| e.into_inner()));
        completed.sort_by_key(|(index, _)| *index);
        let not_started: Vec<(usize, T)> = queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let accounted: HashSet<usize> = completed
            .iter()
            .map(|(i, _)| *i)
            .chain(not_started.iter().map(|(i, _)| *i))
            .collect();
        let lost = (0..total).filter(|i| !accounted.contains(i)).collect();

        PoolOutput {
            completed,
            not_started,
            lost,
        }
    }
}
