//! Request throttling
//!
//! Bounds how many requests run at once and how closely request starts may
//! follow each other. Spacing applies to starts only; completions are not
//! spaced.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::metrics::ThrottleMetrics;

/// Concurrency cap plus minimum spacing between permit issuances
#[derive(Debug)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    delay: Duration,
    last_issued: Mutex<Option<Instant>>,
}

/// Proof of a held throttle slot; dropping it releases the slot
#[derive(Debug)]
pub struct ThrottlePermit {
    worker_slot: usize,
    issued_at: Instant,
    _permit: OwnedSemaphorePermit,
}

impl ThrottlePermit {
    /// Worker that requested the permit
    pub fn worker_slot(&self) -> usize {
        self.worker_slot
    }

    /// When the permit was issued
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

impl Throttle {
    /// Create a throttle with `max_permits` slots and `delay` spacing
    ///
    /// `max_permits` is clamped to at least one.
    pub fn new(max_permits: usize, delay: Duration) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_permits)),
            max_permits,
            delay,
            last_issued: Mutex::new(None),
        }
    }

    /// Wait for a free slot and for the spacing window, then issue a permit
    ///
    /// The spacing lock is held while sleeping so that waiters are issued one
    /// by one, each at least `delay` after the previous issuance.
    pub async fn acquire(&self, worker_slot: usize) -> Result<ThrottlePermit, ThrottleError> {
        let mut metrics = ThrottleMetrics::new();
        metrics.start_acquire();

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ThrottleError::Closed(e.to_string()))?;

        let issued_at = if self.delay.is_zero() {
            Instant::now()
        } else {
            let mut last = self.last_issued.lock().await;
            if let Some(previous) = *last {
                let earliest = previous + self.delay;
                if Instant::now() < earliest {
                    trace!(worker_slot, "Waiting for throttle spacing window");
                    sleep_until(earliest).await;
                }
            }
            let now = Instant::now();
            *last = Some(now);
            now
        };

        metrics.record_acquired(self.available());

        Ok(ThrottlePermit {
            worker_slot,
            issued_at,
            _permit: permit,
        })
    }

    /// Return a permit's slot
    pub fn release(&self, permit: ThrottlePermit) {
        trace!(worker_slot = permit.worker_slot, "Releasing throttle permit");
        drop(permit);
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured slot count
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Configured spacing
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stop issuing permits; pending and future acquires fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Throttle errors
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    /// The throttle was closed
    #[error("throttle closed: {0}")]
    Closed(String),
}
