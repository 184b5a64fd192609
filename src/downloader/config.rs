//! Download configuration and backoff calculation

use std::time::Duration;

use super::DownloadError;
use crate::fetcher::FetchError;

/// Default number of concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 7;

/// Default spacing between request starts.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Default write chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default per-request timeout. Report exports can take minutes to render.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Default attempts per task, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 5000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Extra delay added after 502/503/504 responses.
pub const SERVER_BUSY_BACKOFF_MS: u64 = 10_000;

/// Default interval between run snapshots sent to the observer.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 5;

/// Default report server endpoint.
pub const DEFAULT_BASE_URL: &str = "http://172.27.230.27/ReportServer";

/// Environment variable names read by [`DownloadConfig::from_env`].
pub mod env {
    /// Worker count
    pub const MAX_WORKERS: &str = "DOWNLOAD_MAX_WORKERS";
    /// Delay between request starts, in seconds (fractional allowed)
    pub const DELAY: &str = "DOWNLOAD_DELAY";
    /// Chunk size in bytes
    pub const CHUNK_SIZE: &str = "CHUNK_SIZE";
    /// Request timeout in seconds
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    /// Skip the pre-flight metadata probe (`true`/`false`)
    pub const DIRECT_DOWNLOAD: &str = "DIRECT_DOWNLOAD";
    /// Report server base URL
    pub const BASE_URL: &str = "REPORT_BASE_URL";
}

/// Tunables for a download run
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Concurrent workers and throttle permits
    pub max_workers: usize,
    /// Minimum spacing between request starts; zero disables spacing
    pub delay: Duration,
    /// Bytes written per chunk
    pub chunk_size: usize,
    /// Pause after each written chunk; zero disables it
    pub chunk_delay: Duration,
    /// Bound on each attempt, from request start to last byte
    pub request_timeout: Duration,
    /// TCP connect timeout for the HTTP transport
    pub connect_timeout: Duration,
    /// Skip the metadata probe for unrecorded existing files
    pub direct_download: bool,
    /// Report server base URL
    pub base_url: String,
    /// Attempts per task, first try included
    pub max_attempts: u32,
    /// Backoff after the first failed attempt
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Extra backoff after gateway errors
    pub server_busy_backoff: Duration,
    /// Record and check SHA-256 of staged files
    pub verify_hash: bool,
    /// Re-download even when the ledger says the file is current
    pub force: bool,
    /// Observer snapshot cadence; `None` disables periodic snapshots
    pub snapshot_interval: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: crate::fetcher::http::DEFAULT_CONNECT_TIMEOUT,
            direct_download: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            server_busy_backoff: Duration::from_millis(SERVER_BUSY_BACKOFF_MS),
            verify_hash: false,
            force: false,
            snapshot_interval: Some(Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS)),
        }
    }
}

impl DownloadConfig {
    /// Defaults overlaid with the environment variables in [`env`]
    pub fn from_env() -> Result<Self, DownloadError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values from a lookup function (environment or test map)
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, DownloadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env::MAX_WORKERS) {
            self.max_workers = parse_var(env::MAX_WORKERS, &value)?;
        }
        if let Some(value) = lookup(env::DELAY) {
            let secs: f64 = parse_var(env::DELAY, &value)?;
            self.delay = Duration::try_from_secs_f64(secs).map_err(|_| {
                DownloadError::InvalidConfig(format!("{}: '{value}' is not a valid delay", env::DELAY))
            })?;
        }
        if let Some(value) = lookup(env::CHUNK_SIZE) {
            self.chunk_size = parse_var(env::CHUNK_SIZE, &value)?;
        }
        if let Some(value) = lookup(env::REQUEST_TIMEOUT) {
            self.request_timeout = Duration::from_secs(parse_var(env::REQUEST_TIMEOUT, &value)?);
        }
        if let Some(value) = lookup(env::DIRECT_DOWNLOAD) {
            self.direct_download = parse_bool(env::DIRECT_DOWNLOAD, &value)?;
        }
        if let Some(value) = lookup(env::BASE_URL) {
            self.base_url = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the executor cannot work with
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.max_workers == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DownloadError::InvalidConfig(
                "request_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set worker count
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set request start spacing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set per-chunk pause
    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }

    /// Set per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set attempts per task
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set extra gateway-error backoff
    pub fn with_server_busy_backoff(mut self, extra: Duration) -> Self {
        self.server_busy_backoff = extra;
        self
    }

    /// Toggle the metadata probe
    pub fn with_direct_download(mut self, direct: bool) -> Self {
        self.direct_download = direct;
        self
    }

    /// Toggle SHA-256 verification
    pub fn with_verify_hash(mut self, verify: bool) -> Self {
        self.verify_hash = verify;
        self
    }

    /// Toggle forced re-download
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set snapshot cadence
    pub fn with_snapshot_interval(mut self, interval: Option<Duration>) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Backoff before retry number `retry_index` (0 for the first retry)
    pub fn backoff_for(&self, retry_index: u32, error: &FetchError) -> Duration {
        let base = calculate_backoff(retry_index, self.initial_backoff, self.max_backoff);
        if error.is_server_busy() {
            base + self.server_busy_backoff
        } else {
            base
        }
    }
}

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_index: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry_index.min(16));
    initial.saturating_mul(factor).min(max)
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DownloadError> {
    value
        .trim()
        .parse()
        .map_err(|_| DownloadError::InvalidConfig(format!("{name}: cannot parse '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, DownloadError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DownloadError::InvalidConfig(format!(
            "{name}: expected a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_backoff_calculation() {
        let initial = Duration::from_millis(INITIAL_BACKOFF_MS);
        let max = Duration::from_millis(MAX_BACKOFF_MS);
        assert_eq!(calculate_backoff(0, initial, max), Duration::from_millis(5000));
        assert_eq!(calculate_backoff(1, initial, max), Duration::from_millis(10000));
        assert_eq!(calculate_backoff(2, initial, max), Duration::from_millis(20000));
        assert_eq!(calculate_backoff(3, initial, max), Duration::from_millis(40000));
        // Should cap at MAX_BACKOFF_MS
        assert_eq!(calculate_backoff(10, initial, max), max);
        assert_eq!(calculate_backoff(u32::MAX, initial, max), max);
    }

    #[test]
    fn test_server_busy_adds_extra_delay() {
        let config = DownloadConfig::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1))
            .with_server_busy_backoff(Duration::from_millis(50));
        let busy = FetchError::from_status(503, "").unwrap();
        let reset = FetchError::Network("reset".into());
        assert_eq!(config.backoff_for(0, &busy), Duration::from_millis(150));
        assert_eq!(config.backoff_for(0, &reset), Duration::from_millis(100));
    }

    #[test]
    fn test_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_workers, 7);
        assert_eq!(config.delay, Duration::from_secs(1));
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert!(config.direct_download);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_overlay_from_map() {
        let vars: HashMap<&str, &str> = [
            (env::MAX_WORKERS, "2"),
            (env::DELAY, "0.5"),
            (env::DIRECT_DOWNLOAD, "false"),
            (env::BASE_URL, "http://example/ReportServer"),
        ]
        .into_iter()
        .collect();
        let config = DownloadConfig::default()
            .overlay(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.delay, Duration::from_millis(500));
        assert!(!config.direct_download);
        assert_eq!(config.base_url, "http://example/ReportServer");
    }

    #[test]
    fn test_overlay_rejects_garbage() {
        let result = DownloadConfig::default().overlay(|name| {
            (name == env::MAX_WORKERS).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(DownloadError::InvalidConfig(_))));

        let zero = DownloadConfig::default()
            .overlay(|name| (name == env::CHUNK_SIZE).then(|| "0".to_string()));
        assert!(zero.is_err());
    }
}
