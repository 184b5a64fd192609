//! Shared fixtures: a scripted transport and orchestrator builders

use async_trait::async_trait;
use bytes::Bytes;
use report_downloader::downloader::{DownloadConfig, Orchestrator};
use report_downloader::fetcher::{
    ByteStream, Credentials, FetchError, FetchResult, RemoteBody, RemoteMetadata, Transport,
};
use report_downloader::identifier::Module;
use report_downloader::output::{ArtifactFormat, StagingLayout};
use report_downloader::shutdown::{SharedShutdown, ShutdownCoordinator};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "http://reports.local/ReportServer";

/// Report body as the server exports it: three preamble lines, then CSV
pub fn report_body(url: &str) -> Vec<u8> {
    let year = query_value(url, "anio").unwrap_or("0");
    let variant = query_value(url, "EstadoTramite").unwrap_or("-");
    format!(
        "Reporte de tramites\nGenerado automaticamente\n\nNumeroTramite,Anio,Estado,Monto\nLM{year}{variant}1,{year},{variant},10.5\nLM{year}{variant}2,{year},{variant},\n"
    )
    .into_bytes()
}

fn query_value<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    url.split(['?', '&'])
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Serves [`report_body`] for every URL
///
/// URLs containing a key of `flaky` fail that many times with a network
/// error before succeeding. With `reject_auth` every request fails with 401.
#[derive(Default)]
pub struct ScriptedTransport {
    flaky: Mutex<HashMap<String, usize>>,
    reject_auth: bool,
    latency: Duration,
    pub opens: AtomicUsize,
    pub probes: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flaky(self, fragment: &str, failures: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(fragment.to_string(), failures);
        self
    }

    pub fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn probe(&self, url: &str, _: &Credentials) -> FetchResult<RemoteMetadata> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth {
            return Err(FetchError::from_status(401, "Unauthorized").unwrap());
        }
        Ok(RemoteMetadata {
            content_length: Some(report_body(url).len() as u64),
        })
    }

    async fn open(&self, url: &str, _: &Credentials) -> FetchResult<RemoteBody> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.reject_auth {
            return Err(FetchError::from_status(401, "Unauthorized").unwrap());
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky
                .iter_mut()
                .find(|(fragment, _)| url.contains(fragment.as_str()))
                .map(|(_, remaining)| remaining)
            {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Network("connection reset".to_string()));
                }
            }
        }

        let body = report_body(url);
        let chunks: ByteStream = Box::pin(futures_util::stream::iter(
            body.chunks(16)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        ));
        Ok(RemoteBody {
            content_length: Some(body.len() as u64),
            chunks,
        })
    }
}

pub fn fast_config(workers: usize) -> DownloadConfig {
    DownloadConfig::default()
        .with_max_workers(workers)
        .with_delay(Duration::ZERO)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .with_server_busy_backoff(Duration::ZERO)
        .with_snapshot_interval(None)
        .with_base_url(BASE_URL)
}

pub fn credentials() -> Credentials {
    Credentials::new("DOMAIN\\analyst", "secret").unwrap()
}

/// Layout under `root` with directories for `modules` created
pub fn prepared_layout(root: &Path, modules: &[Module]) -> StagingLayout {
    let layout = StagingLayout::new(root.join("staging"), root.join("output"));
    layout.ensure_layout(modules).unwrap();
    layout
}

pub fn orchestrator(
    transport: Arc<ScriptedTransport>,
    layout: StagingLayout,
    workers: usize,
    shutdown: SharedShutdown,
) -> Orchestrator {
    Orchestrator::new(fast_config(workers), transport, layout)
        .unwrap()
        .with_formats(vec![
            ArtifactFormat::Columnar,
            ArtifactFormat::CompactBinary,
            ArtifactFormat::DelimitedText,
        ])
        .with_shutdown(shutdown)
}

pub fn fresh_shutdown() -> SharedShutdown {
    ShutdownCoordinator::shared()
}
