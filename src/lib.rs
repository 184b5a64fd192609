//! # Report Downloader Library
//!
//! Bulk retrieval of exported reports from an NTLM-protected report server,
//! followed by consolidation into one dataset per module and conversion into
//! analysis-friendly formats.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: a fixed worker pool with request spacing and
//!   chunked writes keeps the report server responsive
//! - **Resume Capability**: a fetch ledger records verified downloads so
//!   interrupted runs pick up where they stopped
//! - **Atomic Writes**: staged files and artifacts are written to temp files
//!   and renamed into place
//! - **Consolidation**: staged csv and Excel files are merged under a
//!   reference schema with typed columns
//! - **Multiple Formats**: xlsx, Parquet, Arrow IPC, gzip'd bincode, and CSV
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use report_downloader::downloader::{DownloadConfig, DownloadRequest, Orchestrator};
//! use report_downloader::fetcher::{CredentialProvider, EnvCredentials, HttpTransport};
//! use report_downloader::identifier::{DateRange, Module};
//! use report_downloader::output::StagingLayout;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::new(config.connect_timeout)?);
//! let orchestrator =
//!     Orchestrator::new(config, transport, StagingLayout::new("staging", "output"))?;
//!
//! let request = DownloadRequest::new(vec![Module::Prr], DateRange::years(2023, 2024)?);
//! let credentials = EnvCredentials::default().credentials()?;
//! let summary = orchestrator.run(&request, &credentials).await?;
//! for report in &summary.processing {
//!     println!("{}", report.format_line());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - modules, periods, date keys, and date ranges
//! - [`registry`] - embedded catalogue of report modules
//! - [`resolver`] - maps a module and date key to a report URL
//! - [`fetcher`] - transport abstraction, HTTP client, credentials, errors
//! - [`downloader`] - task expansion, worker pool, throttle, executor,
//!   orchestrator
//! - [`resume`] - fetch ledger, deduplication, staging lock
//! - [`consolidate`] - file readers and the schema-checked merge
//! - [`output`] - staging layout and artifact writers
//! - [`shutdown`] - cooperative cancellation
//! - [`metrics`] - Prometheus instrumentation

#![warn(missing_docs)]

pub mod cli;
pub mod consolidate;
pub mod downloader;
pub mod fetcher;
pub mod identifier;
pub mod metrics;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod resume;
pub mod shutdown;
