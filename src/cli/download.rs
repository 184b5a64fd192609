//! Top-level CLI definition and the download command

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::observer::ProgressBarObserver;
use super::report;
use super::CliError;
use crate::consolidate::{ConsolidateOptions, CsvFormat, RowFilter};
use crate::downloader::{
    DownloadConfig, DownloadRequest, NoopObserver, Orchestrator, ProgressObserver, RunMode,
    RunStatus,
};
use crate::fetcher::{AuthScheme, CredentialProvider, EnvCredentials, HttpTransport};
use crate::identifier::{parse_variants, DateRange, Granularity, Module};
use crate::output::{ArtifactFormat, StagingLayout, DEFAULT_BATCH_SIZE};
use crate::registry::ModuleRegistry;
use crate::shutdown::SharedShutdown;

/// Upper bound on workers; the report server degrades well before this
const MAX_WORKERS: usize = 32;

fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("max workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("max workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("delimiter must be a single ASCII character, got '{s}'")),
    }
}

/// Report downloader CLI
#[derive(Parser, Debug)]
#[command(name = "report-downloader")]
#[command(about = "Download report server exports and convert them to analysis formats", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Root directory for raw staged report files
    #[arg(long, global = true, env = "REPORT_STAGING_DIR", default_value = "staging")]
    pub staging_dir: PathBuf,

    /// Root directory for consolidated artifacts
    #[arg(long, global = true, env = "REPORT_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Concurrent downloads (default 7, max 32)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub max_workers: Option<usize>,

    /// Minimum spacing between request starts, in milliseconds (0 disables)
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    /// Bytes written per chunk
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Pause after each written chunk, in milliseconds
    #[arg(long, global = true)]
    pub chunk_delay_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Skip the metadata probe for unrecorded staged files (true/false)
    #[arg(long, global = true)]
    pub direct_download: Option<bool>,

    /// Report server base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Authentication scheme: ntlm or basic
    #[arg(long, global = true, env = "REPORT_AUTH_SCHEME", default_value = "ntlm")]
    pub auth_scheme: AuthScheme,

    /// Attempts per file, first try included (1-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Verify SHA-256 of staged files before skipping them
    #[arg(long, global = true, default_value_t = false)]
    pub verify_hash: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Environment configuration with command-line flags applied on top
    pub fn download_config(&self) -> Result<DownloadConfig, CliError> {
        let mut config = DownloadConfig::from_env()?;
        if let Some(workers) = self.max_workers {
            config = config.with_max_workers(workers);
        }
        if let Some(ms) = self.delay_ms {
            config = config.with_delay(Duration::from_millis(ms));
        }
        if let Some(size) = self.chunk_size {
            config = config.with_chunk_size(size);
        }
        if let Some(ms) = self.chunk_delay_ms {
            config = config.with_chunk_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(direct) = self.direct_download {
            config = config.with_direct_download(direct);
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(attempts) = self.max_attempts {
            config = config.with_max_attempts(attempts);
        }
        if self.verify_hash {
            config = config.with_verify_hash(true);
        }
        config.validate()?;
        Ok(config)
    }

    /// Staging and output roots
    pub fn layout(&self) -> StagingLayout {
        StagingLayout::new(self.staging_dir.clone(), self.output_dir.clone())
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download reports, then consolidate and optimize them
    Download(DownloadArgs),

    /// Consolidate local files and write artifacts
    Optimize(super::OptimizeArgs),

    /// List registered report modules
    Modules(super::ModulesCommand),

    /// Check (and optionally create) the directory layout and fetch ledger
    Validate(super::ValidateCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Consolidation flags shared by `download` and `optimize`
#[derive(clap::Args, Debug, Clone)]
pub struct ConsolidateArgs {
    /// Artifact formats (xlsx,parquet,feather,binary,csv,csv-gzip); default all
    #[arg(long)]
    pub formats: Option<String>,

    /// Rows per batch for columnar and binary artifacts
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Preamble lines before the CSV header
    #[arg(long, default_value_t = 3)]
    pub skip_rows: usize,

    /// CSV field delimiter
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: u8,

    /// Keep only rows whose COLUMN starts with PREFIX (COLUMN=PREFIX)
    #[arg(long)]
    pub row_filter: Option<RowFilter>,

    /// Append a column with this name holding each row's source file name
    #[arg(long)]
    pub source_column: Option<String>,
}

impl ConsolidateArgs {
    /// Requested formats, all when unset
    pub fn formats(&self) -> Result<Vec<ArtifactFormat>, CliError> {
        match &self.formats {
            None => Ok(ArtifactFormat::ALL.to_vec()),
            Some(list) => {
                let formats = ArtifactFormat::parse_list(list)
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?;
                if formats.is_empty() {
                    return Err(CliError::InvalidArgument(
                        "format list cannot be empty".to_string(),
                    ));
                }
                Ok(formats)
            }
        }
    }

    /// Consolidator settings
    pub fn options(&self) -> ConsolidateOptions {
        ConsolidateOptions {
            csv: CsvFormat {
                skip_rows: self.skip_rows,
                delimiter: self.delimiter,
            },
            row_filter: self.row_filter.clone(),
            source_column: self.source_column.clone(),
        }
    }
}

/// Download command arguments
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Modules to download (e.g. CCM,PRR); default every registered module
    #[arg(long)]
    pub modules: Option<String>,

    /// First period (YYYY, YYYY-MM, or YYYY-MM-DD); default registry span
    #[arg(long)]
    pub from: Option<String>,

    /// Last period, inclusive
    #[arg(long)]
    pub to: Option<String>,

    /// Period granularity: yearly, monthly, or daily
    #[arg(long, default_value = "yearly")]
    pub granularity: Granularity,

    /// Report variant codes (e.g. A,P,B); default registry variants
    #[arg(long)]
    pub variants: Option<String>,

    /// Fetch each period once, without the variant dimension
    #[arg(long, default_value_t = false, conflicts_with = "variants")]
    pub no_variants: bool,

    /// Run mode: missing, all, or consolidate-only
    #[arg(long, default_value = "missing")]
    pub mode: RunMode,

    /// Also consolidate modules whose files were all verified skips
    #[arg(long, default_value_t = false)]
    pub reconsolidate_skipped: bool,

    /// Consolidation and artifact settings
    #[command(flatten)]
    pub consolidate: ConsolidateArgs,
}

impl DownloadArgs {
    fn request(&self, registry: &ModuleRegistry) -> Result<DownloadRequest, CliError> {
        let modules = match &self.modules {
            Some(list) => Module::parse_list(list)?,
            None => registry.entries().map(|(m, _)| m.clone()).collect(),
        };

        let (first, last) = registry.default_years();
        let from = self.from.clone().unwrap_or_else(|| first.to_string());
        let to = self.to.clone().unwrap_or_else(|| last.to_string());
        let range = DateRange::from_bounds(&from, &to, self.granularity)?;

        let variants = if self.no_variants {
            Vec::new()
        } else {
            match &self.variants {
                Some(list) => parse_variants(list)?,
                None => registry.default_variants().to_vec(),
            }
        };

        Ok(DownloadRequest::new(modules, range)
            .with_variants(variants)
            .with_mode(self.mode))
    }

    /// Execute the download command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let registry = ModuleRegistry::load_embedded()?;
        let request = self.request(&registry)?;
        let config = cli.download_config()?;
        let layout = cli.layout();

        let bar_observer = (cli.output_format == OutputFormat::Human)
            .then(|| Arc::new(ProgressBarObserver::new()));
        let observer: Arc<dyn ProgressObserver> = match &bar_observer {
            Some(bar) => bar.clone() as Arc<dyn ProgressObserver>,
            None => Arc::new(NoopObserver),
        };

        let transport =
            Arc::new(HttpTransport::new(config.connect_timeout)?.with_scheme(cli.auth_scheme));
        let orchestrator = Orchestrator::new(config, transport, layout)?
            .with_consolidate_options(self.consolidate.options())
            .with_formats(self.consolidate.formats()?)
            .with_batch_size(self.consolidate.batch_size)
            .with_reconsolidate_skipped(self.reconsolidate_skipped)
            .with_observer(observer)
            .with_shutdown(shutdown);

        let summary = if request.mode == RunMode::ConsolidateOnly {
            orchestrator.consolidate_only(&request.modules).await?
        } else {
            let credentials = EnvCredentials::default().credentials()?;
            let tasks = orchestrator.expand(&request)?.len();
            info!(tasks, mode = %request.mode, "Starting download");
            if let Some(bar) = &bar_observer {
                bar.bar().set_length(tasks as u64);
            }
            orchestrator.run(&request, &credentials).await?
        };

        if let Some(bar) = &bar_observer {
            bar.bar().finish_and_clear();
        }

        match cli.output_format {
            OutputFormat::Json => report::print_summary_json(&summary),
            OutputFormat::Human => report::print_summary_human(&summary),
        }

        match summary.status {
            RunStatus::AllSucceeded => Ok(()),
            status => Err(CliError::RunIncomplete(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Period;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["report-downloader"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_download_defaults_from_registry() {
        let cli = parse(&["download", "--modules", "ccm"]);
        let Commands::Download(args) = &cli.command else {
            panic!("expected download");
        };
        let registry = ModuleRegistry::load_embedded().unwrap();
        let request = args.request(&registry).unwrap();
        assert_eq!(request.modules, vec![Module::Ccm]);
        assert_eq!(request.variants.len(), 7);
        let periods = request.date_range.periods();
        assert_eq!(periods.first(), Some(&Period::Year(2018)));
        assert_eq!(periods.last(), Some(&Period::Year(2025)));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--max-workers",
            "3",
            "--delay-ms",
            "0",
            "--max-attempts",
            "5",
            "download",
            "--no-variants",
            "--mode",
            "all",
        ]);
        let config = cli.download_config().unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.max_attempts, 5);

        let Commands::Download(args) = &cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.mode, RunMode::All);
        assert!(args.no_variants);
    }

    #[test]
    fn test_auth_scheme_flag() {
        assert_eq!(parse(&["modules"]).auth_scheme, AuthScheme::Ntlm);
        assert_eq!(
            parse(&["--auth-scheme", "basic", "modules"]).auth_scheme,
            AuthScheme::Basic
        );
    }

    #[test]
    fn test_rejects_bad_worker_count() {
        let argv = ["report-downloader", "--max-workers", "0", "modules"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["report-downloader", "--max-workers", "64", "modules"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_format_list() {
        let cli = parse(&["optimize", "--module", "CCM", "--input", "x", "--formats", "parquet,csv"]);
        let Commands::Optimize(args) = &cli.command else {
            panic!("expected optimize");
        };
        assert_eq!(
            args.consolidate.formats().unwrap(),
            vec![ArtifactFormat::Columnar, ArtifactFormat::DelimitedText]
        );
    }

    #[test]
    fn test_delimiter_parse() {
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert!(parse_delimiter(";;").is_err());
    }
}
