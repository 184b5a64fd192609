//! Main entry point for the report-downloader CLI

use clap::Parser;
use report_downloader::cli::{Cli, Commands};
use report_downloader::metrics;
use report_downloader::shutdown::{self, ShutdownCoordinator};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr, JSON when `LOG_FORMAT=json`
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("report_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr).await?;
    }

    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received, finishing in-flight files...");
                shutdown.request_shutdown();
            }
        }
    });

    match &cli.command {
        Commands::Download(args) => args.execute(&cli, shutdown).await?,
        Commands::Optimize(args) => args.execute(&cli).await?,
        Commands::Modules(cmd) => cmd.execute(cli.output_format)?,
        Commands::Validate(cmd) => cmd.execute(&cli)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}
