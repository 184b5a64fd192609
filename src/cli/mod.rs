//! CLI command implementations

pub mod download;
pub mod error;
pub mod modules;
pub mod observer;
pub mod optimize;
pub mod report;
pub mod validate;

pub use download::{Cli, Commands, DownloadArgs, OutputFormat};
pub use error::CliError;
pub use modules::ModulesCommand;
pub use optimize::OptimizeArgs;
pub use validate::ValidateCommand;
