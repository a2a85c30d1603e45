// Declare modules for the library build
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod manifest;
pub mod models;
pub mod report;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{Declaration, Entry, Manifest, MatchSpec, Version, VersionSpec};
pub use report::{OutputFormat, Report};
pub use validate::{Diagnostic, Severity, validate};

use std::path::Path;

/// Loads the manifest at `path` (a file or a directory holding one) and lints it
pub fn lint_path(path: &Path, config: &Config) -> Result<Report> {
    let manifest_path = detect::resolve_manifest_path(path)?;
    let manifest = Manifest::from_path(&manifest_path)?;
    let diagnostics = validate(&manifest, config);
    Ok(Report::new(&manifest_path, &manifest, diagnostics))
}

/// Runs the CLI with custom args (first item is the program name)
pub fn run_main_with_args(args: Vec<std::ffi::OsString>) -> Result<bool> {
    let cli_args = cli::parse_args_from(args)?;
    execute_with_args(&cli_args)
}

/// Runs envlint for already-parsed arguments, printing to stdout
pub fn execute_with_args(args: &cli::Args) -> Result<bool> {
    let stdout = std::io::stdout();
    cli::execute(args, &mut stdout.lock())
}
