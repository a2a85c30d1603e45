use crate::config::Config;
use crate::detect::resolve_manifest_path;
use crate::error::{Error, Result};
use crate::models::Manifest;
use crate::report::{OutputFormat, Report, render_listing};
use crate::validate::validate;
use clap::{Arg, ArgAction, Command};
use log::info;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Command line arguments for envlint
#[derive(Debug, Clone)]
pub struct Args {
    /// Manifest file, or directory containing one
    pub path: PathBuf,

    /// Output format for reports and listings
    pub format: OutputFormat,

    /// Fail on warnings as well as errors
    pub strict: bool,

    /// Warn on dependencies without a version constraint
    pub warn_unpinned: bool,

    /// Explicit envlint.toml
    pub config: Option<PathBuf>,

    /// Print the parsed dependency table instead of linting
    pub list: bool,

    /// Print the manifest with canonical specs instead of linting
    pub normalize: bool,
}

/// Builds the clap command definition
pub fn command() -> Command {
    let mut cmd = Command::new("envlint")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Check conda environment manifests for malformed or contradictory declarations")
        .long_about(
            "envlint parses a conda environment manifest (environment.yml), checks that it is \
            structurally valid and that every dependency specifier is well-formed, and reports \
            duplicate declarations, unknown channels and constraints that can never be satisfied \
            together. It never contacts a package index or solves the environment.",
        );

    cmd = cmd.arg(
        Arg::new("PATH")
            .help("Manifest file or directory containing environment.yml")
            .long_help(
                "Either a manifest file of any name, or a directory. For a directory the first \
                of environment.yml, environment.yaml, env.yml and env.yaml is used.",
            )
            .value_parser(clap::value_parser!(PathBuf))
            .default_value("."),
    );

    cmd = cmd.arg(
        Arg::new("format")
            .long("format")
            .help("Output format: text or json")
            .value_parser(["text", "json"])
            .default_value("text"),
    );

    cmd = cmd.arg(
        Arg::new("strict")
            .long("strict")
            .help("Exit non-zero on warnings too")
            .action(ArgAction::SetTrue),
    );

    cmd = cmd.arg(
        Arg::new("warn-unpinned")
            .long("warn-unpinned")
            .help("Warn about dependencies without a version constraint")
            .action(ArgAction::SetTrue),
    );

    cmd = cmd.arg(
        Arg::new("config")
            .long("config")
            .help("Path to an envlint.toml")
            .long_help(
                "Reads lint settings from this file. Without it envlint looks for envlint.toml \
                next to the manifest, then in the user config directory.",
            )
            .value_parser(clap::value_parser!(PathBuf)),
    );

    cmd = cmd.arg(
        Arg::new("list")
            .long("list")
            .help("Print the dependency table grouped by comment headings")
            .action(ArgAction::SetTrue)
            .conflicts_with("normalize"),
    );

    cmd = cmd.arg(
        Arg::new("normalize")
            .long("normalize")
            .help("Print the manifest with every specifier in canonical form")
            .action(ArgAction::SetTrue),
    );

    let after_help = "EXAMPLES:
# Lint environment.yml in the current directory
envlint

# Lint a specific manifest and fail on warnings
envlint devtools/conda-envs/base.yaml --strict

# Machine-readable output
envlint . --format json

# Show dependencies grouped by their heading comments
envlint . --list";

    cmd.after_help(after_help)
}

fn args_from_matches(matches: &clap::ArgMatches) -> Result<Args> {
    let format = matches
        .get_one::<String>("format")
        .map(|f| f.parse::<OutputFormat>())
        .transpose()?
        .unwrap_or_default();

    Ok(Args {
        path: matches
            .get_one::<PathBuf>("PATH")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".")),
        format,
        strict: matches.get_flag("strict"),
        warn_unpinned: matches.get_flag("warn-unpinned"),
        config: matches.get_one::<PathBuf>("config").cloned(),
        list: matches.get_flag("list"),
        normalize: matches.get_flag("normalize"),
    })
}

/// Parses arguments from an explicit list; the first item is the program name
pub fn parse_args_from<I, T>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command()
        .try_get_matches_from(args)
        .map_err(|e| Error::General(e.to_string()))?;
    args_from_matches(&matches)
}

/// Parses the process arguments and runs, returning whether the manifest passed
pub fn run() -> Result<bool> {
    let matches = command().get_matches();
    let args = args_from_matches(&matches)?;
    let stdout = std::io::stdout();
    execute(&args, &mut stdout.lock())
}

/// Runs envlint with the given arguments, writing results to `out`.
///
/// Returns `Ok(false)` when the manifest has errors (or warnings with
/// `--strict`), and `Err` when it cannot be read or is not valid YAML.
pub fn execute(args: &Args, out: &mut impl Write) -> Result<bool> {
    let manifest_path = resolve_manifest_path(&args.path)?;
    let manifest = Manifest::from_path(&manifest_path)?;

    if args.list {
        write!(out, "{}", render_listing(&manifest, args.format)?)?;
        return Ok(true);
    }

    if args.normalize {
        write!(out, "{}", manifest.to_yaml_string()?)?;
        return Ok(true);
    }

    let manifest_dir = manifest_path.parent().unwrap_or(Path::new("."));
    let mut config = Config::discover(args.config.as_deref(), manifest_dir)?;
    config.warn_unpinned |= args.warn_unpinned;
    config.strict |= args.strict;

    let diagnostics = validate(&manifest, &config);
    let report = Report::new(&manifest_path, &manifest, diagnostics);
    write!(out, "{}", report.render(args.format)?)?;

    let passed = !report.is_failure(config.strict);
    if passed {
        info!("{} looks good", manifest_path.display());
    } else {
        info!(
            "{} has {} error(s) and {} warning(s)",
            manifest_path.display(),
            report.errors,
            report.warnings
        );
    }
    Ok(passed)
}
