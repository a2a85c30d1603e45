use envlint::cli::{self, Args};
use envlint::{Config, OutputFormat, Severity, lint_path};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper function to create a temporary project with an environment.yml file.
///
/// # Arguments
///
/// * `content` - The content to write to the environment.yml file
///
/// # Returns
///
/// A tuple containing the temporary directory and its path
fn create_test_environment(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let project_dir = temp_dir.path().to_path_buf();

    fs::write(project_dir.join("environment.yml"), content).unwrap();

    (temp_dir, project_dir)
}

fn args_for(path: &Path) -> Args {
    Args {
        path: path.to_path_buf(),
        format: OutputFormat::Text,
        strict: false,
        warn_unpinned: false,
        config: None,
        list: false,
        normalize: false,
    }
}

fn run(args: &Args) -> (bool, String) {
    let mut out = Vec::new();
    let passed = cli::execute(args, &mut out).unwrap();
    (passed, String::from_utf8(out).unwrap())
}

/// Test that the fixture manifest lints clean
#[test]
fn test_fixture_is_clean() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("qcarchive.yaml");
    let report = lint_path(&path, &Config::default()).unwrap();
    assert_eq!(report.errors, 0);
    assert_eq!(report.warnings, 0);
    assert_eq!(report.name.as_deref(), Some("qcarchive"));
}

/// Test a directory path picks up environment.yml and reports problems
#[test]
fn test_lint_directory_with_problems() {
    let content = r#"
name: broken
channels:
  - conda-forge
dependencies:
  - python=3.9
  - python>=3.10
  - numpy>=1..2
  - bioconda::samtools
"#;
    let (_temp_dir, project_dir) = create_test_environment(content);
    let report = lint_path(&project_dir, &Config::default()).unwrap();

    assert_eq!(report.errors, 2);
    assert_eq!(report.warnings, 2);
    let codes: Vec<&str> = report.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![
            "unsatisfiable",
            "duplicate-dependency",
            "invalid-spec",
            "undeclared-channel"
        ]
    );
    assert_eq!(report.diagnostics[0].severity, Severity::Error);
    assert_eq!(report.diagnostics[0].line, Some(6));
}

/// Test that a missing manifest is reported as an error, not a lint result
#[test]
fn test_missing_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let err = lint_path(temp_dir.path(), &Config::default()).unwrap_err();
    assert!(err.contains("No environment manifest"));
}

/// Test that malformed YAML structure is an error
#[test]
fn test_structurally_invalid_manifest() {
    let (_temp_dir, project_dir) = create_test_environment("dependencies: numpy\n");
    let err = lint_path(&project_dir, &Config::default()).unwrap_err();
    assert!(err.contains("Failed to parse environment manifest"));
}

/// Test text output and exit status through the CLI entry point
#[test]
fn test_execute_text_output() {
    let (_temp_dir, project_dir) =
        create_test_environment("name: t\nchannels: [conda-forge]\ndependencies:\n  - numpy\n");

    let (passed, output) = run(&args_for(&project_dir));
    assert!(passed);
    assert!(output.ends_with("0 errors, 0 warnings\n"));

    let mut args = args_for(&project_dir);
    args.warn_unpinned = true;
    let (passed, output) = run(&args);
    assert!(passed);
    assert!(output.contains(":4: warning[unpinned]"));

    args.strict = true;
    let (passed, _) = run(&args);
    assert!(!passed);
}

/// Test that envlint.toml beside the manifest is honoured
#[test]
fn test_execute_uses_local_config() {
    let (_temp_dir, project_dir) = create_test_environment(
        "name: t\nchannels: [defaults]\ndependencies:\n  - anaconda\n",
    );
    fs::write(
        project_dir.join("envlint.toml"),
        "required_channels = [\"conda-forge\"]\ndenied_packages = [\"anaconda\"]\n",
    )
    .unwrap();

    let mut args = args_for(&project_dir);
    args.format = OutputFormat::Json;
    let (passed, output) = run(&args);
    assert!(!passed);

    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["errors"], 2);
    let codes: Vec<&str> = json["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["code"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"missing-required-channel"));
    assert!(codes.contains(&"denied-package"));
}

/// Test the listing and normalize modes
#[test]
fn test_execute_list_and_normalize() {
    let (_temp_dir, project_dir) = create_test_environment(
        "name: t\ndependencies:\n  # Storage dependencies\n  - sqlalchemy>=1.3\n  - bad>=\n",
    );

    let mut args = args_for(&project_dir);
    args.list = true;
    let (passed, output) = run(&args);
    assert!(passed);
    assert!(output.contains("[Storage dependencies]"));
    assert!(output.contains("(invalid)"));

    let mut args = args_for(&project_dir);
    args.normalize = true;
    let (passed, output) = run(&args);
    assert!(passed);
    assert!(output.contains("sqlalchemy >=1.3"));
}

/// Test argument parsing end to end through the library entry point
#[test]
fn test_run_main_with_args_reports_failure() {
    let (_temp_dir, project_dir) = create_test_environment("dependencies:\n  - numpy==1\n  - numpy==2\n");
    let passed = envlint::run_main_with_args(vec![
        "envlint".into(),
        project_dir.into_os_string(),
        "--format".into(),
        "json".into(),
    ])
    .unwrap();
    assert!(!passed);
}
