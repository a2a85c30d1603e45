use crate::error::Result;
use crate::models::{Entry, Manifest};
use crate::validate::{Diagnostic, Severity};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// The outcome of linting one manifest
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub path: String,
    pub name: Option<String>,
    pub errors: usize,
    pub warnings: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new(path: &Path, manifest: &Manifest, diagnostics: Vec<Diagnostic>) -> Self {
        let errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        Self {
            path: path.display().to_string(),
            name: manifest.name.clone(),
            errors,
            warnings: diagnostics.len() - errors,
            diagnostics,
        }
    }

    /// Whether the lint run should exit non-zero
    pub fn is_failure(&self, strict: bool) -> bool {
        self.errors > 0 || (strict && self.warnings > 0)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// `path:line: severity[code]: message` lines followed by a summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for d in &self.diagnostics {
            match d.line {
                Some(line) => {
                    let _ = write!(out, "{}:{}: ", self.path, line);
                }
                None => {
                    let _ = write!(out, "{}: ", self.path);
                }
            }
            let _ = writeln!(out, "{}[{}]: {}", d.severity, d.code, d.message);
        }
        let _ = writeln!(
            out,
            "{}: {} error{}, {} warning{}",
            self.path,
            self.errors,
            if self.errors == 1 { "" } else { "s" },
            self.warnings,
            if self.warnings == 1 { "" } else { "s" },
        );
        out
    }
}

#[derive(Debug, Serialize)]
struct ListedDependency<'a> {
    raw: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Listing<'a> {
    name: Option<&'a str>,
    channels: &'a [String],
    dependencies: Vec<ListedDependency<'a>>,
    sub_sections: Vec<(&'a str, &'a [String])>,
}

/// Prints the dependency table, grouped by heading comment
pub fn render_listing(manifest: &Manifest, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(listing_text(manifest)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&listing(manifest))?),
    }
}

fn listing(manifest: &Manifest) -> Listing<'_> {
    let dependencies = manifest
        .declarations()
        .map(|decl| {
            let spec = decl.match_spec();
            ListedDependency {
                raw: &decl.raw,
                name: spec.map(|s| s.name.as_str()),
                version: spec.filter(|s| !s.version.is_any()).map(|s| s.version.to_string()),
                build: spec.and_then(|s| s.build.as_deref()),
                channel: spec.and_then(|s| s.channel.as_deref()),
                group: decl.group.as_deref(),
                line: decl.line,
                error: decl.spec.as_ref().err().map(|e| e.to_string()),
            }
        })
        .collect();

    Listing {
        name: manifest.name.as_deref(),
        channels: &manifest.channels,
        dependencies,
        sub_sections: manifest.sub_sections().collect(),
    }
}

fn listing_text(manifest: &Manifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "name: {}", manifest.name.as_deref().unwrap_or("<unnamed>"));
    let _ = writeln!(out, "channels: {}", manifest.channels.join(", "));

    for (group, decls) in manifest.groups() {
        let _ = writeln!(out, "\n[{}]", group.as_deref().unwrap_or("ungrouped"));
        for decl in decls {
            match decl.match_spec() {
                Some(spec) if spec.version.is_any() => {
                    let _ = writeln!(out, "  {}", spec.name);
                }
                Some(spec) => {
                    let _ = writeln!(out, "  {:<24} {}", spec.name, spec.version);
                }
                None => {
                    let _ = writeln!(out, "  {:<24} (invalid)", decl.raw);
                }
            }
        }
    }

    for entry in &manifest.dependencies {
        if let Entry::SubSection { key, specs, .. } = entry {
            let _ = writeln!(out, "\n[{}]", key);
            for spec in specs {
                let _ = writeln!(out, "  {}", spec);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::validate::validate;

    const CONTENT: &str = "\
name: qcarchive
channels:
  - conda-forge
dependencies:
  # Core dependencies
  - numpy
  - msgpack-python>=0.6.1
  # Storage dependencies
  - sqlalchemy>=2,<1.4
  - pip:
    - qcportal
";

    #[test]
    fn test_report_counts_and_text() {
        let manifest = Manifest::from_yaml_str(CONTENT).unwrap();
        let diagnostics = validate(&manifest, &Config::default());
        let report = Report::new(Path::new("environment.yml"), &manifest, diagnostics);

        assert_eq!(report.errors, 1);
        assert_eq!(report.warnings, 1);
        assert!(report.is_failure(false));

        let text = report.render_text();
        assert!(text.contains("environment.yml:9: error[unsatisfiable]"));
        assert!(text.contains("environment.yml:10: warning[pip-without-pip]"));
        assert!(text.ends_with("environment.yml: 1 error, 1 warning\n"));
    }

    #[test]
    fn test_clean_report_is_not_failure() {
        let manifest = Manifest::from_yaml_str("name: a\nchannels: [c]\ndependencies: [x]\n").unwrap();
        let report = Report::new(Path::new("e.yml"), &manifest, Vec::new());
        assert!(!report.is_failure(true));
        assert_eq!(report.render_text(), "e.yml: 0 errors, 0 warnings\n");
    }

    #[test]
    fn test_json_report() {
        let manifest = Manifest::from_yaml_str(CONTENT).unwrap();
        let diagnostics = validate(&manifest, &Config::default());
        let report = Report::new(Path::new("environment.yml"), &manifest, diagnostics);
        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["name"], "qcarchive");
        assert_eq!(json["errors"], 1);
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][0]["package"], "sqlalchemy");
    }

    #[test]
    fn test_listing() {
        let manifest = Manifest::from_yaml_str(CONTENT).unwrap();
        let text = render_listing(&manifest, OutputFormat::Text).unwrap();
        assert!(text.contains("[Core dependencies]\n  numpy\n"));
        assert!(text.contains("[Storage dependencies]"));
        assert!(text.contains("[pip]\n  qcportal\n"));

        let json: serde_json::Value =
            serde_json::from_str(&render_listing(&manifest, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["dependencies"][1]["name"], "msgpack-python");
        assert_eq!(json["dependencies"][1]["version"], ">=0.6.1");
        assert_eq!(json["dependencies"][1]["group"], "Core dependencies");
        assert_eq!(json["sub_sections"][0][0], "pip");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
