use crate::config::Config;
use crate::models::{
    Constraint, Declaration, Entry, Manifest, MatchSpec, Version, VersionOperator,
};
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static CHANNEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+(/[A-Za-z0-9_.\-]+)*$").unwrap());

static CHANNEL_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?|file|s3|gcs|oci)://\S+$").unwrap());

const REQ_VERSION: &str = r"(===|~=|==|!=|<=|>=|<|>)\s*[A-Za-z0-9.*+!_\-]+";

static PIP_REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^[A-Za-z0-9]([A-Za-z0-9._\-]*[A-Za-z0-9])?\s*(\[\s*[A-Za-z0-9._\-]+(\s*,\s*[A-Za-z0-9._\-]+)*\s*\])?\s*(\(?\s*{v}(\s*,\s*{v})*\s*\)?)?\s*(;.+)?$",
        v = REQ_VERSION
    ))
    .unwrap()
});

static PIP_DIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9._\-]+(\[[^\]]*\])?\s*@\s*)?((git|hg|svn|bzr)\+)?(https?|file|ssh|git)://\S+$")
        .unwrap()
});

static PIP_OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--?[A-Za-z][A-Za-z\-]*(\s+\S.*|=\S.*)?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One finding about a manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl Diagnostic {
    fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            line: None,
            package: None,
        }
    }

    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn at(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    fn for_package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }
}

/// Runs every check against `manifest`. Diagnostics come back sorted by line.
pub fn validate(manifest: &Manifest, config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    check_document(manifest, &mut diagnostics);
    check_channels(manifest, config, &mut diagnostics);
    check_declarations(manifest, config, &mut diagnostics);
    check_sub_sections(manifest, config, &mut diagnostics);

    diagnostics.sort_by_key(|d| (d.line.unwrap_or(0), std::cmp::Reverse(d.severity)));
    debug!("Validation produced {} diagnostics", diagnostics.len());
    diagnostics
}

fn check_document(manifest: &Manifest, out: &mut Vec<Diagnostic>) {
    if manifest.name.as_deref().is_none_or(|name| name.trim().is_empty()) {
        out.push(Diagnostic::warning("missing-name", "manifest has no 'name'"));
    }
    if manifest.dependencies.is_empty() {
        out.push(Diagnostic::warning(
            "no-dependencies",
            "manifest declares no dependencies",
        ));
    }
    for key in manifest.unknown_keys.keys() {
        out.push(Diagnostic::warning(
            "unknown-key",
            format!("unknown top-level key '{}'", key),
        ));
    }
}

fn check_channels(manifest: &Manifest, config: &Config, out: &mut Vec<Diagnostic>) {
    if manifest.channels.is_empty() {
        out.push(Diagnostic::warning(
            "no-channels",
            "no channels listed; the installer's defaults will be used",
        ));
    }

    let mut seen: Vec<&str> = Vec::new();
    for channel in &manifest.channels {
        let channel = channel.trim();
        if !is_valid_channel(channel) {
            out.push(Diagnostic::error(
                "invalid-channel",
                format!("'{}' is not a channel name or URL", channel),
            ));
        }
        if seen.contains(&channel) {
            out.push(Diagnostic::warning(
                "duplicate-channel",
                format!("channel '{}' is listed more than once", channel),
            ));
        } else {
            seen.push(channel);
        }
    }

    for required in &config.required_channels {
        if !manifest.channels.iter().any(|c| c.trim() == required) {
            out.push(Diagnostic::error(
                "missing-required-channel",
                format!("required channel '{}' is not listed", required),
            ));
        }
    }
}

fn is_valid_channel(channel: &str) -> bool {
    CHANNEL_NAME_RE.is_match(channel) || CHANNEL_URL_RE.is_match(channel)
}

fn check_declarations(manifest: &Manifest, config: &Config, out: &mut Vec<Diagnostic>) {
    let mut by_name: BTreeMap<String, Vec<(&Declaration, &MatchSpec)>> = BTreeMap::new();

    for decl in manifest.declarations() {
        let spec = match &decl.spec {
            Ok(spec) => spec,
            Err(e) => {
                out.push(
                    Diagnostic::error("invalid-spec", format!("'{}': {}", decl.raw, e))
                        .at(decl.line),
                );
                continue;
            }
        };
        let name = spec.normalized_name();

        if let Some(channel) = &spec.channel {
            let declared = manifest.channels.iter().any(|c| c.trim() == channel);
            if !declared {
                out.push(
                    Diagnostic::warning(
                        "undeclared-channel",
                        format!(
                            "'{}' pins channel '{}' which is not in 'channels'",
                            decl.raw, channel
                        ),
                    )
                    .at(decl.line)
                    .for_package(&name),
                );
            }
        }

        if config
            .denied_packages
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(&name))
        {
            out.push(
                Diagnostic::error("denied-package", format!("'{}' is not allowed", spec.name))
                    .at(decl.line)
                    .for_package(&name),
            );
        }

        if config.warn_unpinned && !spec.is_pinned() {
            out.push(
                Diagnostic::warning(
                    "unpinned",
                    format!("'{}' has no version constraint", spec.name),
                )
                .at(decl.line)
                .for_package(&name),
            );
        }

        by_name.entry(name).or_default().push((decl, spec));
    }

    for (name, decls) in &by_name {
        let first_line = decls.first().and_then(|(decl, _)| decl.line);
        if decls.len() > 1 {
            let written = decls
                .iter()
                .map(|(decl, _)| format!("'{}'", decl.raw))
                .collect::<Vec<_>>()
                .join(", ");
            let duplicate_line = decls.get(1).and_then(|(decl, _)| decl.line);
            out.push(
                Diagnostic::warning(
                    "duplicate-dependency",
                    format!("'{}' is declared {} times: {}", name, decls.len(), written),
                )
                .at(duplicate_line)
                .for_package(name),
            );
        }

        let specs: Vec<&MatchSpec> = decls.iter().map(|(_, spec)| *spec).collect();
        if let Some(reason) = find_conflict(&specs) {
            out.push(
                Diagnostic::error(
                    "unsatisfiable",
                    format!("constraints on '{}' can never be satisfied: {}", name, reason),
                )
                .at(first_line)
                .for_package(name),
            );
        }
    }

    let has_pip = by_name.contains_key("pip");
    if manifest.pip_specs().is_some() && !has_pip {
        let line = manifest
            .dependencies
            .iter()
            .find(|e| matches!(e, Entry::SubSection { key, .. } if key == "pip"))
            .and_then(Entry::line);
        out.push(
            Diagnostic::warning(
                "pip-without-pip",
                "a 'pip' subsection is present but 'pip' is not a conda dependency",
            )
            .at(line),
        );
    }
}

fn check_sub_sections(manifest: &Manifest, config: &Config, out: &mut Vec<Diagnostic>) {
    for entry in &manifest.dependencies {
        let Entry::SubSection { key, specs, line } = entry else {
            continue;
        };

        if key != "pip" && !config.extra_subsections.iter().any(|k| k == key) {
            out.push(
                Diagnostic::warning(
                    "unknown-subsection",
                    format!("subsection '{}' is not understood by conda", key),
                )
                .at(*line),
            );
            continue;
        }

        if key == "pip" {
            for spec in specs {
                if !is_valid_pip_requirement(spec) {
                    out.push(
                        Diagnostic::error(
                            "invalid-pip-requirement",
                            format!("'{}' is not a valid pip requirement", spec),
                        )
                        .at(*line),
                    );
                }
            }
        }
    }
}

/// Accepts requirement specifiers, direct URL / VCS references, local paths
/// and requirements-file style option lines.
pub fn is_valid_pip_requirement(requirement: &str) -> bool {
    let requirement = requirement.trim();
    if requirement.is_empty() {
        return false;
    }
    if requirement.starts_with('.') || requirement.starts_with('/') {
        return true;
    }
    PIP_OPTION_RE.is_match(requirement)
        || PIP_DIRECT_RE.is_match(requirement)
        || PIP_REQUIREMENT_RE.is_match(requirement)
}

#[derive(Debug, Clone)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// The combined constraints of every declaration of one package
#[derive(Debug, Default)]
struct Constraints {
    lower: Option<Bound>,
    upper: Option<Bound>,
    exact: Vec<Version>,
    excluded: Vec<Version>,
    prefixes: Vec<Version>,
    excluded_prefixes: Vec<Version>,
}

impl Constraints {
    fn raise_lower(&mut self, version: &Version, inclusive: bool) {
        let replace = match &self.lower {
            None => true,
            Some(current) => {
                version > &current.version || (version == &current.version && !inclusive)
            }
        };
        if replace {
            self.lower = Some(Bound {
                version: version.clone(),
                inclusive,
            });
        }
    }

    fn lower_upper(&mut self, version: &Version, inclusive: bool) {
        let replace = match &self.upper {
            None => true,
            Some(current) => {
                version < &current.version || (version == &current.version && !inclusive)
            }
        };
        if replace {
            self.upper = Some(Bound {
                version: version.clone(),
                inclusive,
            });
        }
    }

    fn add(&mut self, constraint: &Constraint) {
        let v = &constraint.version;
        match constraint.operator {
            VersionOperator::Equal => self.exact.push(v.clone()),
            VersionOperator::NotEqual => self.excluded.push(v.clone()),
            VersionOperator::Greater => self.raise_lower(v, false),
            VersionOperator::GreaterEqual => self.raise_lower(v, true),
            VersionOperator::Less => self.lower_upper(v, false),
            VersionOperator::LessEqual => self.lower_upper(v, true),
            VersionOperator::StartsWith => self.prefixes.push(v.clone()),
            VersionOperator::NotStartsWith => self.excluded_prefixes.push(v.clone()),
            VersionOperator::Compatible => {
                self.raise_lower(v, true);
                if let Some(prefix) = v.truncated() {
                    self.prefixes.push(prefix);
                }
            }
        }
    }

    fn admits(&self, version: &Version) -> Option<String> {
        if let Some(lower) = &self.lower {
            if version < &lower.version || (version == &lower.version && !lower.inclusive) {
                return Some(format!(
                    "{} is below the lower bound {}{}",
                    version,
                    if lower.inclusive { ">=" } else { ">" },
                    lower.version
                ));
            }
        }
        if let Some(upper) = &self.upper {
            if version > &upper.version || (version == &upper.version && !upper.inclusive) {
                return Some(format!(
                    "{} is above the upper bound {}{}",
                    version,
                    if upper.inclusive { "<=" } else { "<" },
                    upper.version
                ));
            }
        }
        if self.excluded.contains(version) {
            return Some(format!("{} is both required and excluded", version));
        }
        if let Some(prefix) = self.prefixes.iter().find(|p| !version.starts_with(p)) {
            return Some(format!("{} does not match {}.*", version, prefix));
        }
        if let Some(prefix) = self.excluded_prefixes.iter().find(|p| version.starts_with(p)) {
            return Some(format!("{} matches the excluded {}.*", version, prefix));
        }
        None
    }

    fn conflict(&self) -> Option<String> {
        if let [first, rest @ ..] = self.exact.as_slice() {
            if let Some(other) = rest.iter().find(|v| *v != first) {
                return Some(format!("pinned to both {} and {}", first, other));
            }
            return self.admits(first);
        }

        if let (Some(lower), Some(upper)) = (&self.lower, &self.upper) {
            let empty = lower.version > upper.version
                || (lower.version == upper.version && !(lower.inclusive && upper.inclusive));
            if empty {
                return Some(format!(
                    "range {}{} .. {}{} is empty",
                    if lower.inclusive { ">=" } else { ">" },
                    lower.version,
                    if upper.inclusive { "<=" } else { "<" },
                    upper.version
                ));
            }
        }

        for (i, a) in self.prefixes.iter().enumerate() {
            for b in &self.prefixes[i + 1..] {
                if !a.starts_with(b) && !b.starts_with(a) {
                    return Some(format!("{}.* and {}.* have no version in common", a, b));
                }
            }
            if let (Some(lower), Some(end)) = (&self.lower, a.bumped()) {
                if lower.version >= end {
                    return Some(format!(
                        "{}.* lies entirely below the lower bound {}",
                        a, lower.version
                    ));
                }
            }
            if let Some(upper) = &self.upper {
                if upper.version < *a && !upper.version.starts_with(a) {
                    return Some(format!(
                        "{}.* lies entirely above the upper bound {}",
                        a, upper.version
                    ));
                }
            }
            if let Some(excluded) = self.excluded_prefixes.iter().find(|p| a.starts_with(p)) {
                return Some(format!("{}.* is inside the excluded {}.*", a, excluded));
            }
        }

        None
    }
}

/// Looks for a provable contradiction between the specs of one package.
///
/// Builds are always compared. Version checks give up on specs with `|`
/// alternatives; deciding those is the solver's job.
fn find_conflict(specs: &[&MatchSpec]) -> Option<String> {
    let builds: Vec<&str> = specs
        .iter()
        .filter_map(|s| s.build.as_deref())
        .filter(|b| !b.contains('*'))
        .collect();
    if let [first, rest @ ..] = builds.as_slice() {
        if let Some(other) = rest.iter().find(|b| *b != first) {
            return Some(format!("requires both build {} and build {}", first, other));
        }
    }

    let mut constraints = Constraints::default();
    for spec in specs {
        for constraint in spec.version.conjunction()? {
            constraints.add(constraint);
        }
    }
    constraints.conflict()
}
