use crate::models::version::{ParseVersionError, Version};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*").unwrap());

static BUILD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.*+]+$").unwrap());

static SUBDIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(noarch|[a-z]+-(64|32|aarch64|arm64|armv6l|armv7l|ppc64le|ppc64|s390x|riscv64|z))$").unwrap());

/// Comparison operator of a single version constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOperator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    /// `=1.2`, `1.2.*` or `==1.2.*`
    StartsWith,
    /// `!=1.2.*`
    NotStartsWith,
    /// `~=1.2`
    Compatible,
}

/// One `<op><version>` term
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub operator: VersionOperator,
    pub version: Version,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.version;
        match self.operator {
            VersionOperator::Equal => write!(f, "=={}", v),
            VersionOperator::NotEqual => write!(f, "!={}", v),
            VersionOperator::Greater => write!(f, ">{}", v),
            VersionOperator::GreaterEqual => write!(f, ">={}", v),
            VersionOperator::Less => write!(f, "<{}", v),
            VersionOperator::LessEqual => write!(f, "<={}", v),
            VersionOperator::StartsWith => write!(f, "{}.*", v),
            VersionOperator::NotStartsWith => write!(f, "!={}.*", v),
            VersionOperator::Compatible => write!(f, "~={}", v),
        }
    }
}

/// A version constraint in disjunctive normal form
///
/// `alternatives` are joined with `|`, the constraints inside one alternative
/// with `,`. An empty list of alternatives matches any version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VersionSpec {
    pub alternatives: Vec<Vec<Constraint>>,
}

impl VersionSpec {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// The constraints when the spec has no `|` alternatives
    pub fn conjunction(&self) -> Option<&[Constraint]> {
        match self.alternatives.as_slice() {
            [] => Some(&[]),
            [only] => Some(only),
            _ => None,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "*");
        }
        let text = self
            .alternatives
            .iter()
            .map(|all| {
                all.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("|");
        write!(f, "{}", text)
    }
}

/// Errors produced while parsing a dependency specifier
#[derive(Debug, Clone, PartialEq)]
pub enum ParseSpecError {
    Empty,
    EmptyChannel,
    MissingName(String),
    InvalidNameCharacter { name: String, found: char },
    MissingVersion(String),
    InvalidWildcard(String),
    InvalidVersion { text: String, reason: ParseVersionError },
    InvalidBuild(String),
    TooManyParts(String),
    UnknownBracketKey(String),
    MalformedBracket(String),
    ConflictingVersion,
}

impl fmt::Display for ParseSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseSpecError::Empty => write!(f, "empty dependency specifier"),
            ParseSpecError::EmptyChannel => write!(f, "channel before '::' is empty"),
            ParseSpecError::MissingName(spec) => write!(f, "no package name in '{}'", spec),
            ParseSpecError::InvalidNameCharacter { name, found } => {
                write!(f, "unexpected character '{}' after package name '{}'", found, name)
            }
            ParseSpecError::MissingVersion(op) => {
                write!(f, "operator '{}' is not followed by a version", op)
            }
            ParseSpecError::InvalidWildcard(term) => {
                write!(f, "wildcard not allowed in '{}'", term)
            }
            ParseSpecError::InvalidVersion { text, reason } => {
                write!(f, "invalid version '{}': {}", text, reason)
            }
            ParseSpecError::InvalidBuild(build) => write!(f, "invalid build string '{}'", build),
            ParseSpecError::TooManyParts(rest) => {
                write!(f, "expected '<version> [<build>]' but found '{}'", rest)
            }
            ParseSpecError::UnknownBracketKey(key) => write!(f, "unknown bracket key '{}'", key),
            ParseSpecError::MalformedBracket(content) => {
                write!(f, "malformed bracket section '[{}]'", content)
            }
            ParseSpecError::ConflictingVersion => {
                write!(f, "version given both inline and in brackets")
            }
        }
    }
}

impl std::error::Error for ParseSpecError {}

const OPERATORS: &[(&str, VersionOperator)] = &[
    ("==", VersionOperator::Equal),
    ("!=", VersionOperator::NotEqual),
    (">=", VersionOperator::GreaterEqual),
    ("<=", VersionOperator::LessEqual),
    ("~=", VersionOperator::Compatible),
    (">", VersionOperator::Greater),
    ("<", VersionOperator::Less),
    ("=", VersionOperator::StartsWith),
];

fn parse_version(text: &str) -> Result<Version, ParseSpecError> {
    text.parse::<Version>()
        .map_err(|reason| ParseSpecError::InvalidVersion {
            text: text.to_string(),
            reason,
        })
}

/// Parses one term. `Ok(None)` is the `*` wildcard.
fn parse_constraint(term: &str) -> Result<Option<Constraint>, ParseSpecError> {
    let term = term.trim();
    let (op_text, operator, rest) = OPERATORS
        .iter()
        .find_map(|(text, op)| term.strip_prefix(text).map(|rest| (*text, Some(*op), rest)))
        .unwrap_or(("", None, term));
    let rest = rest.trim();

    if rest.is_empty() {
        return Err(if op_text.is_empty() {
            ParseSpecError::Empty
        } else {
            ParseSpecError::MissingVersion(op_text.to_string())
        });
    }

    let wildcard_base = rest
        .strip_suffix(".*")
        .or_else(|| rest.strip_suffix('*'))
        .filter(|base| !base.is_empty());

    let (operator, version_text) = match (operator, wildcard_base) {
        (None, _) if rest == "*" => return Ok(None),
        (None, Some(base)) | (Some(VersionOperator::Equal), Some(base)) => {
            (VersionOperator::StartsWith, base)
        }
        (Some(VersionOperator::StartsWith), Some(base)) => (VersionOperator::StartsWith, base),
        (Some(VersionOperator::NotEqual), Some(base)) => (VersionOperator::NotStartsWith, base),
        (Some(_), Some(_)) => return Err(ParseSpecError::InvalidWildcard(term.to_string())),
        (None, None) => (VersionOperator::Equal, rest),
        (Some(op), None) => (op, rest),
    };

    if version_text.contains('*') {
        return Err(ParseSpecError::InvalidWildcard(term.to_string()));
    }

    Ok(Some(Constraint {
        operator,
        version: parse_version(version_text)?,
    }))
}

impl FromStr for VersionSpec {
    type Err = ParseSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseSpecError::Empty);
        }

        let mut alternatives = Vec::new();
        for alternative in s.split('|') {
            let mut all = Vec::new();
            for term in alternative.split(',') {
                if let Some(constraint) = parse_constraint(term)? {
                    all.push(constraint);
                }
            }
            if all.is_empty() {
                // one branch accepts anything, so the whole spec does
                return Ok(VersionSpec::any());
            }
            alternatives.push(all);
        }
        Ok(VersionSpec { alternatives })
    }
}

/// A conda dependency declaration, e.g. `conda-forge::numpy >=1.21,<2 py39*`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSpec {
    pub channel: Option<String>,
    pub subdir: Option<String>,
    pub name: String,
    pub version: VersionSpec,
    pub build: Option<String>,
}

impl MatchSpec {
    /// Lowercased name, used to compare declarations
    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn is_pinned(&self) -> bool {
        !self.version.is_any() || self.build.is_some()
    }
}

fn validate_build(build: &str) -> Result<String, ParseSpecError> {
    if BUILD_RE.is_match(build) {
        Ok(build.to_string())
    } else {
        Err(ParseSpecError::InvalidBuild(build.to_string()))
    }
}

/// Splits on commas that are not inside quotes
fn split_bracket_items(content: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in content.chars() {
        match (quote, c) {
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, ',') => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for q in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    value
}

/// Joins whitespace-separated tokens that belong together (`>= 1.0`, `1.0, <2`)
fn version_tokens(rest: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut glue_next = false;
    for token in rest.split_whitespace() {
        let is_operator = token.chars().all(|c| "<>=!~".contains(c));
        let continues = token.starts_with([',', '|']);
        match tokens.last_mut() {
            Some(last) if glue_next || continues => last.push_str(token),
            _ => tokens.push(token.to_string()),
        }
        glue_next = is_operator || token.ends_with([',', '|']);
    }
    tokens
}

impl FromStr for MatchSpec {
    type Err = ParseSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(ParseSpecError::Empty);
        }

        let (mut channel, mut subdir, rest) = match spec.rsplit_once("::") {
            Some((channel, rest)) => {
                let channel = channel.trim();
                if channel.is_empty() {
                    return Err(ParseSpecError::EmptyChannel);
                }
                match channel.rsplit_once('/') {
                    Some((base, sub)) if SUBDIR_RE.is_match(sub) && !base.is_empty() => {
                        (Some(base.to_string()), Some(sub.to_string()), rest)
                    }
                    _ => (Some(channel.to_string()), None, rest),
                }
            }
            None => (None, None, spec),
        };

        let mut bracket_version = None;
        let mut bracket_build = None;
        let rest = match rest.find('[') {
            Some(open) => {
                let inner = &rest[open + 1..];
                let content = inner
                    .strip_suffix(']')
                    .ok_or_else(|| ParseSpecError::MalformedBracket(inner.to_string()))?;
                for item in split_bracket_items(content) {
                    if item.trim().is_empty() {
                        continue;
                    }
                    let (key, value) = item
                        .split_once('=')
                        .ok_or_else(|| ParseSpecError::MalformedBracket(content.to_string()))?;
                    let value = unquote(value).to_string();
                    match key.trim() {
                        "version" => bracket_version = Some(value.parse::<VersionSpec>()?),
                        "build" => bracket_build = Some(validate_build(&value)?),
                        "channel" => channel = Some(value),
                        "subdir" => subdir = Some(value),
                        other => {
                            return Err(ParseSpecError::UnknownBracketKey(other.to_string()));
                        }
                    }
                }
                &rest[..open]
            }
            None => rest,
        };

        let rest = rest.trim_start();
        let name = NAME_RE
            .find(rest)
            .map(|m| m.as_str())
            .ok_or_else(|| ParseSpecError::MissingName(spec.to_string()))?;
        let remainder = &rest[name.len()..];

        if let Some(found) = remainder.chars().next() {
            if !found.is_whitespace() && !"=<>!~".contains(found) {
                return Err(ParseSpecError::InvalidNameCharacter {
                    name: name.to_string(),
                    found,
                });
            }
        }

        let remainder = remainder.trim();
        let (version, build) = if remainder.is_empty() {
            (VersionSpec::any(), None)
        } else if remainder.starts_with('=')
            && !remainder.starts_with("==")
            && !remainder.contains(char::is_whitespace)
        {
            // name=version or name=version=build
            match remainder[1..].split_once('=') {
                Some((version, build)) => {
                    (version.parse::<VersionSpec>()?, Some(validate_build(build)?))
                }
                None => (remainder.parse::<VersionSpec>()?, None),
            }
        } else {
            let tokens = version_tokens(remainder);
            match tokens.as_slice() {
                [version] => (version.parse::<VersionSpec>()?, None),
                [version, build] => {
                    (version.parse::<VersionSpec>()?, Some(validate_build(build)?))
                }
                _ => return Err(ParseSpecError::TooManyParts(remainder.to_string())),
            }
        };

        let version = match bracket_version {
            Some(_) if !version.is_any() => return Err(ParseSpecError::ConflictingVersion),
            Some(bracket) => bracket,
            None => version,
        };

        Ok(MatchSpec {
            channel,
            subdir,
            name: name.to_string(),
            version,
            build: bracket_build.or(build),
        })
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{}", channel)?;
            if let Some(subdir) = &self.subdir {
                write!(f, "/{}", subdir)?;
            }
            write!(f, "::")?;
        }
        write!(f, "{}", self.name)?;
        match (&self.build, self.version.is_any()) {
            (Some(build), _) => write!(f, " {} {}", self.version, build),
            (None, false) => write!(f, " {}", self.version),
            (None, true) => Ok(()),
        }
    }
}
