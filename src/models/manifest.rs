use crate::models::spec::{MatchSpec, ParseSpecError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A conda dependency line from the `dependencies` list
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// The specifier exactly as written in the manifest
    pub raw: String,

    /// The parsed specifier, or why it could not be parsed
    pub spec: Result<MatchSpec, ParseSpecError>,

    /// 1-based line in the manifest, when it could be located
    pub line: Option<usize>,

    /// Heading comment the declaration sits under (e.g. "Storage dependencies")
    pub group: Option<String>,
}

impl Declaration {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let spec = raw.parse::<MatchSpec>();
        Self {
            raw,
            spec,
            line: None,
            group: None,
        }
    }

    pub fn match_spec(&self) -> Option<&MatchSpec> {
        self.spec.as_ref().ok()
    }
}

/// One item of the `dependencies` list
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A conda package declaration
    Conda(Declaration),

    /// Specs for another installer, e.g. `- pip: [requests]`
    SubSection {
        key: String,
        specs: Vec<String>,
        line: Option<usize>,
    },
}

impl Entry {
    pub fn line(&self) -> Option<usize> {
        match self {
            Entry::Conda(decl) => decl.line,
            Entry::SubSection { line, .. } => *line,
        }
    }
}

/// A parsed `environment.yml`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub prefix: Option<PathBuf>,
    pub channels: Vec<String>,
    pub dependencies: Vec<Entry>,
    pub variables: BTreeMap<String, String>,

    /// Top-level keys conda does not know about, with their values so
    /// normalized output can write them back
    pub unknown_keys: BTreeMap<String, serde_yml::Value>,
}

impl Manifest {
    /// All conda declarations, valid or not
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.dependencies.iter().filter_map(|entry| match entry {
            Entry::Conda(decl) => Some(decl),
            Entry::SubSection { .. } => None,
        })
    }

    /// All conda declarations that parsed successfully
    pub fn match_specs(&self) -> impl Iterator<Item = &MatchSpec> {
        self.declarations().filter_map(Declaration::match_spec)
    }

    pub fn sub_sections(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.dependencies.iter().filter_map(|entry| match entry {
            Entry::SubSection { key, specs, .. } => Some((key.as_str(), specs.as_slice())),
            Entry::Conda(_) => None,
        })
    }

    pub fn find_sub_section(&self, key: &str) -> Option<&[String]> {
        self.sub_sections()
            .find_map(|(name, specs)| (name == key).then_some(specs))
    }

    pub fn pip_specs(&self) -> Option<&[String]> {
        self.find_sub_section("pip")
    }

    /// Declarations bucketed by their heading comment, in first-seen order
    pub fn groups(&self) -> Vec<(Option<String>, Vec<&Declaration>)> {
        let mut groups: Vec<(Option<String>, Vec<&Declaration>)> = Vec::new();
        for decl in self.declarations() {
            match groups.iter_mut().find(|(group, _)| *group == decl.group) {
                Some((_, members)) => members.push(decl),
                None => groups.push((decl.group.clone(), vec![decl])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(raw: &str, group: Option<&str>) -> Entry {
        let mut decl = Declaration::new(raw);
        decl.group = group.map(str::to_string);
        Entry::Conda(decl)
    }

    #[test]
    fn test_accessors() {
        let manifest = Manifest {
            dependencies: vec![
                decl("numpy", Some("Core dependencies")),
                decl("bcrypt", Some("Security dependencies")),
                decl("pandas>=", Some("Core dependencies")),
                Entry::SubSection {
                    key: "pip".to_string(),
                    specs: vec!["requests".to_string()],
                    line: None,
                },
            ],
            ..Default::default()
        };

        assert_eq!(manifest.declarations().count(), 3);
        assert_eq!(manifest.match_specs().count(), 2);
        assert_eq!(manifest.pip_specs(), Some(&["requests".to_string()][..]));
        assert_eq!(manifest.find_sub_section("npm"), None);

        let groups = manifest.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_deref(), Some("Core dependencies"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1[0].raw, "bcrypt");
    }
}
