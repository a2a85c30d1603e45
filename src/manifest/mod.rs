use crate::error::{Error, Result};
use crate::models::{Declaration, Entry, Manifest};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod scan;

/// The manifest as it appears on disk
#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    prefix: Option<PathBuf>,
    channels: Option<Vec<String>>,
    dependencies: Option<Vec<RawEntry>>,
    variables: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_yml::Value>,
}

/// Output shape of [`Manifest::to_yaml_string`]
#[derive(Debug, Serialize)]
struct NormalizedManifest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a Path>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<RawEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<String, String>,
    #[serde(flatten)]
    unknown: &'a BTreeMap<String, serde_yml::Value>,
}

/// A single dependency item: a spec string or a single-key subsection
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum RawEntry {
    Spec(String),
    SubSection(BTreeMap<String, Vec<String>>),
}

impl Manifest {
    /// Reads and parses the manifest at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::FileOperation {
            path: path.to_path_buf(),
            message: format!("Failed to read manifest: {}", e),
        })?;
        info!("Parsing environment manifest {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Parses manifest text.
    ///
    /// Structural problems (wrong YAML types, multi-key subsections) are
    /// errors. Malformed specifier strings are not: they are kept as
    /// declarations carrying their parse error so every one can be reported.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let blank = content
            .lines()
            .all(|line| line.trim().is_empty() || line.trim_start().starts_with('#'));
        if blank {
            return Ok(Manifest::default());
        }

        let raw: Option<RawManifest> = serde_yml::from_str(content).map_err(|e| {
            Error::ManifestParsing(format!("Failed to parse environment manifest: {}", e))
        })?;
        let raw = raw.unwrap_or_default();

        let mut dependencies = Vec::new();
        for item in raw.dependencies.unwrap_or_default() {
            match item {
                RawEntry::Spec(spec) => dependencies.push(Entry::Conda(Declaration::new(spec))),
                RawEntry::SubSection(map) => {
                    if map.len() != 1 {
                        return Err(Error::ManifestParsing(format!(
                            "Dependency subsection must have exactly one key, found {}",
                            map.len()
                        )));
                    }
                    for (key, specs) in map {
                        dependencies.push(Entry::SubSection {
                            key,
                            specs,
                            line: None,
                        });
                    }
                }
            }
        }

        attach_source_positions(&mut dependencies, &scan::scan_dependencies(content));
        debug!("Parsed {} dependency entries", dependencies.len());

        Ok(Manifest {
            name: raw.name,
            prefix: raw.prefix,
            channels: raw.channels.unwrap_or_default(),
            dependencies,
            variables: raw.variables.unwrap_or_default(),
            unknown_keys: raw.unknown,
        })
    }

    /// Re-serializes the manifest with every valid conda spec in canonical form.
    ///
    /// Specs that failed to parse are written back unchanged.
    pub fn to_yaml_string(&self) -> Result<String> {
        let dependencies = self
            .dependencies
            .iter()
            .map(|entry| match entry {
                Entry::Conda(decl) => RawEntry::Spec(match &decl.spec {
                    Ok(spec) => spec.to_string(),
                    Err(_) => decl.raw.clone(),
                }),
                Entry::SubSection { key, specs, .. } => {
                    RawEntry::SubSection(BTreeMap::from([(key.clone(), specs.clone())]))
                }
            })
            .collect::<Vec<_>>();

        let normalized = NormalizedManifest {
            name: self.name.as_deref(),
            prefix: self.prefix.as_deref(),
            channels: self.channels.clone(),
            dependencies,
            variables: self.variables.clone(),
            unknown: &self.unknown_keys,
        };

        Ok(serde_yml::to_string(&normalized)?)
    }
}

/// Copies line numbers and comment groups from the text scan onto the decoded
/// entries, but only when both views agree item by item.
fn attach_source_positions(entries: &mut [Entry], scanned: &[scan::ScannedItem]) {
    if entries.len() != scanned.len() {
        debug!(
            "Skipping source positions: {} decoded entries, {} scanned items",
            entries.len(),
            scanned.len()
        );
        return;
    }

    let aligned = entries
        .iter()
        .zip(scanned)
        .all(|(entry, item)| match entry {
            Entry::Conda(decl) => !item.is_mapping && decl.raw.trim() == item.text,
            Entry::SubSection { .. } => item.is_mapping,
        });
    if !aligned {
        debug!("Skipping source positions: scanned items do not match decoded entries");
        return;
    }

    for (entry, item) in entries.iter_mut().zip(scanned) {
        match entry {
            Entry::Conda(decl) => {
                decl.line = Some(item.line);
                decl.group = item.group.clone();
            }
            Entry::SubSection { line, .. } => *line = Some(item.line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        assert_eq!(Manifest::from_yaml_str("").unwrap(), Manifest::default());
        assert_eq!(Manifest::from_yaml_str("# nothing\n").unwrap(), Manifest::default());
    }

    #[test]
    fn test_structural_errors() {
        let err = Manifest::from_yaml_str("- just\n- a list\n").unwrap_err();
        assert!(err.contains("Failed to parse environment manifest"));

        let err = Manifest::from_yaml_str("channels: conda-forge\n").unwrap_err();
        assert!(matches!(err, Error::ManifestParsing(_)));

        let err =
            Manifest::from_yaml_str("dependencies:\n  - pip: [a]\n    npm: [b]\n").unwrap_err();
        assert!(err.contains("exactly one key"));
    }

    #[test]
    fn test_invalid_specs_are_kept() {
        let manifest =
            Manifest::from_yaml_str("dependencies:\n  - numpy>=\n  - scipy\n").unwrap();
        let decls: Vec<_> = manifest.declarations().collect();
        assert_eq!(decls.len(), 2);
        assert!(decls[0].spec.is_err());
        assert_eq!(decls[0].line, Some(2));
        assert!(decls[1].spec.is_ok());
    }

    #[test]
    fn test_flow_style_has_no_positions() {
        let manifest = Manifest::from_yaml_str("dependencies: [numpy, scipy]\n").unwrap();
        assert_eq!(manifest.declarations().count(), 2);
        assert!(manifest.declarations().all(|d| d.line.is_none()));
    }

    #[test]
    fn test_unknown_keys_and_variables() {
        let manifest = Manifest::from_yaml_str(
            "name: x\nvariables:\n  OMP_NUM_THREADS: '1'\nplatforms: [linux-64]\n",
        )
        .unwrap();
        assert_eq!(manifest.variables.get("OMP_NUM_THREADS").map(String::as_str), Some("1"));
        assert_eq!(
            manifest.unknown_keys.keys().collect::<Vec<_>>(),
            vec!["platforms"]
        );
    }

    #[test]
    fn test_to_yaml_string_keeps_unknown_keys() {
        let manifest = Manifest::from_yaml_str(
            "name: t\nchannels: [conda-forge]\nplatforms: [linux-64, osx-arm64]\ndependencies:\n  - numpy\n",
        )
        .unwrap();
        let yaml = manifest.to_yaml_string().unwrap();
        assert!(yaml.contains("platforms"));

        let reparsed = Manifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(reparsed.unknown_keys, manifest.unknown_keys);
        let platforms = reparsed.unknown_keys.get("platforms").unwrap();
        assert_eq!(platforms.as_sequence().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_to_yaml_string_normalizes_specs() {
        let manifest = Manifest::from_yaml_str(
            "name: demo\nchannels: [conda-forge]\ndependencies:\n  - pandas=1.3\n  - scipy >= 1.7\n  - bad>=\n  - pip:\n    - requests\n",
        )
        .unwrap();
        let yaml = manifest.to_yaml_string().unwrap();
        assert!(yaml.contains("pandas 1.3.*"));
        assert!(yaml.contains("scipy >=1.7"));
        assert!(yaml.contains("bad>="));

        let reparsed = Manifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(reparsed.name.as_deref(), Some("demo"));
        assert_eq!(reparsed.pip_specs(), Some(&["requests".to_string()][..]));
        assert_eq!(reparsed.match_specs().count(), 2);
    }
}
