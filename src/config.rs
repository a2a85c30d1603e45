use crate::error::{Error, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "envlint.toml";

/// Lint settings read from `envlint.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Channels every manifest must list
    pub required_channels: Vec<String>,

    /// Packages that must not be declared
    pub denied_packages: Vec<String>,

    /// Warn on conda dependencies without a version constraint
    pub warn_unpinned: bool,

    /// Subsection keys accepted besides `pip`
    pub extra_subsections: Vec<String>,

    /// Treat warnings as failures
    pub strict: bool,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::FileOperation {
            path: path.to_path_buf(),
            message: format!("Failed to read config: {}", e),
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Finds the config to use for a manifest.
    ///
    /// An explicit path wins, then `envlint.toml` beside the manifest, then
    /// the user config directory. No file at all yields the defaults.
    pub fn discover(explicit: Option<&Path>, manifest_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Using config {}", path.display());
            return Self::from_path(path);
        }

        let candidates = [
            Some(manifest_dir.join(CONFIG_FILE_NAME)),
            user_config_path(),
        ];
        for candidate in candidates.into_iter().flatten() {
            if candidate.is_file() {
                info!("Using config {}", candidate.display());
                return Self::from_path(&candidate);
            }
        }

        debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("envlint").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
required_channels = ["conda-forge"]
denied_packages = ["anaconda"]
warn_unpinned = true
"#,
        )
        .unwrap();
        assert_eq!(config.required_channels, vec!["conda-forge"]);
        assert_eq!(config.denied_packages, vec!["anaconda"]);
        assert!(config.warn_unpinned);
        assert!(!config.strict);
        assert!(config.extra_subsections.is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "warn_unpined = true\n").unwrap();

        let err = Config::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_discover_prefers_explicit_then_local() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join(CONFIG_FILE_NAME), "strict = true\n").unwrap();
        let explicit = dir.join("other.toml");
        fs::write(&explicit, "warn_unpinned = true\n").unwrap();

        let config = Config::discover(Some(&explicit), dir).unwrap();
        assert!(config.warn_unpinned);
        assert!(!config.strict);

        let config = Config::discover(None, dir).unwrap();
        assert!(config.strict);
    }
}
