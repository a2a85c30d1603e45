use crate::error::{Error, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// File names conda picks up, in lookup order
pub const MANIFEST_FILE_NAMES: &[&str] =
    &["environment.yml", "environment.yaml", "env.yml", "env.yaml"];

/// Finds the environment manifest in `project_dir`
pub fn find_manifest(project_dir: &Path) -> Option<PathBuf> {
    MANIFEST_FILE_NAMES
        .iter()
        .map(|name| project_dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Turns a user-supplied path into the manifest file to read
pub fn resolve_manifest_path(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        debug!("Using manifest file {}", path.display());
        return Ok(path.to_path_buf());
    }

    if path.is_dir() {
        let manifest = find_manifest(path).ok_or_else(|| {
            Error::ProjectDetection(format!(
                "No environment manifest ({}) found in {}",
                MANIFEST_FILE_NAMES.join(", "),
                path.display()
            ))
        })?;
        info!("Detected environment manifest {}", manifest.display());
        return Ok(manifest);
    }

    Err(Error::FileOperation {
        path: path.to_path_buf(),
        message: "Path does not exist".to_string(),
    })
}
