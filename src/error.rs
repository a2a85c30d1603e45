use std::fmt;
use std::io;
use std::path::PathBuf;

/// Custom error type for envlint operations
#[derive(Debug)]
pub enum Error {
    /// I/O errors (file access, permissions, etc.)
    Io(io::Error),

    /// YAML decoding errors
    Yaml(serde_yml::Error),

    /// JSON serialization errors
    Json(serde_json::Error),

    /// Errors reading or decoding envlint.toml
    Config(String),

    /// No manifest could be located
    ProjectDetection(String),

    /// The manifest is not structurally valid
    ManifestParsing(String),

    /// Errors related to file operations
    FileOperation { path: PathBuf, message: String },

    /// General errors
    General(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Yaml(err) => write!(f, "YAML parsing error: {}", err),
            Error::Json(err) => write!(f, "JSON serialization error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::ProjectDetection(msg) => write!(f, "Manifest detection error: {}", msg),
            Error::ManifestParsing(msg) => write!(f, "Manifest parsing error: {}", msg),
            Error::FileOperation { path, message } => {
                write!(f, "File operation error on {}: {}", path.display(), message)
            }
            Error::General(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Check if the error message contains a specific string
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Error::FileOperation { path: _, message } => message.contains(needle),
            _ => self.to_string().contains(needle),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Yaml(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yml::Error> for Error {
    fn from(err: serde_yml::Error) -> Self {
        Error::Yaml(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::General(err)
    }
}

/// Result type alias for envlint operations
pub type Result<T> = std::result::Result<T, Error>;
