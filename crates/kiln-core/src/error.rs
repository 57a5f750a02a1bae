//! Error types for Kiln

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using KilnError
pub type Result<T> = std::result::Result<T, KilnError>;

/// Main error type for Kiln operations
#[derive(Debug, Error)]
pub enum KilnError {
    /// Build file errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Build file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No build file in the directory or any parent
    #[error("No build file found in {0} or any parent directory")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid build file: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading build file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
