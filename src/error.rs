//! Error types for Wheelhouse
//!
//! All modules use `WheelhouseResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Wheelhouse operations
pub type WheelhouseResult<T> = Result<T, WheelhouseError>;

/// All errors that can occur in Wheelhouse
#[derive(Error, Debug)]
pub enum WheelhouseError {
    // Package errors
    #[error("Package {package} works only with Python versions: {supported:?}")]
    UnsupportedPython {
        package: String,
        supported: Vec<String>,
    },

    #[error("Failed to build wheel for {package}. See the captured build output for the reason.")]
    WheelBuild { package: String, output: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WheelhouseError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a wheel build failure carrying the captured process output
    pub fn build_failed(package: impl Into<String>, output: impl Into<String>) -> Self {
        Self::WheelBuild {
            package: package.into(),
            output: output.into(),
        }
    }

    /// Captured build output, when this error carries any
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::WheelBuild { output, .. } => Some(output),
            _ => None,
        }
    }
}
