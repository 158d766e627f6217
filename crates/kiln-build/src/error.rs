/// Build system error types
use kiln_format::ContainerError;
use kiln_package::{PackageError, ResolverError};
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// Boxed cause carried by compile failures
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(String),

    #[error("Invalid configuration at {}: {source}", path.display())]
    ConfigurationInvalid {
        path: PathBuf,
        #[source]
        source: PackageError,
    },

    #[error("Invalid {set} pattern '{pattern}': {source}")]
    InvalidPattern {
        set: &'static str,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Execution unit not found: {name}")]
    ExecutionUnitNotFound { name: String },

    #[error("File required by unit '{unit}' is missing: {}", path.display())]
    RequiredFileMissing { unit: String, path: PathBuf },

    #[error("Dependency '{0}' already exists")]
    DuplicateDependency(String),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("Package store error: {0}")]
    Store(#[source] PackageError),

    #[error("Cannot name component entry for {}", .0.display())]
    InvalidComponentPath(PathBuf),

    #[error("Cannot name resource entry for {}", .0.display())]
    InvalidResourcePath(PathBuf),

    #[error("Failed to compile {}: {source}", path.display())]
    CompileFailed {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("Tool '{tool}' not found in PATH")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },

    #[error("Execution unit '{name}' failed: {reason}")]
    ExecutionUnitFailed { name: String, reason: String },

    #[error("Invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("I/O error at {}: {error}", path.display())]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a compile failure for an output path
    pub fn compile_failed(path: impl Into<PathBuf>, source: impl Into<Cause>) -> Self {
        Self::CompileFailed {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Create an execution unit failure
    pub fn unit_failed(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ExecutionUnitFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an execution unit not found error
    pub fn unit_not_found(name: impl Into<String>) -> Self {
        Self::ExecutionUnitNotFound { name: name.into() }
    }
}
