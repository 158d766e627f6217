//! Kiln package management
//!
//! Project manifests (`kiln.toml`), manifest validation, the installed
//! package store, transitive dependency resolution, and the hosting-backend
//! contract used by install-time callers.

pub mod manifest;
pub mod options;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod validator;
pub mod version;

pub use kiln_format::{DependencyReference, ExecutionUnit, PackageSource, UnitKind};
pub use manifest::{
    AssemblyMetadata, BuildConfiguration, Dependency, DetailedDependency, Lifecycle, PatternSet,
    ProjectConfiguration, RuntimeConfig, SourceConfig, MANIFEST_FILE,
};
pub use options::BuildOptions;
pub use remote::{locate, FetchProgress, HostingBackend, RemoteError, RemotePackage};
pub use resolver::{
    synthesize_source, DependencyResolver, ResolvedDependency, ResolverError, ResolverResult,
};
pub use store::{
    DirectoryStore, InstalledPackage, PackageContents, PackageStore, INSTALLED_FILE,
};
pub use validator::{ValidationError, Validator};
pub use version::VersionConstraint;

use std::path::PathBuf;

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid manifest: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Semver error: {0}")]
    SemverError(#[from] semver::Error),

    #[error("Unreadable package at {}: {source}", path.display())]
    Container {
        path: PathBuf,
        #[source]
        source: kiln_format::ContainerError,
    },

    #[error("Package store not available: {0}")]
    StoreUnavailable(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PackageError>;
