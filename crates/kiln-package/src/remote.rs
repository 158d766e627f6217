//! Hosting-backend contract
//!
//! Install-time callers use a [`HostingBackend`] to discover and download
//! packages that are not yet in the store. Builds never reach the network.

use crate::version::VersionConstraint;
use kiln_format::PackageSource;
use semver::Version;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Origin '{0}' is not of the form organization/name")]
    InvalidOrigin(String),

    #[error("No release of {origin} matches {constraint}")]
    NoCandidate { origin: String, constraint: String },

    #[error("Invalid version constraint '{0}'")]
    InvalidConstraint(String),

    #[error("Hosting backend error: {0}")]
    Backend(String),
}

/// A downloadable release discovered on a hosting backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePackage {
    pub group: String,
    pub project: String,
    pub version: Version,
    /// Backend-specific download location
    pub url: String,
}

/// Download progress: bytes received and total, if known
pub type FetchProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Discovery and download of hosted packages
pub trait HostingBackend {
    /// Releases of `group/project`, optionally narrowed to one version
    fn discover(
        &self,
        group: &str,
        project: &str,
        version: Option<&str>,
    ) -> Result<Vec<RemotePackage>, RemoteError>;

    /// Download a release and return its local path
    fn fetch(
        &self,
        candidate: &RemotePackage,
        progress: Option<FetchProgress<'_>>,
    ) -> Result<PathBuf, RemoteError>;
}

/// Find the newest release matching a package source.
///
/// The origin (`organization/name`) selects the project; the source's
/// version constraint selects among its releases.
pub fn locate(
    backend: &dyn HostingBackend,
    source: &PackageSource,
) -> Result<RemotePackage, RemoteError> {
    let origin = source.origin.as_deref().unwrap_or(&source.package);
    let (group, project) = origin
        .split_once('/')
        .filter(|(g, p)| !g.is_empty() && !p.is_empty() && !p.contains('/'))
        .ok_or_else(|| RemoteError::InvalidOrigin(origin.to_string()))?;

    let constraint = VersionConstraint::parse_optional(source.version.as_deref())
        .map_err(|_| RemoteError::InvalidConstraint(source.version.clone().unwrap_or_default()))?;

    let exact = match &constraint {
        VersionConstraint::Exact(v) => Some(v.to_string()),
        _ => None,
    };

    backend
        .discover(group, project, exact.as_deref())?
        .into_iter()
        .filter(|candidate| constraint.matches(&candidate.version))
        .max_by(|a, b| a.version.cmp(&b.version))
        .ok_or_else(|| RemoteError::NoCandidate {
            origin: origin.to_string(),
            constraint: source.version.clone().unwrap_or_else(|| "*".to_string()),
        })
}
