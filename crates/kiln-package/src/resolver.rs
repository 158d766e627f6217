//! Transitive dependency resolution over the installed package store
//!
//! Resolution never installs anything. It walks what is already present:
//! each package's header records the references it was built against, and
//! those are followed depth-first into one flat list. A package reached
//! twice through different paths appears twice; a package reached again
//! while it is still being resolved is a cycle.

use crate::store::{InstalledPackage, PackageStore};
use crate::version::VersionConstraint;
use crate::PackageError;
use kiln_format::{DependencyReference, PackageSource};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Dependency '{name}' ({constraint}) is not installed")]
    DependencyNotInstalled { name: String, constraint: String },

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Invalid version constraint '{constraint}' for '{name}': {source}")]
    InvalidConstraint {
        name: String,
        constraint: String,
        #[source]
        source: semver::Error,
    },

    #[error("Package store error: {0}")]
    Store(#[from] PackageError),
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// A dependency matched against the installed store
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub name: String,
    pub source: PackageSource,
    pub package: InstalledPackage,
}

impl ResolvedDependency {
    /// Installed version
    pub fn version(&self) -> &str {
        self.package.version()
    }

    /// References recorded in the installed package's header
    pub fn references(&self) -> &[DependencyReference] {
        &self.package.header.dependencies
    }
}

/// Source for a reference that carries none of its own.
///
/// `org.vendor.name` becomes origin `vendor/name`; any other shape keeps the
/// raw package name as origin.
pub fn synthesize_source(name: &str, version: &str) -> PackageSource {
    let parts: Vec<&str> = name.splitn(3, '.').collect();
    let origin = match parts.as_slice() {
        [_, organization, project] => format!("{}/{}", organization, project),
        _ => name.to_string(),
    };

    let mut source = PackageSource::new(name).with_origin(origin);
    if !version.is_empty() {
        source.version = Some(version.to_string());
    }
    source
}

/// Walks dependency closures through a [`PackageStore`]
pub struct DependencyResolver<'a> {
    store: &'a dyn PackageStore,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a dyn PackageStore) -> Self {
        Self { store }
    }

    /// Resolve `name` and everything it references.
    ///
    /// The entry for `name` comes first, transitive entries follow in
    /// encounter order.
    pub fn resolve(&self, name: &str, source: &PackageSource) -> ResolverResult<Vec<ResolvedDependency>> {
        let mut resolved = Vec::new();
        let mut path = Vec::new();
        self.resolve_into(name, source, &mut path, &mut resolved)?;
        debug!(dependency = name, count = resolved.len(), "resolved dependency closure");
        Ok(resolved)
    }

    fn resolve_into(
        &self,
        name: &str,
        source: &PackageSource,
        path: &mut Vec<(String, String)>,
        resolved: &mut Vec<ResolvedDependency>,
    ) -> ResolverResult<()> {
        let dependency = self.lookup(name, source)?;
        let key = (name.to_string(), dependency.version().to_string());

        if path.contains(&key) {
            let mut chain: Vec<String> = path.iter().map(|(n, v)| format!("{}@{}", n, v)).collect();
            chain.push(format!("{}@{}", key.0, key.1));
            return Err(ResolverError::DependencyCycle(chain.join(" -> ")));
        }

        trace!(dependency = name, version = %key.1, depth = path.len(), "resolving");

        let references = dependency.references().to_vec();
        resolved.push(dependency);
        path.push(key);

        for reference in &references {
            let source = match &reference.source {
                Some(source) => {
                    let mut source = source.clone();
                    if source.version.is_none() && !reference.version.is_empty() {
                        source.version = Some(reference.version.clone());
                    }
                    source
                }
                None => synthesize_source(&reference.name, &reference.version),
            };
            self.resolve_into(&reference.name, &source, path, resolved)?;
        }

        path.pop();
        Ok(())
    }

    fn lookup(&self, name: &str, source: &PackageSource) -> ResolverResult<ResolvedDependency> {
        let constraint = VersionConstraint::parse_optional(source.version.as_deref()).map_err(
            |e| ResolverError::InvalidConstraint {
                name: name.to_string(),
                constraint: source.version.clone().unwrap_or_default(),
                source: e,
            },
        )?;

        match self.store.find(name, &constraint)? {
            Some(package) => Ok(ResolvedDependency {
                name: name.to_string(),
                source: source.clone(),
                package,
            }),
            None => Err(ResolverError::DependencyNotInstalled {
                name: name.to_string(),
                constraint: source.version.clone().unwrap_or_else(|| "*".to_string()),
            }),
        }
    }
}
