//! Installed package store
//!
//! Packages live at `<root>/<package>/<version>/package.kpkg`. The store is
//! read-only during a build.

use crate::version::VersionConstraint;
use crate::{PackageError, Result};
use kiln_format::{Assembly, ContainerReader, Header, PackageArchive};
use semver::Version;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of an installed container within its version directory
pub const INSTALLED_FILE: &str = "package.kpkg";

/// Lookup of already-installed packages
pub trait PackageStore {
    /// Highest installed version of `name` satisfying `constraint`
    fn find(&self, name: &str, constraint: &VersionConstraint) -> Result<Option<InstalledPackage>>;

    /// Installed versions of `name`, ascending
    fn installed(&self, name: &str) -> Result<Vec<Version>>;
}

/// Entry names of an installed package, per section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageContents {
    pub execution_units: Vec<String>,
    pub components: Vec<String>,
    pub resources: Vec<String>,
}

/// Handle to an installed package
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub path: PathBuf,
    pub header: Header,
    pub assembly: Assembly,
}

impl InstalledPackage {
    pub fn new(path: impl Into<PathBuf>, header: Header, assembly: Assembly) -> Self {
        Self {
            path: path.into(),
            header,
            assembly,
        }
    }

    /// Read the header and assembly of a container, leaving payloads on disk
    pub fn open(path: &Path) -> Result<Self> {
        let container_error = |source| PackageError::Container {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path)?;
        let mut reader = ContainerReader::new(BufReader::new(file)).map_err(container_error)?;
        let header = reader.read_header().map_err(container_error)?;
        let assembly = reader.read_assembly().map_err(container_error)?;

        Ok(Self::new(path, header, assembly))
    }

    pub fn name(&self) -> &str {
        &self.assembly.package
    }

    pub fn version(&self) -> &str {
        &self.assembly.version
    }

    /// Load the whole container, including units, components and resources
    pub fn archive(&self) -> Result<PackageArchive> {
        PackageArchive::open(&self.path).map_err(|source| PackageError::Container {
            path: self.path.clone(),
            source,
        })
    }

    /// Names of the units, components and resources the package ships
    pub fn contents(&self) -> Result<PackageContents> {
        let archive = self.archive()?;
        let owned = |names: Vec<&str>| names.into_iter().map(str::to_string).collect();
        Ok(PackageContents {
            execution_units: owned(archive.execution_unit_names()),
            components: owned(archive.components().names()),
            resources: owned(archive.resources().names()),
        })
    }
}

/// Store backed by a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store at `$KILN_HOME/packages`, or `~/.kiln/packages`
    pub fn from_env() -> Result<Self> {
        if let Ok(home) = std::env::var("KILN_HOME") {
            return Ok(Self::new(PathBuf::from(home).join("packages")));
        }

        let home = dirs::home_dir().ok_or_else(|| {
            PackageError::StoreUnavailable("cannot determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(".kiln").join("packages")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an installed package version
    pub fn package_path(&self, name: &str, version: &Version) -> PathBuf {
        self.root
            .join(name)
            .join(version.to_string())
            .join(INSTALLED_FILE)
    }
}

impl PackageStore for DirectoryStore {
    fn find(&self, name: &str, constraint: &VersionConstraint) -> Result<Option<InstalledPackage>> {
        let candidate = self
            .installed(name)?
            .into_iter()
            .rev()
            .find(|v| constraint.matches(v));

        match candidate {
            Some(version) => {
                let path = self.package_path(name, &version);
                debug!(package = name, %version, path = %path.display(), "found installed package");
                InstalledPackage::open(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    fn installed(&self, name: &str) -> Result<Vec<Version>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(raw) = file_name.to_str() else {
                continue;
            };

            match Version::parse(raw) {
                Ok(version) if entry.path().join(INSTALLED_FILE).is_file() => {
                    versions.push(version)
                }
                Ok(_) => {}
                Err(_) => warn!(package = name, entry = raw, "skipping non-version directory"),
            }
        }

        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_format::{Compression, ContainerWriter};
    use serial_test::serial;

    fn install(store: &DirectoryStore, name: &str, version: &str) {
        let path = store.package_path(name, &Version::parse(version).unwrap());
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let file = File::create(&path).unwrap();
        let mut writer = ContainerWriter::new(file, Compression::none()).unwrap();
        writer.write_header(Header::new("abc")).unwrap();
        writer
            .write_assembly(&Assembly::new(name, name, version))
            .unwrap();
        writer.end_section().unwrap();
        writer.end_section().unwrap();
        writer.end_section().unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_highest_matching_version_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        install(&store, "org.vendor.lib", "1.0.0");
        install(&store, "org.vendor.lib", "1.4.2");
        install(&store, "org.vendor.lib", "2.0.0");

        let caret = VersionConstraint::parse("^1.0.0").unwrap();
        let found = store.find("org.vendor.lib", &caret).unwrap().unwrap();
        assert_eq!(found.version(), "1.4.2");

        let any = VersionConstraint::Any;
        let found = store.find("org.vendor.lib", &any).unwrap().unwrap();
        assert_eq!(found.version(), "2.0.0");
    }

    #[test]
    fn test_missing_package() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(store
            .find("org.vendor.none", &VersionConstraint::Any)
            .unwrap()
            .is_none());
        assert!(store.installed("org.vendor.none").unwrap().is_empty());
    }

    #[test]
    fn test_ignores_stray_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        install(&store, "org.vendor.lib", "0.3.0");
        fs::create_dir_all(dir.path().join("org.vendor.lib").join("latest")).unwrap();
        fs::create_dir_all(dir.path().join("org.vendor.lib").join("0.4.0")).unwrap();

        let versions = store.installed("org.vendor.lib").unwrap();
        assert_eq!(versions, vec![Version::new(0, 3, 0)]);
    }

    #[test]
    fn test_archive_loads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        install(&store, "org.vendor.lib", "1.0.0");

        let found = store
            .find("org.vendor.lib", &VersionConstraint::Any)
            .unwrap()
            .unwrap();
        let archive = found.archive().unwrap();
        assert!(archive.execution_units.is_empty());
        assert!(archive.components().is_empty());
        assert_eq!(found.contents().unwrap(), PackageContents::default());
    }

    #[test]
    #[serial]
    fn test_from_env_uses_kiln_home() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("KILN_HOME", dir.path());
        let store = DirectoryStore::from_env();
        std::env::remove_var("KILN_HOME");

        assert_eq!(store.unwrap().root(), dir.path().join("packages"));
    }
}
