//! Project manifest parsing and types (kiln.toml)

use crate::options::BuildOptions;
use crate::validator::Validator;
use crate::{PackageError, Result};
use kiln_format::{Assembly, ExecutionUnit, PackageSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest file name
pub const MANIFEST_FILE: &str = "kiln.toml";

/// Project manifest (kiln.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfiguration {
    pub package: AssemblyMetadata,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub units: BTreeMap<String, ExecutionUnit>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Dependency>,
    #[serde(default)]
    pub builds: BTreeMap<String, BuildConfiguration>,
}

impl ProjectConfiguration {
    /// Parse manifest from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;

        // Table keys are the canonical names
        for (name, unit) in config.units.iter_mut() {
            unit.name = name.clone();
        }
        for (name, build) in config.builds.iter_mut() {
            build.name = name.clone();
        }

        Ok(config)
    }

    /// Load and validate a manifest from a file, or from `kiln.toml` in a directory
    pub fn load(path: &Path) -> Result<(PathBuf, Self)> {
        let manifest_path = Self::locate(path)?;
        let content = std::fs::read_to_string(&manifest_path)?;
        let mut config = Self::from_str(&content)?;

        for build in config.builds.values_mut() {
            build
                .options
                .apply_env_overrides()
                .map_err(|e| PackageError::Invalid(vec![e]))?;
        }

        Validator::validate(&config).map_err(PackageError::Invalid)?;
        Ok((manifest_path, config))
    }

    /// Resolve a manifest path from a file or directory path
    pub fn locate(path: &Path) -> Result<PathBuf> {
        let candidate = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path.to_path_buf()
        };

        if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(PackageError::ManifestNotFound(candidate))
        }
    }

    /// Serialize to TOML string
    pub fn to_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Get a build configuration by name
    pub fn build(&self, name: &str) -> Option<&BuildConfiguration> {
        self.builds.get(name)
    }

    /// Get an execution unit by name
    pub fn unit(&self, name: &str) -> Option<&ExecutionUnit> {
        self.units.get(name)
    }

    /// Assembly metadata in container form
    pub fn assembly(&self) -> Assembly {
        let meta = &self.package;
        let mut assembly = Assembly::new(&meta.name, &meta.package, meta.version.to_string());
        assembly.description = meta.description.clone();
        assembly.authors = meta.authors.clone();
        assembly.license = meta.license.clone();
        assembly.homepage = meta.homepage.clone();
        assembly
    }
}

/// Assembly metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssemblyMetadata {
    /// Display name
    pub name: String,
    /// Dotted package id, e.g. `org.vendor.tool`
    pub package: String,
    pub version: semver::Version,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

/// Source tree configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Source root, relative to the project root
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    /// Source file extension, without the dot
    #[serde(default)]
    pub extension: String,
}

fn default_source_path() -> PathBuf {
    PathBuf::from("src")
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            extension: String::new(),
        }
    }
}

impl SourceConfig {
    /// Glob matching source files
    pub fn pattern(&self) -> String {
        format!("*.{}", self.extension)
    }
}

/// Runtime used to execute script units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

fn default_interpreter() -> String {
    "sh".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
        }
    }
}

/// Execution units bound to lifecycle events
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Lifecycle {
    /// Unit dispatched in command-line environments
    #[serde(default)]
    pub entry_point: Option<String>,
    /// Unit dispatched in hosted environments
    #[serde(default)]
    pub web_entry_point: Option<String>,
    #[serde(default)]
    pub pre_install: Vec<String>,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub pre_compile: Vec<String>,
    #[serde(default)]
    pub post_compile: Vec<String>,
}

impl Lifecycle {
    /// Units that must ship in the package, in declaration order
    pub fn required_units(&self) -> Vec<String> {
        let mut units = Vec::new();
        let entries = self.entry_point.iter().chain(self.web_entry_point.iter());
        for name in entries.chain(&self.pre_install).chain(&self.post_install) {
            if !units.contains(name) {
                units.push(name.clone());
            }
        }
        units
    }

    /// Build-time-only units, in declaration order
    pub fn temporary_units(&self) -> Vec<String> {
        let mut units = Vec::new();
        for name in self.pre_compile.iter().chain(&self.post_compile) {
            if !units.contains(name) {
                units.push(name.clone());
            }
        }
        units
    }
}

/// Dependency specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Dependency {
    /// Simple version constraint
    Simple(String),
    /// Detailed dependency
    Detailed(DetailedDependency),
}

impl Dependency {
    /// Get version constraint if applicable
    pub fn version_constraint(&self) -> Option<&str> {
        match self {
            Dependency::Simple(v) => Some(v),
            Dependency::Detailed(d) => d.version.as_deref(),
        }
    }

    /// Convert to a package source for the named package
    pub fn to_source(&self, name: &str) -> PackageSource {
        let mut source = PackageSource::new(name);
        source.version = self.version_constraint().map(str::to_string);
        if let Dependency::Detailed(d) = self {
            source.origin = d.source.clone();
        }
        source
    }
}

/// Detailed dependency specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedDependency {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Local path or remote `organization/name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Include/exclude glob patterns
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternSet {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A named build variant of the project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfiguration {
    /// Build name (filled from the manifest table key)
    #[serde(skip)]
    pub name: String,
    /// Output path template, relative to the project root
    pub output: String,
    #[serde(default)]
    pub components: PatternSet,
    #[serde(default)]
    pub resources: PatternSet,
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Dependency>,
}

impl BuildConfiguration {
    /// Expand `{name}`, `{package}`, `{version}` and `{build}` in the output template
    pub fn output_path(&self, meta: &AssemblyMetadata) -> PathBuf {
        let expanded = self
            .output
            .replace("{name}", &meta.name)
            .replace("{package}", &meta.package)
            .replace("{version}", &meta.version.to_string())
            .replace("{build}", &self.name);
        PathBuf::from(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_format::UnitKind;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    const MANIFEST: &str = r#"
        [package]
        name = "Vendor Tool"
        package = "org.vendor.tool"
        version = "1.2.0"

        [source]
        extension = "lua"

        [units.main]
        kind = "script"
        target = "bin/main.lua"
        required-files = ["data/defaults.json"]

        [units.gen]
        kind = "command"
        target = "echo generated"

        [lifecycle]
        entry-point = "main"
        pre-compile = ["gen"]

        [dependencies]
        "org.other.lib" = "^1.0"
        "com.acme.util" = { version = "1.2.0", source = "acme/util" }

        [builds.release]
        output = "build/{package}-{version}-{build}.kpkg"

        [builds.release.options]
        compression-level = 9
    "#;

    #[test]
    fn test_parse_manifest() {
        let config = ProjectConfiguration::from_str(MANIFEST).unwrap();
        assert_eq!(config.package.package, "org.vendor.tool");
        assert_eq!(config.source.path, PathBuf::from("src"));
        assert_eq!(config.source.pattern(), "*.lua");
        assert_eq!(config.runtime.interpreter, "sh");

        let main = config.unit("main").unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(main.kind, UnitKind::Script);
        assert_eq!(main.required_files, vec!["data/defaults.json".to_string()]);

        let release = config.build("release").unwrap();
        assert_eq!(release.name, "release");
        assert_eq!(release.options.compression_level, 9);
        assert!(config.build("debug").is_none());
    }

    #[test]
    fn test_output_template() {
        let config = ProjectConfiguration::from_str(MANIFEST).unwrap();
        let release = config.build("release").unwrap();
        assert_eq!(
            release.output_path(&config.package),
            PathBuf::from("build/org.vendor.tool-1.2.0-release.kpkg")
        );
    }

    #[test]
    fn test_dependency_sources() {
        let config = ProjectConfiguration::from_str(MANIFEST).unwrap();

        let simple = config.dependencies["org.other.lib"].to_source("org.other.lib");
        assert_eq!(simple.version.as_deref(), Some("^1.0"));
        assert_eq!(simple.origin, None);

        let detailed = config.dependencies["com.acme.util"].to_source("com.acme.util");
        assert_eq!(detailed.version.as_deref(), Some("1.2.0"));
        assert_eq!(detailed.origin.as_deref(), Some("acme/util"));
    }

    #[test]
    fn test_lifecycle_unit_lists() {
        let lifecycle = Lifecycle {
            entry_point: Some("main".to_string()),
            web_entry_point: Some("site".to_string()),
            pre_install: vec!["migrate".to_string(), "main".to_string()],
            post_install: vec![],
            pre_compile: vec!["gen".to_string()],
            post_compile: vec!["clean".to_string(), "gen".to_string()],
        };
        assert_eq!(lifecycle.required_units(), vec!["main", "site", "migrate"]);
        assert_eq!(lifecycle.temporary_units(), vec!["gen", "clean"]);
    }

    #[test]
    fn test_assembly_conversion() {
        let config = ProjectConfiguration::from_str(MANIFEST).unwrap();
        let assembly = config.assembly();
        assert_eq!(assembly.name, "Vendor Tool");
        assert_eq!(assembly.version, "1.2.0");
    }

    #[test]
    fn test_locate_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfiguration::locate(dir.path()).unwrap_err();
        assert!(matches!(err, PackageError::ManifestNotFound(_)));
    }

    #[test]
    #[serial]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), MANIFEST).unwrap();
        let (path, config) = ProjectConfiguration::load(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(MANIFEST_FILE));
        assert_eq!(config.units.len(), 2);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            MANIFEST.replace("compression-level = 9", "compression-level = 0"),
        )
        .unwrap();
        let err = ProjectConfiguration::load(dir.path()).unwrap_err();
        assert!(matches!(err, PackageError::Invalid(_)));
    }
}
