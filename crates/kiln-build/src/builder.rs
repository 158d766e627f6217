//! Build orchestration
//!
//! A [`Builder`] owns one project and one of its build configurations. It
//! collects component and resource files, checks the execution units the
//! package needs, fingerprints the sources, resolves dependencies against
//! the installed store and runs the compile lifecycle hooks. Packaging
//! itself is left to a [`PackageCompiler`](crate::strategy::PackageCompiler).

use crate::collector::{relative_name, FileCollector};
use crate::error::{BuildError, BuildResult};
use crate::fingerprint;
use crate::reporter::{NoopReporter, Reporter};
use crate::script::{UnitContext, UnitExecutor};
use crate::serializer::{serialize_component, ComponentSerializer, OpaqueSerializer};
use kiln_format::{
    ComponentKind, ContainerWriter, DependencyReference, ExecutionUnit, Header, PackageArchive,
    UnitKind,
};
use kiln_package::{
    BuildConfiguration, BuildOptions, DependencyResolver, DirectoryStore, PackageError,
    PackageSource, PackageStore, PatternSet, ProjectConfiguration, ResolvedDependency,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::Entry;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrator for one build configuration of a project
pub struct Builder {
    manifest_path: PathBuf,
    project_root: PathBuf,
    config: ProjectConfiguration,
    build: BuildConfiguration,
    source_dir: PathBuf,
    output_path: PathBuf,
    components_patterns: PatternSet,
    resources_patterns: PatternSet,
    components: Vec<PathBuf>,
    resources: Vec<PathBuf>,
    required_units: Vec<String>,
    temporary_units: Vec<String>,
    dependencies: Vec<(String, PackageSource)>,
    build_number: String,
    store: Box<dyn PackageStore>,
    serializer: Box<dyn ComponentSerializer>,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("manifest_path", &self.manifest_path)
            .field("build", &self.build.name)
            .field("build_number", &self.build_number)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Load the project at `path` (a manifest file or its directory) for the
    /// build configuration `build_name`, and collect its files.
    pub fn open(path: impl AsRef<Path>, build_name: &str) -> BuildResult<Self> {
        let path = path.as_ref();
        let (manifest_path, config) = ProjectConfiguration::load(path).map_err(|e| match e {
            PackageError::ManifestNotFound(missing) => {
                BuildError::ConfigurationNotFound(format!("no manifest at {}", missing.display()))
            }
            source => BuildError::ConfigurationInvalid {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let build = config.build(build_name).cloned().ok_or_else(|| {
            BuildError::ConfigurationNotFound(format!("build configuration '{}'", build_name))
        })?;

        let manifest_path = manifest_path
            .canonicalize()
            .map_err(|e| BuildError::io(&manifest_path, e))?;
        let project_root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BuildError::invalid_input(&manifest_path, "manifest has no parent"))?;

        let source_dir = project_root.join(&config.source.path);
        let output_path = project_root.join(build.output_path(&config.package));

        // Source files are components, never resources
        let source_pattern = config.source.pattern();
        let mut components_patterns = build.components.clone();
        if !components_patterns.include.contains(&source_pattern) {
            components_patterns.include.push(source_pattern.clone());
        }
        let mut resources_patterns = build.resources.clone();
        if !resources_patterns.exclude.contains(&source_pattern) {
            resources_patterns.exclude.push(source_pattern);
        }

        let required_units = config.lifecycle.required_units();
        let temporary_units = config.lifecycle.temporary_units();

        let mut dependencies: Vec<(String, PackageSource)> = Vec::new();
        for (name, dep) in config.dependencies.iter().chain(&build.dependencies) {
            dependencies.retain(|(existing, _)| existing != name);
            dependencies.push((name.clone(), dep.to_source(name)));
        }

        let store = DirectoryStore::from_env().map_err(BuildError::Store)?;

        info!(
            package = %config.package.package,
            version = %config.package.version,
            build = %build.name,
            "loaded project"
        );

        let mut builder = Self {
            manifest_path,
            project_root,
            config,
            build,
            source_dir,
            output_path,
            components_patterns,
            resources_patterns,
            components: Vec::new(),
            resources: Vec::new(),
            required_units,
            temporary_units,
            dependencies,
            build_number: String::new(),
            store: Box::new(store),
            serializer: Box::new(OpaqueSerializer),
            reporter: Arc::new(NoopReporter),
        };
        builder.refresh_files()?;
        Ok(builder)
    }

    /// Use a different installed package store
    pub fn with_store(mut self, store: impl PackageStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Use a different component serializer
    pub fn with_serializer(mut self, serializer: impl ComponentSerializer + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    /// Report progress to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Re-collect files, check required units and recompute the build number
    pub fn refresh_files(&mut self) -> BuildResult<()> {
        let components = FileCollector::new(
            &self.components_patterns.include,
            &self.components_patterns.exclude,
        )?
        .collect(&self.source_dir)?;
        let mut resources = FileCollector::new(
            &self.resources_patterns.include,
            &self.resources_patterns.exclude,
        )?
        .collect(&self.source_dir)?;

        let entry_points = [
            self.config.lifecycle.entry_point.as_deref(),
            self.config.lifecycle.web_entry_point.as_deref(),
        ];

        for name in &self.required_units {
            let unit = self
                .config
                .unit(name)
                .ok_or_else(|| BuildError::unit_not_found(name))?;

            if entry_points.contains(&Some(name.as_str())) && unit.kind.targets_file() {
                let target = self.project_root.join(&unit.target);
                if target.is_file() {
                    add_unique(&mut resources, canonical(&target)?);
                } else if unit.kind == UnitKind::Script {
                    return Err(BuildError::RequiredFileMissing {
                        unit: name.clone(),
                        path: target,
                    });
                }
            }

            for file in &unit.required_files {
                let path = self.project_root.join(file);
                if !path.is_file() {
                    return Err(BuildError::RequiredFileMissing {
                        unit: name.clone(),
                        path,
                    });
                }
                add_unique(&mut resources, canonical(&path)?);
            }
        }

        ensure_unique_names(&self.source_dir, &components, BuildError::InvalidComponentPath)?;
        ensure_unique_names(&self.source_dir, &resources, BuildError::InvalidResourcePath)?;

        let fingerprinted: Vec<PathBuf> = components.iter().chain(&resources).cloned().collect();
        self.build_number = fingerprint::build_number(&fingerprinted)?;
        self.components = components;
        self.resources = resources;

        debug!(
            components = self.components.len(),
            resources = self.resources.len(),
            build_number = %self.build_number,
            "refreshed files"
        );
        Ok(())
    }

    /// Declare a dependency
    pub fn add_dependency(&mut self, name: &str, source: PackageSource) -> BuildResult<()> {
        if self.dependency_exists(name) {
            return Err(BuildError::DuplicateDependency(name.to_string()));
        }
        self.dependencies.push((name.to_string(), source));
        Ok(())
    }

    /// Remove a dependency; absent names are ignored
    pub fn remove_dependency(&mut self, name: &str) {
        self.dependencies.retain(|(existing, _)| existing != name);
    }

    pub fn dependency_exists(&self, name: &str) -> bool {
        self.get_dependency(name).is_some()
    }

    /// Look a dependency up by its declared name, then by its source's package id
    pub fn get_dependency(&self, name: &str) -> Option<&PackageSource> {
        self.dependencies
            .iter()
            .find(|(key, _)| key == name)
            .or_else(|| {
                self.dependencies
                    .iter()
                    .find(|(_, source)| source.package == name)
            })
            .map(|(_, source)| source)
    }

    /// Declared dependencies, project-level first, build-level last
    pub fn dependencies(&self) -> &[(String, PackageSource)] {
        &self.dependencies
    }

    /// Full transitive closure of the declared dependencies
    pub fn dependency_readers(&self) -> BuildResult<Vec<ResolvedDependency>> {
        let resolver = DependencyResolver::new(self.store.as_ref());
        let mut resolved = Vec::new();
        for (name, source) in &self.dependencies {
            resolved.extend(resolver.resolve(name, source)?);
        }
        Ok(resolved)
    }

    /// Header references for the direct dependencies
    pub fn dependency_references(&self) -> BuildResult<Vec<DependencyReference>> {
        let resolver = DependencyResolver::new(self.store.as_ref());
        let static_link = self.build.options.static_link;

        let mut references = Vec::with_capacity(self.dependencies.len());
        for (name, source) in &self.dependencies {
            let resolved = resolver.resolve(name, source)?;
            if let Some(direct) = resolved.first() {
                references.push(
                    DependencyReference::new(name, direct.version())
                        .with_static_link(static_link)
                        .with_source(source.clone()),
                );
            }
        }
        Ok(references)
    }

    /// Installed dependencies to embed in the package.
    ///
    /// Empty unless static linking is on; otherwise the resolved closure with
    /// one entry per package name.
    pub fn embedded_dependencies(&self) -> BuildResult<Vec<(ResolvedDependency, PackageArchive)>> {
        if !self.build.options.static_link {
            return Ok(Vec::new());
        }

        let mut embedded: Vec<(ResolvedDependency, PackageArchive)> = Vec::new();
        for dependency in self.dependency_readers()? {
            if let Some((first, _)) = embedded.iter().find(|(d, _)| d.name == dependency.name) {
                if first.version() != dependency.version() {
                    warn!(
                        dependency = %dependency.name,
                        kept = %first.version(),
                        skipped = %dependency.version(),
                        "dependency reached at two versions, embedding the first"
                    );
                }
                continue;
            }
            let archive = dependency.package.archive().map_err(BuildError::Store)?;
            debug!(dependency = %dependency.name, version = %dependency.version(), "embedding dependency");
            embedded.push((dependency, archive));
        }
        Ok(embedded)
    }

    /// Run the pre-compile units
    pub fn pre_compile(&self) -> BuildResult<()> {
        self.reporter.stage("pre-compile");
        self.run_units(&self.config.lifecycle.pre_compile)
    }

    /// Run the post-compile units
    pub fn post_compile(&self) -> BuildResult<()> {
        self.reporter.stage("post-compile");
        self.run_units(&self.config.lifecycle.post_compile)
    }

    fn run_units(&self, names: &[String]) -> BuildResult<()> {
        let units = names
            .iter()
            .map(|name| {
                self.config
                    .unit(name)
                    .ok_or_else(|| BuildError::unit_not_found(name))
            })
            .collect::<BuildResult<Vec<_>>>()?;

        if units.is_empty() {
            return Ok(());
        }
        UnitExecutor::new(self.unit_context()).execute_all(&units)?;
        Ok(())
    }

    /// Environment in which lifecycle units run
    pub fn unit_context(&self) -> UnitContext {
        UnitContext {
            project_root: self.project_root.clone(),
            source_dir: self.source_dir.clone(),
            output: self.output_path.clone(),
            package: self.config.package.package.clone(),
            version: self.config.package.version.to_string(),
            build: self.build.name.clone(),
            build_number: self.build_number.clone(),
            interpreter: self.config.runtime.interpreter.clone(),
            env_vars: HashMap::new(),
        }
    }

    /// Entry name for a component file
    pub fn component_name(&self, path: &Path) -> BuildResult<String> {
        entry_name(&self.source_dir, path)
            .ok_or_else(|| BuildError::InvalidComponentPath(path.to_path_buf()))
    }

    /// Entry name for a resource file
    pub fn resource_name(&self, path: &Path) -> BuildResult<String> {
        entry_name(&self.source_dir, path)
            .ok_or_else(|| BuildError::InvalidResourcePath(path.to_path_buf()))
    }

    /// Execution units shipped in the package
    pub fn packaged_units(&self) -> BuildResult<Vec<&ExecutionUnit>> {
        self.required_units
            .iter()
            .map(|name| {
                self.config
                    .unit(name)
                    .ok_or_else(|| BuildError::unit_not_found(name))
            })
            .collect()
    }

    /// Serialize the package container into `out`
    pub fn write_container<W: Write>(&self, out: W) -> BuildResult<W> {
        let source_dir = self.source_dir.as_path();
        let serializer = self.serializer.as_ref();
        let components = self
            .components
            .par_iter()
            .map(|path| {
                let name = entry_name(source_dir, path)
                    .ok_or_else(|| BuildError::InvalidComponentPath(path.clone()))?;
                let component = serialize_component(serializer, path)?;
                Ok((name, component))
            })
            .collect::<BuildResult<Vec<_>>>()?;

        let embedded = self.embedded_dependencies()?;

        let mut kinds: BTreeMap<String, ComponentKind> = components
            .iter()
            .map(|(name, component)| (name.clone(), component.kind))
            .collect();
        for (dependency, archive) in &embedded {
            let recorded = &dependency.package.header.component_kinds;
            for name in archive.components().names() {
                let kind = recorded.get(name).copied().unwrap_or(ComponentKind::Opaque);
                kinds.insert(embedded_name(&dependency.name, name), kind);
            }
        }

        let header = Header::new(&self.build_number)
            .with_build(&self.build.name)
            .with_dependencies(self.dependency_references()?)
            .with_component_kinds(kinds)
            .stamped();

        let mut writer = ContainerWriter::new(out, self.build.options.compression())?;
        writer.write_header(header)?;
        writer.write_assembly(&self.config.assembly())?;

        for unit in self.packaged_units()? {
            writer.write_execution_unit(unit)?;
        }
        for (dependency, archive) in &embedded {
            for unit in &archive.execution_units {
                let mut unit = unit.clone();
                unit.name = embedded_name(&dependency.name, &unit.name);
                writer.write_execution_unit(&unit)?;
            }
        }
        writer.end_section()?;

        let total = components.len();
        for (index, (name, component)) in components.iter().enumerate() {
            self.reporter.progress(name, index + 1, total);
            writer.write_data(&component.payload, Some(name))?;
        }
        for (dependency, archive) in &embedded {
            for (name, data) in named_entries(archive.components().entries()) {
                writer.write_data(data, Some(&embedded_name(&dependency.name, name)))?;
            }
        }
        writer.end_section()?;

        for path in &self.resources {
            let name = self.resource_name(path)?;
            let data = fs::read(path).map_err(|e| BuildError::io(path, e))?;
            writer.write_data(&data, Some(&name))?;
        }
        for (dependency, archive) in &embedded {
            for (name, data) in named_entries(archive.resources().entries()) {
                writer.write_data(data, Some(&embedded_name(&dependency.name, name)))?;
            }
        }
        writer.end_section()?;

        Ok(writer.finish()?)
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &ProjectConfiguration {
        &self.config
    }

    pub fn build_config(&self) -> &BuildConfiguration {
        &self.build
    }

    pub fn options(&self) -> &BuildOptions {
        &self.build.options
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Override the output path
    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) {
        self.output_path = path.into();
    }

    pub fn components(&self) -> &[PathBuf] {
        &self.components
    }

    pub fn resources(&self) -> &[PathBuf] {
        &self.resources
    }

    pub fn required_units(&self) -> &[String] {
        &self.required_units
    }

    pub fn temporary_units(&self) -> &[String] {
        &self.temporary_units
    }

    pub fn build_number(&self) -> &str {
        &self.build_number
    }

    pub fn store(&self) -> &dyn PackageStore {
        self.store.as_ref()
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }
}

/// Directory under which a statically linked dependency's entries live
pub fn dependency_prefix(package: &str) -> String {
    format!("deps/{}", package)
}

/// Entry name of `name` from the embedded dependency `package`
pub fn embedded_name(package: &str, name: &str) -> String {
    format!("{}/{}", dependency_prefix(package), name)
}

fn named_entries(entries: &[kiln_format::Entry]) -> impl Iterator<Item = (&str, &[u8])> {
    entries
        .iter()
        .filter_map(|entry| Some((entry.name.as_deref()?, entry.data.as_slice())))
}

/// Path relative to the source root, or the base file name outside it
fn entry_name(source_dir: &Path, path: &Path) -> Option<String> {
    let name = match relative_name(source_dir, path) {
        Some(relative) => relative,
        None => path.file_name()?.to_str()?.to_string(),
    };
    let usable = !name.is_empty()
        && name
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    usable.then_some(name)
}

/// Every file in a section must map to its own entry name
fn ensure_unique_names(
    source_dir: &Path,
    files: &[PathBuf],
    invalid: fn(PathBuf) -> BuildError,
) -> BuildResult<()> {
    let mut seen: HashMap<String, &PathBuf> = HashMap::with_capacity(files.len());
    for path in files {
        let name = entry_name(source_dir, path).ok_or_else(|| invalid(path.clone()))?;
        match seen.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(slot) => {
                debug!(
                    name = %slot.key(),
                    first = %slot.get().display(),
                    second = %path.display(),
                    "entry name collision"
                );
                return Err(invalid(path.clone()));
            }
        }
    }
    Ok(())
}

fn canonical(path: &Path) -> BuildResult<PathBuf> {
    path.canonicalize().map_err(|e| BuildError::io(path, e))
}

fn add_unique(files: &mut Vec<PathBuf>, path: PathBuf) {
    if !files.contains(&path) {
        files.push(path);
    }
}
