//! Archive with launcher stub
//!
//! Produces a gzip-compressed tar tree:
//!
//! ```text
//! .kiln/stub.sh          launcher
//! .kiln/autoload.json    symbol -> file map
//! .kiln/manifest.json    assembly, build number, dependency references
//! units/<name>.json
//! components/<name>
//! resources/<name>
//! deps/<package>/...     statically linked dependencies only
//! ```
//!
//! The stub comes in four variants picked by `skip-execution` and `static`.

use super::{prepare_output, sh_quote, symbols, PackageCompiler};
use crate::builder::{dependency_prefix, Builder};
use crate::error::{BuildError, BuildResult};
use flate2::write::GzEncoder;
use kiln_format::{Assembly, DependencyReference, ExecutionUnit, UnitKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How the stub reaches an entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Script file inside the archive, run by the interpreter
    Script(String),
    /// Shell command line
    Command(String),
}

/// Inputs for stub generation
#[derive(Debug, Clone)]
pub(crate) struct StubPlan {
    pub package: String,
    pub version: String,
    pub interpreter: String,
    pub entry: Option<Dispatch>,
    pub web_entry: Option<Dispatch>,
    pub skip_execution: bool,
    pub static_link: bool,
    pub dependencies: Vec<String>,
}

#[derive(Serialize)]
struct ArchiveManifest<'a> {
    assembly: Assembly,
    build: &'a str,
    build_number: &'a str,
    #[serde(rename = "static")]
    static_link: bool,
    entry_point: Option<&'a str>,
    web_entry_point: Option<&'a str>,
    dependencies: Vec<DependencyReference>,
}

/// Writes a tar.gz archive with a launcher stub
#[derive(Debug)]
pub struct ArchiveCompiler {
    builder: Builder,
}

type TarWriter = tar::Builder<GzEncoder<File>>;

impl ArchiveCompiler {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }

    pub fn into_builder(self) -> Builder {
        self.builder
    }

    fn write_tree(&self, tar: &mut TarWriter, output: &Path) -> BuildResult<()> {
        let builder = &self.builder;
        let options = builder.options();
        let mut autoload = BTreeMap::new();
        let fail = |e: std::io::Error| BuildError::compile_failed(output, e);

        for unit in builder.packaged_units()? {
            append(tar, &format!("units/{}.json", unit.name), &unit_json(unit)?).map_err(fail)?;
        }

        let total = builder.components().len();
        for (index, path) in builder.components().iter().enumerate() {
            let name = builder.component_name(path)?;
            builder.reporter().progress(&name, index + 1, total);
            let data = fs::read(path).map_err(|e| BuildError::io(path, e))?;
            let location = format!("components/{}", name);
            register_symbols(&mut autoload, &data, &location);
            append(tar, &location, &data).map_err(fail)?;
        }

        for path in builder.resources() {
            let name = builder.resource_name(path)?;
            let data = fs::read(path).map_err(|e| BuildError::io(path, e))?;
            append(tar, &format!("resources/{}", name), &data).map_err(fail)?;
        }

        let references = builder.dependency_references()?;
        if options.static_link {
            self.embed_dependencies(tar, &mut autoload, output)?;
        }

        let lifecycle = &builder.config().lifecycle;
        let manifest = ArchiveManifest {
            assembly: builder.config().assembly(),
            build: &builder.build_config().name,
            build_number: builder.build_number(),
            static_link: options.static_link,
            entry_point: lifecycle.entry_point.as_deref(),
            web_entry_point: lifecycle.web_entry_point.as_deref(),
            dependencies: references.clone(),
        };
        append(tar, ".kiln/manifest.json", &to_json(&manifest)?).map_err(fail)?;
        append(tar, ".kiln/autoload.json", &to_json(&autoload)?).map_err(fail)?;

        let plan = StubPlan {
            package: builder.config().package.package.clone(),
            version: builder.config().package.version.to_string(),
            interpreter: builder.config().runtime.interpreter.clone(),
            entry: self.dispatch(lifecycle.entry_point.as_deref())?,
            web_entry: self.dispatch(lifecycle.web_entry_point.as_deref())?,
            skip_execution: options.skip_execution,
            static_link: options.static_link,
            dependencies: references.into_iter().map(|r| r.name).collect(),
        };
        append_mode(tar, ".kiln/stub.sh", render_stub(&plan).as_bytes(), 0o755).map_err(fail)?;

        debug!(symbols = autoload.len(), "wrote archive tree");
        Ok(())
    }

    /// Copy each statically linked dependency once, under `deps/<package>/`
    fn embed_dependencies(
        &self,
        tar: &mut TarWriter,
        autoload: &mut BTreeMap<String, String>,
        output: &Path,
    ) -> BuildResult<()> {
        let fail = |e: std::io::Error| BuildError::compile_failed(output, e);

        for (dependency, archive) in self.builder.embedded_dependencies()? {
            let prefix = dependency_prefix(&dependency.name);

            for unit in &archive.execution_units {
                append(tar, &format!("{}/units/{}.json", prefix, unit.name), &unit_json(unit)?)
                    .map_err(fail)?;
            }
            for entry in archive.components().entries() {
                let Some(name) = entry.name.as_deref() else {
                    continue;
                };
                let location = format!("{}/components/{}", prefix, name);
                register_symbols(autoload, &entry.data, &location);
                append(tar, &location, &entry.data).map_err(fail)?;
            }
            for entry in archive.resources().entries() {
                let Some(name) = entry.name.as_deref() else {
                    continue;
                };
                append(tar, &format!("{}/resources/{}", prefix, name), &entry.data)
                    .map_err(fail)?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, unit_name: Option<&str>) -> BuildResult<Option<Dispatch>> {
        let Some(name) = unit_name else {
            return Ok(None);
        };
        let unit = self
            .builder
            .config()
            .unit(name)
            .ok_or_else(|| BuildError::unit_not_found(name))?;

        match unit.kind {
            UnitKind::Command => Ok(Some(Dispatch::Command(unit.target.clone()))),
            UnitKind::Script | UnitKind::Web => {
                let target = self.builder.project_root().join(&unit.target);
                match target.canonicalize() {
                    Ok(path) => Ok(Some(Dispatch::Script(format!(
                        "resources/{}",
                        self.builder.resource_name(&path)?
                    )))),
                    Err(_) => {
                        warn!(unit = name, "entry point target missing, stub will not dispatch it");
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl PackageCompiler for ArchiveCompiler {
    fn builder(&self) -> &Builder {
        &self.builder
    }

    fn builder_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }

    fn compile(&mut self, overwrite: bool) -> BuildResult<PathBuf> {
        let output = self.builder.output_path().to_path_buf();
        self.builder.reporter().stage("compile");
        prepare_output(&output, overwrite)?;

        let options = self.builder.options();
        let level = if options.compress {
            flate2::Compression::new(options.compression_level)
        } else {
            flate2::Compression::none()
        };

        let file = File::create(&output).map_err(|e| BuildError::compile_failed(&output, e))?;
        let mut tar = tar::Builder::new(GzEncoder::new(file, level));
        self.write_tree(&mut tar, &output)?;

        let mut file = tar
            .into_inner()
            .and_then(GzEncoder::finish)
            .map_err(|e| BuildError::compile_failed(&output, e))?;
        file.flush()
            .map_err(|e| BuildError::compile_failed(&output, e))?;

        info!(output = %output.display(), "wrote archive");
        self.builder.reporter().finished(&output);
        Ok(output)
    }
}

/// Launcher script for `plan`
pub(crate) fn render_stub(plan: &StubPlan) -> String {
    let mut stub = String::new();
    stub.push_str("#!/bin/sh\n");
    stub.push_str(&format!(
        "# {} {} launcher, generated by kiln\n",
        plan.package, plan.version
    ));
    stub.push_str("KILN_ROOT=\"$(CDPATH= cd -- \"$(dirname -- \"$0\")/..\" && pwd)\"\n");
    stub.push_str("KILN_AUTOLOAD=\"$KILN_ROOT/.kiln/autoload.json\"\n");

    if plan.static_link {
        stub.push_str("KILN_PATH=\"$KILN_ROOT/deps\"\n");
        stub.push_str("export KILN_ROOT KILN_AUTOLOAD KILN_PATH\n");
    } else {
        stub.push_str("KILN_PATH=\"${KILN_HOME:-$HOME/.kiln}/packages\"\n");
        stub.push_str("export KILN_ROOT KILN_AUTOLOAD KILN_PATH\n");
        if !plan.dependencies.is_empty() {
            let quoted: Vec<String> = plan.dependencies.iter().map(|d| sh_quote(d)).collect();
            stub.push_str(&format!("for dep in {}; do\n", quoted.join(" ")));
            stub.push_str("    if [ ! -d \"$KILN_PATH/$dep\" ]; then\n");
            stub.push_str("        echo \"kiln: dependency $dep is not installed\" >&2\n");
            stub.push_str("        exit 1\n");
            stub.push_str("    fi\n");
            stub.push_str("done\n");
        }
    }

    if plan.skip_execution {
        stub.push_str("return 0 2>/dev/null || exit 0\n");
        return stub;
    }

    stub.push_str("if [ -n \"${GATEWAY_INTERFACE:-}\" ] || [ -n \"${REQUEST_METHOD:-}\" ]; then\n");
    stub.push_str(&dispatch_line(plan, plan.web_entry.as_ref(), "web entry point"));
    stub.push_str("fi\n");
    stub.push_str(dispatch_line(plan, plan.entry.as_ref(), "entry point").trim_start());
    stub
}

fn dispatch_line(plan: &StubPlan, dispatch: Option<&Dispatch>, what: &str) -> String {
    match dispatch {
        Some(Dispatch::Script(path)) => format!(
            "    exec {} \"$KILN_ROOT/{}\" \"$@\"\n",
            sh_quote(&plan.interpreter),
            path
        ),
        Some(Dispatch::Command(command)) => {
            format!("    exec sh -c {} kiln \"$@\"\n", sh_quote(command))
        }
        None => format!(
            "    echo \"kiln: {} has no {}\" >&2\n    exit 1\n",
            plan.package, what
        ),
    }
}

fn register_symbols(autoload: &mut BTreeMap<String, String>, data: &[u8], location: &str) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for symbol in symbols::scan(text) {
        if let Some(existing) = autoload.get(&symbol) {
            warn!(%symbol, first = %existing, duplicate = location, "symbol declared twice, keeping first");
            continue;
        }
        autoload.insert(symbol, location.to_string());
    }
}

fn unit_json(unit: &ExecutionUnit) -> BuildResult<Vec<u8>> {
    to_json(unit)
}

fn to_json<T: Serialize>(value: &T) -> BuildResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| BuildError::compile_failed("archive manifest", e))
}

fn append(tar: &mut TarWriter, path: &str, data: &[u8]) -> std::io::Result<()> {
    append_mode(tar, path, data, 0o644)
}

fn append_mode(tar: &mut TarWriter, path: &str, data: &[u8], mode: u32) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);
    tar.append_data(&mut header, path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plan(skip_execution: bool, static_link: bool) -> StubPlan {
        StubPlan {
            package: "org.vendor.tool".to_string(),
            version: "1.0.0".to_string(),
            interpreter: "lua".to_string(),
            entry: Some(Dispatch::Script("resources/main.lua".to_string())),
            web_entry: Some(Dispatch::Command("echo web".to_string())),
            skip_execution,
            static_link,
            dependencies: vec!["org.other.lib".to_string()],
        }
    }

    #[rstest]
    #[case(false, false)]
    #[case(false, true)]
    #[case(true, false)]
    #[case(true, true)]
    fn test_stub_variants(#[case] skip_execution: bool, #[case] static_link: bool) {
        let stub = render_stub(&plan(skip_execution, static_link));
        assert!(stub.starts_with("#!/bin/sh\n"));
        assert!(stub.contains("KILN_AUTOLOAD="));

        assert_eq!(stub.contains("$KILN_ROOT/deps"), static_link);
        assert_eq!(stub.contains("'org.other.lib'"), !static_link);

        assert_eq!(stub.contains("GATEWAY_INTERFACE"), !skip_execution);
        assert_eq!(stub.contains("exec 'lua' \"$KILN_ROOT/resources/main.lua\""), !skip_execution);
        assert_eq!(stub.contains("return 0"), skip_execution);
    }

    #[test]
    fn test_stub_without_web_entry() {
        let mut plan = plan(false, true);
        plan.web_entry = None;
        let stub = render_stub(&plan);
        assert!(stub.contains("org.vendor.tool has no web entry point"));
    }

    #[test]
    fn test_command_dispatch_quoted() {
        let stub = render_stub(&plan(false, true));
        assert!(stub.contains("exec sh -c 'echo web' kiln \"$@\""));
    }

    #[test]
    fn test_register_symbols_keeps_first() {
        let mut autoload = BTreeMap::new();
        register_symbols(&mut autoload, b"namespace A; class B {}", "components/b.php");
        register_symbols(&mut autoload, b"namespace A; class B {}", "deps/x/components/b.php");
        register_symbols(&mut autoload, &[0xff, 0xfe], "components/bin");
        assert_eq!(autoload.len(), 1);
        assert_eq!(autoload["A\\B"], "components/b.php");
    }
}
