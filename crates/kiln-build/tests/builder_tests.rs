//! Integration tests for the build orchestrator
//!
//! Each test lays out a small project in a temporary directory and drives a
//! [`Builder`] over it.

use kiln_build::{collect, BuildError, Builder, ContainerCompiler, PackageCompiler};
use kiln_format::{Compression, ContainerWriter, DependencyReference, Header, PackageArchive};
use kiln_package::{DirectoryStore, PackageSource};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs::{self, File};
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[package]
name = "Demo"
package = "org.demo.app"
version = "0.1.0"

[source]
extension = "lua"

[units.main]
kind = "script"
target = "bin/main.sh"

[lifecycle]
entry-point = "main"

[builds.release]
output = "build/{package}-{version}-{build}.kpkg"
"#;

/// Create a project with the given manifest and files
fn create_project(manifest: &str, files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("kiln.toml"), manifest).unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn names(paths: &[std::path::PathBuf], root: &Path) -> Vec<String> {
    let root = root.canonicalize().unwrap();
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(&root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn test_single_resource_single_unit_container() {
    let project = create_project(
        MANIFEST,
        &[("src/app.lua", "return {}"), ("bin/main.sh", "echo hi")],
    );

    let builder = Builder::open(project.path(), "release").unwrap();
    let mut compiler = ContainerCompiler::new(builder);
    let output = compiler.build(false).unwrap();

    assert_eq!(
        output,
        project
            .path()
            .canonicalize()
            .unwrap()
            .join("build/org.demo.app-0.1.0-release.kpkg")
    );

    let archive = PackageArchive::open(&output).unwrap();
    assert_eq!(archive.resources().names(), vec!["main.sh"]);
    assert_eq!(archive.execution_unit_names(), vec!["main"]);
    assert_eq!(archive.components().names(), vec!["app.lua"]);
    assert_eq!(archive.component("app.lua").unwrap(), b"return {}");
    assert_eq!(archive.assembly.package, "org.demo.app");
    assert_eq!(archive.header.build, "release");
    assert_eq!(archive.header.compression, Compression::deflate(6));
    assert_eq!(archive.header.build_number, compiler.builder().build_number());
    assert!(archive.header.created.is_some());
}

#[test]
fn test_missing_entry_script_fails_before_writing() {
    let project = create_project(MANIFEST, &[("src/app.lua", "return {}")]);

    let err = Builder::open(project.path(), "release").unwrap_err();
    assert!(matches!(err, BuildError::RequiredFileMissing { ref unit, .. } if unit == "main"));
    assert!(!project.path().join("build").exists());
}

#[test]
fn test_refresh_detects_removed_script() {
    let project = create_project(
        MANIFEST,
        &[("src/app.lua", "return {}"), ("bin/main.sh", "echo hi")],
    );
    let mut builder = Builder::open(project.path(), "release").unwrap();

    fs::remove_file(project.path().join("bin/main.sh")).unwrap();
    let err = builder.refresh_files().unwrap_err();
    assert!(matches!(err, BuildError::RequiredFileMissing { .. }));
}

#[test]
fn test_required_files_become_resources() {
    let manifest = MANIFEST.replace(
        "target = \"bin/main.sh\"",
        "target = \"bin/main.sh\"\nrequired-files = [\"data/defaults.json\"]",
    );
    let project = create_project(
        &manifest,
        &[
            ("src/app.lua", "return {}"),
            ("src/assets/logo.txt", "logo"),
            ("bin/main.sh", "echo hi"),
            ("data/defaults.json", "{}"),
        ],
    );

    let builder = Builder::open(project.path(), "release").unwrap();
    assert_eq!(
        names(builder.resources(), project.path()),
        vec!["src/assets/logo.txt", "bin/main.sh", "data/defaults.json"]
    );
    assert_eq!(builder.resource_name(&builder.resources()[0]).unwrap(), "assets/logo.txt");
    assert_eq!(builder.resource_name(&builder.resources()[2]).unwrap(), "defaults.json");
}

#[test]
fn test_missing_required_file() {
    let manifest = MANIFEST.replace(
        "target = \"bin/main.sh\"",
        "target = \"bin/main.sh\"\nrequired-files = [\"data/missing.json\"]",
    );
    let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);

    let err = Builder::open(project.path(), "release").unwrap_err();
    assert!(matches!(err, BuildError::RequiredFileMissing { .. }));
}

#[test]
fn test_source_files_are_never_resources() {
    let project = create_project(
        MANIFEST,
        &[
            ("src/app.lua", "return {}"),
            ("src/lib/util.lua", "return 1"),
            ("src/readme.txt", "docs"),
            ("bin/main.sh", "echo hi"),
        ],
    );

    let builder = Builder::open(project.path(), "release").unwrap();
    assert_eq!(
        names(builder.components(), project.path()),
        vec!["src/app.lua", "src/lib/util.lua"]
    );
    assert_eq!(
        names(builder.resources(), project.path()),
        vec!["src/readme.txt", "bin/main.sh"]
    );
}

#[test]
fn test_resource_name_collision_fails_before_writing() {
    let project = create_project(
        MANIFEST,
        &[
            ("src/app.lua", "return {}"),
            ("src/main.sh", "echo source"),
            ("bin/main.sh", "echo hi"),
        ],
    );

    let err = Builder::open(project.path(), "release").unwrap_err();
    assert!(
        matches!(err, BuildError::InvalidResourcePath(ref path) if path.ends_with("bin/main.sh"))
    );
    assert!(!project.path().join("build").exists());
}

#[test]
fn test_build_number_is_deterministic() {
    let files = [
        ("src/app.lua", "return {}"),
        ("src/lib/util.lua", "return 1"),
        ("bin/main.sh", "echo hi"),
    ];
    let first = create_project(MANIFEST, &files);
    let second = create_project(MANIFEST, &files);

    let a = Builder::open(first.path(), "release").unwrap();
    let b = Builder::open(second.path(), "release").unwrap();
    assert_eq!(a.build_number(), b.build_number());
    assert_eq!(a.build_number().len(), 64);
}

#[test]
fn test_build_number_tracks_content_not_mtime() {
    let project = create_project(
        MANIFEST,
        &[("src/app.lua", "return {}"), ("bin/main.sh", "echo hi")],
    );
    let mut builder = Builder::open(project.path(), "release").unwrap();
    let original = builder.build_number().to_string();

    // Same bytes, new modification time
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(project.path().join("src/app.lua"), "return {}").unwrap();
    builder.refresh_files().unwrap();
    assert_eq!(builder.build_number(), original);

    fs::write(project.path().join("src/app.lua"), "return {1}").unwrap();
    builder.refresh_files().unwrap();
    assert_ne!(builder.build_number(), original);
}

#[test]
fn test_collector_excludes_directory_prefix() {
    let dir = tempfile::tempdir().unwrap();
    for path in ["a.lua", "lib/b.lua", "tests/c.lua", "tests/deep/d.lua", "e.txt"] {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, path).unwrap();
    }

    let files = collect(
        dir.path(),
        &["*.lua".to_string()],
        &["/tests/*".to_string()],
    )
    .unwrap();

    assert_eq!(names(&files, dir.path()), vec!["a.lua", "lib/b.lua"]);
    assert!(files
        .iter()
        .all(|p| !p.to_string_lossy().contains("/tests/")));
    assert!(files.iter().all(|p| p.is_absolute()));
}

#[test]
fn test_collector_rejects_missing_root() {
    let err = collect(Path::new("/nonexistent/kiln/root"), &[], &[]).unwrap_err();
    assert!(matches!(err, BuildError::InvalidInput { .. }));
}

#[test]
fn test_unknown_build_configuration() {
    let project = create_project(MANIFEST, &[("bin/main.sh", "echo hi")]);
    let err = Builder::open(project.path(), "debug").unwrap_err();
    assert!(matches!(err, BuildError::ConfigurationNotFound(_)));
}

#[test]
fn test_missing_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let err = Builder::open(dir.path(), "release").unwrap_err();
    assert!(matches!(err, BuildError::ConfigurationNotFound(_)));
}

#[test]
fn test_invalid_manifest() {
    let project = create_project(
        &MANIFEST.replace("package = \"org.demo.app\"", "package = \"org..app\""),
        &[("bin/main.sh", "echo hi")],
    );
    let err = Builder::open(project.path(), "release").unwrap_err();
    assert!(matches!(err, BuildError::ConfigurationInvalid { .. }));
}

#[test]
fn test_open_by_manifest_file() {
    let project = create_project(
        MANIFEST,
        &[("src/app.lua", "return {}"), ("bin/main.sh", "echo hi")],
    );
    let builder = Builder::open(project.path().join("kiln.toml"), "release").unwrap();
    assert_eq!(builder.project_root(), project.path().canonicalize().unwrap());
    assert_eq!(builder.required_units(), ["main".to_string()]);
}

#[test]
fn test_undeclared_entry_unit() {
    let project = create_project(
        &MANIFEST.replace("entry-point = \"main\"", "entry-point = \"missing\""),
        &[("bin/main.sh", "echo hi")],
    );
    let err = Builder::open(project.path(), "release").unwrap_err();
    assert!(matches!(err, BuildError::ExecutionUnitNotFound { ref name } if name == "missing"));
}

#[test]
fn test_dependency_management() {
    let project = create_project(
        &format!(
            "{}\n[dependencies]\n\"org.other.lib\" = \"^1.0.0\"\n",
            MANIFEST
        ),
        &[("bin/main.sh", "echo hi")],
    );
    let mut builder = Builder::open(project.path(), "release").unwrap();

    assert!(builder.dependency_exists("org.other.lib"));
    let err = builder
        .add_dependency("org.other.lib", PackageSource::new("org.other.lib"))
        .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateDependency(_)));

    builder
        .add_dependency("alias", PackageSource::new("com.acme.util").with_version("1.0.0"))
        .unwrap();
    assert!(builder.dependency_exists("alias"));
    assert_eq!(
        builder.get_dependency("com.acme.util").unwrap().version.as_deref(),
        Some("1.0.0")
    );

    builder.remove_dependency("alias");
    builder.remove_dependency("never-declared");
    assert!(!builder.dependency_exists("com.acme.util"));
    assert_eq!(builder.dependencies().len(), 1);
}

#[test]
fn test_build_dependencies_override_project_dependencies() {
    let manifest = format!(
        "{}\n[dependencies]\n\"org.other.lib\" = \"^1.0.0\"\n\"org.other.extra\" = \"*\"\n\n[builds.release.dependencies]\n\"org.other.lib\" = \"^1.2.0\"\n",
        MANIFEST
    );
    let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
    let builder = Builder::open(project.path(), "release").unwrap();

    let declared: Vec<(&str, Option<&str>)> = builder
        .dependencies()
        .iter()
        .map(|(name, source)| (name.as_str(), source.version.as_deref()))
        .collect();
    assert_eq!(
        declared,
        vec![("org.other.extra", Some("*")), ("org.other.lib", Some("^1.2.0"))]
    );
}

fn install(store: &DirectoryStore, name: &str, version: &str, refs: Vec<DependencyReference>) {
    let path = store.package_path(name, &semver::Version::parse(version).unwrap());
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut writer =
        ContainerWriter::new(File::create(&path).unwrap(), Compression::none()).unwrap();
    writer
        .write_header(Header::new("0").with_dependencies(refs))
        .unwrap();
    writer
        .write_assembly(&kiln_format::Assembly::new(name, name, version))
        .unwrap();
    for _ in 0..3 {
        writer.end_section().unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_dependency_readers_and_references() {
    let store_dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(store_dir.path());
    install(
        &store,
        "org.vendor.name",
        "1.1.0",
        vec![DependencyReference::new("com.other.tool", "2.0.0")],
    );
    install(&store, "com.other.tool", "2.0.0", vec![]);

    let manifest = format!(
        "{}\n[dependencies]\n\"org.vendor.name\" = \"^1.0.0\"\n",
        MANIFEST
    );
    let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
    let builder = Builder::open(project.path(), "release")
        .unwrap()
        .with_store(store);

    let readers = builder.dependency_readers().unwrap();
    let resolved: Vec<(&str, Option<&str>)> = readers
        .iter()
        .map(|d| (d.name.as_str(), d.source.origin.as_deref()))
        .collect();
    assert_eq!(
        resolved,
        vec![("org.vendor.name", None), ("com.other.tool", Some("other/tool"))]
    );

    let references = builder.dependency_references().unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].name, "org.vendor.name");
    assert_eq!(references[0].version, "1.1.0");
    assert!(!references[0].static_link);
}

#[test]
#[serial]
fn test_default_store_follows_kiln_home() {
    let home = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(home.path().join("packages"));
    install(&store, "org.vendor.name", "1.0.0", vec![]);

    let manifest = format!("{}\n[dependencies]\n\"org.vendor.name\" = \"*\"\n", MANIFEST);
    let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);

    std::env::set_var("KILN_HOME", home.path());
    let builder = Builder::open(project.path(), "release");
    std::env::remove_var("KILN_HOME");

    let readers = builder.unwrap().dependency_readers().unwrap();
    assert_eq!(readers.len(), 1);
    assert_eq!(readers[0].version(), "1.0.0");
}

#[test]
fn test_uninstalled_dependency_fails_compile() {
    let store_dir = tempfile::tempdir().unwrap();
    let manifest = format!("{}\n[dependencies]\n\"org.vendor.none\" = \"*\"\n", MANIFEST);
    let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
    let builder = Builder::open(project.path(), "release")
        .unwrap()
        .with_store(DirectoryStore::new(store_dir.path()));

    let err = ContainerCompiler::new(builder).compile(false).unwrap_err();
    assert!(matches!(
        err,
        BuildError::Resolver(kiln_package::ResolverError::DependencyNotInstalled { .. })
    ));
}

#[cfg(unix)]
mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lifecycle_manifest(pre: &str, post: &str) -> String {
        MANIFEST.replace(
            "entry-point = \"main\"",
            &format!(
                "entry-point = \"main\"\npre-compile = [\"pre\"]\npost-compile = [\"post\"]\n\n[units.pre]\nkind = \"command\"\ntarget = \"{}\"\n\n[units.post]\nkind = \"command\"\ntarget = \"{}\"",
                pre, post
            ),
        )
    }

    #[test]
    fn test_hooks_run_around_compile() {
        let manifest = lifecycle_manifest(
            "echo $KILN_BUILD > pre.txt",
            "test -f \\\"$KILN_OUTPUT\\\" && echo done > post.txt",
        );
        let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
        let builder = Builder::open(project.path(), "release").unwrap();
        assert_eq!(builder.temporary_units(), ["pre".to_string(), "post".to_string()]);

        let mut compiler = ContainerCompiler::new(builder);
        let output = compiler.build(false).unwrap();

        assert!(output.is_file());
        assert_eq!(
            fs::read_to_string(project.path().join("pre.txt")).unwrap().trim(),
            "release"
        );
        assert_eq!(
            fs::read_to_string(project.path().join("post.txt")).unwrap().trim(),
            "done"
        );

        // Build-time units are not packaged
        let archive = PackageArchive::open(&output).unwrap();
        assert_eq!(archive.execution_unit_names(), vec!["main"]);
    }

    #[test]
    fn test_pre_compile_failure_aborts() {
        let manifest = lifecycle_manifest("exit 1", "echo done > post.txt");
        let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
        let builder = Builder::open(project.path(), "release").unwrap();
        let output = builder.output_path().to_path_buf();

        let err = ContainerCompiler::new(builder).build(false).unwrap_err();
        assert!(matches!(err, BuildError::ExecutionUnitFailed { ref name, .. } if name == "pre"));
        assert!(!output.exists());
        assert!(!project.path().join("post.txt").exists());
    }

    #[test]
    fn test_post_compile_failure_is_reported() {
        let manifest = lifecycle_manifest("true", "exit 2");
        let project = create_project(&manifest, &[("bin/main.sh", "echo hi")]);
        let builder = Builder::open(project.path(), "release").unwrap();

        let err = ContainerCompiler::new(builder).build(false).unwrap_err();
        assert!(matches!(err, BuildError::ExecutionUnitFailed { ref name, .. } if name == "post"));
    }
}
