//! Kiln build system
//!
//! Turns a project described by `kiln.toml` into a package:
//! - File collection by include/exclude patterns
//! - Content fingerprinting (build numbers)
//! - Execution unit lifecycle hooks
//! - Dependency resolution against installed packages
//! - Packaging strategies (container, native executable, archive, wrapped script)

pub mod builder;
pub mod collector;
pub mod error;
pub mod fingerprint;
pub mod reporter;
pub mod script;
pub mod serializer;
pub mod strategy;

pub use builder::Builder;
pub use collector::{collect, FileCollector};
pub use error::{BuildError, BuildResult};
pub use fingerprint::build_number;
pub use reporter::{NoopReporter, Reporter, TracingReporter};
pub use script::{UnitContext, UnitExecutor, UnitResult};
pub use serializer::{ComponentSerializer, OpaqueSerializer, SerializedComponent};
pub use strategy::{
    ArchiveCompiler, ContainerCompiler, NativeCompiler, PackageCompiler, StrategyKind,
    WrappedCompiler,
};
