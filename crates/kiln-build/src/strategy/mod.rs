//! Packaging strategies
//!
//! Every strategy wraps a [`Builder`] and differs only in how the final
//! artifact is shaped:
//! - [`ContainerCompiler`]: the package container itself
//! - [`NativeCompiler`]: a self-extracting native executable
//! - [`ArchiveCompiler`]: a tar.gz tree with a launcher stub and symbol map
//! - [`WrappedCompiler`]: a shell script with the container appended

mod archive;
mod container;
mod native;
pub mod symbols;
mod wrapped;

pub use archive::ArchiveCompiler;
pub use container::ContainerCompiler;
pub use native::NativeCompiler;
pub use wrapped::{WrappedCompiler, PAYLOAD_SENTINEL};

use crate::builder::Builder;
use crate::error::{BuildError, BuildResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A packaging backend driven by a [`Builder`]
pub trait PackageCompiler {
    fn builder(&self) -> &Builder;

    fn builder_mut(&mut self) -> &mut Builder;

    /// Write the artifact and return its path
    fn compile(&mut self, overwrite: bool) -> BuildResult<PathBuf>;

    /// Run pre-compile units, compile, then run post-compile units
    fn build(&mut self, overwrite: bool) -> BuildResult<PathBuf> {
        self.builder().pre_compile()?;
        let output = self.compile(overwrite)?;
        self.builder().post_compile()?;
        Ok(output)
    }
}

/// Available packaging strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Container,
    Native,
    Archive,
    Wrapped,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Native => "native",
            Self::Archive => "archive",
            Self::Wrapped => "wrapped",
        }
    }

    pub fn all() -> [StrategyKind; 4] {
        [Self::Container, Self::Native, Self::Archive, Self::Wrapped]
    }

    /// Wrap `builder` in the compiler for this strategy
    pub fn compiler(self, builder: Builder) -> Box<dyn PackageCompiler> {
        match self {
            Self::Container => Box::new(ContainerCompiler::new(builder)),
            Self::Native => Box::new(NativeCompiler::new(builder)),
            Self::Archive => Box::new(ArchiveCompiler::new(builder)),
            Self::Wrapped => Box::new(WrappedCompiler::new(builder)),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown packaging strategy '{}'", s))
    }
}

/// Check that `output` may be written and create its parent directory
pub(crate) fn prepare_output(output: &Path, overwrite: bool) -> BuildResult<()> {
    if output.exists() {
        if !overwrite {
            return Err(BuildError::compile_failed(
                output,
                io::Error::new(io::ErrorKind::AlreadyExists, "output already exists"),
            ));
        }
        if output.is_dir() {
            return Err(BuildError::compile_failed(
                output,
                io::Error::new(io::ErrorKind::Other, "output is a directory"),
            ));
        }
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::compile_failed(output, e))?;
    }
    Ok(())
}

/// Attach the output path to container write failures
pub(crate) fn at_output(output: &Path) -> impl Fn(BuildError) -> BuildError + '_ {
    move |error| match error {
        BuildError::Container(source) => BuildError::compile_failed(output, source),
        BuildError::Io(source) => BuildError::compile_failed(output, source),
        other => other,
    }
}

/// Single-quote `value` for POSIX sh
pub(crate) fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
