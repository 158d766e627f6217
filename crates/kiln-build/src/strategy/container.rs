use super::{at_output, prepare_output, PackageCompiler};
use crate::builder::Builder;
use crate::error::{BuildError, BuildResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

/// Writes the package container as the artifact
#[derive(Debug)]
pub struct ContainerCompiler {
    builder: Builder,
}

impl ContainerCompiler {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }

    pub fn into_builder(self) -> Builder {
        self.builder
    }
}

impl PackageCompiler for ContainerCompiler {
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

        let file = File::create(&output).map_err(|e| BuildError::compile_failed(&output, e))?;
        let mut out = self
            .builder
            .write_container(BufWriter::new(file))
            .map_err(at_output(&output))?;
        out.flush()
            .map_err(|e| BuildError::compile_failed(&output, e))?;

        info!(output = %output.display(), "wrote package container");
        self.builder.reporter().finished(&output);
        Ok(output)
    }
}
