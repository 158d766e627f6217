//! Shell script with the container appended
//!
//! The script header extracts everything after the sentinel line into a
//! temporary file and hands it to the runner. It never reads past `exit`.

use super::{at_output, prepare_output, sh_quote, PackageCompiler};
use crate::builder::Builder;
use crate::error::{BuildError, BuildResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

/// Line separating the script header from the container bytes
pub const PAYLOAD_SENTINEL: &str = "__KILN_PAYLOAD__";

/// Prepends a shell bootstrap to the container
#[derive(Debug)]
pub struct WrappedCompiler {
    builder: Builder,
}

impl WrappedCompiler {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }

    pub fn into_builder(self) -> Builder {
        self.builder
    }

    fn header(&self) -> String {
        let config = self.builder.config();
        let lifecycle = &config.lifecycle;
        let runner = &self.builder.options().runner;

        let mut script = String::new();
        script.push_str("#!/bin/sh\n");
        script.push_str(&format!(
            "# {} {} (build {}), generated by kiln\n",
            config.package.package,
            config.package.version,
            self.builder.build_number()
        ));
        script.push_str(&format!("KILN_RUNNER=${{KILN_RUNNER:-{}}}\n", sh_quote(runner)));
        script.push_str("if ! command -v \"$KILN_RUNNER\" >/dev/null 2>&1; then\n");
        script.push_str("    echo \"kiln: runner '$KILN_RUNNER' not found\" >&2\n");
        script.push_str("    exit 127\n");
        script.push_str("fi\n");

        let entry = lifecycle.entry_point.as_deref().unwrap_or("");
        let web_entry = lifecycle.web_entry_point.as_deref().unwrap_or(entry);
        script.push_str(&format!("KILN_UNIT={}\n", sh_quote(entry)));
        script.push_str("if [ -n \"${GATEWAY_INTERFACE:-}\" ] || [ -n \"${REQUEST_METHOD:-}\" ]; then\n");
        script.push_str(&format!("    KILN_UNIT={}\n", sh_quote(web_entry)));
        script.push_str("fi\n");

        script.push_str("KILN_PACKAGE_FILE=\"$(mktemp \"${TMPDIR:-/tmp}/kiln.XXXXXX\")\" || exit 1\n");
        script.push_str("trap 'rm -f \"$KILN_PACKAGE_FILE\"' EXIT\n");
        script.push_str(&format!(
            "line=$(awk '/^{}$/ {{ print NR + 1; exit }}' \"$0\")\n",
            PAYLOAD_SENTINEL
        ));
        script.push_str("tail -n +\"$line\" \"$0\" > \"$KILN_PACKAGE_FILE\"\n");
        script.push_str("status=0\n");
        script.push_str("if [ -n \"$KILN_UNIT\" ]; then\n");
        script.push_str(
            "    \"$KILN_RUNNER\" run --unit \"$KILN_UNIT\" \"$KILN_PACKAGE_FILE\" \"$@\" || status=$?\n",
        );
        script.push_str("else\n");
        script.push_str("    \"$KILN_RUNNER\" run \"$KILN_PACKAGE_FILE\" \"$@\" || status=$?\n");
        script.push_str("fi\n");
        script.push_str("exit $status\n");
        script.push_str(PAYLOAD_SENTINEL);
        script.push('\n');
        script
    }
}

impl PackageCompiler for WrappedCompiler {
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
        let mut out = BufWriter::new(file);
        out.write_all(self.header().as_bytes())
            .map_err(|e| BuildError::compile_failed(&output, e))?;
        let mut out = self
            .builder
            .write_container(out)
            .map_err(at_output(&output))?;
        out.flush()
            .map_err(|e| BuildError::compile_failed(&output, e))?;
        drop(out);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| BuildError::compile_failed(&output, e))?;
        }

        info!(output = %output.display(), "wrote wrapped script");
        self.builder.reporter().finished(&output);
        Ok(output)
    }
}
