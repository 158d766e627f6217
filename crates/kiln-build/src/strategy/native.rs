//! Self-extracting native executable
//!
//! The container is embedded as a byte array in a small C program. At run
//! time the program writes the container to a temporary file and execs the
//! configured runner on it (`<runner> run <file> [args...]`).

use super::{at_output, prepare_output, PackageCompiler};
use crate::builder::Builder;
use crate::error::{BuildError, BuildResult};
use crate::script::wait_with_timeout;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

const STUB_TEMPLATE: &str = r#"#include <stdio.h>
#include <stdlib.h>
#include <unistd.h>

static const unsigned char KILN_PAYLOAD[] = {
@PAYLOAD@};

static const char KILN_RUNNER[] = "@RUNNER@";

int main(int argc, char **argv) {
    const char *dir = getenv("TMPDIR");
    char path[4096];
    snprintf(path, sizeof path, "%s/kiln-XXXXXX", dir && *dir ? dir : "/tmp");

    int fd = mkstemp(path);
    if (fd < 0) {
        perror("kiln: mkstemp");
        return 1;
    }

    size_t written = 0;
    while (written < sizeof KILN_PAYLOAD) {
        ssize_t n = write(fd, KILN_PAYLOAD + written, sizeof KILN_PAYLOAD - written);
        if (n <= 0) {
            perror("kiln: write");
            close(fd);
            unlink(path);
            return 1;
        }
        written += (size_t)n;
    }
    close(fd);

    char **args = calloc((size_t)argc + 3, sizeof *args);
    if (!args) {
        unlink(path);
        return 1;
    }
    args[0] = (char *)KILN_RUNNER;
    args[1] = "run";
    args[2] = path;
    for (int i = 1; i < argc; i++) {
        args[i + 2] = argv[i];
    }

    execvp(KILN_RUNNER, args);
    perror("kiln: exec");
    unlink(path);
    return 127;
}
"#;

/// Links the container into a native executable
#[derive(Debug)]
pub struct NativeCompiler {
    builder: Builder,
}

impl NativeCompiler {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }

    pub fn into_builder(self) -> Builder {
        self.builder
    }

    fn link(&self, compiler: &Path, source: &Path, output: &Path) -> BuildResult<()> {
        let timeout = self.builder.options().tool_timeout();
        debug!(compiler = %compiler.display(), source = %source.display(), "linking bootstrap");

        let child = Command::new(compiler)
            .arg("-O2")
            .arg("-o")
            .arg(output)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::compile_failed(output, e))?;

        let result = wait_with_timeout(child, timeout)
            .map_err(|e| BuildError::compile_failed(output, e))?;

        let Some(result) = result else {
            return Err(BuildError::compile_failed(
                output,
                format!(
                    "{} timed out after {} seconds",
                    compiler.display(),
                    timeout.as_secs()
                ),
            ));
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(BuildError::compile_failed(
                output,
                format!(
                    "{} failed ({}): {}",
                    compiler.display(),
                    result.status,
                    stderr.trim()
                ),
            ));
        }
        Ok(())
    }
}

impl PackageCompiler for NativeCompiler {
    fn builder(&self) -> &Builder {
        &self.builder
    }

    fn builder_mut(&mut self) -> &mut Builder {
        &mut self.builder
    }

    fn compile(&mut self, overwrite: bool) -> BuildResult<PathBuf> {
        let output = self.builder.output_path().to_path_buf();
        self.builder.reporter().stage("compile");

        let tool = &self.builder.options().native_compiler;
        let compiler = which::which(tool).map_err(|source| BuildError::ToolNotFound {
            tool: tool.clone(),
            source,
        })?;

        prepare_output(&output, overwrite)?;

        // Dropped on every return path
        let workdir = tempfile::Builder::new()
            .prefix("kiln-native-")
            .tempdir()
            .map_err(|e| BuildError::compile_failed(&output, e))?;

        let container = self
            .builder
            .write_container(Vec::new())
            .map_err(at_output(&output))?;
        let source = workdir.path().join("bootstrap.c");
        fs::write(&source, render_stub(&container, &self.builder.options().runner))
            .map_err(|e| BuildError::compile_failed(&output, e))?;

        self.link(&compiler, &source, &output)?;

        info!(output = %output.display(), bytes = container.len(), "linked self-extracting executable");
        self.builder.reporter().finished(&output);
        Ok(output)
    }
}

/// C source for the bootstrap with `payload` embedded
pub(crate) fn render_stub(payload: &[u8], runner: &str) -> String {
    STUB_TEMPLATE
        .replace("@RUNNER@", &c_escape(runner))
        .replace("@PAYLOAD@", &byte_array(payload))
}

/// Comma-separated hex literals, 16 per line
fn byte_array(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 6);
    for chunk in bytes.chunks(16) {
        out.push_str("    ");
        for byte in chunk {
            let _ = write!(out, "0x{:02x},", byte);
        }
        out.push('\n');
    }
    out
}

fn c_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "\\x{:02x}\"\"", byte);
                }
            }
        }
    }
    out
}
