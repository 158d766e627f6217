//! Execution unit runner
//!
//! Runs lifecycle units at build time with timeout enforcement and output
//! capture. Script units run through the project's interpreter, command
//! units through `sh -c`. Web units only run in hosted environments.

use crate::error::{BuildError, BuildResult};
use kiln_format::{ExecutionUnit, UnitKind};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Timeout applied to units that declare none
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Unit execution context
#[derive(Debug, Clone)]
pub struct UnitContext {
    /// Working directory
    pub project_root: PathBuf,
    pub source_dir: PathBuf,
    pub output: PathBuf,
    pub package: String,
    pub version: String,
    pub build: String,
    pub build_number: String,
    /// Interpreter for script units
    pub interpreter: String,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
}

impl UnitContext {
    /// Get environment variables for unit execution
    pub fn environment(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert("KILN_PACKAGE".to_string(), self.package.clone());
        env.insert("KILN_VERSION".to_string(), self.version.clone());
        env.insert("KILN_BUILD".to_string(), self.build.clone());
        env.insert("KILN_BUILD_NUMBER".to_string(), self.build_number.clone());
        env.insert(
            "KILN_SOURCE_DIR".to_string(),
            self.source_dir.display().to_string(),
        );
        env.insert("KILN_OUTPUT".to_string(), self.output.display().to_string());

        for (key, value) in &self.env_vars {
            env.insert(key.clone(), value.clone());
        }

        env
    }
}

/// Unit execution result
#[derive(Debug)]
pub struct UnitResult {
    pub name: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
}

impl UnitResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs execution units in a [`UnitContext`]
pub struct UnitExecutor {
    context: UnitContext,
}

impl UnitExecutor {
    pub fn new(context: UnitContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &UnitContext {
        &self.context
    }

    /// Run one unit; a non-zero exit or timeout is an error
    pub fn execute(&self, unit: &ExecutionUnit) -> BuildResult<UnitResult> {
        info!(unit = %unit.name, kind = %unit.kind, "running execution unit");

        let mut command = match unit.kind {
            UnitKind::Script => {
                let script = self.context.project_root.join(&unit.target);
                if !script.is_file() {
                    return Err(BuildError::RequiredFileMissing {
                        unit: unit.name.clone(),
                        path: script,
                    });
                }
                let mut command = Command::new(&self.context.interpreter);
                command.arg(script);
                command
            }
            UnitKind::Command => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(&unit.target);
                command
            }
            UnitKind::Web => {
                return Err(BuildError::unit_failed(
                    &unit.name,
                    "web units cannot run at build time",
                ));
            }
        };

        let start = Instant::now();
        let child = command
            .current_dir(&self.context.project_root)
            .envs(self.context.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::unit_failed(&unit.name, format!("failed to spawn: {}", e)))?;

        let timeout = unit.timeout.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT);
        let result = wait(&unit.name, child, timeout, start)?;

        for line in result.stdout.lines() {
            debug!("[{}] {}", unit.name, line);
        }
        for line in result.stderr.lines() {
            warn!("[{}] {}", unit.name, line);
        }

        if !result.success() {
            return Err(BuildError::unit_failed(
                &unit.name,
                format!("exited with code {}", result.exit_code),
            ));
        }

        debug!(
            unit = %unit.name,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "execution unit finished"
        );
        Ok(result)
    }

    /// Run units in order, stopping at the first failure
    pub fn execute_all(&self, units: &[&ExecutionUnit]) -> BuildResult<Vec<UnitResult>> {
        units.iter().map(|unit| self.execute(unit)).collect()
    }
}

fn wait(name: &str, child: Child, timeout: Duration, start: Instant) -> BuildResult<UnitResult> {
    let output = wait_with_timeout(child, timeout)
        .map_err(|e| BuildError::unit_failed(name, e))?
        .ok_or_else(|| {
            BuildError::unit_failed(name, format!("timed out after {} seconds", timeout.as_secs()))
        })?;

    Ok(UnitResult {
        name: name.to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        execution_time: start.elapsed(),
    })
}

/// Wait for `child` with its pipes drained concurrently.
///
/// Returns `None` when the child outlived `timeout` and was killed.
pub(crate) fn wait_with_timeout(mut child: Child, timeout: Duration) -> io::Result<Option<Output>> {
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            // Readers finish once every holder of the pipes exits
            return Ok(None);
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    Ok(Some(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    }))
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
