//! Typed build options
//!
//! Options are read from `[builds.<name>.options]`, validated once when the
//! manifest is loaded, and may be overridden from the environment:
//! `KILN_STATIC`, `KILN_COMPRESS`, `KILN_COMPRESSION_LEVEL`.

use crate::validator::ValidationError;
use kiln_format::Compression;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Build options for one build configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BuildOptions {
    /// Embed dependencies instead of referencing them
    #[serde(rename = "static")]
    pub static_link: bool,
    /// Deflate component and resource payloads
    pub compress: bool,
    /// Compression level, 1-9
    pub compression_level: u32,
    /// Generate stubs that only set up loading, without dispatching
    pub skip_execution: bool,
    /// Native compiler used for self-extracting executables
    pub native_compiler: String,
    /// Launcher exec'd by self-extracting executables
    pub runner: String,
    /// Timeout for external tools, in seconds
    pub tool_timeout: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            static_link: false,
            compress: true,
            compression_level: 6,
            skip_execution: false,
            native_compiler: "cc".to_string(),
            runner: "kiln".to_string(),
            tool_timeout: 300,
        }
    }
}

impl BuildOptions {
    /// Compression setting for the container writer
    pub fn compression(&self) -> Compression {
        if self.compress {
            Compression::deflate(self.compression_level)
        } else {
            Compression::none()
        }
    }

    /// Timeout for external tools
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout)
    }

    /// Check option values
    pub fn validate(&self, build: &str) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(1..=9).contains(&self.compression_level) {
            errors.push(ValidationError::InvalidOption {
                build: build.to_string(),
                option: "compression-level".to_string(),
                reason: format!("{} is outside 1-9", self.compression_level),
            });
        }
        if self.native_compiler.trim().is_empty() {
            errors.push(ValidationError::InvalidOption {
                build: build.to_string(),
                option: "native-compiler".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if self.runner.trim().is_empty() {
            errors.push(ValidationError::InvalidOption {
                build: build.to_string(),
                option: "runner".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if self.tool_timeout == 0 {
            errors.push(ValidationError::InvalidOption {
                build: build.to_string(),
                option: "tool-timeout".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply `KILN_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ValidationError> {
        if let Ok(value) = env::var("KILN_STATIC") {
            self.static_link = parse_flag(&value);
        }

        if let Ok(value) = env::var("KILN_COMPRESS") {
            self.compress = parse_flag(&value);
        }

        if let Ok(value) = env::var("KILN_COMPRESSION_LEVEL") {
            self.compression_level =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ValidationError::InvalidOption {
                        build: "environment".to_string(),
                        option: "KILN_COMPRESSION_LEVEL".to_string(),
                        reason: format!("'{}' is not a number", value),
                    })?;
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
