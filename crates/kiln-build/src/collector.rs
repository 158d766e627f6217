//! File collection by include/exclude glob patterns
//!
//! Patterns are matched against paths relative to the collection root.
//! A pattern with a leading `/` is anchored at the root (`/tests/*` removes
//! everything under `<root>/tests`); any other pattern is matched against the
//! unanchored relative path. `*` crosses directory separators, so `*.lua`
//! matches at any depth. Exclusions always win.

use crate::error::{BuildError, BuildResult};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled include/exclude pattern set
#[derive(Debug, Clone)]
pub struct FileCollector {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileCollector {
    /// Compile include and exclude patterns
    pub fn new(include: &[String], exclude: &[String]) -> BuildResult<Self> {
        Ok(Self {
            include: compile("include", include)?,
            exclude: compile("exclude", exclude)?,
        })
    }

    /// Whether a root-relative path (with `/` separators) is selected
    pub fn matches(&self, relative: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| test(p, relative));
        included && !self.exclude.iter().any(|p| test(p, relative))
    }

    /// Walk `root` and return the selected files.
    ///
    /// Paths are absolute and deduplicated, in sorted directory-walk order.
    pub fn collect(&self, root: &Path) -> BuildResult<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(BuildError::invalid_input(root, "not a directory"));
        }
        let root = root
            .canonicalize()
            .map_err(|e| BuildError::io(root, e))?;

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = relative_name(&root, entry.path()) else {
                continue;
            };
            if self.matches(&relative) && seen.insert(entry.path().to_path_buf()) {
                files.push(entry.into_path());
            }
        }

        debug!(root = %root.display(), count = files.len(), "collected files");
        Ok(files)
    }
}

/// Collect files under `root` selected by `include` and not by `exclude`
pub fn collect(root: &Path, include: &[String], exclude: &[String]) -> BuildResult<Vec<PathBuf>> {
    FileCollector::new(include, exclude)?.collect(root)
}

/// Path of `path` relative to `root`, with `/` separators
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn compile(set: &'static str, patterns: &[String]) -> BuildResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|source| BuildError::InvalidPattern {
                set,
                pattern: raw.clone(),
                source,
            })
        })
        .collect()
}

fn test(pattern: &Pattern, relative: &str) -> bool {
    if pattern.as_str().starts_with('/') {
        pattern.matches_with(&format!("/{}", relative), MATCH_OPTIONS)
    } else {
        pattern.matches_with(relative, MATCH_OPTIONS)
    }
}
