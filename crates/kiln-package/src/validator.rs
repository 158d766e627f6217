//! Project manifest validation

use crate::manifest::{Dependency, ProjectConfiguration};
use crate::version::VersionConstraint;
use kiln_format::{ExecutionUnit, UnitKind};
use std::collections::BTreeMap;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid package id format
    InvalidPackageId(String),
    /// Missing required field
    MissingField(String),
    /// Invalid source extension
    InvalidExtension(String),
    /// Malformed execution unit
    InvalidUnit { name: String, reason: String },
    /// Invalid dependency specification
    InvalidDependency { name: String, reason: String },
    /// Invalid build configuration
    InvalidBuild { name: String, reason: String },
    /// Invalid build option value
    InvalidOption {
        build: String,
        option: String,
        reason: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidPackageId(id) => {
                write!(f, "Invalid package id: {}", id)
            }
            ValidationError::MissingField(field) => {
                write!(f, "Missing required field: {}", field)
            }
            ValidationError::InvalidExtension(ext) => {
                write!(f, "Invalid source extension: {}", ext)
            }
            ValidationError::InvalidUnit { name, reason } => {
                write!(f, "Invalid execution unit '{}': {}", name, reason)
            }
            ValidationError::InvalidDependency { name, reason } => {
                write!(f, "Invalid dependency '{}': {}", name, reason)
            }
            ValidationError::InvalidBuild { name, reason } => {
                write!(f, "Invalid build '{}': {}", name, reason)
            }
            ValidationError::InvalidOption {
                build,
                option,
                reason,
            } => {
                write!(f, "Invalid option '{}' in build '{}': {}", option, build, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Project manifest validator
pub struct Validator;

impl Validator {
    /// Validate a project manifest, collecting every problem found
    pub fn validate(config: &ProjectConfiguration) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.package.name.trim().is_empty() {
            errors.push(ValidationError::MissingField("package.name".to_string()));
        }
        if let Err(e) = Self::validate_package_id(&config.package.package) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_extension(&config.source.extension) {
            errors.push(e);
        }

        for (name, unit) in &config.units {
            if let Err(e) = Self::validate_unit(name, unit) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_dependencies(&config.dependencies));

        for (name, build) in &config.builds {
            if build.output.trim().is_empty() {
                errors.push(ValidationError::InvalidBuild {
                    name: name.clone(),
                    reason: "output template cannot be empty".to_string(),
                });
            }
            if let Err(option_errors) = build.options.validate(name) {
                errors.extend(option_errors);
            }
            errors.extend(Self::validate_dependencies(&build.dependencies));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate dotted package id format (`org.vendor.tool`)
    pub fn validate_package_id(id: &str) -> Result<(), ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::InvalidPackageId(
                "Package id cannot be empty".to_string(),
            ));
        }

        if id.split('.').any(str::is_empty) {
            return Err(ValidationError::InvalidPackageId(format!(
                "'{}' has an empty segment",
                id
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidPackageId(format!(
                "'{}' contains invalid characters (only letters, digits, ., -, _ allowed)",
                id
            )));
        }

        if id.len() > 128 {
            return Err(ValidationError::InvalidPackageId(format!(
                "'{}' exceeds maximum length of 128 characters",
                id
            )));
        }

        Ok(())
    }

    /// Validate the source extension
    pub fn validate_extension(ext: &str) -> Result<(), ValidationError> {
        if ext.is_empty() {
            return Err(ValidationError::MissingField("source.extension".to_string()));
        }
        if ext.contains(['.', '/', '\\', '*']) {
            return Err(ValidationError::InvalidExtension(format!(
                "'{}' must be a bare extension without dots or path separators",
                ext
            )));
        }
        Ok(())
    }

    /// Validate the shape of an execution unit
    pub fn validate_unit(name: &str, unit: &ExecutionUnit) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidUnit {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if unit.target.trim().is_empty() {
            return Err(invalid("target cannot be empty"));
        }
        if unit.kind.targets_file() && std::path::Path::new(&unit.target).is_absolute() {
            return Err(invalid("file targets must be relative to the project root"));
        }
        if unit.kind == UnitKind::Command && unit.target.contains('\0') {
            return Err(invalid("command contains a NUL byte"));
        }
        if unit.timeout == Some(0) {
            return Err(invalid("timeout must be at least one second"));
        }
        if unit.required_files.iter().any(|f| f.trim().is_empty()) {
            return Err(invalid("required-files contains an empty path"));
        }

        Ok(())
    }

    /// Validate dependency declarations
    pub fn validate_dependencies(deps: &BTreeMap<String, Dependency>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (name, dep) in deps {
            if let Err(ValidationError::InvalidPackageId(reason)) = Self::validate_package_id(name)
            {
                errors.push(ValidationError::InvalidDependency {
                    name: name.clone(),
                    reason,
                });
                continue;
            }

            if let Some(constraint) = dep.version_constraint() {
                if let Err(e) = VersionConstraint::parse(constraint) {
                    errors.push(ValidationError::InvalidDependency {
                        name: name.clone(),
                        reason: format!("Invalid version constraint '{}': {}", constraint, e),
                    });
                }
            }

            if let Dependency::Detailed(detailed) = dep {
                if detailed.source.as_deref().is_some_and(|s| s.trim().is_empty()) {
                    errors.push(ValidationError::InvalidDependency {
                        name: name.clone(),
                        reason: "source cannot be empty".to_string(),
                    });
                }
            }
        }

        errors
    }
}
