//! Header and assembly payloads (CBOR-encoded)
//!
//! Both payloads are field-name keyed maps so that readers tolerate fields
//! added by newer writers. New fields must carry `#[serde(default)]`.

use crate::codec::Compression;
use crate::{ContainerError, Result, FORMAT_VERSION};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pointer to where a dependency comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageSource {
    /// Package id (e.g. `org.vendor.tool`)
    pub package: String,
    /// Version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Local path or remote identifier (e.g. `vendor/tool`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl PackageSource {
    /// Create a source for a package id
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: None,
            origin: None,
        }
    }

    /// Set the version constraint
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the origin
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// A dependency as recorded in a built package's header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReference {
    pub name: String,
    pub version: String,
    /// Whether the dependency was embedded into the package
    #[serde(default, rename = "static")]
    pub static_link: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PackageSource>,
}

impl DependencyReference {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            static_link: false,
            source: None,
        }
    }

    pub fn with_static_link(mut self, static_link: bool) -> Self {
        self.static_link = static_link;
        self
    }

    pub fn with_source(mut self, source: PackageSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// How a component payload was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Serialized tree produced by a component parser
    Structured,
    /// Raw file bytes
    Opaque,
}

/// Container header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub format_version: u16,
    /// Codec applied to component and resource payloads
    #[serde(default)]
    pub compression: Compression,
    /// Content fingerprint of the collected sources
    pub build_number: String,
    /// Build configuration that produced the package
    #[serde(default)]
    pub build: String,
    /// RFC 3339 creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyReference>,
    /// Component name -> payload kind
    #[serde(default)]
    pub component_kinds: BTreeMap<String, ComponentKind>,
}

impl Header {
    /// Create a header for the given build number
    pub fn new(build_number: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            compression: Compression::none(),
            build_number: build_number.into(),
            build: String::new(),
            created: None,
            dependencies: Vec::new(),
            component_kinds: BTreeMap::new(),
        }
    }

    /// Set the build configuration name
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = build.into();
        self
    }

    /// Set the dependency references
    pub fn with_dependencies(mut self, dependencies: Vec<DependencyReference>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set the component kinds
    pub fn with_component_kinds(mut self, kinds: BTreeMap<String, ComponentKind>) -> Self {
        self.component_kinds = kinds;
        self
    }

    /// Stamp the current time as the creation time
    pub fn stamped(mut self) -> Self {
        self.created = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// Find a dependency reference by name
    pub fn dependency(&self, name: &str) -> Option<&DependencyReference> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        to_cbor("header", self)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        from_cbor("header", data)
    }
}

/// Assembly metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    /// Display name
    pub name: String,
    /// Dotted package id
    pub package: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

impl Assembly {
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            version: version.into(),
            description: None,
            authors: Vec::new(),
            license: None,
            homepage: None,
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        to_cbor("assembly", self)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        from_cbor("assembly", data)
    }
}

pub(crate) fn to_cbor<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ContainerError::encode(what, e))?;
    Ok(buf)
}

pub(crate) fn from_cbor<T: DeserializeOwned>(what: &'static str, data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| ContainerError::decode(what, e))
}
