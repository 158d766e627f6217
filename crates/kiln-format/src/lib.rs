//! Kiln package container format
//!
//! A container is a magic-prefixed, versioned byte stream holding five
//! sections in a fixed order:
//! - Header (one unnamed CBOR entry)
//! - Assembly (one unnamed CBOR entry)
//! - ExecutionUnits (named CBOR entries)
//! - Components (named raw entries, optionally deflated)
//! - Resources (named raw entries, optionally deflated)
//!
//! [`ContainerWriter`] and [`ContainerReader`] enforce the section order as a
//! state machine. [`PackageArchive`] loads a complete container into memory.

pub mod archive;
pub mod codec;
pub mod metadata;
pub mod reader;
pub mod section;
pub mod unit;
pub mod writer;

pub use archive::PackageArchive;
pub use codec::{Codec, Compression};
pub use metadata::{Assembly, ComponentKind, DependencyReference, Header, PackageSource};
pub use reader::{ContainerReader, Entry, SectionIndex};
pub use section::Section;
pub use unit::{ExecutionUnit, UnitKind};
pub use writer::ContainerWriter;

/// Leading bytes of every container
pub const MAGIC: &[u8; 8] = b"KILNPKG\0";

/// Bytes written after the Resources section trailer
pub const END_MARKER: &[u8; 8] = b"KILNEND\0";

/// Current container format version
pub const FORMAT_VERSION: u16 = 1;

/// Conventional file extension for containers
pub const PACKAGE_EXTENSION: &str = "kpkg";

/// Container errors
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode {what}: {error}")]
    Encode { what: &'static str, error: String },

    #[error("Failed to decode {what}: {error}")]
    Decode { what: &'static str, error: String },

    #[error("Not a kiln package: bad magic bytes")]
    BadMagic,

    #[error("Unsupported container format version {0}")]
    UnsupportedVersion(u16),

    #[error("Container is already closed")]
    Closed,

    #[error("Cannot {operation} while in the {section} section")]
    InvalidState {
        operation: &'static str,
        section: Section,
    },

    #[error("Entries in the {0} section must be named")]
    UnnamedEntry(Section),

    #[error("The {0} section holds a single unnamed entry")]
    NamedEntry(Section),

    #[error("Duplicate entry '{name}' in the {section} section")]
    DuplicateEntry { name: String, section: Section },

    #[error("The {0} section has not been indexed")]
    NotIndexed(Section),

    #[error("Entry '{name}' not found in the {section} section")]
    EntryNotFound { name: String, section: Section },

    #[error("Container is truncated: {0}")]
    Truncated(String),

    #[error("Container is corrupt: {0}")]
    Corrupt(String),
}

impl ContainerError {
    /// Create an encode error
    pub fn encode(what: &'static str, error: impl ToString) -> Self {
        Self::Encode {
            what,
            error: error.to_string(),
        }
    }

    /// Create a decode error
    pub fn decode(what: &'static str, error: impl ToString) -> Self {
        Self::Decode {
            what,
            error: error.to_string(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, section: Section) -> Self {
        Self::InvalidState { operation, section }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
