//! Component serializer contract
//!
//! A serializer turns a component source file into the payload stored in the
//! container. Parsers that produce a structured tree report
//! [`ComponentKind::Structured`]; anything that fails falls back to the raw
//! file bytes and never aborts the build.

use crate::error::{BuildError, BuildResult, Cause};
use kiln_format::ComponentKind;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Payload produced for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedComponent {
    pub payload: Vec<u8>,
    pub kind: ComponentKind,
}

impl SerializedComponent {
    pub fn opaque(payload: Vec<u8>) -> Self {
        Self {
            payload,
            kind: ComponentKind::Opaque,
        }
    }

    pub fn structured(payload: Vec<u8>) -> Self {
        Self {
            payload,
            kind: ComponentKind::Structured,
        }
    }
}

/// Turns a component file into a container payload
pub trait ComponentSerializer: Send + Sync {
    fn serialize(&self, path: &Path) -> Result<SerializedComponent, Cause>;
}

/// Stores component files as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueSerializer;

impl ComponentSerializer for OpaqueSerializer {
    fn serialize(&self, path: &Path) -> Result<SerializedComponent, Cause> {
        Ok(SerializedComponent::opaque(fs::read(path)?))
    }
}

/// Serialize a component, falling back to its raw bytes on failure
pub fn serialize_component(
    serializer: &dyn ComponentSerializer,
    path: &Path,
) -> BuildResult<SerializedComponent> {
    match serializer.serialize(path) {
        Ok(component) => Ok(component),
        Err(error) => {
            warn!(path = %path.display(), %error, "component serializer failed, storing raw bytes");
            let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
            Ok(SerializedComponent::opaque(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl ComponentSerializer for Failing {
        fn serialize(&self, _path: &Path) -> Result<SerializedComponent, Cause> {
            Err("parse error".into())
        }
    }

    struct Upper;

    impl ComponentSerializer for Upper {
        fn serialize(&self, path: &Path) -> Result<SerializedComponent, Cause> {
            let text = fs::read_to_string(path)?;
            Ok(SerializedComponent::structured(text.to_uppercase().into_bytes()))
        }
    }

    #[test]
    fn test_fallback_to_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.lua");
        fs::write(&path, "return 1").unwrap();

        let component = serialize_component(&Failing, &path).unwrap();
        assert_eq!(component, SerializedComponent::opaque(b"return 1".to_vec()));
    }

    #[test]
    fn test_structured_result_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.lua");
        fs::write(&path, "return 1").unwrap();

        let component = serialize_component(&Upper, &path).unwrap();
        assert_eq!(component.kind, ComponentKind::Structured);
        assert_eq!(component.payload, b"RETURN 1");
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let err = serialize_component(&OpaqueSerializer, Path::new("/nonexistent/a.lua"));
        assert!(matches!(err, Err(BuildError::IoError { .. })));
    }
}
