//! Execution unit definitions

use crate::metadata::{from_cbor, to_cbor};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Kind of execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Script file run by the project's interpreter
    Script,
    /// Script file served in a hosted (web) environment
    Web,
    /// Shell command line
    Command,
}

impl UnitKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Web => "web",
            Self::Command => "command",
        }
    }

    /// Whether the unit target is a file relative to the project root
    pub fn targets_file(&self) -> bool {
        matches!(self, Self::Script | Self::Web)
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A named unit of executable logic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionUnit {
    /// Unit name (filled from the manifest table key)
    #[serde(default)]
    pub name: String,
    pub kind: UnitKind,
    /// Script path or command line
    pub target: String,
    /// Files that must exist relative to the project root
    #[serde(default)]
    pub required_files: Vec<String>,
    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl ExecutionUnit {
    /// Create a script unit
    pub fn script(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, UnitKind::Script, path)
    }

    /// Create a web unit
    pub fn web(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, UnitKind::Web, path)
    }

    /// Create a command unit
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, UnitKind::Command, command)
    }

    fn new(name: impl Into<String>, kind: UnitKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            required_files: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_required_files(mut self, files: Vec<String>) -> Self {
        self.required_files = files;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        to_cbor("execution unit", self)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        from_cbor("execution unit", data)
    }
}
