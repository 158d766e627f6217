//! Container sections and their fixed ordering

use serde::{Deserialize, Serialize};

/// Container section, doubling as the writer/reader state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    /// Package header (single unnamed entry)
    Header,
    /// Assembly metadata (single unnamed entry)
    Assembly,
    /// Execution units (named entries)
    ExecutionUnits,
    /// Compiled components (named entries)
    Components,
    /// Resource files (named entries)
    Resources,
    /// Terminal state after Resources has been ended
    Closed,
}

impl Section {
    /// Sections in the order they appear in a container
    pub fn all() -> [Section; 5] {
        [
            Self::Header,
            Self::Assembly,
            Self::ExecutionUnits,
            Self::Components,
            Self::Resources,
        ]
    }

    /// Tag byte written at the start of the section
    pub fn tag(&self) -> u8 {
        match self {
            Self::Header => 1,
            Self::Assembly => 2,
            Self::ExecutionUnits => 3,
            Self::Components => 4,
            Self::Resources => 5,
            Self::Closed => 0,
        }
    }

    /// Section for a tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Header),
            2 => Some(Self::Assembly),
            3 => Some(Self::ExecutionUnits),
            4 => Some(Self::Components),
            5 => Some(Self::Resources),
            _ => None,
        }
    }

    /// The section that follows this one
    pub fn next(&self) -> Self {
        match self {
            Self::Header => Self::Assembly,
            Self::Assembly => Self::ExecutionUnits,
            Self::ExecutionUnits => Self::Components,
            Self::Components => Self::Resources,
            Self::Resources | Self::Closed => Self::Closed,
        }
    }

    /// Whether entries in this section carry names
    pub fn is_named(&self) -> bool {
        matches!(
            self,
            Self::ExecutionUnits | Self::Components | Self::Resources
        )
    }

    /// Whether entry payloads in this section pass through the codec
    pub fn is_compressible(&self) -> bool {
        matches!(self, Self::Components | Self::Resources)
    }

    /// Section name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Assembly => "assembly",
            Self::ExecutionUnits => "execution-units",
            Self::Components => "components",
            Self::Resources => "resources",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
