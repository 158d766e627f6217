//! Fully indexed, in-memory view of a container

use crate::metadata::{Assembly, Header};
use crate::reader::{ContainerReader, SectionIndex};
use crate::section::Section;
use crate::unit::ExecutionUnit;
use crate::Result;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A package container read to completion
#[derive(Debug, Clone)]
pub struct PackageArchive {
    pub header: Header,
    pub assembly: Assembly,
    pub execution_units: Vec<ExecutionUnit>,
    components: SectionIndex,
    resources: SectionIndex,
}

impl PackageArchive {
    /// Read a container file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a container from any byte source
    pub fn from_reader<R: Read>(inner: R) -> Result<Self> {
        let mut reader = ContainerReader::new(inner)?;
        let header = reader.read_header()?;
        let assembly = reader.read_assembly()?;

        let mut execution_units = Vec::new();
        while let Some(unit) = reader.next_execution_unit()? {
            execution_units.push(unit);
        }

        reader.index_section()?;
        reader.index_section()?;

        Ok(Self {
            header,
            assembly,
            execution_units,
            components: reader.take_index(Section::Components)?,
            resources: reader.take_index(Section::Resources)?,
        })
    }

    /// Find an execution unit by name
    pub fn execution_unit(&self, name: &str) -> Option<&ExecutionUnit> {
        self.execution_units.iter().find(|u| u.name == name)
    }

    /// Names of all execution units
    pub fn execution_unit_names(&self) -> Vec<&str> {
        self.execution_units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Decompressed component payload
    pub fn component(&self, name: &str) -> Option<&[u8]> {
        self.components.get(name)
    }

    /// Decompressed resource payload
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name)
    }

    pub fn components(&self) -> &SectionIndex {
        &self.components
    }

    pub fn resources(&self) -> &SectionIndex {
        &self.resources
    }
}
