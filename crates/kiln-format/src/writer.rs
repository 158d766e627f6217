//! Streaming container writer
//!
//! The writer is a state machine over [`Section`]. Header and Assembly take
//! exactly one unnamed entry and advance on their own; the named sections
//! stay open until [`ContainerWriter::end_section`] is called. Ending the
//! Resources section writes the end marker and closes the container.

use crate::codec::Compression;
use crate::metadata::{Assembly, Header};
use crate::section::Section;
use crate::unit::ExecutionUnit;
use crate::{ContainerError, Result, END_MARKER, FORMAT_VERSION, MAGIC};
use std::collections::HashSet;
use std::io::Write;

pub(crate) const ENTRY_MARKER: u8 = 0x01;
pub(crate) const TRAILER_MARKER: u8 = 0x00;

/// Sequential writer for a package container
#[derive(Debug)]
pub struct ContainerWriter<W: Write> {
    inner: W,
    section: Section,
    compression: Compression,
    /// Whether the current section's tag byte has been written
    section_started: bool,
    entry_count: u32,
    names: HashSet<String>,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a container, writing the magic bytes and format version
    pub fn new(mut inner: W, compression: Compression) -> Result<Self> {
        inner.write_all(MAGIC)?;
        inner.write_all(&FORMAT_VERSION.to_le_bytes())?;

        Ok(Self {
            inner,
            section: Section::Header,
            compression,
            section_started: false,
            entry_count: 0,
            names: HashSet::new(),
        })
    }

    /// Current section
    pub fn section(&self) -> Section {
        self.section
    }

    /// True once the Resources section has been ended
    pub fn is_closed(&self) -> bool {
        self.section == Section::Closed
    }

    /// Compression applied to component and resource payloads
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Append one entry to the current section
    pub fn write_data(&mut self, data: &[u8], name: Option<&str>) -> Result<()> {
        let section = self.section;

        if section == Section::Closed {
            return Err(ContainerError::Closed);
        }

        if !section.is_named() {
            if name.is_some() {
                return Err(ContainerError::NamedEntry(section));
            }
            self.start_section()?;
            self.write_entry("", data)?;
            return self.finish_section();
        }

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(ContainerError::UnnamedEntry(section)),
        };

        if !self.names.insert(name.to_string()) {
            return Err(ContainerError::DuplicateEntry {
                name: name.to_string(),
                section,
            });
        }

        self.start_section()?;
        if section.is_compressible() && self.compression.is_enabled() {
            let packed = self.compression.compress(data)?;
            self.write_entry(name, &packed)
        } else {
            self.write_entry(name, data)
        }
    }

    /// Close the current named section and advance to the next one.
    ///
    /// A no-op in Header and Assembly, which advance on their own.
    pub fn end_section(&mut self) -> Result<()> {
        match self.section {
            Section::Closed => Err(ContainerError::Closed),
            Section::Header | Section::Assembly => Ok(()),
            _ => {
                self.start_section()?;
                self.finish_section()
            }
        }
    }

    /// Write the header entry, stamping the writer's compression into it
    pub fn write_header(&mut self, mut header: Header) -> Result<()> {
        if self.section != Section::Header {
            return Err(ContainerError::invalid_state("write the header", self.section));
        }
        header.compression = self.compression;
        let bytes = header.to_cbor()?;
        self.write_data(&bytes, None)
    }

    /// Write the assembly entry
    pub fn write_assembly(&mut self, assembly: &Assembly) -> Result<()> {
        if self.section != Section::Assembly {
            return Err(ContainerError::invalid_state(
                "write the assembly",
                self.section,
            ));
        }
        let bytes = assembly.to_cbor()?;
        self.write_data(&bytes, None)
    }

    /// Write one execution unit, named after the unit
    pub fn write_execution_unit(&mut self, unit: &ExecutionUnit) -> Result<()> {
        if self.section != Section::ExecutionUnits {
            return Err(ContainerError::invalid_state(
                "write an execution unit",
                self.section,
            ));
        }
        let bytes = unit.to_cbor()?;
        self.write_data(&bytes, Some(&unit.name))
    }

    /// Borrow the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume a closed writer and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        if !self.is_closed() {
            return Err(ContainerError::invalid_state("finish", self.section));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn start_section(&mut self) -> Result<()> {
        if !self.section_started {
            self.inner.write_all(&[self.section.tag()])?;
            self.section_started = true;
        }
        Ok(())
    }

    fn write_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.inner.write_all(&[ENTRY_MARKER])?;
        self.inner.write_all(&(name.len() as u32).to_le_bytes())?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(&(data.len() as u64).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.entry_count += 1;
        Ok(())
    }

    fn finish_section(&mut self) -> Result<()> {
        self.inner.write_all(&[TRAILER_MARKER])?;
        self.inner.write_all(&self.entry_count.to_le_bytes())?;

        self.section = self.section.next();
        self.section_started = false;
        self.entry_count = 0;
        self.names.clear();

        if self.section == Section::Closed {
            self.inner.write_all(END_MARKER)?;
            self.inner.flush()?;
        }
        Ok(())
    }
}
