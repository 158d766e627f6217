//! Streaming container reader
//!
//! The dual of [`crate::ContainerWriter`]: sections are consumed in order.
//! Entries of a named section can be streamed with
//! [`ContainerReader::next_entry`], or the whole section can be indexed with
//! [`ContainerReader::index_section`]. Lookup by name is only possible once a
//! section is indexed, because entries are not seekable before its trailer.

use crate::codec::Compression;
use crate::metadata::{Assembly, Header};
use crate::section::Section;
use crate::unit::ExecutionUnit;
use crate::writer::{ENTRY_MARKER, TRAILER_MARKER};
use crate::{ContainerError, Result, END_MARKER, FORMAT_VERSION, MAGIC};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};

/// Guard against absurd name lengths in corrupt input
const MAX_NAME_LEN: u32 = 64 * 1024;

/// One entry read from a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name (`None` in Header and Assembly)
    pub name: Option<String>,
    /// Payload, decompressed when the section is compressible
    pub data: Vec<u8>,
}

/// Fully read section with name lookup
#[derive(Debug, Clone, Default)]
pub struct SectionIndex {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl SectionIndex {
    fn push(&mut self, entry: Entry) {
        if let Some(name) = &entry.name {
            self.by_name.insert(name.clone(), self.entries.len());
        }
        self.entries.push(entry);
    }

    /// Look up an entry payload by name
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.by_name
            .get(name)
            .map(|&i| self.entries[i].data.as_slice())
    }

    /// Whether an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entry names in container order
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.name.as_deref())
            .collect()
    }

    /// Entries in container order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sequential reader for a package container
#[derive(Debug)]
pub struct ContainerReader<R: Read> {
    inner: R,
    version: u16,
    section: Section,
    compression: Compression,
    section_started: bool,
    entries_read: u32,
    indexes: HashMap<Section, SectionIndex>,
}

impl<R: Read> ContainerReader<R> {
    /// Open a container, checking the magic bytes and format version
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        read_exact(&mut inner, &mut magic, "magic")?;
        if &magic != MAGIC {
            return Err(ContainerError::BadMagic);
        }

        let mut version = [0u8; 2];
        read_exact(&mut inner, &mut version, "format version")?;
        let version = u16::from_le_bytes(version);
        if version == 0 || version > FORMAT_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }

        Ok(Self {
            inner,
            version,
            section: Section::Header,
            compression: Compression::none(),
            section_started: false,
            entries_read: 0,
            indexes: HashMap::new(),
        })
    }

    /// Format version found in the container
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Current section
    pub fn section(&self) -> Section {
        self.section
    }

    /// True once the end marker has been read
    pub fn is_closed(&self) -> bool {
        self.section == Section::Closed
    }

    /// Read the header; payload compression is taken from it
    pub fn read_header(&mut self) -> Result<Header> {
        let data = self.read_single(Section::Header, "read the header")?;
        let header = Header::from_cbor(&data)?;
        self.compression = header.compression;
        Ok(header)
    }

    /// Read the assembly metadata
    pub fn read_assembly(&mut self) -> Result<Assembly> {
        let data = self.read_single(Section::Assembly, "read the assembly")?;
        Assembly::from_cbor(&data)
    }

    /// Read the next entry of the current named section.
    ///
    /// Returns `None` at the section trailer, after which the reader has
    /// advanced to the next section.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let section = self.section;
        if section == Section::Closed {
            return Err(ContainerError::Closed);
        }
        if !section.is_named() {
            return Err(ContainerError::invalid_state("stream entries", section));
        }

        self.start_section()?;
        match self.read_u8("entry marker")? {
            ENTRY_MARKER => {
                let (name, data) = self.read_entry_body()?;
                if name.is_empty() {
                    return Err(ContainerError::Corrupt(format!(
                        "unnamed entry in the {} section",
                        section
                    )));
                }
                let data = if section.is_compressible() {
                    self.compression.decompress(&data)?
                } else {
                    data
                };
                Ok(Some(Entry {
                    name: Some(name),
                    data,
                }))
            }
            TRAILER_MARKER => {
                self.finish_section()?;
                Ok(None)
            }
            other => Err(ContainerError::Corrupt(format!(
                "unexpected marker 0x{:02x} in the {} section",
                other, section
            ))),
        }
    }

    /// Read the next execution unit
    pub fn next_execution_unit(&mut self) -> Result<Option<ExecutionUnit>> {
        if self.section != Section::ExecutionUnits {
            return Err(ContainerError::invalid_state(
                "read an execution unit",
                self.section,
            ));
        }
        match self.next_entry()? {
            Some(entry) => Ok(Some(ExecutionUnit::from_cbor(&entry.data)?)),
            None => Ok(None),
        }
    }

    /// Consume the current named section and index it by entry name
    pub fn index_section(&mut self) -> Result<&SectionIndex> {
        let section = self.section;
        if self.entries_read > 0 {
            return Err(ContainerError::invalid_state(
                "index a partially streamed section",
                section,
            ));
        }

        let mut index = SectionIndex::default();
        while let Some(entry) = self.next_entry()? {
            index.push(entry);
        }
        Ok(self.indexes.entry(section).or_insert(index))
    }

    /// Index every remaining section up to the end of the container
    pub fn index_remaining(&mut self) -> Result<()> {
        if self.section == Section::Header {
            self.read_header()?;
        }
        if self.section == Section::Assembly {
            self.read_assembly()?;
        }
        while self.section != Section::Closed {
            self.index_section()?;
        }
        Ok(())
    }

    /// The index of a section, if it has been indexed
    pub fn index(&self, section: Section) -> Result<&SectionIndex> {
        self.indexes
            .get(&section)
            .ok_or(ContainerError::NotIndexed(section))
    }

    /// Random access to a named entry of an indexed section
    pub fn entry(&self, section: Section, name: &str) -> Result<&[u8]> {
        self.index(section)?
            .get(name)
            .ok_or_else(|| ContainerError::EntryNotFound {
                name: name.to_string(),
                section,
            })
    }

    /// Take ownership of a section index
    pub fn take_index(&mut self, section: Section) -> Result<SectionIndex> {
        self.indexes
            .remove(&section)
            .ok_or(ContainerError::NotIndexed(section))
    }

    fn read_single(&mut self, expected: Section, operation: &'static str) -> Result<Vec<u8>> {
        if self.section != expected {
            return Err(ContainerError::invalid_state(operation, self.section));
        }
        self.start_section()?;

        match self.read_u8("entry marker")? {
            ENTRY_MARKER => {}
            _ => {
                return Err(ContainerError::Corrupt(format!(
                    "the {} section has no entry",
                    expected
                )))
            }
        }
        let (name, data) = self.read_entry_body()?;
        if !name.is_empty() {
            return Err(ContainerError::Corrupt(format!(
                "named entry '{}' in the {} section",
                name, expected
            )));
        }

        if self.read_u8("section trailer")? != TRAILER_MARKER {
            return Err(ContainerError::Corrupt(format!(
                "the {} section holds more than one entry",
                expected
            )));
        }
        self.finish_section()?;
        Ok(data)
    }

    fn start_section(&mut self) -> Result<()> {
        if self.section_started {
            return Ok(());
        }
        let tag = self.read_u8("section tag")?;
        match Section::from_tag(tag) {
            Some(found) if found == self.section => {
                self.section_started = true;
                Ok(())
            }
            Some(found) => Err(ContainerError::Corrupt(format!(
                "expected the {} section, found {}",
                self.section, found
            ))),
            None => Err(ContainerError::Corrupt(format!(
                "unknown section tag 0x{:02x}",
                tag
            ))),
        }
    }

    fn read_entry_body(&mut self) -> Result<(String, Vec<u8>)> {
        let name_len = self.read_u32("name length")?;
        if name_len > MAX_NAME_LEN {
            return Err(ContainerError::Corrupt(format!(
                "entry name length {} exceeds limit",
                name_len
            )));
        }
        let mut name = vec![0u8; name_len as usize];
        read_exact(&mut self.inner, &mut name, "entry name")?;
        let name = String::from_utf8(name)
            .map_err(|_| ContainerError::Corrupt("entry name is not UTF-8".to_string()))?;

        let data_len = self.read_u64("payload length")?;
        let mut data = Vec::new();
        let read = (&mut self.inner).take(data_len).read_to_end(&mut data)?;
        if read as u64 != data_len {
            return Err(ContainerError::Truncated(format!(
                "payload of '{}' ends after {} of {} bytes",
                name, read, data_len
            )));
        }

        self.entries_read += 1;
        Ok((name, data))
    }

    fn finish_section(&mut self) -> Result<()> {
        let count = self.read_u32("entry count")?;
        if count != self.entries_read {
            return Err(ContainerError::Corrupt(format!(
                "the {} section trailer counts {} entries, read {}",
                self.section, count, self.entries_read
            )));
        }

        self.section = self.section.next();
        self.section_started = false;
        self.entries_read = 0;

        if self.section == Section::Closed {
            let mut marker = [0u8; 8];
            read_exact(&mut self.inner, &mut marker, "end marker")?;
            if &marker != END_MARKER {
                return Err(ContainerError::Corrupt("bad end marker".to_string()));
            }
        }
        Ok(())
    }

    fn read_u8(&mut self, what: &str) -> Result<u8> {
        let mut buf = [0u8; 1];
        read_exact(&mut self.inner, &mut buf, what)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        read_exact(&mut self.inner, &mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64> {
        let mut buf = [0u8; 8];
        read_exact(&mut self.inner, &mut buf, what)?;
        Ok(u64::from_le_bytes(buf))
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ContainerError::Truncated(format!("unexpected end of data reading {}", what))
        } else {
            ContainerError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ContainerWriter;
    use crate::PackageArchive;

    /// Empty container; its last 14 bytes are the Resources section and end marker
    fn empty_container() -> Vec<u8> {
        let mut writer = ContainerWriter::new(Vec::new(), Compression::none()).unwrap();
        writer.write_header(Header::new("abc")).unwrap();
        writer
            .write_assembly(&Assembly::new("Empty", "org.test.empty", "0.1.0"))
            .unwrap();
        for _ in 0..3 {
            writer.end_section().unwrap();
        }
        writer.finish().unwrap()
    }

    fn read(bytes: &[u8]) -> Result<PackageArchive> {
        PackageArchive::from_reader(bytes)
    }

    #[test]
    fn test_trailer_count_mismatch() {
        let mut bytes = empty_container();
        let len = bytes.len();
        bytes[len - 12] = 1;
        assert!(matches!(read(&bytes), Err(ContainerError::Corrupt(_))));
    }

    #[test]
    fn test_bad_end_marker() {
        let mut bytes = empty_container();
        let len = bytes.len();
        bytes[len - 1] = b'X';
        assert!(matches!(read(&bytes), Err(ContainerError::Corrupt(_))));
    }

    #[test]
    fn test_section_out_of_order() {
        let mut bytes = empty_container();
        let len = bytes.len();
        assert_eq!(bytes[len - 14], Section::Resources.tag());
        bytes[len - 14] = Section::Components.tag();

        let err = read(&bytes).unwrap_err();
        assert!(err.to_string().contains("expected the"));
    }

    #[test]
    fn test_unknown_entry_marker() {
        let mut bytes = empty_container();
        let len = bytes.len();
        bytes[len - 13] = 0x7f;
        assert!(matches!(read(&bytes), Err(ContainerError::Corrupt(_))));
    }
}
