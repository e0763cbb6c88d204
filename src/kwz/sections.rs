//! KWZ section discovery

use super::KWZ_SIGNATURE_SIZE;
use crate::common::ensure_input;
use crate::{FlipnoteError, Result};

/// Upper bound on the number of sections read from one file
pub const MAX_SECTIONS: usize = 6;

/// Size of a section header: 4-byte tag and `u32` payload length
pub const SECTION_HEADER_SIZE: usize = 8;

/// Location of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KwzSection {
    /// Absolute offset of the section header
    pub offset: usize,
    /// Payload length, excluding the 8-byte header
    pub length: usize,
}

impl KwzSection {
    /// Absolute offset of the first payload byte
    pub fn payload_offset(&self) -> usize {
        self.offset + SECTION_HEADER_SIZE
    }

    /// Absolute offset one past the last payload byte
    pub fn end(&self) -> usize {
        self.payload_offset() + self.length
    }
}

/// Sections found in a KWZ file, keyed by their three significant tag bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    sections: Vec<([u8; 3], KwzSection)>,
    body_end: usize,
}

impl SectionMap {
    /// Walk the section chain from the start of the file
    ///
    /// Stops once the cursor reaches the signature area or after
    /// [`MAX_SECTIONS`] sections. Every section must lie inside the buffer.
    pub fn discover(bytes: &[u8]) -> Result<Self> {
        let limit = bytes.len().saturating_sub(KWZ_SIGNATURE_SIZE);
        let mut map = SectionMap::default();
        let mut offset = 0;

        while offset < limit && map.sections.len() < MAX_SECTIONS {
            let header = bytes.get(offset..offset + SECTION_HEADER_SIZE).ok_or(
                FlipnoteError::UnexpectedEof {
                    offset,
                    wanted: SECTION_HEADER_SIZE,
                    len: bytes.len(),
                },
            )?;
            let tag = [header[0], header[1], header[2]];
            let length =
                u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let section = KwzSection { offset, length };
            ensure_input!(
                section.end() <= bytes.len(),
                "section {} at {offset:#x} claims {length} bytes, past the end of the file",
                String::from_utf8_lossy(&tag)
            );
            log::trace!(
                "KWZ section {} at {offset:#x}, {length} bytes",
                String::from_utf8_lossy(&tag)
            );
            map.sections.push((tag, section));
            offset = section.end();
        }
        map.body_end = offset;

        ensure_input!(map.contains(b"KMI"), "missing KMI section");
        ensure_input!(map.contains(b"KMC"), "missing KMC section");
        Ok(map)
    }

    /// Whether a section with this tag was found
    pub fn contains(&self, tag: &[u8; 3]) -> bool {
        self.get(tag).is_some()
    }

    /// Look up a section by tag; a repeated tag resolves to its last occurrence
    pub fn get(&self, tag: &[u8; 3]) -> Option<KwzSection> {
        self.sections
            .iter()
            .rev()
            .find(|(t, _)| t == tag)
            .map(|&(_, section)| section)
    }

    /// Look up a section that the caller cannot do without
    pub fn require(&self, tag: &[u8; 3]) -> Result<KwzSection> {
        match self.get(tag) {
            Some(section) => Ok(section),
            None => Err(FlipnoteError::MalformedInput(format!(
                "missing {} section",
                String::from_utf8_lossy(tag)
            ))),
        }
    }

    /// Offset one past the last discovered section; the signature starts here
    pub fn body_end(&self) -> usize {
        self.body_end
    }

    /// Number of discovered sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether no sections were found
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Iterate over `(tag, section)` pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8; 3], &KwzSection)> {
        self.sections.iter().map(|(tag, section)| (tag, section))
    }
}
