//! Property-set stream decoding (spec §4.G): the typed key-value metadata
//! layered inside `\005SummaryInformation` and `\005DocumentSummaryInformation`
//! streams.
//!
//! No example repo in the pack implements MS-OLEPS; this is grounded in
//! `examples/original_source/`'s `pypropertyset` module for the section
//! layout and the sort-then-accept tolerance for out-of-order property
//! offsets, expressed in the teacher's style: plain structs, a `parse`
//! constructor that validates eagerly, and per-index accessors returning
//! `Result<Option<T>>` rather than panicking on a bad index.

pub mod value;

use crate::constants;
use crate::error::{Error, Result};
pub use value::PropertyValue;

/// The two well-known property-set stream names (spec §3).
pub const SUMMARY_INFORMATION: &str = constants::SUMMARY_INFORMATION_NAME;
pub const DOCUMENT_SUMMARY_INFORMATION: &str = constants::DOCUMENT_SUMMARY_INFORMATION_NAME;

const OUTER_HEADER_LEN: usize = 48;
/// Length of the fixed outer header actually parsed by [`PropertySet::parse`]:
/// `byte_order_mark`(2) + `format_version`(2) + `os_version`(4) + `class_id`(16)
/// + `section_count`(4). The section-descriptor array starts here, not at
/// `OUTER_HEADER_LEN` (which additionally accounts for one descriptor slot).
const FIXED_HEADER_LEN: usize = 28;
const SECTION_DESCRIPTOR_LEN: usize = 20;
const MAX_SECTION_COUNT: u32 = 64;

pub struct Property {
    pub identifier: u32,
    pub value_type: u32,
    pub value: PropertyValue,
}

impl Property {
    pub fn get_identifier(&self) -> u32 {
        self.identifier
    }

    pub fn get_value_type(&self) -> u32 {
        self.value_type
    }

    pub fn get_data(&self) -> Vec<u8> {
        self.value.get_data()
    }

    pub fn as_boolean(&self) -> Result<bool> {
        self.value.as_bool()
    }

    pub fn as_i16(&self) -> Result<i16> {
        self.value.as_i16()
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.value.as_i32()
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.value.as_i64()
    }

    pub fn as_filetime(&self) -> Result<i64> {
        self.value.as_filetime()
    }

    pub fn as_utf8_string(&self) -> Result<&str> {
        self.value.as_utf8_string()
    }
}

pub struct Section {
    pub class_id: [u8; 16],
    properties: Vec<Property>,
}

impl Section {
    pub fn get_class_identifier(&self) -> [u8; 16] {
        self.class_id
    }

    pub fn get_property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn get_property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Finds a property by identifier within this section (used internally
    /// for code-page lookup; exposed because it's a common caller need).
    pub fn get_property_by_id(&self, identifier: u32) -> Option<&Property> {
        self.properties.iter().find(|p| p.identifier == identifier)
    }
}

pub struct PropertySet {
    class_id: [u8; 16],
    format_version: u16,
    os_version: u32,
    section_descriptors: Vec<([u8; 16], u32)>,
    raw: Vec<u8>,
}

fn read_u16(buf: &[u8], at: usize, what: &'static str) -> Result<u16> {
    let slice: [u8; 2] = buf
        .get(at..at + 2)
        .ok_or_else(|| Error::InvalidPropertySet(format!("{what}: truncated")))?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(slice))
}

fn read_u32(buf: &[u8], at: usize, what: &'static str) -> Result<u32> {
    let slice: [u8; 4] = buf
        .get(at..at + 4)
        .ok_or_else(|| Error::InvalidPropertySet(format!("{what}: truncated")))?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(slice))
}

fn read_guid(buf: &[u8], at: usize, what: &'static str) -> Result<[u8; 16]> {
    buf.get(at..at + 16)
        .ok_or_else(|| Error::InvalidPropertySet(format!("{what}: truncated")))?
        .try_into()
        .map_err(|_| Error::InvalidPropertySet(format!("{what}: slice conversion failed")))
}

impl PropertySet {
    /// Parses the outer header and section descriptor array (spec §4.G
    /// "Outer header", "Section descriptors"). Section contents are parsed
    /// lazily by [`PropertySet::get_section`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < OUTER_HEADER_LEN {
            return Err(Error::InvalidPropertySet(format!(
                "stream too short for outer header: {} bytes",
                bytes.len()
            )));
        }

        let byte_order_mark = read_u16(bytes, 0, "byte_order_mark")?;
        if byte_order_mark != constants::BYTE_ORDER_MARK {
            return Err(Error::InvalidPropertySet(format!(
                "bad byte-order mark {byte_order_mark:#06x}"
            )));
        }

        let format_version = read_u16(bytes, 2, "format_version")?;
        if format_version != 0 && format_version != 1 {
            return Err(Error::InvalidPropertySet(format!(
                "unsupported format version {format_version}"
            )));
        }

        let os_version = read_u32(bytes, 4, "os_version")?;
        let class_id = read_guid(bytes, 8, "class_id")?;
        let section_count = read_u32(bytes, 24, "section_count")?;
        if section_count == 0 || section_count > MAX_SECTION_COUNT {
            return Err(Error::InvalidPropertySet(format!(
                "section count {section_count} out of range [1, {MAX_SECTION_COUNT}]"
            )));
        }

        let mut section_descriptors = Vec::with_capacity(section_count as usize);
        for i in 0..section_count as usize {
            let at = FIXED_HEADER_LEN + i * SECTION_DESCRIPTOR_LEN;
            let guid = read_guid(bytes, at, "section_guid")?;
            let offset = read_u32(bytes, at + 16, "section_offset")?;
            section_descriptors.push((guid, offset));
        }

        Ok(PropertySet {
            class_id,
            format_version,
            os_version,
            section_descriptors,
            raw: bytes.to_vec(),
        })
    }

    pub fn get_class_identifier(&self) -> [u8; 16] {
        self.class_id
    }

    pub fn get_format_version(&self) -> u16 {
        self.format_version
    }

    pub fn get_os_version(&self) -> u32 {
        self.os_version
    }

    pub fn get_section_count(&self) -> usize {
        self.section_descriptors.len()
    }

    /// Parses and returns section `index` (spec §4.G "Section parse",
    /// parsed lazily on request).
    pub fn get_section(&self, index: usize) -> Result<Option<Section>> {
        let Some(&(class_id, offset)) = self.section_descriptors.get(index) else {
            return Ok(None);
        };
        parse_section(&self.raw, class_id, offset as usize).map(Some)
    }
}

fn parse_section(raw: &[u8], class_id: [u8; 16], section_offset: usize) -> Result<Section> {
    let section_byte_length = read_u32(raw, section_offset, "section_byte_length")? as usize;
    let property_count = read_u32(raw, section_offset + 4, "property_count")? as usize;

    let section_end = section_offset
        .checked_add(section_byte_length)
        .ok_or_else(|| Error::InvalidPropertySet("section length overflow".to_string()))?;
    if section_end > raw.len() {
        return Err(Error::InvalidPropertySet(
            "section extends past end of stream".to_string(),
        ));
    }

    let mut descriptors = Vec::with_capacity(property_count);
    for i in 0..property_count {
        let at = section_offset + 8 + i * 8;
        let identifier = read_u32(raw, at, "property_identifier")?;
        let value_offset = read_u32(raw, at + 4, "property_offset")? as usize;
        if value_offset < 16 || value_offset >= section_byte_length {
            return Err(Error::InvalidPropertySet(format!(
                "property {identifier} offset {value_offset} outside section"
            )));
        }
        descriptors.push((identifier, value_offset));
    }

    // Spec §4.G: "Out-of-order offsets are tolerated but values are still
    // parsed by (offset, next-offset) slice after sorting by offset
    // ascending -- the final offset terminates at section_byte_length."
    descriptors.sort_by_key(|&(_, offset)| offset);

    let code_page = find_code_page(raw, section_offset, &descriptors);

    let mut properties = Vec::with_capacity(descriptors.len());
    for (i, &(identifier, value_offset)) in descriptors.iter().enumerate() {
        let next_offset = descriptors
            .get(i + 1)
            .map(|&(_, o)| o)
            .unwrap_or(section_byte_length);
        let abs_start = section_offset + value_offset;
        let abs_next = section_offset + next_offset;
        if abs_next < abs_start + 4 || abs_next > raw.len() {
            return Err(Error::InvalidPropertySet(format!(
                "property {identifier} has a malformed value slice"
            )));
        }
        let value_type = read_u32(raw, abs_start, "value_type")?;
        let payload = &raw[abs_start + 4..abs_next];
        let value = value::decode_value(value_type, payload, code_page)?;
        properties.push(Property {
            identifier,
            value_type,
            value,
        });
    }

    Ok(Section { class_id, properties })
}

/// Looks up the section's `CodePage` property (id=1) to resolve the
/// code page for ASCII strings, defaulting to Windows-1252 (spec §4.G
/// "Code-page handling").
fn find_code_page(raw: &[u8], section_offset: usize, descriptors: &[(u32, usize)]) -> i16 {
    for &(identifier, value_offset) in descriptors {
        if identifier != constants::PROPERTY_ID_CODEPAGE {
            continue;
        }
        let abs_start = section_offset + value_offset;
        let Ok(value_type) = read_u32(raw, abs_start, "code_page_type") else {
            return constants::DEFAULT_CODEPAGE;
        };
        if value_type != value::VT_I2 {
            return constants::DEFAULT_CODEPAGE;
        }
        let Some(bytes) = raw.get(abs_start + 4..abs_start + 6) else {
            return constants::DEFAULT_CODEPAGE;
        };
        return i16::from_le_bytes([bytes[0], bytes[1]]);
    }
    constants::DEFAULT_CODEPAGE
}
