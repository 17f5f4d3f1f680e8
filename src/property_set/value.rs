//! Typed property value decoding (spec §4.G "Value decoding").
//!
//! No teacher or pack example parses MS-OLEPS property sets; this module
//! is grounded directly in `examples/original_source/`'s `pypropertyset`
//! value-type table (the set of `VT_*` codes and their payload shapes),
//! expressed in the teacher's idiom: a plain enum plus fallible `as_*`
//! accessors returning `type-mismatch` on the wrong variant, matching how
//! `marirs-ole-rs/common/src/directory.rs` exposes typed fields as `Option`
//! rather than panicking.

use crate::error::{Error, Result};
use encoding_rs::Encoding;

pub const VT_EMPTY: u32 = 0x0000;
pub const VT_NULL: u32 = 0x0001;
pub const VT_I2: u32 = 0x0002;
pub const VT_I4: u32 = 0x0003;
pub const VT_R4: u32 = 0x0004;
pub const VT_R8: u32 = 0x0005;
pub const VT_BOOL: u32 = 0x000B;
pub const VT_I8: u32 = 0x0014;
pub const VT_UI8: u32 = 0x0015;
pub const VT_LPSTR: u32 = 0x001E;
pub const VT_LPWSTR: u32 = 0x001F;
pub const VT_FILETIME: u32 = 0x0040;
pub const VT_BLOB: u32 = 0x0041;
pub const VT_CLSID: u32 = 0x0048;
pub const VT_VECTOR: u32 = 0x1000;

#[derive(Debug, Clone)]
pub enum PropertyValue {
    Empty,
    Null,
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// Raw FILETIME ticks: 100-ns units since 1601-01-01 UTC (spec §4.G).
    FileTime(i64),
    Clsid([u8; 16]),
    AsciiString(String),
    Utf16String(String),
    Blob(Vec<u8>),
    Vector(Vec<PropertyValue>),
    /// An unrecognized value-type, kept as raw bytes so callers can still
    /// inspect `get_data`, but typed accessors fail `type-mismatch`.
    Unknown { value_type: u32, raw: Vec<u8> },
}

fn code_page_encoding(code_page: i16) -> &'static Encoding {
    match code_page {
        1252 => encoding_rs::WINDOWS_1252,
        1251 => encoding_rs::WINDOWS_1251,
        1250 => encoding_rs::WINDOWS_1250,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        65001 => encoding_rs::UTF_8,
        _ => encoding_rs::WINDOWS_1252,
    }
}

fn read_u32(buf: &[u8], at: usize, what: &'static str) -> Result<u32> {
    let slice: [u8; 4] = buf
        .get(at..at + 4)
        .ok_or_else(|| Error::InvalidPropertySet(format!("{what}: truncated")))?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(slice))
}

fn decode_ascii_string(payload: &[u8], code_page: i16) -> Result<(PropertyValue, usize)> {
    let len = read_u32(payload, 0, "ascii string length")? as usize;
    let bytes = payload
        .get(4..4 + len)
        .ok_or_else(|| Error::InvalidPropertySet("ascii string payload truncated".to_string()))?;
    let trimmed = match bytes.split_last() {
        Some((0, rest)) => rest,
        _ => bytes,
    };
    let (decoded, _, _) = code_page_encoding(code_page).decode(trimmed);
    Ok((PropertyValue::AsciiString(decoded.into_owned()), 4 + len))
}

fn decode_utf16_string(payload: &[u8]) -> Result<(PropertyValue, usize)> {
    let char_len = read_u32(payload, 0, "utf16 string length")? as usize;
    let byte_len = char_len * 2;
    let bytes = payload
        .get(4..4 + byte_len)
        .ok_or_else(|| Error::InvalidPropertySet("utf16 string payload truncated".to_string()))?;
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|p| u16::from_le_bytes([p[0], p[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    let decoded = String::from_utf16(&units)?;
    Ok((PropertyValue::Utf16String(decoded), 4 + byte_len))
}

/// Decodes exactly one value of `base_type` from the front of `payload`,
/// returning the value and the number of bytes consumed (used by
/// multi-value arrays to locate the next element; spec §4.G "Each item is
/// 4-byte aligned").
fn decode_one_with_code_page(
    base_type: u32,
    payload: &[u8],
    code_page: i16,
) -> Result<(PropertyValue, usize)> {
    match base_type {
        VT_EMPTY => Ok((PropertyValue::Empty, 0)),
        VT_NULL => Ok((PropertyValue::Null, 0)),
        VT_I2 => {
            let raw: [u8; 2] = payload
                .get(0..2)
                .ok_or_else(|| Error::InvalidPropertySet("I2 payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::I16(i16::from_le_bytes(raw)), 2))
        }
        VT_I4 => {
            let raw: [u8; 4] = payload
                .get(0..4)
                .ok_or_else(|| Error::InvalidPropertySet("I4 payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::I32(i32::from_le_bytes(raw)), 4))
        }
        VT_R4 => {
            let raw: [u8; 4] = payload
                .get(0..4)
                .ok_or_else(|| Error::InvalidPropertySet("R4 payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::F32(f32::from_le_bytes(raw)), 4))
        }
        VT_R8 => {
            let raw: [u8; 8] = payload
                .get(0..8)
                .ok_or_else(|| Error::InvalidPropertySet("R8 payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::F64(f64::from_le_bytes(raw)), 8))
        }
        VT_BOOL => {
            let raw: [u8; 2] = payload
                .get(0..2)
                .ok_or_else(|| Error::InvalidPropertySet("BOOL payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::Bool(u16::from_le_bytes(raw) != 0), 2))
        }
        VT_I8 | VT_UI8 => {
            let raw: [u8; 8] = payload
                .get(0..8)
                .ok_or_else(|| Error::InvalidPropertySet("I8 payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::I64(i64::from_le_bytes(raw)), 8))
        }
        VT_FILETIME => {
            let raw: [u8; 8] = payload
                .get(0..8)
                .ok_or_else(|| Error::InvalidPropertySet("FILETIME payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::FileTime(i64::from_le_bytes(raw)), 8))
        }
        VT_CLSID => {
            let raw: [u8; 16] = payload
                .get(0..16)
                .ok_or_else(|| Error::InvalidPropertySet("CLSID payload truncated".to_string()))?
                .try_into()
                .unwrap();
            Ok((PropertyValue::Clsid(raw), 16))
        }
        VT_BLOB => {
            let len = read_u32(payload, 0, "blob length")? as usize;
            let bytes = payload
                .get(4..4 + len)
                .ok_or_else(|| Error::InvalidPropertySet("blob payload truncated".to_string()))?;
            Ok((PropertyValue::Blob(bytes.to_vec()), 4 + len))
        }
        VT_LPSTR => decode_ascii_string(payload, code_page),
        VT_LPWSTR => decode_utf16_string(payload),
        other => Ok((
            PropertyValue::Unknown {
                value_type: other,
                raw: payload.to_vec(),
            },
            payload.len(),
        )),
    }
}

/// Decodes a full property value slice, including the multi-value
/// (`VT_VECTOR`) case (spec §4.G).
pub fn decode_value(value_type: u32, payload: &[u8], code_page: i16) -> Result<PropertyValue> {
    if value_type & VT_VECTOR != 0 {
        let base_type = value_type & !VT_VECTOR;
        let count = read_u32(payload, 0, "vector count")? as usize;
        let mut pos = 4usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let slice = payload
                .get(pos..)
                .ok_or_else(|| Error::InvalidPropertySet("vector element truncated".to_string()))?;
            let (value, consumed) = decode_one_with_code_page(base_type, slice, code_page)?;
            items.push(value);
            pos += consumed;
            let padding = (4 - pos % 4) % 4;
            pos += padding;
        }
        Ok(PropertyValue::Vector(items))
    } else {
        let (value, _) = decode_one_with_code_page(value_type, payload, code_page)?;
        Ok(value)
    }
}

impl PropertyValue {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            PropertyValue::Bool(b) => Ok(*b),
            other => Err(other.type_mismatch("bool")),
        }
    }

    pub fn as_i16(&self) -> Result<i16> {
        match self {
            PropertyValue::I16(v) => Ok(*v),
            other => Err(other.type_mismatch("i16")),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            PropertyValue::I32(v) => Ok(*v),
            other => Err(other.type_mismatch("i32")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            PropertyValue::I64(v) => Ok(*v),
            other => Err(other.type_mismatch("i64")),
        }
    }

    pub fn as_filetime(&self) -> Result<i64> {
        match self {
            PropertyValue::FileTime(v) => Ok(*v),
            other => Err(other.type_mismatch("filetime")),
        }
    }

    pub fn as_utf8_string(&self) -> Result<&str> {
        match self {
            PropertyValue::AsciiString(s) | PropertyValue::Utf16String(s) => Ok(s.as_str()),
            other => Err(other.type_mismatch("string")),
        }
    }

    pub fn get_data(&self) -> Vec<u8> {
        match self {
            PropertyValue::Empty | PropertyValue::Null => Vec::new(),
            PropertyValue::I16(v) => v.to_le_bytes().to_vec(),
            PropertyValue::I32(v) => v.to_le_bytes().to_vec(),
            PropertyValue::I64(v) => v.to_le_bytes().to_vec(),
            PropertyValue::F32(v) => v.to_le_bytes().to_vec(),
            PropertyValue::F64(v) => v.to_le_bytes().to_vec(),
            PropertyValue::Bool(v) => (*v as u16).to_le_bytes().to_vec(),
            PropertyValue::FileTime(v) => v.to_le_bytes().to_vec(),
            PropertyValue::Clsid(v) => v.to_vec(),
            PropertyValue::AsciiString(s) => s.as_bytes().to_vec(),
            PropertyValue::Utf16String(s) => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            PropertyValue::Blob(v) => v.clone(),
            PropertyValue::Vector(_) => Vec::new(),
            PropertyValue::Unknown { raw, .. } => raw.clone(),
        }
    }

    fn type_mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            actual: self.type_name().to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Empty => "empty",
            PropertyValue::Null => "null",
            PropertyValue::I16(_) => "i16",
            PropertyValue::I32(_) => "i32",
            PropertyValue::I64(_) => "i64",
            PropertyValue::F32(_) => "f32",
            PropertyValue::F64(_) => "f64",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::FileTime(_) => "filetime",
            PropertyValue::Clsid(_) => "clsid",
            PropertyValue::AsciiString(_) => "ascii_string",
            PropertyValue::Utf16String(_) => "utf16_string",
            PropertyValue::Blob(_) => "blob",
            PropertyValue::Vector(_) => "vector",
            PropertyValue::Unknown { .. } => "unknown",
        }
    }
}
