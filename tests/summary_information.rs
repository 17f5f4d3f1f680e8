//! Scenario 6 (spec §8): a `\005SummaryInformation` stream decoded as a
//! property set, including a `type-mismatch` check on a string property.

mod common;

use common::Builder;
use olecf::property_set::value::{VT_FILETIME, VT_I2, VT_LPSTR};
use olecf::{Error, OleFile, PropertySet};

const BYTE_ORDER_MARK: u16 = 0xFFFE;
const FIXED_HEADER_LEN: usize = 28;
const SECTION_DESCRIPTOR_LEN: usize = 20;

/// Builds a one-section property-set stream with PIDSI_TITLE (2),
/// PIDSI_AUTHOR (4), and PIDSI_CREATE_DTM (12), plus an explicit CodePage
/// (1) property.
fn build_summary_information_stream() -> Vec<u8> {
    let title = b"Annual Budget\0".to_vec();
    let author = b"J. Smith\0".to_vec();

    let descriptor_table_len = 4 * 8; // four properties
    let mut values = Vec::new();

    let code_page_offset = descriptor_table_len;
    values.extend_from_slice(&VT_I2.to_le_bytes());
    values.extend_from_slice(&1252i16.to_le_bytes());

    let title_offset = descriptor_table_len + values.len();
    values.extend_from_slice(&VT_LPSTR.to_le_bytes());
    values.extend_from_slice(&(title.len() as u32).to_le_bytes());
    values.extend_from_slice(&title);

    let author_offset = descriptor_table_len + values.len();
    values.extend_from_slice(&VT_LPSTR.to_le_bytes());
    values.extend_from_slice(&(author.len() as u32).to_le_bytes());
    values.extend_from_slice(&author);

    let create_time_offset = descriptor_table_len + values.len();
    values.extend_from_slice(&VT_FILETIME.to_le_bytes());
    values.extend_from_slice(&132_000_000_000_000_000i64.to_le_bytes());

    let mut section_body = Vec::new();
    section_body.extend_from_slice(&1u32.to_le_bytes());
    section_body.extend_from_slice(&(code_page_offset as u32).to_le_bytes());
    section_body.extend_from_slice(&2u32.to_le_bytes());
    section_body.extend_from_slice(&(title_offset as u32).to_le_bytes());
    section_body.extend_from_slice(&4u32.to_le_bytes());
    section_body.extend_from_slice(&(author_offset as u32).to_le_bytes());
    section_body.extend_from_slice(&12u32.to_le_bytes());
    section_body.extend_from_slice(&(create_time_offset as u32).to_le_bytes());
    section_body.extend_from_slice(&values);

    let section_byte_length = (8 + section_body.len()) as u32;
    let mut section = Vec::new();
    section.extend_from_slice(&section_byte_length.to_le_bytes());
    section.extend_from_slice(&4u32.to_le_bytes());
    section.extend_from_slice(&section_body);

    let mut stream = Vec::new();
    stream.extend_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
    stream.extend_from_slice(&0u16.to_le_bytes());
    stream.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    stream.extend_from_slice(&[0u8; 16]);
    stream.extend_from_slice(&1u32.to_le_bytes());

    let section_offset = (FIXED_HEADER_LEN + SECTION_DESCRIPTOR_LEN) as u32;
    stream.extend_from_slice(&[0u8; 16]);
    stream.extend_from_slice(&section_offset.to_le_bytes());
    stream.extend_from_slice(&section);
    stream
}

#[test]
fn decodes_title_author_and_create_time() {
    let mut builder = Builder::new(3);
    let root = builder.root();
    builder.add_stream(root, "\u{5}SummaryInformation", build_summary_information_stream());

    let file = OleFile::open_bytes(builder.build()).unwrap();
    let item = file
        .get_root()
        .lookup_by_name("\u{5}SummaryInformation")
        .unwrap()
        .unwrap();
    let bytes = item.stream_read_at(0, item.get_size().unwrap()).unwrap();

    let property_set = PropertySet::parse(&bytes).unwrap();
    assert_eq!(property_set.get_section_count(), 1);
    let section = property_set.get_section(0).unwrap().unwrap();

    let title = section.get_property_by_id(2).unwrap();
    assert_eq!(title.as_utf8_string().unwrap(), "Annual Budget");

    let author = section.get_property_by_id(4).unwrap();
    assert_eq!(author.as_utf8_string().unwrap(), "J. Smith");

    let create_time = section.get_property_by_id(12).unwrap();
    assert_eq!(create_time.as_filetime().unwrap(), 132_000_000_000_000_000);

    let err = title.as_i32().unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}
