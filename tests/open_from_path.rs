//! Exercises `OleFile::open` against a real file on disk, as opposed to
//! the in-memory source the other integration tests use.

mod common;

use common::Builder;
use olecf::OleFile;
use std::io::Write;

#[test]
fn opens_a_compound_file_from_a_path() {
    let mut builder = Builder::new(3);
    let root = builder.root();
    builder.add_stream(root, "notes", b"hello from disk".to_vec());
    let bytes = builder.build();

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();
    tmp.flush().unwrap();

    let file = OleFile::open(tmp.path()).unwrap();
    let item = file.get_root().lookup_by_name("notes").unwrap().unwrap();
    assert_eq!(item.stream_read_at(0, 15).unwrap(), b"hello from disk");
}

#[test]
fn opening_a_missing_path_fails_with_not_found() {
    let err = OleFile::open("/nonexistent/path/to/a/file.doc").unwrap_err();
    assert!(matches!(err, olecf::Error::NotFound(_)));
}
