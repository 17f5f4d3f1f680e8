//! Item handle API (spec §4.F): navigation, metadata accessors, and
//! stateful stream I/O over a single directory entry.
//!
//! Grounded in `marirs-ole-rs/src/lib.rs`'s stream-reading methods, which
//! take an owned offset and length per call; this version adds the
//! mutable per-handle read cursor spec §9 calls for ("stream state is a
//! property of the handle, not the directory entry"), and the lookup/path
//! navigation the teacher doesn't implement.

use crate::directory::{self, DirectoryEntry, ObjectType};
use crate::error::{Error, Result};
use crate::file::OleFile;
use chrono::NaiveDateTime;
use std::cell::Cell;

/// A handle onto one directory entry. Two handles for the same entry have
/// independent read cursors (spec §9).
pub struct Item<'a> {
    file: &'a OleFile,
    index: u32,
    cursor: Cell<u64>,
}

impl<'a> Item<'a> {
    pub(crate) fn new(file: &'a OleFile, index: u32) -> Self {
        Item {
            file,
            index,
            cursor: Cell::new(0),
        }
    }

    fn entry(&self) -> Result<&'a DirectoryEntry> {
        self.file.entry(self.index)
    }

    pub fn get_name(&self) -> Result<&str> {
        Ok(self.entry()?.name.as_str())
    }

    pub fn get_type(&self) -> Result<ObjectType> {
        Ok(self.entry()?.object_type)
    }

    pub fn get_size(&self) -> Result<u64> {
        Ok(self.entry()?.stream_size)
    }

    pub fn get_class_id(&self) -> Result<Option<[u8; 16]>> {
        Ok(self.entry()?.class_id)
    }

    pub fn get_creation_time(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.entry()?.creation_time)
    }

    pub fn get_modification_time(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.entry()?.modification_time)
    }

    pub fn get_child_count(&self) -> Result<usize> {
        Ok(self.entry()?.children.len())
    }

    /// Returns the `i`-th child in directory-index order (spec §4.E
    /// sibling-ordering contract).
    pub fn get_child(&self, i: usize) -> Result<Option<Item<'a>>> {
        let entry = self.entry()?;
        Ok(entry
            .children
            .get(i)
            .map(|&idx| Item::new(self.file, idx)))
    }

    /// Looks up a direct child by name, case-insensitively (spec §4.F).
    pub fn lookup_by_name(&self, name: &str) -> Result<Option<Item<'a>>> {
        let entry = self.entry()?;
        for &idx in &entry.children {
            let candidate = self.file.entry(idx)?;
            if directory::names_equal_fold(&candidate.name, name) {
                return Ok(Some(Item::new(self.file, idx)));
            }
        }
        Ok(None)
    }

    /// Looks up a descendant by slash-separated path, relative to this
    /// item (spec §4.F `lookup_by_path`). An empty component (`//` or a
    /// trailing slash) is `invalid-path`.
    pub fn lookup_by_path(&self, path: &str) -> Result<Option<Item<'a>>> {
        if path.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let mut current = Item::new(self.file, self.index);
        for component in path.split('/') {
            if component.is_empty() {
                return Err(Error::InvalidPath(path.to_string()));
            }
            match current.lookup_by_name(component)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn require_stream(&self) -> Result<&'a DirectoryEntry> {
        let entry = self.entry()?;
        if !entry.is_stream() {
            return Err(Error::NotAStream(entry.name.clone()));
        }
        Ok(entry)
    }

    /// Stateless read at an explicit offset; does not touch the handle's
    /// cursor (spec §4.F `stream_read_at`).
    pub fn stream_read_at(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let entry = self.require_stream()?;
        if offset.checked_add(length).is_none() {
            return Err(Error::InvalidRead { offset, length });
        }
        let start = match entry.stream_start {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        if offset >= entry.stream_size {
            return Ok(Vec::new());
        }
        let remaining_in_stream = entry.stream_size - offset;
        let length = length.min(remaining_in_stream);
        let is_mini = self.file.is_mini_stream(entry);
        self.file
            .sector_reader()
            .read_stream(start, offset, length, is_mini)
    }

    /// Stateful read (spec §4.F `stream_read`): reads from, and advances,
    /// the handle's own cursor.
    pub fn stream_read(&self, length: u64) -> Result<Vec<u8>> {
        let offset = self.cursor.get();
        let bytes = self.stream_read_at(offset, length)?;
        self.cursor.set(offset + bytes.len() as u64);
        Ok(bytes)
    }

    pub fn stream_tell(&self) -> u64 {
        self.cursor.get()
    }

    /// Repositions the handle's cursor (spec §4.F `stream_seek`).
    /// `SeekFrom::Start`/`Current`/`End` map to `whence` SET/CUR/END.
    pub fn stream_seek(&self, pos: std::io::SeekFrom) -> Result<u64> {
        let size = self.entry()?.stream_size as i64;
        let current = self.cursor.get() as i64;
        let target = match pos {
            std::io::SeekFrom::Start(n) => n as i64,
            std::io::SeekFrom::Current(delta) => current + delta,
            std::io::SeekFrom::End(delta) => size + delta,
        };
        if target < 0 {
            return Err(Error::InvalidArgument(format!(
                "seek to negative offset {target}"
            )));
        }
        self.cursor.set(target as u64);
        Ok(target as u64)
    }
}
