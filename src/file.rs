//! `OleFile`: the root file-state entity (spec §3 "File state", §4.F, §5,
//! §9). Ties together the header, allocation tables, directory tree, and
//! sector reader; owns the byte source for the file's lifetime.
//!
//! Grounded in `marirs-ole-rs/src/lib.rs`'s `OleFile::parse`, which performs
//! the same sequence (header, SAT, mini-SAT, directory stream, mini
//! stream) -- generalized to run over any [`ByteSource`] rather than only
//! an async file, and to implement the MSAT-chain and property-set layers
//! the teacher didn't reach.

use crate::constants;
use crate::directory::{self, DirectoryEntry, ObjectType};
use crate::error::{Error, Result};
use crate::header::{self, Header};
use crate::io::{ByteSource, FileSource, MemorySource};
use crate::item::Item;
use crate::sat::{self, AllocationTables};
use crate::sector::SectorReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static::lazy_static! {
    /// Default ASCII code page used for `0x001E` string properties whose
    /// section carries no explicit `CodePage` (id=1) property (spec §4.G).
    static ref DEFAULT_ASCII_CODEPAGE: i16 = constants::DEFAULT_CODEPAGE;
}

/// A non-fatal condition surfaced during parsing (spec §7: "directory
/// orphans... non-fatal, logged via an optional notification sink").
#[derive(Debug, Clone)]
pub enum Notification {
    OrphanDirectoryEntry { index: u32 },
    UnknownPropertyValueType { identifier: u32, value_type: u32 },
}

pub struct OleFile {
    source: Box<dyn ByteSource>,
    header: Header,
    tables: AllocationTables,
    mini_stream: Vec<u8>,
    entries: Vec<Option<DirectoryEntry>>,
    abort: Arc<AtomicBool>,
    ascii_codepage: std::cell::Cell<i16>,
    notify: Option<Box<dyn Fn(Notification) + Send + Sync>>,
}

impl OleFile {
    /// Opens a compound file at the given path (spec §6 "File: open (by
    /// path)"). Narrow and wide paths are both handled by `AsRef<Path>`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_source(Box::new(FileSource::open(path)?))
    }

    /// Opens a compound file already held in memory.
    pub fn open_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_source(Box::new(MemorySource::new(bytes)))
    }

    /// Opens a compound file from a user-supplied byte source (spec §6:
    /// "open... by I/O callbacks").
    pub fn from_source(source: Box<dyn ByteSource>) -> Result<Self> {
        let header = header::parse_header(source.as_ref())?;
        let tables = sat::build_allocation_tables(source.as_ref(), &header)?;
        let abort = Arc::new(AtomicBool::new(false));

        // Phase 1: read the directory stream and the root's own stream
        // (the physical mini-stream) using only the regular path -- the
        // mini path isn't usable yet since it needs the mini-stream bytes.
        let phase1 = SectorReader::new(
            source.as_ref(),
            &header,
            &tables.sat,
            &tables.minifat,
            &[],
            &abort,
        );

        let directory_chain_len =
            sat::walk_chain(&tables.sat, header.directory_first_sector)?.len() as u64;
        let directory_bytes = phase1.read_stream(
            header.directory_first_sector,
            0,
            directory_chain_len * header.sector_size as u64,
            false,
        )?;

        let mut entries = directory::parse_directory_stream(&directory_bytes, header.major_version)?;

        let root = entries
            .first()
            .and_then(|e| e.as_ref())
            .filter(|e| e.object_type == ObjectType::Root)
            .ok_or_else(|| Error::DirectoryCorrupt("missing root entry".to_string()))?;

        let mini_stream = match root.stream_start {
            Some(start) if root.stream_size > 0 => {
                phase1.read_stream(start, 0, root.stream_size, false)?
            }
            _ => Vec::new(),
        };

        let mut pending_notifications = Vec::new();
        directory::build_tree(&mut entries, |index| {
            pending_notifications.push(Notification::OrphanDirectoryEntry { index });
        })?;

        let mut file = OleFile {
            source,
            header,
            tables,
            mini_stream,
            entries,
            abort,
            ascii_codepage: std::cell::Cell::new(*DEFAULT_ASCII_CODEPAGE),
            notify: None,
        };
        for notification in pending_notifications {
            file.emit_notification(notification);
        }
        Ok(file)
    }

    pub fn close(self) -> Result<()> {
        self.source.close()
    }

    /// Installs a sink for non-fatal notifications (spec §9: "Model these
    /// as explicit, per-file-state configuration... plus an optional
    /// singleton for diagnostics").
    pub fn set_notification_sink(&mut self, sink: Box<dyn Fn(Notification) + Send + Sync>) {
        self.notify = Some(sink);
    }

    fn emit_notification(&self, notification: Notification) {
        log::warn!("{notification:?}");
        if let Some(sink) = &self.notify {
            sink(notification);
        }
    }

    pub fn format_version(&self) -> &'static str {
        self.header.format_version()
    }

    pub fn sector_size(&self) -> u32 {
        self.header.sector_size
    }

    pub fn mini_sector_size(&self) -> u32 {
        self.header.mini_sector_size
    }

    pub fn ascii_codepage(&self) -> i16 {
        self.ascii_codepage.get()
    }

    pub fn set_ascii_codepage(&self, codepage: i16) {
        self.ascii_codepage.set(codepage);
    }

    /// Sets the cooperative abort flag (spec §5). Checked between chain
    /// hops and on entry to each sector read; cancellation is advisory.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn get_root(&self) -> Item<'_> {
        Item::new(self, constants::ROOT_ENTRY_INDEX)
    }

    pub(crate) fn entry(&self, index: u32) -> Result<&DirectoryEntry> {
        self.entries
            .get(index as usize)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| Error::InvalidArgument(format!("no directory entry at index {index}")))
    }

    pub(crate) fn sector_reader(&self) -> SectorReader<'_> {
        SectorReader::new(
            self.source.as_ref(),
            &self.header,
            &self.tables.sat,
            &self.tables.minifat,
            &self.mini_stream,
            &self.abort,
        )
    }

    pub(crate) fn is_mini_stream(&self, entry: &DirectoryEntry) -> bool {
        self.sector_reader()
            .is_mini(entry.stream_size, entry.object_type == ObjectType::Root)
    }

    /// Looks up an item by absolute or relative path (spec §4.F
    /// `lookup_by_path`): split on `/`, a single leading slash allowed and
    /// ignored, empty component (`//`) is `invalid-path`.
    pub fn get_item_by_path(&self, path: &str) -> Result<Option<Item<'_>>> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Ok(Some(self.get_root()));
        }

        let mut current = self.get_root();
        for component in trimmed.split('/') {
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
}
