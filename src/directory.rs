//! Directory entry parsing and tree reconstruction (spec §4.E).
//!
//! The raw-field parsing is grounded in `marirs-ole-rs/common/src/directory.rs`'s
//! `DirectoryEntryRaw`/`DirectoryEntry::from_raw` (field-by-field `try_into`
//! with a named error per field, FILETIME via `epochs::windows_file`,
//! version-3 stream-size truncation). The red-black-tree-to-ordered-child-list
//! flattening is new: per spec §9's note, it's built as a flat array indexed
//! by entry id with a visited bitmap, rather than re-implementing node
//! pointers, which makes cycle detection a single `HashSet` check.

use crate::constants;
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use derivative::Derivative;
use std::array::TryFromSliceError;
use std::collections::{HashSet, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Storage,
    Stream,
    Root,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeColor {
    Red,
    Black,
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DirectoryEntry {
    pub index: u32,
    pub name: String,
    pub object_type: ObjectType,
    pub color: NodeColor,
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub child: Option<u32>,
    pub class_id: Option<[u8; 16]>,
    pub creation_time: Option<NaiveDateTime>,
    pub modification_time: Option<NaiveDateTime>,
    pub stream_start: Option<u32>,
    pub stream_size: u64,
    /// Resolved ordered child list, in directory-index order (spec §4.E's
    /// sibling-ordering contract). Empty for streams and childless storages.
    pub children: Vec<u32>,
}

impl DirectoryEntry {
    pub fn is_stream(&self) -> bool {
        self.object_type == ObjectType::Stream
    }

    pub fn is_storage_like(&self) -> bool {
        matches!(self.object_type, ObjectType::Storage | ObjectType::Root)
    }
}

fn sibling_id(raw: [u8; 4], field_name: &'static str) -> Result<Option<u32>> {
    let value = u32::from_le_bytes(raw);
    match value {
        constants::NO_STREAM => Ok(None),
        v if v > constants::MAX_REGULAR_SECTOR => Err(Error::InvalidDirectoryEntry {
            field: field_name,
            reason: format!("invalid stream id {v:#x}"),
        }),
        v => Ok(Some(v)),
    }
}

fn slice<const N: usize>(buf: &[u8], start: usize, field_name: &'static str) -> Result<[u8; N]> {
    buf.get(start..start + N)
        .ok_or_else(|| Error::InvalidDirectoryEntry {
            field: field_name,
            reason: "record too short".to_string(),
        })?
        .try_into()
        .map_err(|e: TryFromSliceError| Error::InvalidDirectoryEntry {
            field: field_name,
            reason: e.to_string(),
        })
}

/// Parses one 128-byte raw directory record. Returns `Ok(None)` for
/// unallocated (type 0) slots, which are not active entries (spec §4.E).
fn parse_entry(buf: &[u8], index: u32, major_version: u16) -> Result<Option<DirectoryEntry>> {
    if buf.len() != constants::SIZE_OF_DIRECTORY_ENTRY {
        return Err(Error::InvalidDirectoryEntry {
            field: "record",
            reason: format!("expected 128 bytes, got {}", buf.len()),
        });
    }

    let object_type_raw = buf[66];
    let object_type = match object_type_raw {
        constants::OBJECT_TYPE_UNALLOCATED => return Ok(None),
        constants::OBJECT_TYPE_STORAGE => ObjectType::Storage,
        constants::OBJECT_TYPE_STREAM => ObjectType::Stream,
        constants::OBJECT_TYPE_ROOT_STORAGE => ObjectType::Root,
        other => {
            return Err(Error::InvalidDirectoryEntry {
                field: "object_type",
                reason: format!("invalid value {other:#x}"),
            })
        }
    };

    let name_len = u16::from_le_bytes(slice(buf, 64, "name_len")?) as usize;
    if name_len > constants::MAX_DIRECTORY_NAME_BYTES || name_len % 2 != 0 {
        return Err(Error::InvalidDirectoryEntry {
            field: "name_len",
            reason: format!("invalid name length {name_len}"),
        });
    }
    let name_units: Vec<u16> = if name_len >= 2 {
        buf[0..name_len - 2]
            .chunks(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect()
    } else {
        Vec::new()
    };
    let name = String::from_utf16(&name_units)?;

    let color_raw = buf[67];
    let color = match color_raw {
        constants::NODE_COLOR_RED => NodeColor::Red,
        constants::NODE_COLOR_BLACK => NodeColor::Black,
        other => {
            return Err(Error::InvalidDirectoryEntry {
                field: "color_flag",
                reason: format!("invalid value {other:#x}"),
            })
        }
    };

    let left = sibling_id(slice(buf, 68, "left_sibling_id")?, "left_sibling_id")?;
    let right = sibling_id(slice(buf, 72, "right_sibling_id")?, "right_sibling_id")?;
    let child = sibling_id(slice(buf, 76, "child_id")?, "child_id")?;

    for (label, id) in [("left", left), ("right", right), ("child", child)] {
        if id == Some(index) {
            return Err(Error::DirectoryCorrupt(format!(
                "entry {index} references itself as its own {label} pointer"
            )));
        }
    }

    let class_id_raw: [u8; 16] = slice(buf, 80, "class_id")?;
    let class_id = if class_id_raw == [0u8; 16] {
        None
    } else {
        Some(class_id_raw)
    };

    // bytes 96..100: user flags, not exposed.

    let creation_time = filetime_to_datetime(i64::from_le_bytes(slice(buf, 100, "creation_time")?));
    let modification_time =
        filetime_to_datetime(i64::from_le_bytes(slice(buf, 108, "modification_time")?));

    let stream_start_raw = u32::from_le_bytes(slice(buf, 116, "stream_start")?);
    let stream_start = match object_type {
        ObjectType::Storage => None,
        _ => Some(stream_start_raw),
    };

    let mut stream_size_bytes: [u8; 8] = slice(buf, 120, "stream_size")?;
    if major_version == constants::MAJOR_VERSION_3 {
        // Spec §9 / §4.E: the upper 32 bits are ignored (silently
        // truncated) for version-3 files. This preserves the original
        // behavior, flagged in spec.md as a potential CVE surface.
        stream_size_bytes[4..8].copy_from_slice(&[0, 0, 0, 0]);
    }
    let stream_size = u64::from_le_bytes(stream_size_bytes);

    if stream_size != 0 && object_type == ObjectType::Storage {
        return Err(Error::InvalidDirectoryEntry {
            field: "stream_size",
            reason: "storage entries must have zero stream size".to_string(),
        });
    }
    if object_type == ObjectType::Root && stream_size % constants::MINI_SECTOR_SIZE as u64 != 0 {
        return Err(Error::InvalidDirectoryEntry {
            field: "stream_size",
            reason: "root stream size must be a multiple of the mini-sector size".to_string(),
        });
    }
    if stream_size > i64::MAX as u64 {
        return Err(Error::InvalidSize(stream_size));
    }

    Ok(Some(DirectoryEntry {
        index,
        name,
        object_type,
        color,
        left,
        right,
        child,
        class_id,
        creation_time,
        modification_time,
        stream_start,
        stream_size,
        children: Vec::new(),
    }))
}

fn filetime_to_datetime(ticks: i64) -> Option<NaiveDateTime> {
    if ticks == 0 {
        return None;
    }
    epochs::windows_file(ticks)
}

/// Parses every 128-byte record in the directory stream, preserving index
/// order (including `None` for unallocated slots, so sibling ids still
/// line up with their position).
pub fn parse_directory_stream(bytes: &[u8], major_version: u16) -> Result<Vec<Option<DirectoryEntry>>> {
    if bytes.len() % constants::SIZE_OF_DIRECTORY_ENTRY != 0 {
        return Err(Error::DirectoryCorrupt(format!(
            "directory stream size {} is not a multiple of {}",
            bytes.len(),
            constants::SIZE_OF_DIRECTORY_ENTRY
        )));
    }

    bytes
        .chunks_exact(constants::SIZE_OF_DIRECTORY_ENTRY)
        .enumerate()
        .map(|(i, chunk)| parse_entry(chunk, i as u32, major_version))
        .collect()
}

/// Traverses the red-black subtree rooted at `start`, returning every
/// visited entry index (spec §4.E). Detects self-cycles via a global
/// visited set shared across the whole directory (an entry reachable from
/// two different parents is also a cycle per spec -- every non-root entry
/// belongs to exactly one parent).
fn collect_subtree(
    entries: &[Option<DirectoryEntry>],
    global_visited: &mut HashSet<u32>,
    start: u32,
) -> Result<Vec<u32>> {
    let mut stack = vec![start];
    let mut collected = Vec::new();

    while let Some(idx) = stack.pop() {
        if !global_visited.insert(idx) {
            return Err(Error::DirectoryCycle(idx));
        }
        let entry = entries
            .get(idx as usize)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| {
                Error::DirectoryCorrupt(format!("sibling pointer {idx} names an unallocated entry"))
            })?;
        collected.push(idx);
        if let Some(l) = entry.left {
            stack.push(l);
        }
        if let Some(r) = entry.right {
            stack.push(r);
        }
    }

    collected.sort_unstable();
    Ok(collected)
}

/// Links directory entries into their parent/child tree, flattening each
/// parent's red-black subtree into an index-ordered child list. Entries
/// unreachable from root are logged as orphans via `on_orphan` and left
/// out of every `children` list (spec §4.E: non-fatal).
pub fn build_tree(
    entries: &mut [Option<DirectoryEntry>],
    on_orphan: impl Fn(u32),
) -> Result<()> {
    let root_count = entries
        .iter()
        .flatten()
        .filter(|e| e.object_type == ObjectType::Root)
        .count();
    if root_count != 1 {
        return Err(Error::DirectoryCorrupt(format!(
            "expected exactly one root entry, found {root_count}"
        )));
    }
    match entries.first() {
        Some(Some(e)) if e.object_type == ObjectType::Root && e.index == constants::ROOT_ENTRY_INDEX => {}
        _ => {
            return Err(Error::DirectoryCorrupt(
                "root entry must be at index 0".to_string(),
            ))
        }
    }

    let mut global_visited = HashSet::new();
    global_visited.insert(constants::ROOT_ENTRY_INDEX);

    let mut queue = VecDeque::new();
    queue.push_back(constants::ROOT_ENTRY_INDEX);

    while let Some(parent_idx) = queue.pop_front() {
        let child_start = entries[parent_idx as usize].as_ref().unwrap().child;
        let Some(child_start) = child_start else {
            continue;
        };
        let subtree = collect_subtree(entries, &mut global_visited, child_start)?;
        for &idx in &subtree {
            if entries[idx as usize].as_ref().unwrap().is_storage_like() {
                queue.push_back(idx);
            }
        }
        entries[parent_idx as usize].as_mut().unwrap().children = subtree;
    }

    for entry in entries.iter().flatten() {
        if entry.index != constants::ROOT_ENTRY_INDEX && !global_visited.contains(&entry.index) {
            on_orphan(entry.index);
        }
    }

    Ok(())
}

/// Case-insensitive name-fold key per spec §4.E: compare lengths first,
/// then code-unit-wise after folding ASCII letters to uppercase.
/// Non-ASCII letters compare as raw UTF-16 code units.
pub fn name_fold_key(name: &str) -> (usize, Vec<u16>) {
    let units: Vec<u16> = name
        .encode_utf16()
        .map(|u| if (0x61..=0x7A).contains(&u) { u - 0x20 } else { u })
        .collect();
    (units.len(), units)
}

pub fn names_equal_fold(a: &str, b: &str) -> bool {
    name_fold_key(a) == name_fold_key(b)
}
