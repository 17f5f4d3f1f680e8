//! Minimal, hand-rolled compound-file builder shared by the integration
//! tests. Each test crafts the smallest file that exercises one scenario,
//! in memory, rather than shipping binary fixtures (spec §8).
//!
//! This is deliberately not a general-purpose writer: it assumes a single
//! SAT sector and a single MSAT (the 109 inline header entries), which
//! every fixture below fits within comfortably.

use olecf::constants;

pub struct Entry {
    pub name: String,
    pub is_storage: bool,
    pub content: Vec<u8>,
    pub children: Vec<usize>,
}

pub struct Builder {
    entries: Vec<Entry>,
    sector_size: u32,
    mini_cutoff: u32,
}

impl Builder {
    pub fn new(major_version: u16) -> Self {
        let sector_size = match major_version {
            3 => 512,
            4 => 4096,
            _ => panic!("unsupported major version {major_version}"),
        };
        Builder {
            entries: vec![Entry {
                name: "Root Entry".to_string(),
                is_storage: true,
                content: Vec::new(),
                children: Vec::new(),
            }],
            sector_size,
            mini_cutoff: constants::DEFAULT_MINI_STREAM_CUTOFF,
        }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn with_mini_cutoff(mut self, cutoff: u32) -> Self {
        self.mini_cutoff = cutoff;
        self
    }

    pub fn add_storage(&mut self, parent: usize, name: &str) -> usize {
        let idx = self.entries.len();
        self.entries.push(Entry {
            name: name.to_string(),
            is_storage: true,
            content: Vec::new(),
            children: Vec::new(),
        });
        self.entries[parent].children.push(idx);
        idx
    }

    pub fn add_stream(&mut self, parent: usize, name: &str, content: Vec<u8>) -> usize {
        let idx = self.entries.len();
        self.entries.push(Entry {
            name: name.to_string(),
            is_storage: false,
            content,
            children: Vec::new(),
        });
        self.entries[parent].children.push(idx);
        idx
    }

    /// Corrupts the SAT after a normal build so that `sector` points back
    /// to itself (a self-cycle), for the SAT-cycle test scenario.
    pub fn build_with_sat_self_cycle(self, sector: u32) -> Vec<u8> {
        let sector_size = self.sector_size;
        let mut bytes = self.build();
        patch_sat_entry(&mut bytes, sector_size, sector, sector);
        bytes
    }

    pub fn build(self) -> Vec<u8> {
        let sector_size = self.sector_size as usize;
        let entries_per_dir_sector = sector_size / constants::SIZE_OF_DIRECTORY_ENTRY;
        let entries_per_table_sector = sector_size / 4;
        let major_version = if sector_size == 512 { 3u16 } else { 4u16 };

        let directory_sectors = self.entries.len().div_ceil(entries_per_dir_sector).max(1);

        // Link each parent's children into a right-only chain (spec §4.E:
        // sibling order in the RB tree doesn't matter, only the resulting
        // index-ordered child list does).
        let left: Vec<Option<u32>> = vec![None; self.entries.len()];
        let mut right = vec![None; self.entries.len()];
        let mut child = vec![None; self.entries.len()];
        for (parent_idx, entry) in self.entries.iter().enumerate() {
            if entry.children.is_empty() {
                continue;
            }
            child[parent_idx] = Some(entry.children[0] as u32);
            for window in entry.children.windows(2) {
                right[window[0]] = Some(window[1] as u32);
            }
        }

        // Classify streams as mini or regular.
        let mut mini_runs: Vec<(usize, u32, u32)> = Vec::new(); // (entry_idx, mini_sector_start, mini_sector_count)
        let mut regular_runs: Vec<(usize, u32, u32)> = Vec::new(); // (entry_idx, sector_start, sector_count) -- start assigned later
        let mut next_mini_sector = 0u32;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.is_storage || idx == 0 {
                continue;
            }
            if entry.content.is_empty() {
                continue;
            }
            if (entry.content.len() as u32) < self.mini_cutoff {
                let mini_sector_count = (entry.content.len() as u32).div_ceil(constants::MINI_SECTOR_SIZE);
                mini_runs.push((idx, next_mini_sector, mini_sector_count));
                next_mini_sector += mini_sector_count;
            } else {
                regular_runs.push((idx, 0, (entry.content.len() as u32).div_ceil(sector_size as u32)));
            }
        }
        let total_mini_sectors = next_mini_sector;
        let total_mini_bytes = total_mini_sectors * constants::MINI_SECTOR_SIZE;

        // Assign absolute regular sector numbers in order: directory,
        // regular streams, mini-stream backing, mini-FAT, SAT.
        let mut cursor = directory_sectors as u32;
        for run in regular_runs.iter_mut() {
            run.1 = cursor;
            cursor += run.2;
        }
        let mini_backing_start = cursor;
        let mini_backing_sectors = if total_mini_bytes > 0 {
            total_mini_bytes.div_ceil(sector_size as u32)
        } else {
            0
        };
        cursor += mini_backing_sectors;

        let minifat_start = cursor;
        let minifat_sectors = if total_mini_sectors > 0 {
            total_mini_sectors.div_ceil(entries_per_table_sector as u32)
        } else {
            0
        };
        cursor += minifat_sectors;

        let sat_sector = cursor;
        let count_before_sat = cursor;
        assert!(
            (count_before_sat + 1) as usize <= entries_per_table_sector,
            "test fixture too large for the single-SAT-sector assumption"
        );
        let total_sectors = count_before_sat + 1;

        // --- SAT ---
        let mut sat_table = vec![constants::SECTOR_FREE; entries_per_table_sector];
        chain_run(&mut sat_table, 0, directory_sectors as u32);
        for &(_, start, count) in &regular_runs {
            chain_run(&mut sat_table, start, count);
        }
        if mini_backing_sectors > 0 {
            chain_run(&mut sat_table, mini_backing_start, mini_backing_sectors);
        }
        if minifat_sectors > 0 {
            chain_run(&mut sat_table, minifat_start, minifat_sectors);
        }
        sat_table[sat_sector as usize] = constants::SECTOR_SAT;

        // --- mini-FAT ---
        let minifat_table_len = (minifat_sectors as usize) * entries_per_table_sector;
        let mut minifat_table = vec![constants::SECTOR_FREE; minifat_table_len];
        for &(_, mstart, mcount) in &mini_runs {
            chain_run(&mut minifat_table, mstart, mcount);
        }

        // --- header ---
        let mut header = vec![0u8; 512];
        header[0..8].copy_from_slice(&constants::MAGIC_BYTES);
        header[24..26].copy_from_slice(&0x3Eu16.to_le_bytes());
        header[26..28].copy_from_slice(&major_version.to_le_bytes());
        header[28..30].copy_from_slice(&constants::BYTE_ORDER_MARK.to_le_bytes());
        let shift = if major_version == 3 {
            constants::SECTOR_SHIFT_VERSION_3
        } else {
            constants::SECTOR_SHIFT_VERSION_4
        };
        header[30..32].copy_from_slice(&shift.to_le_bytes());
        header[32..34].copy_from_slice(&constants::MINI_SECTOR_SHIFT.to_le_bytes());
        if major_version == 4 {
            header[40..44].copy_from_slice(&(directory_sectors as u32).to_le_bytes());
        }
        header[44..48].copy_from_slice(&1u32.to_le_bytes()); // sat_sector_count
        header[48..52].copy_from_slice(&0u32.to_le_bytes()); // directory_first_sector
        header[56..60].copy_from_slice(&self.mini_cutoff.to_le_bytes());
        if minifat_sectors > 0 {
            header[60..64].copy_from_slice(&minifat_start.to_le_bytes());
        } else {
            header[60..64].copy_from_slice(&constants::SECTOR_END_OF_CHAIN.to_le_bytes());
        }
        header[64..68].copy_from_slice(&minifat_sectors.to_le_bytes());
        header[68..72].copy_from_slice(&constants::SECTOR_END_OF_CHAIN.to_le_bytes());
        header[72..76].copy_from_slice(&0u32.to_le_bytes());
        for (i, slot) in header[76..512].chunks_exact_mut(4).enumerate() {
            let value = if i == 0 { sat_sector } else { constants::SECTOR_FREE };
            slot.copy_from_slice(&value.to_le_bytes());
        }

        // --- directory sectors ---
        let mut directory_bytes = vec![0u8; directory_sectors * sector_size];
        for (idx, entry) in self.entries.iter().enumerate() {
            let at = idx * constants::SIZE_OF_DIRECTORY_ENTRY;
            let record = &mut directory_bytes[at..at + constants::SIZE_OF_DIRECTORY_ENTRY];
            write_directory_record(
                record,
                entry,
                idx,
                left[idx],
                right[idx],
                child[idx],
                if idx == 0 {
                    if mini_backing_sectors > 0 {
                        Some(mini_backing_start)
                    } else {
                        None
                    }
                } else {
                    mini_runs
                        .iter()
                        .find(|&&(e, _, _)| e == idx)
                        .map(|&(_, mstart, _)| mstart)
                        .or_else(|| {
                            regular_runs
                                .iter()
                                .find(|&&(e, _, _)| e == idx)
                                .map(|&(_, start, _)| start)
                        })
                },
                if idx == 0 {
                    total_mini_bytes as u64
                } else {
                    entry.content.len() as u64
                },
            );
        }

        // --- regular stream data ---
        let mut regular_bytes = vec![0u8; regular_runs.iter().map(|r| r.2).sum::<u32>() as usize * sector_size];
        let regular_base = directory_sectors as u32;
        for &(entry_idx, start, _count) in &regular_runs {
            let offset = (start - regular_base) as usize * sector_size;
            let content = &self.entries[entry_idx].content;
            regular_bytes[offset..offset + content.len()].copy_from_slice(content);
        }

        // --- mini-stream backing ---
        let mut mini_backing_bytes = vec![0u8; (mini_backing_sectors as usize) * sector_size];
        for &(entry_idx, mstart, _mcount) in &mini_runs {
            let offset = mstart as usize * constants::MINI_SECTOR_SIZE as usize;
            let content = &self.entries[entry_idx].content;
            mini_backing_bytes[offset..offset + content.len()].copy_from_slice(content);
        }

        // --- minifat sectors ---
        let mut minifat_bytes = vec![0u8; minifat_table_len * 4];
        for (i, &v) in minifat_table.iter().enumerate() {
            minifat_bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }

        // --- SAT sector ---
        let mut sat_bytes = vec![0u8; entries_per_table_sector * 4];
        for (i, &v) in sat_table.iter().enumerate() {
            sat_bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }

        let mut out = header;
        out.extend_from_slice(&directory_bytes);
        out.extend_from_slice(&regular_bytes);
        out.extend_from_slice(&mini_backing_bytes);
        out.extend_from_slice(&minifat_bytes);
        out.extend_from_slice(&sat_bytes);

        let expected_len = (total_sectors as usize + 1) * sector_size;
        assert_eq!(out.len(), expected_len);
        out
    }
}

fn chain_run(table: &mut [u32], start: u32, count: u32) {
    for i in 0..count {
        let idx = (start + i) as usize;
        table[idx] = if i + 1 < count {
            start + i + 1
        } else {
            constants::SECTOR_END_OF_CHAIN
        };
    }
}

fn patch_sat_entry(bytes: &mut [u8], sector_size: u32, sector: u32, points_to: u32) {
    // The SAT sector is always the last sector written by `build()`.
    let sector_size = sector_size as usize;
    let sat_sector_offset = bytes.len() - sector_size;
    let entry_offset = sat_sector_offset + (sector as usize) * 4;
    bytes[entry_offset..entry_offset + 4].copy_from_slice(&points_to.to_le_bytes());
}

#[allow(clippy::too_many_arguments)]
fn write_directory_record(
    record: &mut [u8],
    entry: &Entry,
    index: usize,
    left: Option<u32>,
    right: Option<u32>,
    child: Option<u32>,
    stream_start: Option<u32>,
    stream_size: u64,
) {
    let utf16: Vec<u16> = entry.name.encode_utf16().chain(std::iter::once(0)).collect();
    let name_len = (utf16.len() * 2) as u16;
    for (i, unit) in utf16.iter().enumerate() {
        record[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    record[64..66].copy_from_slice(&name_len.to_le_bytes());
    record[66] = if index == 0 {
        constants::OBJECT_TYPE_ROOT_STORAGE
    } else if entry.is_storage {
        constants::OBJECT_TYPE_STORAGE
    } else {
        constants::OBJECT_TYPE_STREAM
    };
    record[67] = constants::NODE_COLOR_BLACK;
    record[68..72].copy_from_slice(&left.unwrap_or(constants::NO_STREAM).to_le_bytes());
    record[72..76].copy_from_slice(&right.unwrap_or(constants::NO_STREAM).to_le_bytes());
    record[76..80].copy_from_slice(&child.unwrap_or(constants::NO_STREAM).to_le_bytes());
    record[116..120].copy_from_slice(&stream_start.unwrap_or(constants::NO_STREAM).to_le_bytes());
    record[120..128].copy_from_slice(&stream_size.to_le_bytes());
}
