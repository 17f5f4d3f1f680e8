//! Header parser (spec §4.B). Reads and validates the first 512 bytes of
//! the compound file and produces [`Header`], the parameter block every
//! other component is built from.
//!
//! Grounded in `marirs-ole-rs/src/header.rs`'s `parse_raw_header`: each
//! field is sliced out, `try_into`'d, and validated with a named error on
//! failure. This version is synchronous (reads come from [`ByteSource`]
//! rather than an `AsyncRead`) and additionally keeps the inline 109-entry
//! MSAT prefix as part of the header, per spec §3/§4.C.

use crate::constants::{self, SectorIndex};
use crate::error::{Error, Result};
use crate::io::ByteSource;
use derivative::Derivative;

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Header {
    pub major_version: u16,
    pub minor_version: u16,
    pub sector_size: u32,
    pub mini_sector_size: u32,
    pub directory_sectors_len: u32,
    pub mini_stream_cutoff: u32,
    pub directory_first_sector: u32,
    pub sat_sector_count: u32,
    pub msat_first_sector: u32,
    pub msat_sector_count: u32,
    pub minifat_first_sector: u32,
    pub minifat_sector_count: u32,
    /// The first 109 MSAT entries, inline in the header (spec §3 "MSAT").
    #[derivative(Debug = "ignore")]
    pub msat_head: Vec<u32>,
}

impl Header {
    /// Byte offset at which sector `n` begins (spec §3: "the byte range
    /// `[(n+1)*sector_size, (n+2)*sector_size)`").
    pub fn sector_offset(&self, sector: u32) -> u64 {
        (sector as u64 + 1) * self.sector_size as u64
    }

    pub fn format_version(&self) -> &'static str {
        match self.major_version {
            constants::MAJOR_VERSION_3 => "3.x",
            constants::MAJOR_VERSION_4 => "4.x",
            _ => unreachable!("validated at parse time"),
        }
    }
}

fn field<const N: usize>(buf: &[u8], start: usize, name: &'static str) -> Result<[u8; N]> {
    buf.get(start..start + N)
        .ok_or_else(|| Error::InvalidHeader {
            field: name,
            reason: format!("buffer too short to read {N} bytes at offset {start}"),
        })?
        .try_into()
        .map_err(|_| Error::InvalidHeader {
            field: name,
            reason: "slice conversion failed".to_string(),
        })
}

pub fn parse_header(source: &dyn ByteSource) -> Result<Header> {
    let mut buf = [0u8; constants::HEADER_LENGTH];
    let n = source.read_at(0, &mut buf)?;
    if n != constants::HEADER_LENGTH {
        return Err(Error::ShortRead {
            expected: constants::HEADER_LENGTH,
            actual: n,
        });
    }

    let signature: [u8; 8] = field(&buf, 0, "signature")?;
    if signature != constants::MAGIC_BYTES {
        return Err(Error::InvalidSignature {
            found: signature.to_vec(),
        });
    }

    // Bytes 8..24: reserved CLSID, not validated -- some writers leave
    // garbage here and libolecf tolerates it, so this crate does too.

    let minor_version = u16::from_le_bytes(field(&buf, 24, "minor_version")?);

    let major_version_raw: [u8; 2] = field(&buf, 26, "major_version")?;
    let major_version = u16::from_le_bytes(major_version_raw);
    if major_version != constants::MAJOR_VERSION_3 && major_version != constants::MAJOR_VERSION_4 {
        return Err(Error::InvalidHeader {
            field: "major_version",
            reason: format!("unsupported major version {major_version}"),
        });
    }

    let byte_order_mark = u16::from_le_bytes(field(&buf, 28, "byte_order_mark")?);
    if byte_order_mark != constants::BYTE_ORDER_MARK {
        return Err(Error::InvalidHeader {
            field: "byte_order_mark",
            reason: format!("expected {:#06x}, found {byte_order_mark:#06x}", constants::BYTE_ORDER_MARK),
        });
    }

    let sector_shift = u16::from_le_bytes(field(&buf, 30, "sector_shift")?);
    let expected_shift = match major_version {
        constants::MAJOR_VERSION_3 => constants::SECTOR_SHIFT_VERSION_3,
        constants::MAJOR_VERSION_4 => constants::SECTOR_SHIFT_VERSION_4,
        _ => unreachable!(),
    };
    if sector_shift != expected_shift {
        return Err(Error::InvalidHeader {
            field: "sector_shift",
            reason: format!(
                "major version {major_version} requires sector shift {expected_shift}, found {sector_shift}"
            ),
        });
    }
    let sector_size: u32 = 1u32 << sector_shift;

    let mini_sector_shift = u16::from_le_bytes(field(&buf, 32, "mini_sector_shift")?);
    if mini_sector_shift != constants::MINI_SECTOR_SHIFT {
        return Err(Error::InvalidHeader {
            field: "mini_sector_shift",
            reason: format!("expected {}, found {mini_sector_shift}", constants::MINI_SECTOR_SHIFT),
        });
    }
    let mini_sector_size: u32 = 1u32 << mini_sector_shift;

    // Bytes 34..40: reserved, not validated.

    let directory_sectors_len = u32::from_le_bytes(field(&buf, 40, "directory_sectors_len")?);
    if major_version == constants::MAJOR_VERSION_3 && directory_sectors_len != 0 {
        return Err(Error::InvalidHeader {
            field: "directory_sectors_len",
            reason: "must be zero for major version 3".to_string(),
        });
    }

    let sat_sector_count = u32::from_le_bytes(field(&buf, 44, "sat_sector_count")?);
    let directory_first_sector = u32::from_le_bytes(field(&buf, 48, "directory_first_sector")?);
    // Bytes 52..56: transaction signature number, informational only.
    let mini_stream_cutoff = u32::from_le_bytes(field(&buf, 56, "mini_stream_cutoff")?);
    let minifat_first_sector = u32::from_le_bytes(field(&buf, 60, "minifat_first_sector")?);
    let minifat_sector_count = u32::from_le_bytes(field(&buf, 64, "minifat_sector_count")?);
    let msat_first_sector = u32::from_le_bytes(field(&buf, 68, "msat_first_sector")?);
    let msat_sector_count = u32::from_le_bytes(field(&buf, 72, "msat_sector_count")?);

    let msat_head = buf[76..512]
        .chunks_exact(4)
        .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect::<Vec<_>>();
    debug_assert_eq!(msat_head.len(), constants::NUM_HEADER_FAT_ENTRIES);

    let _ = SectorIndex::from_raw(directory_first_sector); // validated lazily by chain walk

    Ok(Header {
        major_version,
        minor_version,
        sector_size,
        mini_sector_size,
        directory_sectors_len,
        mini_stream_cutoff,
        directory_first_sector,
        sat_sector_count,
        msat_first_sector,
        msat_sector_count,
        minifat_first_sector,
        minifat_sector_count,
        msat_head,
    })
}
