//! Zip64 sentinel resolution for central directory records.
//!
//! A 32-bit size or offset equal to `0xFFFFFFFF` means the real value lives
//! in the record's Zip64 extended information extra field (header id
//! `0x0001`). Only the sentinel fields are present there, always in the
//! order uncompressed size, compressed size, local header offset.

use crate::error::{RemoteZipError, Result};

pub const ZIP64_EXTRA_ID: u16 = 0x0001;
pub const SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// Size and offset fields as they appear in the fixed part of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSizes {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub local_header_offset: u32,
}

/// Size and offset fields after Zip64 resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSizes {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub local_header_offset: u64,
}

/// Replace every sentinel in `raw` with its value from `extra`.
///
/// Fails with [`RemoteZipError::Zip64Missing`] when a sentinel has no
/// counterpart in the extra block.
pub fn resolve(raw: RawSizes, extra: &[u8], entry: &str) -> Result<ResolvedSizes> {
    let mut values = zip64_field(extra).unwrap_or(&[]);

    let mut take = |value: u32, field: &'static str| -> Result<u64> {
        if value != SENTINEL_U32 {
            return Ok(value as u64);
        }
        match values {
            [a, b, c, d, e, f, g, h, rest @ ..] => {
                values = rest;
                Ok(u64::from_le_bytes([*a, *b, *c, *d, *e, *f, *g, *h]))
            }
            _ => Err(RemoteZipError::Zip64Missing {
                field,
                entry: entry.to_string(),
            }),
        }
    };

    Ok(ResolvedSizes {
        uncompressed_size: take(raw.uncompressed_size, "uncompressed size")?,
        compressed_size: take(raw.compressed_size, "compressed size")?,
        local_header_offset: take(raw.local_header_offset, "local header offset")?,
    })
}

/// Body of the Zip64 extra field, if the block has one.
fn zip64_field(mut extra: &[u8]) -> Option<&[u8]> {
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let size = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let body = extra.get(4..4 + size)?;
        if id == ZIP64_EXTRA_ID {
            return Some(body);
        }
        extra = &extra[4 + size..];
    }
    None
}
