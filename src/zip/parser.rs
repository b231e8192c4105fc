//! Central directory locator and parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the file's tail
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD for 64-bit values
//! 3. Read the whole Central Directory in a single request
//! 4. Decode one record per declared entry, never reading entry data
//!
//! With an HTTP source the cost is one tail request plus one request for
//! the central directory, whatever the archive size.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::DEFAULT_TAIL_WINDOW;
use crate::error::{RemoteZipError, Result};
use crate::io::ReadAt;

use super::structures::*;
use super::zip64::{self, RawSizes};

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code serves HTTP, local and
/// in-memory sources. Usually driven through
/// [`RemoteArchive`](super::RemoteArchive).
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Bytes of the archive tail searched for the EOCD
    tail_window: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_tail_window(reader, DEFAULT_TAIL_WINDOW)
    }

    pub fn with_tail_window(reader: Arc<R>, tail_window: u64) -> Self {
        Self {
            reader,
            tail_window: tail_window.max(EndOfCentralDirectory::SIZE as u64),
        }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Reads `min(tail_window, size)` bytes from the end and scans backwards
    /// for the signature. The signature may also occur inside the archive
    /// comment, so a candidate is only accepted when its comment length
    /// makes the record end exactly at the end of the file.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file, archive comment).
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64, Vec<u8>)> {
        let size = self.reader.size().await?;
        let search_size = self.tail_window.min(size);
        let search_start = size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_at(search_start, &mut buf).await?;

        if buf.len() < EndOfCentralDirectory::SIZE {
            return Err(RemoteZipError::DirectoryNotFound);
        }

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }

            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let offset = search_start + i as u64;
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..], offset)?;
                let comment = buf[i + EndOfCentralDirectory::SIZE..].to_vec();
                debug!(offset, comment_len, "found end of central directory");
                return Ok((eocd, offset, comment));
            }
        }

        Err(RemoteZipError::DirectoryNotFound)
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has fields at their sentinel values.
    /// The locator sits immediately before the regular EOCD and points at
    /// the ZIP64 record. Returns `None` when there is no locator there: a
    /// plain archive may legitimately hold 0xFFFF entries.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Option<Zip64Eocd>> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EocdLocator::SIZE as u64) else {
            return Ok(None);
        };
        let mut locator_buf = vec![0u8; Zip64EocdLocator::SIZE];
        self.reader
            .read_at(locator_offset, &mut locator_buf)
            .await?;
        if !locator_buf.starts_with(Zip64EocdLocator::SIGNATURE) {
            debug!(eocd_offset, "sentinel values without a Zip64 locator");
            return Ok(None);
        }

        let locator = Zip64EocdLocator::from_bytes(&locator_buf, locator_offset)?;
        if locator.total_disks > 1 || locator.disk_with_eocd64 != 0 {
            return Err(RemoteZipError::MultiVolume);
        }
        let record_end = locator.eocd64_offset.checked_add(Zip64Eocd::MIN_SIZE as u64);
        if record_end.is_none_or(|end| end > locator_offset) {
            return Err(RemoteZipError::invalid_record(
                "Zip64 end of central directory",
                locator.eocd64_offset,
            ));
        }

        let mut eocd64_buf = vec![0u8; Zip64Eocd::MIN_SIZE];
        self.reader
            .read_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        let eocd64 = Zip64Eocd::from_bytes(&eocd64_buf, locator.eocd64_offset)?;
        if eocd64.disk_number != 0 || eocd64.disk_with_cd != 0 {
            return Err(RemoteZipError::MultiVolume);
        }
        debug!(
            offset = locator.eocd64_offset,
            entries = eocd64.total_entries,
            "found Zip64 end of central directory"
        );
        Ok(Some(eocd64))
    }

    /// Build the central directory listing.
    ///
    /// Entries are returned in archive order. The declared entry count must
    /// fit in the fetched span; a directory that runs out early fails with
    /// [`RemoteZipError::TruncatedDirectory`].
    #[instrument(level = "debug", skip(self))]
    pub async fn build_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset, comment) = self.find_eocd().await?;

        // Get Central Directory info, using ZIP64 if needed
        let eocd64 = if eocd.is_zip64() {
            self.read_zip64_eocd(eocd_offset).await?
        } else {
            None
        };
        let (cd_offset, cd_size, total_entries, cd_end_limit) = if let Some(eocd64) = eocd64 {
            let limit = eocd_offset - Zip64EocdLocator::SIZE as u64;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries, limit)
        } else {
            if eocd.is_multi_volume() {
                return Err(RemoteZipError::MultiVolume);
            }
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
                eocd_offset,
            )
        };

        match cd_offset.checked_add(cd_size) {
            Some(end) if end <= cd_end_limit => {}
            _ => {
                return Err(RemoteZipError::OutOfBounds {
                    offset: cd_offset,
                    length: cd_size,
                    total: cd_end_limit,
                });
            }
        }

        // One request for the whole directory: records are contiguous.
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_at(cd_offset, &mut cd_data).await?;

        // Never trust the declared count for allocation: each record is at least 46 bytes.
        let capacity = total_entries.min(cd_size / CDFH_MIN_SIZE as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for decoded in 0..total_entries {
            if cursor.position() + CDFH_MIN_SIZE as u64 > cd_size {
                return Err(RemoteZipError::TruncatedDirectory {
                    declared: total_entries,
                    decoded,
                });
            }
            let record_offset = cd_offset + cursor.position();
            let entry = parse_cdfh(&mut cursor, record_offset).map_err(|e| match e {
                RemoteZipError::TruncatedDirectory { .. } => RemoteZipError::TruncatedDirectory {
                    declared: total_entries,
                    decoded,
                },
                other => other,
            })?;
            entries.push(entry);
        }

        debug!(entries = entries.len(), cd_offset, cd_size, "central directory loaded");
        Ok(CentralDirectory::new(entries, comment))
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Parse one Central Directory File Header from a cursor.
///
/// Any read past the end of the buffer yields a placeholder
/// [`RemoteZipError::TruncatedDirectory`] that the caller fills in.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>, record_offset: u64) -> Result<DirectoryEntry> {
    let eof = |_: std::io::Error| truncated();

    // Read and verify the signature (PK\x01\x02)
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig).map_err(eof)?;
    if sig != CDFH_SIGNATURE {
        return Err(RemoteZipError::invalid_record(
            "central directory file header",
            record_offset,
        ));
    }

    // Read fixed-size header fields
    let _version_made_by = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let _version_needed = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let flags = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let compression_method = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let last_mod_time = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let last_mod_date = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let crc32 = cursor.read_u32::<LittleEndian>().map_err(eof)?;
    let compressed_size = cursor.read_u32::<LittleEndian>().map_err(eof)?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(eof)?;
    let file_name_length = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let extra_field_length = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let file_comment_length = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>().map_err(eof)?;
    let _external_attrs = cursor.read_u32::<LittleEndian>().map_err(eof)?;
    let local_header_offset = cursor.read_u32::<LittleEndian>().map_err(eof)?;

    // Read the variable-length file name
    let mut file_name_bytes = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name_bytes).map_err(eof)?;
    let name = decode_name(file_name_bytes, flags);

    let mut extra = vec![0u8; extra_field_length as usize];
    cursor.read_exact(&mut extra).map_err(eof)?;

    // The comment is unused but must be present for the next record to line up.
    let comment_end = cursor.position() + file_comment_length as u64;
    if comment_end > cursor.get_ref().len() as u64 {
        return Err(truncated());
    }
    cursor.set_position(comment_end);

    let sizes = zip64::resolve(
        RawSizes {
            uncompressed_size,
            compressed_size,
            local_header_offset,
        },
        &extra,
        &name,
    )?;

    Ok(DirectoryEntry {
        is_directory: name.ends_with('/'),
        name,
        compression_method: CompressionMethod::from_u16(compression_method),
        compressed_size: sizes.compressed_size,
        uncompressed_size: sizes.uncompressed_size,
        crc32,
        local_header_offset: sizes.local_header_offset,
        flags,
        last_mod_time,
        last_mod_date,
    })
}

fn truncated() -> RemoteZipError {
    RemoteZipError::TruncatedDirectory {
        declared: 0,
        decoded: 0,
    }
}

/// Names are UTF-8 when flagged, or when they happen to be valid UTF-8;
/// anything else is decoded lossily.
fn decode_name(bytes: Vec<u8>, flags: u16) -> String {
    match String::from_utf8(bytes) {
        Ok(name) => name,
        Err(err) => {
            if flags & FLAG_UTF8 != 0 {
                debug!("entry name flagged UTF-8 but not valid UTF-8");
            }
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}
