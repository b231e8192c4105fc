use flate2::{Decompress, FlushDecompress, Status};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::{RemoteZipError, Result};
use crate::io::{ReadAt, check_bounds};

use super::structures::{
    CentralDirectory, CompressionMethod, DirectoryEntry, LFH_SIZE, LocalFileHeader,
};

/// Decompressed bytes handed to the sink per write.
const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub name: String,
    pub compressed_size: u64,
    pub bytes_written: u64,
    pub crc32: u32,
}

/// Selective entry extractor.
///
/// Fetches the local header and the compressed payload of one entry and
/// streams the decompressed bytes into an [`AsyncWrite`] sink. A failed
/// extraction may leave a partial prefix in the sink; callers must discard it.
pub struct ZipExtractor<R: ReadAt> {
    reader: Arc<R>,
    local_header_probe: u64,
    verify_checksum: bool,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_config(reader, &ClientConfig::default())
    }

    pub fn with_config(reader: Arc<R>, config: &ClientConfig) -> Self {
        Self {
            reader,
            local_header_probe: config.local_header_probe.max(LFH_SIZE as u64),
            verify_checksum: config.verify_checksum,
        }
    }

    /// Extract the entry called `name` (exact, case-sensitive) into `sink`.
    #[instrument(level = "debug", skip(self, directory, sink))]
    pub async fn extract<W>(
        &self,
        directory: &CentralDirectory,
        name: &str,
        sink: &mut W,
    ) -> Result<ExtractionSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        debug!(state = "DirectoryLoaded", entries = directory.len());
        let entry = directory
            .find(name)
            .ok_or_else(|| RemoteZipError::EntryNotFound {
                name: name.to_string(),
            })?;
        self.extract_entry(entry, sink).await
    }

    /// Extract an entry already looked up in the directory.
    pub async fn extract_entry<W>(
        &self,
        entry: &DirectoryEntry,
        sink: &mut W,
    ) -> Result<ExtractionSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        if entry.is_encrypted() {
            return Err(RemoteZipError::Encrypted {
                entry: entry.name.clone(),
            });
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(unsupported(entry, method));
        }
        debug!(
            state = "EntryLocated",
            offset = entry.local_header_offset,
            compressed_size = entry.compressed_size
        );

        let data_offset = self.data_offset(entry).await?;
        debug!(state = "HeaderResolved", data_offset);

        let len = usize::try_from(entry.compressed_size).map_err(|_| {
            RemoteZipError::OutOfBounds {
                offset: data_offset,
                length: entry.compressed_size,
                total: usize::MAX as u64,
            }
        })?;
        let mut compressed = vec![0u8; len];
        self.reader.read_at(data_offset, &mut compressed).await?;
        debug!(state = "DataFetched", bytes = compressed.len());

        debug!(state = "Decompressing", method = entry.compression_method.as_u16());
        let (bytes_written, crc32) = match entry.compression_method {
            CompressionMethod::Stored => write_stored(entry, &compressed, sink).await?,
            CompressionMethod::Deflate => write_inflated(entry, &compressed, sink).await?,
            CompressionMethod::Unknown(method) => return Err(unsupported(entry, method)),
        };

        if self.verify_checksum {
            if bytes_written != entry.uncompressed_size {
                return Err(RemoteZipError::SizeMismatch {
                    entry: entry.name.clone(),
                    expected: entry.uncompressed_size,
                    actual: bytes_written,
                });
            }
            if crc32 != entry.crc32 {
                return Err(RemoteZipError::ChecksumMismatch {
                    entry: entry.name.clone(),
                    expected: entry.crc32,
                    actual: crc32,
                });
            }
        }

        sink.flush()
            .await
            .map_err(|source| RemoteZipError::Sink { source })?;

        info!(
            entry = %entry.name,
            compressed = entry.compressed_size,
            written = bytes_written,
            "extracted entry"
        );
        Ok(ExtractionSummary {
            name: entry.name.clone(),
            compressed_size: entry.compressed_size,
            bytes_written,
            crc32,
        })
    }

    /// Offset of the first byte of entry data.
    ///
    /// The local header's name and extra lengths may differ from the
    /// central directory's, so the header is read to locate the data. The
    /// first read is bounded by the configured probe; a name that runs past
    /// it is fetched with a second read.
    pub async fn data_offset(&self, entry: &DirectoryEntry) -> Result<u64> {
        let total = self.reader.size().await?;
        let offset = entry.local_header_offset;
        let probe_len = self.local_header_probe.min(total.saturating_sub(offset));
        if probe_len < LFH_SIZE as u64 {
            return Err(RemoteZipError::OutOfBounds {
                offset,
                length: LFH_SIZE as u64,
                total,
            });
        }

        let mut buf = vec![0u8; probe_len as usize];
        self.reader.read_at(offset, &mut buf).await?;
        let lfh = LocalFileHeader::from_bytes(&buf, offset)?;

        let name_end = LFH_SIZE + lfh.file_name_length as usize;
        let name_bytes = if name_end <= buf.len() {
            buf.truncate(name_end);
            buf.split_off(LFH_SIZE)
        } else {
            let mut name = vec![0u8; lfh.file_name_length as usize];
            self.reader
                .read_at(offset + LFH_SIZE as u64, &mut name)
                .await?;
            name
        };

        if String::from_utf8_lossy(&name_bytes) != entry.name {
            return Err(RemoteZipError::local_header_mismatch(
                &entry.name,
                format!("local name {:?}", String::from_utf8_lossy(&name_bytes)),
            ));
        }
        if lfh.compression_method != entry.compression_method.as_u16() {
            return Err(RemoteZipError::local_header_mismatch(
                &entry.name,
                format!(
                    "local method {} vs central method {}",
                    lfh.compression_method,
                    entry.compression_method.as_u16()
                ),
            ));
        }

        let data_offset = offset + lfh.data_offset();
        check_bounds(data_offset, entry.compressed_size, total)?;
        Ok(data_offset)
    }
}

fn unsupported(entry: &DirectoryEntry, method: u16) -> RemoteZipError {
    RemoteZipError::UnsupportedCompression {
        entry: entry.name.clone(),
        method,
    }
}

async fn write_stored<W>(entry: &DirectoryEntry, data: &[u8], sink: &mut W) -> Result<(u64, u32)>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    if entry.compressed_size != entry.uncompressed_size {
        return Err(RemoteZipError::invalid_record(
            "stored entry sizes",
            entry.local_header_offset,
        ));
    }

    let mut hasher = crc32fast::Hasher::new();
    for chunk in data.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
        sink.write_all(chunk)
            .await
            .map_err(|source| RemoteZipError::Sink { source })?;
    }
    Ok((data.len() as u64, hasher.finalize()))
}

/// Raw inflate of `data`, writing each produced chunk to `sink` before
/// decoding the next.
async fn write_inflated<W>(
    entry: &DirectoryEntry,
    data: &[u8],
    sink: &mut W,
) -> Result<(u64, u32)>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let corrupt = |reason: String| RemoteZipError::CorruptStream {
        entry: entry.name.clone(),
        reason,
    };

    let mut inflater = Decompress::new(false);
    let mut out = vec![0u8; CHUNK_SIZE];
    let mut hasher = crc32fast::Hasher::new();
    let mut written = 0u64;

    loop {
        let consumed = inflater.total_in() as usize;
        let before = inflater.total_out();
        let status = inflater
            .decompress(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| corrupt(e.to_string()))?;
        let produced = (inflater.total_out() - before) as usize;

        if produced > 0 {
            hasher.update(&out[..produced]);
            sink.write_all(&out[..produced])
                .await
                .map_err(|source| RemoteZipError::Sink { source })?;
            written += produced as u64;
        }

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if produced == 0 && inflater.total_in() as usize == consumed {
                    return Err(corrupt(format!(
                        "deflate stream ended early after {} of {} bytes",
                        consumed,
                        data.len()
                    )));
                }
            }
        }
    }

    Ok((written, hasher.finalize()))
}
