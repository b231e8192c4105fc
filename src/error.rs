//! Error types for remote archive access.
//!
//! Every failure carries the context needed to diagnose it (URL, byte span,
//! HTTP status, entry name) without re-running with tracing enabled.
//! [`RemoteZipError::kind`] groups the variants into the coarse categories
//! callers usually branch on.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a [`RemoteZipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout, cancellation, bad status, short body.
    Transport,
    /// The server does not honor HTTP range requests.
    RangeUnsupported,
    /// The archive structure is missing, truncated or inconsistent.
    MalformedArchive,
    /// The requested entry name is not in the central directory.
    EntryNotFound,
    /// The entry uses a compression method or encryption we cannot decode.
    UnsupportedCompression,
    /// The decompressed output does not match the directory's record of it.
    Integrity,
}

/// Errors produced while reading a remote (or local) ZIP archive.
#[derive(Debug, Error)]
pub enum RemoteZipError {
    /// Network-level error (DNS, connection refused, TLS, reset).
    #[error("network error reading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A single range request exceeded the configured timeout.
    #[error("timeout reading {url}")]
    Timeout { url: String },

    /// The caller-level deadline expired and the in-flight request was dropped.
    #[error("extraction cancelled after {after:?}")]
    Cancelled { after: Duration },

    /// The server answered with a status that is neither partial content nor
    /// a plain success (404, 5xx, ...).
    #[error("resource unavailable: HTTP {status} from {url}")]
    Unavailable { url: String, status: u16 },

    /// The server ignored or mishandled the range request.
    #[error("range requests not supported by {url} (HTTP {status}): {reason}")]
    RangeNotSupported {
        url: String,
        status: u16,
        reason: &'static str,
    },

    /// The response body held fewer bytes than requested.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// The server answered a different span than the one requested.
    #[error("server returned range starting at {received}, requested {requested}")]
    ContentRangeMismatch { requested: u64, received: u64 },

    /// The resource URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Local file system error.
    #[error("IO error {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the caller's sink failed.
    #[error("failed writing to output: {source}")]
    Sink {
        #[source]
        source: std::io::Error,
    },

    /// A read would extend past the end of the resource.
    #[error("read of {length} bytes at offset {offset} exceeds resource length {total}")]
    OutOfBounds { offset: u64, length: u64, total: u64 },

    /// No end of central directory record in the archive tail.
    #[error("archive directory not found")]
    DirectoryNotFound,

    /// A record signature or fixed field did not decode.
    #[error("invalid {record} at offset {offset}")]
    InvalidRecord { record: &'static str, offset: u64 },

    /// The central directory ended before the declared number of entries.
    #[error("truncated central directory: {declared} entries declared, {decoded} decoded")]
    TruncatedDirectory { declared: u64, decoded: u64 },

    /// A 32-bit field held the Zip64 sentinel but no Zip64 value was found.
    #[error("missing Zip64 {field} for {entry}")]
    Zip64Missing { field: &'static str, entry: String },

    /// The archive spans more than one volume.
    #[error("multi-volume archives are not supported")]
    MultiVolume,

    /// The local file header disagrees with the central directory.
    #[error("local header for {entry} inconsistent with central directory: {reason}")]
    LocalHeaderMismatch { entry: String, reason: String },

    /// No entry with the requested name.
    #[error("entry not found in archive: {name}")]
    EntryNotFound { name: String },

    /// Compression method outside {Store, Deflate}.
    #[error("unsupported compression method {method} for {entry}")]
    UnsupportedCompression { entry: String, method: u16 },

    /// The entry is encrypted.
    #[error("encrypted entries are not supported: {entry}")]
    Encrypted { entry: String },

    /// CRC-32 of the decompressed output differs from the directory's value.
    #[error("CRC-32 mismatch for {entry}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        entry: String,
        expected: u32,
        actual: u32,
    },

    /// Decompressed size differs from the directory's value.
    #[error("size mismatch for {entry}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        entry: String,
        expected: u64,
        actual: u64,
    },

    /// The compressed payload could not be decoded.
    #[error("corrupt compressed data for {entry}: {reason}")]
    CorruptStream { entry: String, reason: String },
}

impl RemoteZipError {
    /// Creates a transport error from a reqwest error, separating timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a local IO error with a short description of the operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_record(record: &'static str, offset: u64) -> Self {
        Self::InvalidRecord { record, offset }
    }

    pub fn local_header_mismatch(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LocalHeaderMismatch {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Returns the category this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. }
            | Self::Unavailable { .. }
            | Self::ShortRead { .. }
            | Self::ContentRangeMismatch { .. }
            | Self::InvalidUrl { .. }
            | Self::Io { .. }
            | Self::Sink { .. } => ErrorKind::Transport,
            Self::RangeNotSupported { .. } => ErrorKind::RangeUnsupported,
            Self::OutOfBounds { .. }
            | Self::DirectoryNotFound
            | Self::InvalidRecord { .. }
            | Self::TruncatedDirectory { .. }
            | Self::Zip64Missing { .. }
            | Self::MultiVolume
            | Self::LocalHeaderMismatch { .. } => ErrorKind::MalformedArchive,
            Self::EntryNotFound { .. } => ErrorKind::EntryNotFound,
            Self::UnsupportedCompression { .. } | Self::Encrypted { .. } => {
                ErrorKind::UnsupportedCompression
            }
            Self::ChecksumMismatch { .. }
            | Self::SizeMismatch { .. }
            | Self::CorruptStream { .. } => ErrorKind::Integrity,
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T, E = RemoteZipError> = std::result::Result<T, E>;
