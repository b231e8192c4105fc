//! ZIP archive parsing and selective extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (EOCD, Zip64 records, headers, entries)
//! - [`zip64`]: resolution of Zip64 sentinel values in directory records
//! - [`parser`]: locates the EOCD and decodes the central directory
//! - [`extractor`]: fetches and decompresses one entry into a sink
//! - [`archive`]: a session owning the reader and the once-built directory
//!
//! ## Reading order
//!
//! Everything needed to find an entry lives at the end of the archive: the
//! End of Central Directory record (and, for large archives, its Zip64
//! counterpart) points at the central directory, whose records point at
//! each local header. Entry data is only touched for the entry being
//! extracted.
//!
//! Encrypted entries, multi-disk archives and methods other than STORED and
//! DEFLATE are rejected.

mod archive;
mod extractor;
mod parser;
mod structures;
pub mod zip64;

pub use archive::{RemoteArchive, download_file, download_file_with_config};
pub use extractor::{ExtractionSummary, ZipExtractor};
pub use parser::ZipParser;
pub use structures::*;
