//! # remotezip
//!
//! Extract a single file from a remotely hosted ZIP archive without
//! downloading the archive.
//!
//! Firmware archives can be gigabytes in size while the caller often needs
//! one small file inside (a manifest, a build identity). Using HTTP Range
//! requests, this crate fetches only the archive tail, the central
//! directory, the entry's local header and its compressed payload, then
//! streams the decompressed bytes into any [`tokio::io::AsyncWrite`] sink.
//!
//! ## Features
//!
//! - Lazy range probe: the first request both checks range support and
//!   fetches the tail that holds the End of Central Directory
//! - ZIP64 archives and entries
//! - STORED and DEFLATE entries, with CRC-32 verification
//! - A shared, once-built central directory for concurrent extractions
//! - The same parser and extractor over local files and memory buffers
//!
//! ## Example
//!
//! ```no_run
//! use remotezip::RemoteArchive;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), remotezip::RemoteZipError> {
//!     let archive = RemoteArchive::open("https://example.com/firmware.ipsw")?;
//!
//!     for entry in archive.directory().await?.iter() {
//!         println!("{}", entry.name);
//!     }
//!
//!     let mut manifest = Vec::new();
//!     archive.extract("BuildManifest.plist", &mut manifest).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ErrorKind, RemoteZipError, Result};
pub use io::{
    HttpRangeReader, HttpTransport, LocalFileReader, MemoryReader, ReadAt, ReqwestTransport,
    TransportResponse,
};
pub use zip::{
    CentralDirectory, CompressionMethod, DirectoryEntry, ExtractionSummary, RemoteArchive,
    ZipExtractor, ZipParser, download_file, download_file_with_config,
};
