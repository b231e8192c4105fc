use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWrite, BufWriter};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{RemoteZipError, Result};
use crate::io::{HttpRangeReader, ReadAt};

use super::extractor::{ExtractionSummary, ZipExtractor};
use super::parser::ZipParser;
use super::structures::{CentralDirectory, DirectoryEntry};

/// One extraction session over a single archive.
///
/// The central directory is built on first use and then shared read-only,
/// so any number of [`extract`](Self::extract) calls may run concurrently on
/// the same session. Nothing is retried: a failed call can simply be
/// repeated by the caller.
pub struct RemoteArchive<R: ReadAt> {
    parser: ZipParser<R>,
    extractor: ZipExtractor<R>,
    config: ClientConfig,
    directory: OnceCell<Arc<CentralDirectory>>,
}

impl RemoteArchive<HttpRangeReader> {
    /// Open a remote archive with the default configuration.
    ///
    /// No request is sent until the directory or an entry is needed.
    pub fn open(url: impl Into<String>) -> Result<Self> {
        Self::open_with_config(url, ClientConfig::default())
    }

    pub fn open_with_config(url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let reader = Arc::new(HttpRangeReader::with_config(url, &config)?);
        Ok(Self::new(reader, config))
    }
}

impl<R: ReadAt> RemoteArchive<R> {
    pub fn new(reader: Arc<R>, config: ClientConfig) -> Self {
        Self {
            parser: ZipParser::with_tail_window(Arc::clone(&reader), config.tail_window),
            extractor: ZipExtractor::with_config(reader, &config),
            config,
            directory: OnceCell::new(),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        self.parser.reader()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The central directory, built once per session.
    pub async fn directory(&self) -> Result<Arc<CentralDirectory>> {
        let directory = self
            .directory
            .get_or_try_init(|| async { self.parser.build_directory().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(directory))
    }

    /// List all entries in archive order
    pub async fn list_files(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.directory().await?.entries().to_vec())
    }

    /// Stream the decompressed contents of `name` into `sink`.
    ///
    /// Lookup is exact and case-sensitive; with duplicate names the first
    /// entry in archive order is used.
    pub async fn extract<W>(&self, name: &str, sink: &mut W) -> Result<ExtractionSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let directory = self.directory().await?;
        self.extractor.extract(&directory, name, sink).await
    }

    /// Like [`extract`](Self::extract), but gives up after `timeout`.
    ///
    /// On expiry the in-flight request is dropped and
    /// [`RemoteZipError::Cancelled`] is returned; the sink may hold a partial
    /// prefix.
    pub async fn extract_within<W>(
        &self,
        name: &str,
        sink: &mut W,
        timeout: Duration,
    ) -> Result<ExtractionSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        match tokio::time::timeout(timeout, self.extract(name, sink)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(entry = name, ?timeout, "extraction cancelled");
                Err(RemoteZipError::Cancelled { after: timeout })
            }
        }
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, name: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.extract(name, &mut buf).await?;
        Ok(buf)
    }

    /// Extract file to disk
    ///
    /// Parent directories are created as needed. A partially written file
    /// is removed when extraction fails.
    pub async fn extract_to_file(&self, name: &str, output_path: &Path) -> Result<ExtractionSummary> {
        // Resolve the entry before touching the file system.
        self.directory()
            .await?
            .find(name)
            .ok_or_else(|| RemoteZipError::EntryNotFound {
                name: name.to_string(),
            })?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RemoteZipError::io(format!("creating {}", parent.display()), e))?;
            }
        }

        let file = fs::File::create(output_path).await.map_err(|e| {
            RemoteZipError::io(format!("creating {}", output_path.display()), e)
        })?;
        let mut writer = BufWriter::new(file);

        let result = self.extract(name, &mut writer).await;
        if result.is_err() {
            drop(writer);
            if let Err(e) = fs::remove_file(output_path).await {
                debug!(path = %output_path.display(), error = %e, "could not remove partial file");
            }
        }
        result
    }
}

/// Fetch one entry of a remote archive into `sink` with the default configuration.
pub async fn download_file<W>(url: &str, entry_name: &str, sink: &mut W) -> Result<ExtractionSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    download_file_with_config(url, entry_name, sink, &ClientConfig::default()).await
}

/// Fetch one entry of a remote archive into `sink`.
pub async fn download_file_with_config<W>(
    url: &str,
    entry_name: &str,
    sink: &mut W,
    config: &ClientConfig,
) -> Result<ExtractionSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let archive = RemoteArchive::open_with_config(url, config.clone())?;
    archive.extract(entry_name, sink).await
}
