mod http;
mod local;
mod memory;
mod transport;

pub use http::{HttpRangeReader, ResourceInfo};
pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use transport::{HttpTransport, ReqwestTransport, TransportResponse};

use async_trait::async_trait;

use crate::error::Result;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Reads are exact: a source returns `buf.len()` or an error, never a
    /// partial count.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the data source, resolved on first use.
    async fn size(&self) -> Result<u64>;
}

/// Rejects spans that extend past `total`.
pub(crate) fn check_bounds(offset: u64, length: u64, total: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(crate::RemoteZipError::OutOfBounds {
            offset,
            length,
            total,
        }),
    }
}
