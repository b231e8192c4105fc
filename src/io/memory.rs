use async_trait::async_trait;

use super::{ReadAt, check_bounds};
use crate::error::Result;

/// [`ReadAt`] over bytes already in memory, e.g. an archive fetched by other code.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        check_bounds(offset, buf.len() as u64, self.data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(buf.len())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}
