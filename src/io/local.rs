use super::{ReadAt, check_bounds};
use crate::error::{RemoteZipError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Local file reader with random access support
///
/// Reads run on the blocking pool with positional I/O, so concurrent
/// extractions never share a file cursor.
pub struct LocalFileReader {
    file: Arc<std::fs::File>,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let context = || format!("opening {}", path.display());
        let file = std::fs::File::open(path).map_err(|e| RemoteZipError::io(context(), e))?;
        let size = file
            .metadata()
            .map_err(|e| RemoteZipError::io(context(), e))?
            .len();
        Ok(Self {
            file: Arc::new(file),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        check_bounds(offset, buf.len() as u64, self.size)?;

        let file = Arc::clone(&self.file);
        let len = buf.len();
        let data = tokio::task::spawn_blocking(move || read_exact_at(&file, offset, len))
            .await
            .map_err(|e| RemoteZipError::io("joining read task", std::io::Error::other(e)))?
            .map_err(|e| RemoteZipError::io(format!("reading {len} bytes at offset {offset}"), e))?;

        buf.copy_from_slice(&data);
        Ok(len)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

fn read_exact_at(file: &std::fs::File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, offset)?;
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut filled = 0;
        while filled < len {
            let n = file.seek_read(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            filled += n;
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
    }

    Ok(buf)
}
