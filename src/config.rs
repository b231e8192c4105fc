//! Per-session client configuration.
//!
//! There is no process-wide client: every [`RemoteArchive`](crate::RemoteArchive)
//! or [`HttpRangeReader`](crate::HttpRangeReader) is built from an explicit
//! [`ClientConfig`], falling back to [`ClientConfig::default`].

use std::time::Duration;

/// Timeout applied to every range request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of the tail probe: the largest ZIP comment plus the EOCD record.
pub const DEFAULT_TAIL_WINDOW: u64 = 65535 + 22;

/// Initial read size for a local file header and its name.
pub const DEFAULT_LOCAL_HEADER_PROBE: u64 = 1024;

/// Settings shared by the transport, the directory parser and the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Bytes requested by the first (suffix) probe; also bounds the EOCD search.
    pub tail_window: u64,
    /// Bytes read at a local header offset before a second read is needed.
    pub local_header_probe: u64,
    /// Whether to compare CRC-32 and size of the decompressed output.
    pub verify_checksum: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: concat!("remotezip/", env!("CARGO_PKG_VERSION")).to_string(),
            tail_window: DEFAULT_TAIL_WINDOW,
            local_header_probe: DEFAULT_LOCAL_HEADER_PROBE,
            verify_checksum: true,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the tail probe size. Values below the EOCD record size are raised to it.
    #[must_use]
    pub fn with_tail_window(mut self, bytes: u64) -> Self {
        self.tail_window = bytes.max(22);
        self
    }

    /// Sets the local header probe size. Values below the fixed header size are raised to it.
    #[must_use]
    pub fn with_local_header_probe(mut self, bytes: u64) -> Self {
        self.local_header_probe = bytes.max(30);
        self
    }

    #[must_use]
    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }
}
