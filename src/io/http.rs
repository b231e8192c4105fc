use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue, RANGE};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use super::transport::{HttpTransport, ReqwestTransport, TransportResponse};
use super::{ReadAt, check_bounds};
use crate::config::ClientConfig;
use crate::error::{RemoteZipError, Result};

/// What the first probe learned about the remote resource.
///
/// Resolved once per reader and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Length of the whole resource, from the `Content-Range` total.
    pub total_length: u64,
    tail_offset: u64,
    tail: Vec<u8>,
}

impl ResourceInfo {
    /// Bytes of the probe response, if they cover `offset..offset + len` entirely.
    fn cached(&self, offset: u64, len: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset.checked_sub(self.tail_offset)?).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.tail.get(start..end)
    }

    /// Offset of the first byte held by the tail cache.
    pub fn tail_offset(&self) -> u64 {
        self.tail_offset
    }

    /// Number of bytes held by the tail cache.
    pub fn tail_len(&self) -> u64 {
        self.tail.len() as u64
    }
}

/// HTTP Range reader for remote ZIP files
///
/// Nothing is sent on construction. The first read (or [`ReadAt::size`])
/// issues a suffix request for the archive tail, which both confirms range
/// support and yields the total length; the tail bytes are kept so the
/// end-of-central-directory search does not fetch them twice. Every other
/// read is one range request for exactly the requested span.
pub struct HttpRangeReader {
    transport: Arc<dyn HttpTransport>,
    url: String,
    tail_window: u64,
    info: OnceCell<ResourceInfo>,
    range_rejected: AtomicBool,
    transferred_bytes: AtomicU64,
    request_count: AtomicU64,
}

impl HttpRangeReader {
    /// Create a reader with the default configuration.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_config(url, &ClientConfig::default())
    }

    /// Create a reader whose reqwest client is built from `config`.
    pub fn with_config(url: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        Self::with_transport(url, transport, config)
    }

    /// Create a reader that issues its requests through `transport`.
    pub fn with_transport(
        url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let url = url.into();
        match reqwest::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(RemoteZipError::InvalidUrl { url }),
        }

        Ok(Self {
            transport,
            url,
            tail_window: config.tail_window,
            info: OnceCell::new(),
            range_rejected: AtomicBool::new(false),
            transferred_bytes: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Number of HTTP requests issued so far.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// `None` until the first probe completes.
    pub fn range_supported(&self) -> Option<bool> {
        if self.info.initialized() {
            Some(true)
        } else if self.range_rejected.load(Ordering::Relaxed) {
            Some(false)
        } else {
            None
        }
    }

    /// The probe result, if the probe has run.
    pub fn resource_info(&self) -> Option<&ResourceInfo> {
        self.info.get()
    }

    async fn info(&self) -> Result<&ResourceInfo> {
        self.info
            .get_or_try_init(|| async {
                let result = self.probe().await;
                if let Err(RemoteZipError::RangeNotSupported { .. }) = &result {
                    self.range_rejected.store(true, Ordering::Relaxed);
                }
                result
            })
            .await
    }

    async fn probe(&self) -> Result<ResourceInfo> {
        let resp = self.send_range(format!("bytes=-{}", self.tail_window)).await?;
        let content_range = content_range(&resp.headers);

        match resp.status {
            StatusCode::PARTIAL_CONTENT => {
                let Some(ContentRange {
                    span: Some((start, end)),
                    total: Some(total_length),
                }) = content_range
                else {
                    return Err(self.range_not_supported(
                        resp.status,
                        "partial response without a usable Content-Range",
                    ));
                };

                let expected = end - start + 1;
                let mut tail = resp.body;
                if (tail.len() as u64) < expected {
                    return Err(RemoteZipError::ShortRead {
                        offset: start,
                        expected,
                        actual: tail.len() as u64,
                    });
                }
                tail.truncate(expected as usize);

                debug!(
                    url = %self.url,
                    total_length,
                    tail_offset = start,
                    tail_len = tail.len(),
                    "resolved remote resource"
                );
                Ok(ResourceInfo {
                    total_length,
                    tail_offset: start,
                    tail,
                })
            }
            // A suffix range over an empty resource cannot be satisfied, but
            // the server still reports the length.
            StatusCode::RANGE_NOT_SATISFIABLE => match content_range {
                Some(ContentRange {
                    span: None,
                    total: Some(total_length),
                }) => {
                    debug!(url = %self.url, total_length, "resolved remote resource with empty tail");
                    Ok(ResourceInfo {
                        total_length,
                        tail_offset: total_length,
                        tail: Vec::new(),
                    })
                }
                _ => Err(self.unavailable(resp.status)),
            },
            status if status.is_success() => Err(self.range_not_supported(
                status,
                "server ignored the Range header",
            )),
            status => Err(self.unavailable(status)),
        }
    }

    async fn send_range(&self, range: String) -> Result<TransportResponse> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&range).map_err(|_| RemoteZipError::InvalidUrl {
            url: self.url.clone(),
        })?;
        headers.insert(RANGE, value);

        let resp = self.transport.get(&self.url, headers).await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.transferred_bytes
            .fetch_add(resp.body.len() as u64, Ordering::Relaxed);

        debug!(
            url = %self.url,
            range = %range,
            status = resp.status.as_u16(),
            bytes = resp.body.len(),
            "range request"
        );
        Ok(resp)
    }

    fn range_not_supported(&self, status: StatusCode, reason: &'static str) -> RemoteZipError {
        RemoteZipError::RangeNotSupported {
            url: self.url.clone(),
            status: status.as_u16(),
            reason,
        }
    }

    fn unavailable(&self, status: StatusCode) -> RemoteZipError {
        RemoteZipError::Unavailable {
            url: self.url.clone(),
            status: status.as_u16(),
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let info = self.info().await?;
        let len = buf.len() as u64;
        check_bounds(offset, len, info.total_length)?;

        if let Some(cached) = info.cached(offset, len) {
            trace!(offset, len, "served from tail cache");
            buf.copy_from_slice(cached);
            return Ok(buf.len());
        }

        let end = offset + len - 1;
        let resp = self.send_range(format!("bytes={}-{}", offset, end)).await?;

        if resp.status != StatusCode::PARTIAL_CONTENT {
            return Err(if resp.status.is_success() {
                self.range_not_supported(resp.status, "server ignored the Range header")
            } else {
                self.unavailable(resp.status)
            });
        }

        match content_range(&resp.headers) {
            Some(ContentRange {
                span: Some((start, _)),
                ..
            }) if start != offset => {
                return Err(RemoteZipError::ContentRangeMismatch {
                    requested: offset,
                    received: start,
                });
            }
            Some(ContentRange { span: Some(_), .. }) => {}
            _ => {
                return Err(self.range_not_supported(
                    resp.status,
                    "partial response without a usable Content-Range",
                ));
            }
        }

        let body = resp.body;
        if (body.len() as u64) < len {
            return Err(RemoteZipError::ShortRead {
                offset,
                expected: len,
                actual: body.len() as u64,
            });
        }
        if body.len() > buf.len() {
            warn!(
                offset,
                requested = buf.len(),
                received = body.len(),
                "server returned more bytes than requested"
            );
        }

        buf.copy_from_slice(&body[..buf.len()]);
        Ok(buf.len())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.info().await?.total_length)
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    span: Option<(u64, u64)>,
    total: Option<u64>,
}

fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };

    let span = match span.trim() {
        "*" => None,
        s => {
            let (start, end) = s.split_once('-')?;
            let start: u64 = start.trim().parse().ok()?;
            let end: u64 = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            Some((start, end))
        }
    };

    if span.is_none() && total.is_none() {
        return None;
    }
    Some(ContentRange { span, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves `data` with range semantics, or ignores ranges when `honor_ranges` is false.
    ///
    /// Explicit (non-suffix) ranges can be answered with a start moved by
    /// `start_shift`, or without a `Content-Range` header.
    struct FakeTransport {
        data: Vec<u8>,
        honor_ranges: bool,
        start_shift: u64,
        send_content_range: bool,
        ranges: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(data: Vec<u8>, honor_ranges: bool) -> Arc<Self> {
            Arc::new(Self {
                data,
                honor_ranges,
                start_shift: 0,
                send_content_range: true,
                ranges: Mutex::new(Vec::new()),
            })
        }

        fn misbehaving(data: Vec<u8>, start_shift: u64, send_content_range: bool) -> Arc<Self> {
            Arc::new(Self {
                data,
                honor_ranges: true,
                start_shift,
                send_content_range,
                ranges: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get(&self, _url: &str, headers: HeaderMap) -> Result<TransportResponse> {
            let range = headers.get(RANGE).unwrap().to_str().unwrap().to_string();
            self.ranges.lock().unwrap().push(range.clone());

            if !self.honor_ranges {
                return Ok(TransportResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Vec::new(),
                });
            }

            let total = self.data.len() as u64;
            let mut headers = HeaderMap::new();
            if total == 0 {
                headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */0"));
                return Ok(TransportResponse {
                    status: StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    body: Vec::new(),
                });
            }

            let spec = range.strip_prefix("bytes=").unwrap();
            let (start, end, suffix) = if let Some(n) = spec.strip_prefix('-') {
                let n: u64 = n.parse().unwrap();
                (total.saturating_sub(n), total - 1, true)
            } else {
                let (s, e) = spec.split_once('-').unwrap();
                (s.parse().unwrap(), e.parse::<u64>().unwrap().min(total - 1), false)
            };

            let (shown_start, shown_end) = if suffix {
                (start, end)
            } else {
                (start + self.start_shift, end + self.start_shift)
            };
            if suffix || self.send_content_range {
                headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!(
                        "bytes {}-{}/{}",
                        shown_start, shown_end, total
                    ))
                    .unwrap(),
                );
            }
            Ok(TransportResponse {
                status: StatusCode::PARTIAL_CONTENT,
                headers,
                body: self.data[start as usize..=end as usize].to_vec(),
            })
        }
    }

    fn reader(transport: Arc<FakeTransport>, tail_window: u64) -> HttpRangeReader {
        let config = ClientConfig::default().with_tail_window(tail_window);
        HttpRangeReader::with_transport("http://example.invalid/a.zip", transport, &config)
            .unwrap()
    }

    #[test]
    fn test_parse_content_range_forms() {
        assert_eq!(
            parse_content_range("bytes 0-99/1234"),
            Some(ContentRange {
                span: Some((0, 99)),
                total: Some(1234)
            })
        );
        assert_eq!(
            parse_content_range("bytes 5-9/*"),
            Some(ContentRange {
                span: Some((5, 9)),
                total: None
            })
        );
        assert_eq!(
            parse_content_range("bytes */42"),
            Some(ContentRange {
                span: None,
                total: Some(42)
            })
        );
        assert_eq!(parse_content_range("bytes 9-5/10"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes */*"), None);
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let result = HttpRangeReader::new("ftp://example.com/a.zip");
        assert!(matches!(result, Err(RemoteZipError::InvalidUrl { .. })));
        let result = HttpRangeReader::new("not a url");
        assert!(matches!(result, Err(RemoteZipError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_first_read_probes_tail_and_caches_it() {
        let data: Vec<u8> = (0..200u8).collect();
        let transport = FakeTransport::new(data.clone(), true);
        let reader = reader(transport.clone(), 50);

        assert_eq!(reader.range_supported(), None);
        assert_eq!(reader.size().await.unwrap(), 200);
        assert_eq!(reader.range_supported(), Some(true));

        // Inside the tail: no extra request.
        let mut buf = [0u8; 10];
        reader.read_at(180, &mut buf).await.unwrap();
        assert_eq!(&buf, &data[180..190]);
        assert_eq!(reader.request_count(), 1);

        // Outside the tail: exactly the requested span.
        reader.read_at(20, &mut buf).await.unwrap();
        assert_eq!(&buf, &data[20..30]);
        assert_eq!(reader.request_count(), 2);
        assert_eq!(
            transport.ranges.lock().unwrap().as_slice(),
            &["bytes=-50".to_string(), "bytes=20-29".to_string()]
        );
        assert_eq!(reader.transferred_bytes(), 60);
    }

    #[tokio::test]
    async fn test_read_past_end_is_out_of_bounds() {
        let transport = FakeTransport::new(vec![0u8; 100], true);
        let reader = reader(transport, 22);

        let mut buf = [0u8; 10];
        let err = reader.read_at(95, &mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteZipError::OutOfBounds {
                offset: 95,
                length: 10,
                total: 100
            }
        ));
    }

    #[tokio::test]
    async fn test_ignored_range_is_reported_on_probe() {
        let transport = FakeTransport::new(vec![0u8; 100], false);
        let reader = reader(transport.clone(), 22);

        let err = reader.size().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteZipError::RangeNotSupported { status: 200, .. }
        ));
        assert_eq!(reader.range_supported(), Some(false));
        assert_eq!(transport.ranges.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_resource_resolves_from_unsatisfiable_probe() {
        let transport = FakeTransport::new(Vec::new(), true);
        let reader = reader(transport.clone(), 64);

        assert_eq!(reader.size().await.unwrap(), 0);
        assert_eq!(reader.range_supported(), Some(true));
        let info = reader.resource_info().unwrap();
        assert_eq!(info.tail_len(), 0);
        assert_eq!(info.tail_offset(), 0);

        let mut buf = [0u8; 1];
        let err = reader.read_at(0, &mut buf).await.unwrap_err();
        assert!(matches!(err, RemoteZipError::OutOfBounds { total: 0, .. }));
        assert_eq!(transport.ranges.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shifted_content_range_is_rejected() {
        let data: Vec<u8> = (0..200u8).collect();
        let reader = reader(FakeTransport::misbehaving(data, 1, true), 50);

        let mut buf = [0u8; 10];
        let err = reader.read_at(20, &mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteZipError::ContentRangeMismatch {
                requested: 20,
                received: 21
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_response_needs_content_range() {
        let data: Vec<u8> = (0..200u8).collect();
        let reader = reader(FakeTransport::misbehaving(data, 0, false), 50);

        // The tail is still served from the probe.
        let mut buf = [0u8; 10];
        reader.read_at(190, &mut buf).await.unwrap();

        let err = reader.read_at(20, &mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteZipError::RangeNotSupported { status: 206, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_read_sends_nothing() {
        let transport = FakeTransport::new(vec![0u8; 100], true);
        let reader = reader(transport, 22);

        let mut buf = [0u8; 0];
        assert_eq!(reader.read_at(0, &mut buf).await.unwrap(), 0);
        assert_eq!(reader.request_count(), 0);
    }
}
