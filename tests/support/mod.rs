//! Shared helpers for integration tests: an archive builder with control over
//! layout details the `zip` crate will not produce (duplicate names, forced
//! Zip64, wrong entry counts), and a wiremock responder that honors `Range`.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ARCHIVE_PATH: &str = "/firmware.zip";

// 2024-03-15 13:45:30
const DOS_DATE: u16 = ((2024 - 1980) << 9) | (3 << 5) | 15;
const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;

struct PendingEntry {
    name: String,
    method: u16,
    data: Vec<u8>,
    payload: Vec<u8>,
}

/// Where an entry ended up in a built archive.
#[derive(Debug, Clone)]
pub struct EntryLayout {
    pub name: String,
    pub header_offset: u64,
    pub data_offset: u64,
    pub compressed_size: u64,
    pub crc32: u32,
}

#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<PendingEntry>,
    comment: Vec<u8>,
    zip64: bool,
    declared_entries: Option<u16>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            method: 0,
            data: data.to_vec(),
            payload: data.to_vec(),
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        self.entries.push(PendingEntry {
            name: name.to_string(),
            method: 8,
            data: data.to_vec(),
            payload: encoder.finish().unwrap(),
        });
        self
    }

    /// An entry whose payload is `data` verbatim but labelled with `method`.
    pub fn with_method(mut self, name: &str, method: u16, data: &[u8]) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            method,
            data: data.to_vec(),
            payload: data.to_vec(),
        });
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Write every size and offset through Zip64 records and extra fields.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    /// Override the entry count written to the EOCD record.
    pub fn declared_entries(mut self, count: u16) -> Self {
        self.declared_entries = Some(count);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Vec<EntryLayout>) {
        let mut out = Vec::new();
        let mut layout = Vec::new();
        let version: u16 = if self.zip64 { 45 } else { 20 };

        for entry in &self.entries {
            let crc = crc32fast::hash(&entry.data);
            let header_offset = out.len() as u64;
            let extra = if self.zip64 {
                zip64_extra(&[entry.data.len() as u64, entry.payload.len() as u64])
            } else {
                Vec::new()
            };

            put(&mut out, b"PK\x03\x04");
            put16(&mut out, version);
            put16(&mut out, 0);
            put16(&mut out, entry.method);
            put16(&mut out, DOS_TIME);
            put16(&mut out, DOS_DATE);
            put32(&mut out, crc);
            put32(&mut out, self.size32(entry.payload.len() as u64));
            put32(&mut out, self.size32(entry.data.len() as u64));
            put16(&mut out, entry.name.len() as u16);
            put16(&mut out, extra.len() as u16);
            put(&mut out, entry.name.as_bytes());
            put(&mut out, &extra);

            let data_offset = out.len() as u64;
            put(&mut out, &entry.payload);

            layout.push(EntryLayout {
                name: entry.name.clone(),
                header_offset,
                data_offset,
                compressed_size: entry.payload.len() as u64,
                crc32: crc,
            });
        }

        let cd_offset = out.len() as u64;
        for (entry, placed) in self.entries.iter().zip(&layout) {
            let extra = if self.zip64 {
                zip64_extra(&[
                    entry.data.len() as u64,
                    entry.payload.len() as u64,
                    placed.header_offset,
                ])
            } else {
                Vec::new()
            };

            put(&mut out, b"PK\x01\x02");
            put16(&mut out, version);
            put16(&mut out, version);
            put16(&mut out, 0);
            put16(&mut out, entry.method);
            put16(&mut out, DOS_TIME);
            put16(&mut out, DOS_DATE);
            put32(&mut out, placed.crc32);
            put32(&mut out, self.size32(entry.payload.len() as u64));
            put32(&mut out, self.size32(entry.data.len() as u64));
            put16(&mut out, entry.name.len() as u16);
            put16(&mut out, extra.len() as u16);
            put16(&mut out, 0); // comment
            put16(&mut out, 0); // disk start
            put16(&mut out, 0); // internal attributes
            put32(&mut out, 0); // external attributes
            put32(&mut out, self.size32(placed.header_offset));
            put(&mut out, entry.name.as_bytes());
            put(&mut out, &extra);
        }
        let cd_size = out.len() as u64 - cd_offset;
        let count = self.entries.len() as u64;

        if self.zip64 {
            let eocd64_offset = out.len() as u64;
            put(&mut out, b"PK\x06\x06");
            put64(&mut out, 44);
            put16(&mut out, 45);
            put16(&mut out, 45);
            put32(&mut out, 0);
            put32(&mut out, 0);
            put64(&mut out, count);
            put64(&mut out, count);
            put64(&mut out, cd_size);
            put64(&mut out, cd_offset);

            put(&mut out, b"PK\x06\x07");
            put32(&mut out, 0);
            put64(&mut out, eocd64_offset);
            put32(&mut out, 1);
        }

        let declared = self.declared_entries.unwrap_or(count as u16);
        put(&mut out, b"PK\x05\x06");
        put16(&mut out, 0);
        put16(&mut out, 0);
        if self.zip64 {
            put16(&mut out, 0xFFFF);
            put16(&mut out, 0xFFFF);
            put32(&mut out, 0xFFFF_FFFF);
            put32(&mut out, 0xFFFF_FFFF);
        } else {
            put16(&mut out, declared);
            put16(&mut out, declared);
            put32(&mut out, cd_size as u32);
            put32(&mut out, cd_offset as u32);
        }
        put16(&mut out, self.comment.len() as u16);
        put(&mut out, &self.comment);

        (out, layout)
    }

    fn size32(&self, value: u64) -> u32 {
        if self.zip64 { 0xFFFF_FFFF } else { value as u32 }
    }
}

fn zip64_extra(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    put16(&mut out, 0x0001);
    put16(&mut out, (values.len() * 8) as u16);
    for v in values {
        put64(&mut out, *v);
    }
    out
}

fn put(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Build an archive with the `zip` crate: `(name, data, deflate)`.
pub fn zip_crate_archive(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, deflate) in files {
        let method = if *deflate {
            zip::CompressionMethod::Deflated
        } else {
            zip::CompressionMethod::Stored
        };
        let options = zip::write::SimpleFileOptions::default().compression_method(method);
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Decompress `name` the conventional way: read the whole archive with the `zip` crate.
pub fn reference_extract(archive: &[u8], name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut file = zip.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// 206 with Content-Range, as a well-behaved server.
    Ranges,
    /// 200 with the whole body, ignoring `Range`.
    IgnoreRanges,
    /// Like `Ranges`, but bodies of non-suffix requests lose their last byte.
    ShortBodies,
}

/// Serves an in-memory archive with HTTP range semantics.
pub struct RangeResponder {
    data: Arc<Vec<u8>>,
    mode: ServeMode,
    corrupt_offset: Option<u64>,
    delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            mode: ServeMode::Ranges,
            corrupt_offset: None,
            delay: None,
        }
    }

    pub fn mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Flip the byte at this archive offset whenever it is served.
    pub fn corrupt_at(mut self, offset: u64) -> Self {
        self.corrupt_offset = Some(offset);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn template(&self, status: u16) -> ResponseTemplate {
        let template = ResponseTemplate::new(status);
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.data.len() as u64;

        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="));

        let (Some(spec), ServeMode::Ranges | ServeMode::ShortBodies) = (range, self.mode) else {
            return self.template(200).set_body_bytes(self.data.as_slice());
        };

        let (start, end, suffix) = if let Some(n) = spec.strip_prefix('-') {
            let n: u64 = n.parse().unwrap();
            (total.saturating_sub(n), total.saturating_sub(1), true)
        } else {
            let (s, e) = spec.split_once('-').unwrap();
            let e: u64 = e.parse().unwrap();
            (s.parse().unwrap(), e.min(total.saturating_sub(1)), false)
        };

        if total == 0 || start >= total {
            return self
                .template(416)
                .insert_header("Content-Range", format!("bytes */{}", total));
        }

        let mut body = self.data[start as usize..=end as usize].to_vec();
        if let Some(offset) = self.corrupt_offset {
            if (start..=end).contains(&offset) {
                body[(offset - start) as usize] ^= 0xFF;
            }
        }
        if self.mode == ServeMode::ShortBodies && !suffix {
            body.pop();
        }

        self.template(206)
            .insert_header("Content-Range", format!("bytes {}-{}/{}", start, end, total))
            .set_body_bytes(body)
    }
}

/// Start a mock server that serves `responder` at [`ARCHIVE_PATH`].
pub async fn serve(responder: RangeResponder) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(responder)
        .mount(&server)
        .await;
    let url = format!("{}{}", server.uri(), ARCHIVE_PATH);
    (server, url)
}

/// `Range` headers of every request the server has seen, in order.
pub async fn received_ranges(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.headers.get("range"))
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}
