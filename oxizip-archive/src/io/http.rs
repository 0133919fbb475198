use super::source::Source;
use oxizip_core::error::{OxiZipError, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use std::sync::Mutex;
use tracing::{debug, trace, warn};

/// Size of the read-ahead block kept between requests.
const READ_AHEAD: usize = 64 * 1024;

/// A remote archive read through HTTP range requests.
///
/// Small reads (headers, the directory tail) are served from one cached
/// read-ahead block so opening an archive costs a handful of requests.
#[derive(Debug)]
pub struct HttpRangeSource {
    client: Client,
    url: String,
    size: u64,
    retries: u32,
    cache: Mutex<Option<(u64, Vec<u8>)>>,
}

impl HttpRangeSource {
    /// Probe `url` for its size.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_client(Client::new(), url, 3)
    }

    /// Use a configured client and retry count.
    pub fn with_client(client: Client, url: impl Into<String>, retries: u32) -> Result<Self> {
        let url = url.into();
        let size = probe_size(&client, &url)?;
        debug!(%url, size, "http source opened");
        Ok(Self {
            client,
            url,
            size,
            retries,
            cache: Mutex::new(None),
        })
    }

    fn fetch(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset + len as u64 - 1;
        let mut attempt = 0;
        loop {
            trace!(offset, len, attempt, "range request");
            let result = self
                .client
                .get(&self.url)
                .header(RANGE, format!("bytes={}-{}", offset, end))
                .send()
                .map_err(|e| OxiZipError::http(e.to_string()))
                .and_then(|response| match response.status() {
                    StatusCode::PARTIAL_CONTENT => response
                        .bytes()
                        .map(|b| b.to_vec())
                        .map_err(|e| OxiZipError::http(e.to_string())),
                    // Server ignored the range and sent the whole body
                    StatusCode::OK => {
                        let body = response
                            .bytes()
                            .map_err(|e| OxiZipError::http(e.to_string()))?;
                        let start = offset as usize;
                        body.get(start..start + len)
                            .map(|b| b.to_vec())
                            .ok_or_else(|| OxiZipError::unexpected_eof(len))
                    }
                    status => Err(OxiZipError::http(format!("unexpected status {}", status))),
                });
            match result {
                Ok(bytes) if bytes.len() == len => return Ok(bytes),
                Ok(bytes) => {
                    return Err(OxiZipError::http(format!(
                        "range returned {} bytes, expected {}",
                        bytes.len(),
                        len
                    )));
                }
                Err(e @ OxiZipError::Http { .. }) if attempt < self.retries => {
                    warn!(error = %e, attempt, "range request failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn probe_size(client: &Client, url: &str) -> Result<u64> {
    let head = client
        .head(url)
        .send()
        .map_err(|e| OxiZipError::http(e.to_string()))?;
    if let Some(len) = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Ok(len);
    }
    // Fall back to a one-byte range and read the total from Content-Range
    let probe = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .map_err(|e| OxiZipError::http(e.to_string()))?;
    probe
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
        .ok_or_else(|| OxiZipError::http("server reports no content length"))
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

impl Source for HttpRangeSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if offset + buf.len() as u64 > self.size {
            return Err(OxiZipError::unexpected_eof(buf.len()));
        }
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| OxiZipError::http("read-ahead cache poisoned"))?;
        if let Some((start, block)) = cache.as_ref() {
            if offset >= *start && offset + buf.len() as u64 <= start + block.len() as u64 {
                let from = (offset - start) as usize;
                buf.copy_from_slice(&block[from..from + buf.len()]);
                return Ok(());
            }
        }
        if buf.len() >= READ_AHEAD {
            buf.copy_from_slice(&self.fetch(offset, buf.len())?);
            return Ok(());
        }
        let len = (READ_AHEAD as u64).min(self.size - offset) as usize;
        let block = self.fetch(offset, len)?;
        buf.copy_from_slice(&block[..buf.len()]);
        *cache = Some((offset, block));
        Ok(())
    }
}
