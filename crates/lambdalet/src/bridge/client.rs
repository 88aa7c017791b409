//! Proxy client: one framed POST to the worker's loopback endpoint.
//!
//! Each attempt opens a fresh connection so the three lifecycle timestamps
//! (socket open, write complete, response complete) measure the real
//! transport, not a pooled socket.

use std::io;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Decoded worker reply for a successful exchange.
///
/// The worker's payload is opaque; JSON decoding is a best-effort convenience
/// applied only when the worker says `application/json`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Json(serde_json::Value),
    Text(String),
}

/// Structured failure reported by the worker (status >= 400).
///
/// Carries enough to let a downstream gateway reconstruct an HTTP-shaped
/// error: numeric code, canonical status phrase, and the response headers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("worker returned {code}: {error}")]
pub struct WorkerFailure {
    pub code: u16,
    pub status: Option<&'static str>,
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Worker(#[from] WorkerFailure),
}

/// Elapsed-time deltas for the lifecycle phases of one attempt, relative to
/// request start. A phase that was never reached stays `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeTimings {
    pub socket_open: Option<Duration>,
    pub request_complete: Option<Duration>,
    pub response_complete: Option<Duration>,
    /// Success body length in bytes; `None` on any failure.
    pub response_length: Option<u64>,
}

pub struct ProxyClient {
    port: u16,
    path: String,
}

impl ProxyClient {
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// POST the encoded request and decode the worker's reply.
    ///
    /// Timings are returned alongside the result so the caller can report
    /// them for failed attempts too.
    pub async fn send(&self, body: &[u8]) -> (Result<ResponsePayload, ProxyError>, ExchangeTimings) {
        let started = Instant::now();
        let mut timings = ExchangeTimings::default();
        let result = self.exchange(body, started, &mut timings).await;
        (result, timings)
    }

    async fn exchange(
        &self,
        body: &[u8],
        started: Instant,
        timings: &mut ExchangeTimings,
    ) -> Result<ResponsePayload, ProxyError> {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port)).await?;
        timings.socket_open = Some(started.elapsed());
        tracing::trace!(port = self.port, path = %self.path, "socket open");

        let head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: 127.0.0.1:{}\r\n\
             Content-Type: application/x-protobuf\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n",
            self.path,
            self.port,
            body.len(),
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(body).await?;
        stream.flush().await?;
        timings.request_complete = Some(started.elapsed());

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        timings.response_complete = Some(started.elapsed());

        let response = RawResponse::parse(&raw)?;
        tracing::debug!(code = response.code, bytes = response.body.len(), "worker replied");

        if response.code >= 400 {
            let status = reqwest::StatusCode::from_u16(response.code)
                .ok()
                .and_then(|s| s.canonical_reason());
            return Err(WorkerFailure {
                code: response.code,
                status,
                headers: response.headers,
                error: String::from_utf8_lossy(&response.body).into_owned(),
            }
            .into());
        }

        timings.response_length = Some(response.body.len() as u64);
        let text = String::from_utf8_lossy(&response.body).into_owned();
        if response.header("content-type") == Some("application/json") {
            // Best-effort decode; a malformed body passes through as text.
            match serde_json::from_str(&text) {
                Ok(value) => Ok(ResponsePayload::Json(value)),
                Err(_) => Ok(ResponsePayload::Text(text)),
            }
        } else {
            Ok(ResponsePayload::Text(text))
        }
    }
}

struct RawResponse {
    code: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RawResponse {
    fn parse(raw: &[u8]) -> io::Result<Self> {
        let malformed = || io::Error::new(io::ErrorKind::InvalidData, "malformed HTTP response");

        let head_end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(malformed)?;
        let head = std::str::from_utf8(&raw[..head_end]).map_err(|_| malformed())?;
        let mut lines = head.split("\r\n");

        let status_line = lines.next().ok_or_else(malformed)?;
        let code = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(malformed)?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or_else(malformed)?;
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }

        let chunked = headers.iter().any(|(name, value)| {
            name == "transfer-encoding" && value.to_ascii_lowercase().contains("chunked")
        });

        let mut body = raw[head_end + 4..].to_vec();
        if chunked {
            // Workers that stream without a length chunk-frame the body;
            // strip the framing so the payload comes out clean.
            body = decode_chunked(&body)?;
        } else if let Some(len) = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            && len <= body.len()
        {
            // The connection is closed per request, so the body normally
            // runs to EOF; trust Content-Length if the peer sent trailing
            // bytes anyway.
            body.truncate(len);
        }

        Ok(Self {
            code,
            headers,
            body,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Reassemble a chunk-framed body: `<hex size>\r\n<data>\r\n` repeated,
/// terminated by a zero-size chunk. Trailers after the terminator are
/// discarded.
fn decode_chunked(raw: &[u8]) -> io::Result<Vec<u8>> {
    let malformed = || io::Error::new(io::ErrorKind::InvalidData, "malformed chunked body");

    let mut decoded = Vec::new();
    let mut rest = raw;
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(malformed)?;
        let size_line = std::str::from_utf8(&rest[..line_end]).map_err(|_| malformed())?;
        // Chunk extensions after ';' are allowed and ignored.
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| malformed())?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Ok(decoded);
        }
        if rest.len() < size + 2 || &rest[size..size + 2] != b"\r\n" {
            return Err(malformed());
        }
        decoded.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}
