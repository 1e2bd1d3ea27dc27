//! MJPEG over HTTP
//!
//! Cameras in this crate's world speak bare HTTP/1.1: one `GET`, a `200`
//! response with `multipart/x-mixed-replace`, then an unbounded body. The
//! embedded httpd on ESP32 boards streams that body with
//! `Transfer-Encoding: chunked`, so the source decodes chunked framing and
//! hands downstream exactly the bytes the camera produced.
//!
//! ```text
//! GET /stream HTTP/1.1          HTTP/1.1 200 OK
//! Host: cam.local               Content-Type: multipart/x-mixed-replace;..
//! Accept: multipart/..    ──►   Transfer-Encoding: chunked
//! Connection: close
//!                               <chunked multipart body, never ending>
//! ```

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::url::SourceUrl;
use super::{ByteSource, UpstreamConnector};
use crate::error::UpstreamError;

/// Response head size limit
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Chunk size line limit (hex digits plus extensions)
const MAX_SIZE_LINE: usize = 1024;

/// Connector for plain-HTTP camera endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

#[async_trait]
impl UpstreamConnector for HttpConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn ByteSource>, UpstreamError> {
        let url = SourceUrl::parse(url)?;
        tracing::debug!(host = %url.host, port = url.port, path = %url.path, "Opening upstream connection");

        let mut io = TcpStream::connect((url.host.as_str(), url.port)).await?;

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: multipart/x-mixed-replace, image/jpeg\r\nConnection: close\r\n\r\n",
            url.path,
            url.host_header()
        );
        io.write_all(request.as_bytes()).await?;

        // Accumulate until the blank line that ends the response head
        let mut buf = BytesMut::with_capacity(4096);
        let head_end = loop {
            if let Some(end) = find_double_crlf(&buf) {
                break end;
            }
            if buf.len() > MAX_HEAD_SIZE {
                return Err(UpstreamError::Protocol("response head too large".into()));
            }
            if io.read_buf(&mut buf).await? == 0 {
                return Err(UpstreamError::Protocol(
                    "connection closed before response head".into(),
                ));
            }
        };

        let head_bytes = buf.split_to(head_end);
        let head = parse_response_head(&head_bytes)?;
        if head.status != 200 {
            return Err(UpstreamError::BadStatus(head.status));
        }

        // Whatever followed the head in the same read is already body
        Ok(Box::new(HttpSource {
            io,
            buf,
            decoder: head.chunked.then(ChunkedDecoder::new),
            eof: false,
        }))
    }
}

/// Established HTTP body stream
struct HttpSource {
    io: TcpStream,
    /// Raw bytes read but not yet handed out (or not yet dechunked)
    buf: BytesMut,
    /// Present when the response declared chunked transfer encoding
    decoder: Option<ChunkedDecoder>,
    eof: bool,
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UpstreamError> {
        loop {
            match &mut self.decoder {
                None => {
                    // Identity encoding: pass bytes straight through
                    if !self.buf.is_empty() {
                        return Ok(Some(self.buf.split().freeze()));
                    }
                    if self.eof {
                        return Ok(None);
                    }
                    if self.io.read_buf(&mut self.buf).await? == 0 {
                        self.eof = true;
                        return Ok(None);
                    }
                }
                Some(decoder) => {
                    if let Some(out) = decoder.decode(&mut self.buf)? {
                        return Ok(Some(out));
                    }
                    if decoder.is_done() {
                        return Ok(None);
                    }
                    if self.eof {
                        return Err(UpstreamError::Protocol(
                            "connection closed inside chunked body".into(),
                        ));
                    }
                    if self.io.read_buf(&mut self.buf).await? == 0 {
                        self.eof = true;
                    }
                }
            }
        }
    }
}

/// Minimal parse result of an HTTP response head
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub chunked: bool,
}

/// Parse a response head (status line + header lines, CRLF delimited)
pub(crate) fn parse_response_head(head: &[u8]) -> Result<ResponseHead, UpstreamError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| UpstreamError::Protocol("response head is not valid UTF-8".into()))?;

    let mut lines = text.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| UpstreamError::Protocol("empty response head".into()))?;

    // "HTTP/1.1 200 OK"
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(UpstreamError::Protocol(format!(
            "malformed status line: {}",
            status_line
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            UpstreamError::Protocol(format!("malformed status line: {}", status_line))
        })?;

    let mut chunked = false;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.trim().to_ascii_lowercase().contains("chunked")
            {
                chunked = true;
            }
        }
    }

    Ok(ResponseHead { status, chunked })
}

/// Position just past the `\r\n\r\n` that terminates a response head
fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Resumable RFC 7230 chunked-body decoder
///
/// Feeds on a raw byte buffer and yields decoded body runs as soon as they
/// are available; a chunk split across reads comes out as several runs.
pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Expecting a chunk size line
    Size,
    /// Inside chunk data with this many bytes left
    Data { remaining: usize },
    /// Expecting the CRLF that closes a data chunk
    DataEnd,
    /// Skipping trailer lines after the zero-size chunk
    Trailer,
    /// Stream finished cleanly
    Done,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self {
            state: ChunkedState::Size,
        }
    }

    /// Decode as much as the buffered input allows
    ///
    /// `Ok(None)` means more input is needed, or the body is finished
    /// (`is_done`).
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, UpstreamError> {
        loop {
            match self.state {
                ChunkedState::Size => {
                    let Some(line_end) = find_crlf(buf) else {
                        if buf.len() > MAX_SIZE_LINE {
                            return Err(UpstreamError::Protocol("chunk size line too long".into()));
                        }
                        return Ok(None);
                    };
                    let line = buf.split_to(line_end + 2);
                    let line = std::str::from_utf8(&line[..line_end])
                        .map_err(|_| UpstreamError::Protocol("invalid chunk size line".into()))?;

                    // Chunk extensions after ';' are ignored
                    let hex = line.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(hex, 16).map_err(|_| {
                        UpstreamError::Protocol(format!("invalid chunk size: {}", hex))
                    })?;

                    self.state = if size == 0 {
                        ChunkedState::Trailer
                    } else {
                        ChunkedState::Data { remaining: size }
                    };
                }
                ChunkedState::Data { remaining } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(buf.len());
                    let out = buf.split_to(take).freeze();
                    self.state = if take == remaining {
                        ChunkedState::DataEnd
                    } else {
                        ChunkedState::Data {
                            remaining: remaining - take,
                        }
                    };
                    return Ok(Some(out));
                }
                ChunkedState::DataEnd => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    let crlf = buf.split_to(2);
                    if &crlf[..] != b"\r\n" {
                        return Err(UpstreamError::Protocol("missing CRLF after chunk".into()));
                    }
                    self.state = ChunkedState::Size;
                }
                ChunkedState::Trailer => {
                    let Some(line_end) = find_crlf(buf) else {
                        return Ok(None);
                    };
                    buf.advance(line_end + 2);
                    if line_end == 0 {
                        // Blank line: body complete
                        self.state = ChunkedState::Done;
                        return Ok(None);
                    }
                }
                ChunkedState::Done => return Ok(None),
            }
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == ChunkedState::Done
    }
}
