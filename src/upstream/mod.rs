//! Upstream camera connections
//!
//! The multiplexer never talks to a socket directly; it goes through the
//! [`UpstreamConnector`] seam. Production wiring uses [`HttpConnector`]
//! (MJPEG over HTTP). Tests inject scripted connectors that replay canned
//! byte sequences or fail on demand.

pub mod http;
pub mod url;

pub use http::HttpConnector;
pub use url::SourceUrl;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::UpstreamError;

/// Streaming body handed out by a connector
#[async_trait]
pub trait ByteSource: Send {
    /// Next run of body bytes
    ///
    /// `Ok(None)` is a clean end of stream. Chunk sizes are whatever the
    /// transport produced; callers must not assume any framing.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UpstreamError>;
}

/// Opens a streaming connection to a camera endpoint
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Connect and return the body byte stream
    ///
    /// Implementations do not enforce an overall deadline; the caller wraps
    /// this in its configured connect timeout.
    async fn open(&self, url: &str) -> Result<Box<dyn ByteSource>, UpstreamError>;
}
