//! Crate error types
//!
//! Every failure class is non-fatal to the hub: upstream problems terminate
//! raw viewer streams, malformed uploads are dropped one message at a time,
//! and pipeline failures drop one image. Errors here exist so callers and
//! logs can tell those classes apart.

use std::time::Duration;

/// Convenience result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Upstream camera connection failed or broke
    Upstream(UpstreamError),
    /// Upload message was malformed or could not be reassembled
    Upload(UploadError),
    /// A collaborator (storage / identity) failed
    Pipeline(PipelineError),
    /// The hub actor has stopped and can no longer accept commands
    HubClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Upstream(e) => write!(f, "Upstream error: {}", e),
            Error::Upload(e) => write!(f, "Upload error: {}", e),
            Error::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            Error::HubClosed => write!(f, "Hub is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Upstream(e) => Some(e),
            Error::Upload(e) => Some(e),
            Error::Pipeline(e) => Some(e),
            Error::HubClosed => None,
        }
    }
}

impl From<UpstreamError> for Error {
    fn from(e: UpstreamError) -> Self {
        Error::Upstream(e)
    }
}

impl From<UploadError> for Error {
    fn from(e: UploadError) -> Self {
        Error::Upload(e)
    }
}

impl From<PipelineError> for Error {
    fn from(e: PipelineError) -> Self {
        Error::Pipeline(e)
    }
}

/// Error type for upstream camera connections
///
/// Connect-phase variants (`NoSource`, `InvalidUrl`, `ConnectTimeout`,
/// `BadStatus`, and `Io` before any body byte) mean the upstream is
/// unavailable; `Io`/`Protocol` during the body mean an established session
/// was interrupted.
#[derive(Debug)]
pub enum UpstreamError {
    /// No source URL has been configured
    NoSource,
    /// The configured source URL could not be parsed
    InvalidUrl(String),
    /// Connecting to the source exceeded the configured timeout
    ConnectTimeout(Duration),
    /// Socket-level failure
    Io(std::io::Error),
    /// The source answered with a non-200 HTTP status
    BadStatus(u16),
    /// The source sent bytes that violate HTTP framing
    Protocol(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::NoSource => write!(f, "No upstream source configured"),
            UpstreamError::InvalidUrl(url) => write!(f, "Invalid upstream URL: {}", url),
            UpstreamError::ConnectTimeout(t) => {
                write!(f, "Upstream connect timed out after {:?}", t)
            }
            UpstreamError::Io(e) => write!(f, "Upstream I/O error: {}", e),
            UpstreamError::BadStatus(code) => {
                write!(f, "Upstream responded with HTTP status {}", code)
            }
            UpstreamError::Protocol(msg) => write!(f, "Upstream protocol error: {}", msg),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpstreamError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for UpstreamError {
    fn from(e: std::io::Error) -> Self {
        UpstreamError::Io(e)
    }
}

/// Error type for upload envelopes and chunk reassembly
#[derive(Debug)]
pub enum UploadError {
    /// The envelope was not valid JSON
    Json(serde_json::Error),
    /// A required envelope field is missing
    MissingField(&'static str),
    /// A chunked envelope declared `total` of zero
    ZeroTotal,
    /// Chunk index is outside the declared slot range
    IndexOutOfRange { index: u32, total: u32 },
    /// A later chunk declared a different total than the first chunk
    TotalMismatch { declared: u32, expected: u32 },
    /// Declared total exceeds the configured limit
    TooManyChunks { total: u32, limit: u32 },
    /// The image payload was not valid base64
    Decode(base64::DecodeError),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Json(e) => write!(f, "Invalid upload JSON: {}", e),
            UploadError::MissingField(field) => {
                write!(f, "Upload envelope missing field: {}", field)
            }
            UploadError::ZeroTotal => write!(f, "Chunked upload declared zero total chunks"),
            UploadError::IndexOutOfRange { index, total } => {
                write!(f, "Chunk index {} out of range for total {}", index, total)
            }
            UploadError::TotalMismatch { declared, expected } => {
                write!(
                    f,
                    "Chunk declared total {} but upload was opened with total {}",
                    declared, expected
                )
            }
            UploadError::TooManyChunks { total, limit } => {
                write!(f, "Declared total {} exceeds chunk limit {}", total, limit)
            }
            UploadError::Decode(e) => write!(f, "Image payload is not valid base64: {}", e),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Json(e) => Some(e),
            UploadError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(e: serde_json::Error) -> Self {
        UploadError::Json(e)
    }
}

impl From<base64::DecodeError> for UploadError {
    fn from(e: base64::DecodeError) -> Self {
        UploadError::Decode(e)
    }
}

/// Error type for the image pipeline collaborators
#[derive(Debug)]
pub enum PipelineError {
    /// The owner token did not resolve to a known identity
    OwnerNotFound(String),
    /// Persisting an image failed
    Storage(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::OwnerNotFound(token) => {
                write!(f, "Owner not found for token: {}", token)
            }
            PipelineError::Storage(msg) => write!(f, "Storage failure: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}
