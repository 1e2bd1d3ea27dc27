//! Upload message envelope
//!
//! Devices publish stills as JSON envelopes with camelCase keys. Two shapes
//! share the same envelope:
//!
//! - **Whole image**: `imageData` carries the complete base64 image, plus an
//!   optional capture `timestamp` (epoch millis) and classifier tag.
//! - **Chunk**: `uploadId`/`index`/`total` identify one slot of a larger
//!   upload, and `imageData` carries a fragment of the base64 *text*. The
//!   fragments only form valid base64 once concatenated in slot order, so
//!   decoding happens after reassembly, never per chunk.
//!
//! [`UploadEnvelope::classify`] turns the loose wire shape into a validated
//! [`UploadMessage`]. Slot arithmetic (zero totals, out-of-range indexes,
//! mismatched totals) is the assembler's business; classification only cares
//! that the right fields are present for the claimed shape.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::UploadError;

/// Wire envelope exactly as the device publishes it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEnvelope {
    /// Reassembly key, chunked uploads only
    pub upload_id: Option<String>,

    /// Zero-based slot number, chunked uploads only
    pub index: Option<u32>,

    /// Declared chunk count, chunked uploads only
    pub total: Option<u32>,

    /// Owner token; may be a display name rather than a stable id
    pub user_id: Option<String>,

    /// Complete base64 image, or one fragment of its text
    pub image_data: Option<String>,

    /// Capture time as device epoch millis
    pub timestamp: Option<i64>,

    /// Classifier tag such as "person"
    pub detected_object: Option<String>,
}

/// A validated upload message
#[derive(Debug, Clone)]
pub enum UploadMessage {
    /// One fragment of a chunked upload
    Chunk(ChunkUpload),
    /// A complete image in a single message
    Whole(WholeUpload),
}

/// One slot of a chunked upload
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    /// Reassembly key
    pub upload_id: String,
    /// Zero-based slot number
    pub index: u32,
    /// Declared chunk count
    pub total: u32,
    /// Base64 text fragment, decoded only after reassembly
    pub payload: String,
    /// Owner token from the envelope
    pub owner: Option<String>,
}

/// A complete image received in one message
#[derive(Debug, Clone)]
pub struct WholeUpload {
    /// Owner token from the envelope
    pub owner: Option<String>,
    /// Decoded image bytes
    pub image: Bytes,
    /// Device capture time, or arrival time when the device sent none
    pub captured_at: DateTime<Utc>,
    /// Classifier tag, if any
    pub tag: Option<String>,
}

impl UploadEnvelope {
    /// Parse an envelope from raw JSON
    pub fn from_json(raw: &[u8]) -> Result<Self, UploadError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Decide the message shape and validate it
    ///
    /// Any of `uploadId`/`index`/`total` makes the envelope chunked, and then
    /// all three are required. Everything else is a whole image, decoded
    /// eagerly so undecodable payloads never reach the pipeline.
    pub fn classify(self) -> Result<UploadMessage, UploadError> {
        let chunked = self.upload_id.is_some() || self.index.is_some() || self.total.is_some();

        if chunked {
            let upload_id = self
                .upload_id
                .ok_or(UploadError::MissingField("uploadId"))?;
            let index = self.index.ok_or(UploadError::MissingField("index"))?;
            let total = self.total.ok_or(UploadError::MissingField("total"))?;
            let payload = self
                .image_data
                .ok_or(UploadError::MissingField("imageData"))?;

            Ok(UploadMessage::Chunk(ChunkUpload {
                upload_id,
                index,
                total,
                payload,
                owner: self.user_id,
            }))
        } else {
            let encoded = self
                .image_data
                .ok_or(UploadError::MissingField("imageData"))?;
            let image = Bytes::from(STANDARD.decode(encoded.trim())?);
            let captured_at = self
                .timestamp
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .unwrap_or_else(Utc::now);

            Ok(UploadMessage::Whole(WholeUpload {
                owner: self.user_id,
                image,
                captured_at,
                tag: self.detected_object,
            }))
        }
    }
}
