//! Camera ingestion core for ESP32-style security cameras
//!
//! Two subsystems behind one façade:
//!
//! - **Stream multiplexing**: exactly one connection to the camera's MJPEG
//!   endpoint, shared by any number of viewers. Raw subscribers get the byte
//!   stream as-is; frame subscribers get complete JPEG frames. The upstream
//!   session starts on the first join and survives a configurable grace
//!   period after the last leave, so page reloads never cause a reconnect.
//! - **Upload reassembly**: JSON envelopes carrying whole or chunked base64
//!   stills are validated, reassembled per `uploadId`, and handed to an
//!   [`ImagePipeline`] collaborator for storage and notification. Incomplete
//!   uploads are garbage collected on expiry.
//!
//! ```text
//!                   ┌──────────── CameraHub ────────────┐
//!   camera ──MJPEG──┤ StreamMux ──┬─► raw byte streams  │
//!                   │             └─► JPEG frames       ├──► viewers
//!   device ──JSON───┤ UploadAssembler ──► ImagePipeline │──► storage
//!                   └───────────────────────────────────┘
//! ```
//!
//! One hub serves one camera; run several hubs for several cameras. All
//! transports (HTTP/WS serving, MQTT ingestion) live outside the crate and
//! talk to the hub through plain byte slices and channel receivers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camhub::{CameraHub, CapturedImage, HubConfig, ImageHandle, ImagePipeline, PipelineError};
//!
//! struct PrintStore;
//!
//! #[async_trait::async_trait]
//! impl ImagePipeline for PrintStore {
//!     async fn resolve_owner(&self, token: &str) -> Result<String, PipelineError> {
//!         Ok(token.to_string())
//!     }
//!
//!     async fn store_image(&self, image: CapturedImage) -> Result<ImageHandle, PipelineError> {
//!         println!("storing {} bytes for {}", image.data.len(), image.owner);
//!         Ok(ImageHandle(format!("mem-{}", image.data.len())))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> camhub::Result<()> {
//!     let hub = CameraHub::new(
//!         HubConfig::with_source("http://192.168.1.42/stream"),
//!         Arc::new(PrintStore),
//!     );
//!
//!     let mut sub = hub.join_frame_stream().await?;
//!     while let Ok(frame) = sub.frames.recv().await {
//!         println!("frame: {} bytes", frame.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod pipeline;
pub mod stream;
pub mod upload;
pub mod upstream;

pub use config::{HubConfig, StreamConfig, UploadConfig};
pub use error::{Error, PipelineError, Result, UploadError, UpstreamError};
pub use hub::CameraHub;
pub use pipeline::{CapturedImage, ImageHandle, ImagePipeline};
pub use stream::{
    FrameDemuxer, FrameSubscription, RawSubscription, StreamMux, SubscriberId, UpstreamPhase,
    UpstreamStatus,
};
pub use upload::{
    ChunkUpload, CompletedUpload, UploadAssembler, UploadEnvelope, UploadMessage, WholeUpload,
};
pub use upstream::{ByteSource, HttpConnector, SourceUrl, UpstreamConnector};
