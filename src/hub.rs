//! Camera hub façade
//!
//! One hub per camera. Ties the three moving parts together and is the only
//! type most embedders need:
//!
//! ```text
//!                         ┌─────────── CameraHub ───────────┐
//!   viewers ◄── streams ──┤ StreamMux                       │
//!   devices ── envelopes ─┤ UploadAssembler ── ImagePipeline├──► storage,
//!                         └─────────────────────────────────┘    notification
//! ```
//!
//! Every failure on the upload path is absorbed here: malformed envelopes,
//! unresolvable owners, and storage errors each drop a single message with a
//! log line, never the hub.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::error::Result;
use crate::pipeline::{CapturedImage, ImagePipeline};
use crate::stream::{FrameSubscription, RawSubscription, StreamMux, SubscriberId, UpstreamStatus};
use crate::upload::{ChunkUpload, UploadAssembler, UploadEnvelope, UploadMessage, WholeUpload};
use crate::upstream::{HttpConnector, UpstreamConnector};

/// Ingestion core for a single camera
pub struct CameraHub {
    mux: StreamMux,
    assembler: Arc<UploadAssembler>,
    pipeline: Arc<dyn ImagePipeline>,
    fallback_owner: Option<String>,
    sweep: JoinHandle<()>,
}

impl CameraHub {
    /// Create a hub with the production HTTP connector
    pub fn new(config: HubConfig, pipeline: Arc<dyn ImagePipeline>) -> Self {
        Self::with_connector(config, Arc::new(HttpConnector), pipeline)
    }

    /// Create a hub with a custom upstream connector
    pub fn with_connector(
        config: HubConfig,
        connector: Arc<dyn UpstreamConnector>,
        pipeline: Arc<dyn ImagePipeline>,
    ) -> Self {
        let fallback_owner = config.upload.fallback_owner.clone();
        let mux = StreamMux::spawn(config.stream, connector);
        let assembler = Arc::new(UploadAssembler::new(config.upload));
        let sweep = assembler.spawn_sweep_task();

        Self {
            mux,
            assembler,
            pipeline,
            fallback_owner,
            sweep,
        }
    }

    /// Subscribe to the upstream byte stream as-is
    pub async fn join_raw_stream(&self) -> Result<RawSubscription> {
        self.mux.join_raw().await
    }

    /// End a raw stream membership
    pub async fn leave_raw_stream(&self, id: SubscriberId) -> Result<()> {
        self.mux.leave_raw(id).await
    }

    /// Subscribe to complete JPEG frames
    pub async fn join_frame_stream(&self) -> Result<FrameSubscription> {
        self.mux.join_frame().await
    }

    /// End a frame stream membership
    pub async fn leave_frame_stream(&self, id: SubscriberId) -> Result<()> {
        self.mux.leave_frame(id).await
    }

    /// Set the upstream camera URL
    pub async fn configure_upstream(&self, url: impl Into<String>) -> Result<()> {
        self.mux.set_source(Some(url.into())).await
    }

    /// Forget the upstream camera URL
    pub async fn clear_upstream(&self) -> Result<()> {
        self.mux.set_source(None).await
    }

    /// Watch the last-known upstream status
    pub fn status(&self) -> watch::Receiver<UpstreamStatus> {
        self.mux.status()
    }

    /// Ingest one raw upload envelope as published by a device
    ///
    /// The transport hands bytes in and is done: malformed input is logged
    /// and dropped here, never bounced back.
    pub async fn ingest(&self, raw: &[u8]) {
        match UploadEnvelope::from_json(raw).and_then(UploadEnvelope::classify) {
            Ok(UploadMessage::Chunk(chunk)) => self.submit_chunk(chunk).await,
            Ok(UploadMessage::Whole(whole)) => self.submit_image(whole).await,
            Err(error) => {
                tracing::warn!(error = %error, "Dropping malformed upload message");
            }
        }
    }

    /// Submit one chunk of a chunked upload
    pub async fn submit_chunk(&self, chunk: ChunkUpload) {
        match self.assembler.accept(chunk).await {
            Ok(Some(done)) => {
                self.dispatch(done.owner, done.image, done.received_at, None)
                    .await;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(error = %error, "Dropping upload chunk");
            }
        }
    }

    /// Submit a complete image
    pub async fn submit_image(&self, image: WholeUpload) {
        self.dispatch(image.owner, image.image, image.captured_at, image.tag)
            .await;
    }

    async fn dispatch(
        &self,
        token: Option<String>,
        data: Bytes,
        captured_at: DateTime<Utc>,
        tag: Option<String>,
    ) {
        let Some(owner) = self.resolve_owner(token).await else {
            return;
        };

        let image = CapturedImage {
            owner: owner.clone(),
            data,
            captured_at,
            tag,
        };
        let bytes = image.data.len();

        match self.pipeline.store_image(image).await {
            Ok(handle) => {
                tracing::info!(owner = %owner, handle = %handle, bytes = bytes, "Image stored");
                let pipeline = Arc::clone(&self.pipeline);
                tokio::spawn(async move {
                    if let Err(error) = pipeline.notify_owner(&owner, &handle).await {
                        tracing::warn!(owner = %owner, error = %error, "Owner notification failed");
                    }
                });
            }
            Err(error) => {
                tracing::error!(owner = %owner, error = %error, "Failed to store image");
            }
        }
    }

    async fn resolve_owner(&self, token: Option<String>) -> Option<String> {
        if let Some(token) = token {
            match self.pipeline.resolve_owner(&token).await {
                Ok(owner) => return Some(owner),
                Err(error) => {
                    tracing::warn!(token = %token, error = %error, "Owner resolution failed");
                }
            }
        } else {
            tracing::warn!("Upload message carried no owner token");
        }

        match &self.fallback_owner {
            Some(owner) => {
                tracing::debug!(owner = %owner, "Falling back to configured owner");
                Some(owner.clone())
            }
            None => {
                tracing::warn!("No fallback owner configured, dropping image");
                None
            }
        }
    }
}

impl Drop for CameraHub {
    fn drop(&mut self) {
        self.sweep.abort();
    }
}
