//! Persistence and identity collaborators
//!
//! The hub never touches a database, a filesystem, or a push channel itself.
//! Every completed image leaves through the [`ImagePipeline`] seam: resolve
//! the owner token, store the bytes, notify the owner. Implementations plug
//! in whatever backs those three verbs; tests plug in recorders.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::PipelineError;

/// A captured still, owner already resolved, ready for persistence
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Stable owner id
    pub owner: String,
    /// JPEG bytes
    pub data: Bytes,
    /// Device capture time, or arrival time when none was sent
    pub captured_at: DateTime<Utc>,
    /// Classifier tag, when the device sent one
    pub tag: Option<String>,
}

/// Reference to a stored image (storage key, row id, URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle(pub String);

impl std::fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and persistence seam for captured images
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Resolve an owner token to a stable owner id
    ///
    /// Devices are often provisioned with a display name rather than an id;
    /// this is where that lookup happens. `OwnerNotFound` makes the hub fall
    /// back to its configured owner or drop the image.
    async fn resolve_owner(&self, token: &str) -> Result<String, PipelineError>;

    /// Persist one captured image
    async fn store_image(&self, image: CapturedImage) -> Result<ImageHandle, PipelineError>;

    /// Tell the owner a new image exists
    ///
    /// Runs fire-and-forget after a successful store; a failure here never
    /// reaches ingestion. The default implementation does nothing.
    async fn notify_owner(&self, owner: &str, handle: &ImageHandle) -> Result<(), PipelineError> {
        let _ = (owner, handle);
        Ok(())
    }
}
