//! Upload ingestion behavior through the hub's public surface
//!
//! A recording pipeline stands in for identity and storage, so every test can
//! assert exactly what reached persistence. Envelopes enter as raw JSON the
//! way an MQTT bridge would hand them over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_test::assert_ok;

use camhub::{
    CameraHub, CapturedImage, HubConfig, ImageHandle, ImagePipeline, PipelineError, UploadConfig,
};

/// Records every pipeline interaction; storage can be told to fail
struct RecordingPipeline {
    owners: HashMap<String, String>,
    stored: Mutex<Vec<CapturedImage>>,
    notified: Mutex<Vec<(String, ImageHandle)>>,
    fail_storage: AtomicBool,
}

impl RecordingPipeline {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            owners: HashMap::new(),
            stored: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            fail_storage: AtomicBool::new(false),
        })
    }

    fn with_owner(token: &str, id: &str) -> Arc<Self> {
        let mut owners = HashMap::new();
        owners.insert(token.to_string(), id.to_string());
        Arc::new(Self {
            owners,
            stored: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            fail_storage: AtomicBool::new(false),
        })
    }

    fn stored(&self) -> Vec<CapturedImage> {
        self.stored.lock().unwrap().clone()
    }

    fn notified(&self) -> Vec<(String, ImageHandle)> {
        self.notified.lock().unwrap().clone()
    }

    fn set_storage_failure(&self, fail: bool) {
        self.fail_storage.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImagePipeline for RecordingPipeline {
    async fn resolve_owner(&self, token: &str) -> Result<String, PipelineError> {
        self.owners
            .get(token)
            .cloned()
            .ok_or_else(|| PipelineError::OwnerNotFound(token.to_string()))
    }

    async fn store_image(&self, image: CapturedImage) -> Result<ImageHandle, PipelineError> {
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(PipelineError::Storage("disk full".to_string()));
        }
        let mut stored = self.stored.lock().unwrap();
        stored.push(image);
        Ok(ImageHandle(format!("img-{}", stored.len())))
    }

    async fn notify_owner(&self, owner: &str, handle: &ImageHandle) -> Result<(), PipelineError> {
        self.notified
            .lock()
            .unwrap()
            .push((owner.to_string(), handle.clone()));
        Ok(())
    }
}

fn hub_with(pipeline: Arc<RecordingPipeline>, upload: UploadConfig) -> CameraHub {
    CameraHub::with_connector(
        HubConfig::default().upload(upload),
        Arc::new(NeverConnector),
        pipeline,
    )
}

/// The upload tests never touch the stream side
struct NeverConnector;

#[async_trait]
impl camhub::UpstreamConnector for NeverConnector {
    async fn open(
        &self,
        _url: &str,
    ) -> Result<Box<dyn camhub::ByteSource>, camhub::UpstreamError> {
        Err(camhub::UpstreamError::NoSource)
    }
}

fn chunk_json(id: &str, index: u32, total: u32, payload: &str, user: &str) -> Vec<u8> {
    serde_json::json!({
        "uploadId": id,
        "index": index,
        "total": total,
        "imageData": payload,
        "userId": user,
    })
    .to_string()
    .into_bytes()
}

// "fake jpeg data" as base64, split mid-fragment so only the slot-ordered
// concatenation decodes
const FRAG_0: &str = "ZmFrZSB";
const FRAG_1: &str = "qcGVnIGRh";
const FRAG_2: &str = "dGE=";

#[tokio::test]
async fn test_chunked_upload_reaches_storage_exactly_once() {
    let pipeline = RecordingPipeline::with_owner("Front Door", "user-1");
    let hub = hub_with(Arc::clone(&pipeline), UploadConfig::default());

    // Out of order, with a duplicate in the middle
    hub.ingest(&chunk_json("cap-1", 2, 3, FRAG_2, "Front Door"))
        .await;
    hub.ingest(&chunk_json("cap-1", 0, 3, FRAG_0, "Front Door"))
        .await;
    hub.ingest(&chunk_json("cap-1", 0, 3, "XXXX", "Front Door"))
        .await;
    hub.ingest(&chunk_json("cap-1", 1, 3, FRAG_1, "Front Door"))
        .await;

    let stored = pipeline.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(&stored[0].data[..], b"fake jpeg data");
    assert_eq!(stored[0].owner, "user-1");
    assert!(stored[0].tag.is_none());

    // A straggler after completion opens a fresh entry, never a second store
    hub.ingest(&chunk_json("cap-1", 1, 3, FRAG_1, "Front Door"))
        .await;
    assert_eq!(pipeline.stored().len(), 1);
}

#[tokio::test]
async fn test_whole_image_stores_and_notifies() {
    let pipeline = RecordingPipeline::with_owner("cam-7", "user-9");
    let hub = hub_with(Arc::clone(&pipeline), UploadConfig::default());

    hub.ingest(
        serde_json::json!({
            "userId": "cam-7",
            "imageData": "ZmFrZSBqcGVnIGRhdGE=",
            "timestamp": 1724371200000u64,
            "detectedObject": "person",
        })
        .to_string()
        .as_bytes(),
    )
    .await;

    let stored = pipeline.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(&stored[0].data[..], b"fake jpeg data");
    assert_eq!(stored[0].owner, "user-9");
    assert_eq!(stored[0].tag.as_deref(), Some("person"));
    assert_eq!(stored[0].captured_at.timestamp_millis(), 1724371200000);

    // Notification runs fire-and-forget; give it a beat
    sleep(Duration::from_millis(50)).await;
    let notified = pipeline.notified();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].0, "user-9");
}

#[tokio::test]
async fn test_unknown_owner_uses_fallback() {
    let pipeline = RecordingPipeline::new();
    let hub = hub_with(
        Arc::clone(&pipeline),
        UploadConfig::default().fallback_owner("house"),
    );

    hub.ingest(
        serde_json::json!({
            "userId": "nobody-knows-me",
            "imageData": "ZmFrZSBqcGVnIGRhdGE=",
        })
        .to_string()
        .as_bytes(),
    )
    .await;

    let stored = pipeline.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].owner, "house");
}

#[tokio::test]
async fn test_unknown_owner_without_fallback_drops() {
    let pipeline = RecordingPipeline::new();
    let hub = hub_with(Arc::clone(&pipeline), UploadConfig::default());

    hub.ingest(
        serde_json::json!({
            "userId": "nobody-knows-me",
            "imageData": "ZmFrZSBqcGVnIGRhdGE=",
        })
        .to_string()
        .as_bytes(),
    )
    .await;

    assert!(pipeline.stored().is_empty());
}

#[tokio::test]
async fn test_storage_failure_does_not_poison_later_uploads() {
    let pipeline = RecordingPipeline::with_owner("cam-1", "user-1");
    let hub = hub_with(Arc::clone(&pipeline), UploadConfig::default());

    pipeline.set_storage_failure(true);
    hub.ingest(
        serde_json::json!({"userId": "cam-1", "imageData": "ZmFrZSBqcGVnIGRhdGE="})
            .to_string()
            .as_bytes(),
    )
    .await;
    assert!(pipeline.stored().is_empty());

    pipeline.set_storage_failure(false);
    hub.ingest(
        serde_json::json!({"userId": "cam-1", "imageData": "ZmFrZSBqcGVnIGRhdGE="})
            .to_string()
            .as_bytes(),
    )
    .await;
    assert_eq!(pipeline.stored().len(), 1);
}

#[tokio::test]
async fn test_malformed_ingest_changes_nothing() {
    let pipeline = RecordingPipeline::with_owner("cam-1", "user-1");
    let hub = hub_with(Arc::clone(&pipeline), UploadConfig::default());

    // Not JSON at all
    hub.ingest(b"not json").await;
    // Chunk fields incomplete
    hub.ingest(br#"{"uploadId":"cap-1","index":0,"imageData":"QUJD"}"#)
        .await;
    // Whole image with undecodable payload
    hub.ingest(br#"{"userId":"cam-1","imageData":"!!!"}"#).await;
    // Chunk with a hostile total
    hub.ingest(&chunk_json("cap-2", 0, 100_000, "QUJD", "cam-1"))
        .await;
    // Zero total
    hub.ingest(&chunk_json("cap-3", 0, 0, "QUJD", "cam-1"))
        .await;

    assert!(pipeline.stored().is_empty());

    // The hub is still perfectly usable afterwards
    hub.ingest(
        serde_json::json!({"userId": "cam-1", "imageData": "ZmFrZSBqcGVnIGRhdGE="})
            .to_string()
            .as_bytes(),
    )
    .await;
    assert_eq!(pipeline.stored().len(), 1);
}

#[tokio::test]
async fn test_notification_failure_is_swallowed() {
    // Pipeline whose notify always fails
    struct SulkyPipeline {
        inner: Arc<RecordingPipeline>,
    }

    #[async_trait]
    impl ImagePipeline for SulkyPipeline {
        async fn resolve_owner(&self, token: &str) -> Result<String, PipelineError> {
            self.inner.resolve_owner(token).await
        }

        async fn store_image(&self, image: CapturedImage) -> Result<ImageHandle, PipelineError> {
            self.inner.store_image(image).await
        }

        async fn notify_owner(
            &self,
            _owner: &str,
            _handle: &ImageHandle,
        ) -> Result<(), PipelineError> {
            Err(PipelineError::Storage("push service down".to_string()))
        }
    }

    let inner = RecordingPipeline::with_owner("cam-1", "user-1");
    let hub = CameraHub::with_connector(
        HubConfig::default(),
        Arc::new(NeverConnector),
        Arc::new(SulkyPipeline {
            inner: Arc::clone(&inner),
        }),
    );

    hub.ingest(
        serde_json::json!({"userId": "cam-1", "imageData": "ZmFrZSBqcGVnIGRhdGE="})
            .to_string()
            .as_bytes(),
    )
    .await;
    sleep(Duration::from_millis(50)).await;

    // Stored fine despite the notification failure, and the hub keeps working
    assert_eq!(inner.stored().len(), 1);
    hub.ingest(
        serde_json::json!({"userId": "cam-1", "imageData": "ZmFrZSBqcGVnIGRhdGE="})
            .to_string()
            .as_bytes(),
    )
    .await;
    assert_eq!(inner.stored().len(), 2);
    assert_ok!(hub.clear_upstream().await);
}
