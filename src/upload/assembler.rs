//! Chunked upload reassembly
//!
//! Devices on flaky links split a still image into numbered chunks, each
//! carrying a fragment of the base64 text. The assembler collects them per
//! `uploadId` into a fixed slot table:
//!
//! ```text
//!   uploadId "cap-17", total 4
//!   ┌─────────┬─────────┬─────────┬─────────┐
//!   │ slot 0  │ slot 1  │ slot 2  │ slot 3  │   filled 3/4
//!   │ "aGVs"  │  (none) │ "9ybG"  │ "Qh"    │
//!   └─────────┴─────────┴─────────┴─────────┘
//! ```
//!
//! Chunks arrive in any order and may be duplicated; a slot is written once
//! and never overwritten. The moment the last slot fills, the entry leaves
//! the table *before* the payload is decoded, so a completed upload can be
//! handed over exactly once no matter how many duplicates trail in.
//! Incomplete uploads older than the configured expiry are discarded, either
//! by the background sweep or opportunistically on the next `accept`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::envelope::ChunkUpload;
use crate::config::UploadConfig;
use crate::error::UploadError;

/// One in-progress upload
struct PendingUpload {
    /// Payload fragments by slot, written at most once
    slots: Vec<Option<String>>,

    /// Number of filled slots
    filled: usize,

    /// Owner token fixed by the first chunk
    owner: Option<String>,

    /// Monotonic age, drives expiry
    started_at: Instant,

    /// Wall-clock arrival of the first chunk
    received_at: DateTime<Utc>,
}

impl PendingUpload {
    fn new(total: u32, owner: Option<String>) -> Self {
        Self {
            slots: vec![None; total as usize],
            filled: 0,
            owner,
            started_at: Instant::now(),
            received_at: Utc::now(),
        }
    }
}

/// A fully reassembled upload, decoded and ready for the pipeline
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    /// Owner token from the first chunk
    pub owner: Option<String>,
    /// Decoded image bytes
    pub image: Bytes,
    /// Arrival time of the first chunk
    pub received_at: DateTime<Utc>,
}

/// Keyed store of in-progress chunked uploads
///
/// Safe to share behind an `Arc`; the entry table lives behind an async
/// mutex and every slot mutation is atomic with respect to concurrent
/// submitters.
pub struct UploadAssembler {
    entries: Mutex<HashMap<String, PendingUpload>>,
    config: UploadConfig,
}

impl UploadAssembler {
    /// Create an empty assembler
    pub fn new(config: UploadConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Store one chunk; returns the reassembled upload when it completes
    ///
    /// The first chunk for an id fixes the slot count and the owner. Chunks
    /// that do not fit the declared shape are rejected without creating or
    /// touching any entry; duplicates are ignored (`Ok(None)`). A payload
    /// that cannot be base64-decoded after reassembly is an error too, but
    /// by then the entry is already gone, so the upload cannot be replayed.
    pub async fn accept(
        &self,
        chunk: ChunkUpload,
    ) -> Result<Option<CompletedUpload>, UploadError> {
        if chunk.total == 0 {
            return Err(UploadError::ZeroTotal);
        }
        if chunk.total > self.config.max_chunks {
            return Err(UploadError::TooManyChunks {
                total: chunk.total,
                limit: self.config.max_chunks,
            });
        }
        if chunk.index >= chunk.total {
            return Err(UploadError::IndexOutOfRange {
                index: chunk.index,
                total: chunk.total,
            });
        }

        let mut entries = self.entries.lock().await;
        // An expired entry must never be resurrected by a late chunk
        self.drop_expired(&mut entries);

        let entry = match entries.entry(chunk.upload_id.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                let expected = entry.slots.len() as u32;
                if chunk.total != expected {
                    return Err(UploadError::TotalMismatch {
                        declared: chunk.total,
                        expected,
                    });
                }
                entry
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(
                    upload = %chunk.upload_id,
                    total = chunk.total,
                    "Opened chunked upload"
                );
                vacant.insert(PendingUpload::new(chunk.total, chunk.owner))
            }
        };

        let slot = &mut entry.slots[chunk.index as usize];
        if slot.is_some() {
            tracing::debug!(
                upload = %chunk.upload_id,
                index = chunk.index,
                "Duplicate chunk ignored"
            );
            return Ok(None);
        }
        *slot = Some(chunk.payload);
        entry.filled += 1;

        if entry.filled < entry.slots.len() {
            tracing::debug!(
                upload = %chunk.upload_id,
                index = chunk.index,
                filled = entry.filled,
                total = entry.slots.len(),
                "Chunk stored"
            );
            return Ok(None);
        }

        // Complete: remove first, decode after, so the hand-off is at most once
        let Some(done) = entries.remove(&chunk.upload_id) else {
            return Ok(None);
        };
        drop(entries);

        let text: String = done.slots.into_iter().flatten().collect();
        let image = Bytes::from(STANDARD.decode(text.trim())?);
        tracing::info!(
            upload = %chunk.upload_id,
            bytes = image.len(),
            "Chunked upload reassembled"
        );

        Ok(Some(CompletedUpload {
            owner: done.owner,
            image,
            received_at: done.received_at,
        }))
    }

    /// Discard every incomplete upload older than the expiry window
    ///
    /// Returns the evicted ids. The background sweep calls this on a ticker;
    /// tests call it directly for deterministic expiry.
    pub async fn purge_expired(&self) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        self.drop_expired(&mut entries)
    }

    /// Start the background expiry sweep; the caller owns the handle
    pub fn spawn_sweep_task(self: &Arc<Self>) -> JoinHandle<()> {
        let assembler = Arc::clone(self);
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let expired = assembler.purge_expired().await;
                if !expired.is_empty() {
                    tracing::debug!(evicted = expired.len(), "Upload expiry sweep");
                }
            }
        })
    }

    /// Number of uploads currently awaiting more chunks
    pub async fn pending_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn drop_expired(&self, entries: &mut HashMap<String, PendingUpload>) -> Vec<String> {
        let expiry = self.config.chunk_expiry;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.started_at.elapsed() >= expiry)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = entries.remove(id) {
                tracing::info!(
                    upload = %id,
                    filled = entry.filled,
                    total = entry.slots.len(),
                    "Expired incomplete upload discarded"
                );
            }
        }
        expired
    }
}
