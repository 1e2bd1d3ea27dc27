//! Subscriber membership and fan-out
//!
//! Tracks every downstream consumer of the camera stream and delivers bytes
//! or frames to them. Two kinds of subscriber exist:
//!
//! - **Raw** subscribers get the upstream byte stream exactly as received,
//!   each through its own bounded sink. They model live HTTP responses; a
//!   sink that fills up or goes away costs the subscriber its membership,
//!   never a stall of ingestion.
//! - **Frame** subscribers share one `tokio::sync::broadcast` channel of
//!   whole JPEG frames. `bytes::Bytes` is reference counted, so any number of
//!   frame subscribers share a single allocation per frame. A lagging frame
//!   subscriber skips frames but keeps its membership.
//!
//! The registry is not internally synchronized; it is owned by the mux actor,
//! whose command queue serializes every join, leave, and delivery.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;

/// Identifier handed out on join, unique for the lifetime of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Membership record for one subscriber
enum Subscriber {
    /// Dedicated bounded byte sink
    Raw { sink: mpsc::Sender<Bytes> },
    /// Rides the shared frame broadcast channel
    Frame,
}

/// Membership table plus delivery paths for both subscriber kinds
pub struct SubscriberRegistry {
    /// All current members keyed by id
    subscribers: HashMap<SubscriberId, Subscriber>,

    /// Next id to hand out; never reused
    next_id: u64,

    /// Current raw member count
    raw_count: usize,

    /// Current frame member count
    frame_count: usize,

    /// Shared frame fan-out channel
    frame_tx: broadcast::Sender<Bytes>,

    /// Depth of each raw subscriber's sink
    raw_capacity: usize,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new(broadcast_capacity: usize, raw_capacity: usize) -> Self {
        let (frame_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            subscribers: HashMap::new(),
            next_id: 1,
            raw_count: 0,
            frame_count: 0,
            frame_tx,
            raw_capacity,
        }
    }

    /// Add a raw subscriber
    ///
    /// Returns the new id and the receiving end of its byte sink.
    pub fn join_raw(&mut self) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let id = self.allocate_id();
        let (sink, rx) = mpsc::channel(self.raw_capacity);
        self.subscribers.insert(id, Subscriber::Raw { sink });
        self.raw_count += 1;

        tracing::debug!(
            subscriber = %id,
            raw = self.raw_count,
            frame = self.frame_count,
            "Raw subscriber joined"
        );
        (id, rx)
    }

    /// Add a frame subscriber
    ///
    /// Returns the new id and a receiver on the shared frame channel.
    pub fn join_frame(&mut self) -> (SubscriberId, broadcast::Receiver<Bytes>) {
        let id = self.allocate_id();
        self.subscribers.insert(id, Subscriber::Frame);
        self.frame_count += 1;

        tracing::debug!(
            subscriber = %id,
            raw = self.raw_count,
            frame = self.frame_count,
            "Frame subscriber joined"
        );
        (id, self.frame_tx.subscribe())
    }

    /// Remove a raw subscriber; unknown or mismatched ids are ignored
    pub fn leave_raw(&mut self, id: SubscriberId) -> bool {
        match self.subscribers.get(&id) {
            Some(Subscriber::Raw { .. }) => {
                self.subscribers.remove(&id);
                self.raw_count -= 1;
                tracing::debug!(subscriber = %id, raw = self.raw_count, "Raw subscriber left");
                true
            }
            Some(Subscriber::Frame) => {
                tracing::warn!(subscriber = %id, "Raw leave for a frame subscriber, ignoring");
                false
            }
            None => false,
        }
    }

    /// Remove a frame subscriber; unknown or mismatched ids are ignored
    pub fn leave_frame(&mut self, id: SubscriberId) -> bool {
        match self.subscribers.get(&id) {
            Some(Subscriber::Frame) => {
                self.subscribers.remove(&id);
                self.frame_count -= 1;
                tracing::debug!(subscriber = %id, frame = self.frame_count, "Frame subscriber left");
                true
            }
            Some(Subscriber::Raw { .. }) => {
                tracing::warn!(subscriber = %id, "Frame leave for a raw subscriber, ignoring");
                false
            }
            None => false,
        }
    }

    /// Deliver one upstream chunk to every raw subscriber
    ///
    /// Non-blocking: a subscriber whose sink is full or closed is removed on
    /// the spot. Returns how many subscribers were removed.
    pub fn fan_out_raw(&mut self, chunk: &Bytes) -> usize {
        let mut dropped = Vec::new();
        for (id, sub) in &self.subscribers {
            if let Subscriber::Raw { sink } = sub {
                match sink.try_send(chunk.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = %id, "Raw subscriber too slow, dropping");
                        dropped.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(subscriber = %id, "Raw subscriber gone, dropping");
                        dropped.push(*id);
                    }
                }
            }
        }

        for id in &dropped {
            self.subscribers.remove(id);
            self.raw_count -= 1;
        }
        dropped.len()
    }

    /// Deliver one complete frame to every frame subscriber
    ///
    /// Returns the number of receivers the frame reached.
    pub fn emit_frame(&self, frame: Bytes) -> usize {
        // send() errs only when no receiver exists, which is not a fault here
        self.frame_tx.send(frame).unwrap_or(0)
    }

    /// Close and remove every raw subscriber
    ///
    /// Dropping the sinks terminates the receivers' streams. Frame
    /// subscribers keep their membership. Returns how many were closed.
    pub fn close_raw(&mut self) -> usize {
        let closed = self.raw_count;
        self.subscribers
            .retain(|_, sub| !matches!(sub, Subscriber::Raw { .. }));
        self.raw_count = 0;

        if closed > 0 {
            tracing::debug!(closed = closed, "Closed all raw subscribers");
        }
        closed
    }

    /// Current raw subscriber count
    pub fn raw_count(&self) -> usize {
        self.raw_count
    }

    /// Current frame subscriber count
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Total membership across both kinds
    pub fn total(&self) -> usize {
        self.raw_count + self.frame_count
    }

    /// Whether any frame subscriber is registered
    pub fn has_frame_subscribers(&self) -> bool {
        self.frame_count > 0
    }

    fn allocate_id(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        id
    }
}
