//! Live stream fan-out
//!
//! Everything between the single upstream camera connection and the many
//! downstream consumers:
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!   camera ──bytes──►  │            mux               │ ──bytes──► raw sinks
//!                      │  (actor, one command queue)  │
//!                      │      demux ── frames ──► broadcast ────► frame subs
//!                      └──────────────────────────────┘
//!                             ▲
//!              join/leave/set_source/status
//! ```
//!
//! - [`mux`]: lifecycle actor; owns the upstream session, the membership,
//!   and the idle-grace teardown countdown
//! - [`demux`]: splits the MJPEG byte stream into complete JPEG frames
//! - [`registry`]: membership table and both delivery paths
//! - [`status`]: the snapshot published on every state change

pub mod demux;
pub mod mux;
pub mod registry;
pub mod status;

pub use demux::FrameDemuxer;
pub use mux::{FrameSubscription, RawSubscription, StreamMux};
pub use registry::{SubscriberId, SubscriberRegistry};
pub use status::{UpstreamPhase, UpstreamStatus};
