//! Upstream liveness snapshot
//!
//! The mux publishes its last-known state on a `tokio::sync::watch` channel
//! whenever the phase or the membership changes. Observers (status endpoints,
//! dashboards) read the latest value without ever blocking the actor.

use serde::Serialize;

/// Lifecycle phase of the upstream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamPhase {
    /// No session and no connect attempt
    Idle,
    /// Connect attempt in flight
    Connecting,
    /// Session established, bytes flowing
    Streaming,
    /// Zero subscribers; teardown countdown running
    Closing,
}

impl UpstreamPhase {
    /// Whether a session or connect attempt is alive
    pub fn is_live(&self) -> bool {
        !matches!(self, UpstreamPhase::Idle)
    }
}

/// Last-known summary of the multiplexer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamStatus {
    /// Current lifecycle phase
    pub phase: UpstreamPhase,
    /// Whether an upstream URL is configured
    pub source_configured: bool,
    /// Current raw subscriber count
    pub raw_subscribers: usize,
    /// Current frame subscriber count
    pub frame_subscribers: usize,
    /// Most recent upstream failure; cleared when a session comes up, ends
    /// cleanly, or the source is reconfigured
    pub last_error: Option<String>,
}

impl Default for UpstreamStatus {
    fn default() -> Self {
        Self {
            phase: UpstreamPhase::Idle,
            source_configured: false,
            raw_subscribers: 0,
            frame_subscribers: 0,
            last_error: None,
        }
    }
}
