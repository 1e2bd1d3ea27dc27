//! Single-upstream stream multiplexer
//!
//! One camera connection, any number of viewers. The first subscriber to
//! join starts the upstream session; the last one to leave starts a grace
//! countdown, and only when the countdown expires with the membership still
//! empty is the session torn down. A rejoin inside the window cancels the
//! countdown, so viewers flapping between pages never cost a reconnect.
//!
//! ```text
//!            join            join/leave           grace expires
//!   Idle ──────────► Connecting ──► Streaming ──► Closing ──► Idle
//!                         ▲              ▲  └──────┘
//!                         └──────────────┴── rejoin cancels countdown
//! ```
//!
//! Everything runs on a single actor task fed by one command queue: joins,
//! leaves, configuration, upstream bytes, and timer expiries are serialized,
//! so no interleaving of a join against a teardown can race. Public access
//! goes through the cheaply clonable [`StreamMux`] handle.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::demux::FrameDemuxer;
use super::registry::{SubscriberId, SubscriberRegistry};
use super::status::{UpstreamPhase, UpstreamStatus};
use crate::config::StreamConfig;
use crate::error::{Error, Result, UpstreamError};
use crate::upstream::UpstreamConnector;

/// Raw membership: the upstream byte stream as-is
///
/// The stream ends (receiver yields `None`) when the upstream session ends
/// or is unavailable. Dropping the receiver without leaving is tolerated;
/// membership is reclaimed on the next delivery attempt.
pub struct RawSubscription {
    /// Id to pass to `leave_raw`
    pub id: SubscriberId,
    /// Upstream bytes, exactly as received
    pub bytes: mpsc::Receiver<Bytes>,
}

/// Frame membership: complete JPEG frames
///
/// Survives upstream loss; the receiver simply yields nothing until a new
/// session starts. A lagging receiver skips frames. Membership lasts until
/// an explicit `leave_frame`.
pub struct FrameSubscription {
    /// Id to pass to `leave_frame`
    pub id: SubscriberId,
    /// Whole JPEG frames, markers included
    pub frames: broadcast::Receiver<Bytes>,
}

enum MuxCommand {
    JoinRaw {
        reply: oneshot::Sender<RawSubscription>,
    },
    LeaveRaw {
        id: SubscriberId,
    },
    JoinFrame {
        reply: oneshot::Sender<FrameSubscription>,
    },
    LeaveFrame {
        id: SubscriberId,
    },
    SetSource {
        url: Option<String>,
    },
    SessionUp {
        generation: u64,
    },
    SessionData {
        generation: u64,
        chunk: Bytes,
    },
    SessionEnded {
        generation: u64,
    },
    SessionFailed {
        generation: u64,
        error: UpstreamError,
    },
    IdleExpired,
}

/// Handle to the multiplexer actor
#[derive(Clone)]
pub struct StreamMux {
    commands: mpsc::Sender<MuxCommand>,
    status: watch::Receiver<UpstreamStatus>,
}

impl StreamMux {
    /// Start the actor and return a handle to it
    ///
    /// The actor stops when every handle is dropped; a running session is
    /// aborted at that point.
    pub fn spawn(config: StreamConfig, connector: Arc<dyn UpstreamConnector>) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_queue_depth);
        let (status_tx, status) = watch::channel(UpstreamStatus {
            source_configured: config.source_url.is_some(),
            ..Default::default()
        });

        let actor = MuxActor {
            connector,
            // Weak: only public handles keep the mailbox open; session and
            // timer tasks upgrade per message
            commands: commands.downgrade(),
            status: status_tx,
            registry: SubscriberRegistry::new(config.broadcast_capacity, config.raw_queue_capacity),
            demux: FrameDemuxer::new(),
            source_url: config.source_url.clone(),
            config,
            session: None,
            online: false,
            generation: 0,
            idle_timer: None,
            last_error: None,
        };
        tokio::spawn(actor.run(command_rx));

        Self { commands, status }
    }

    /// Join as a raw subscriber
    pub async fn join_raw(&self) -> Result<RawSubscription> {
        let (reply, rx) = oneshot::channel();
        self.send(MuxCommand::JoinRaw { reply }).await?;
        rx.await.map_err(|_| Error::HubClosed)
    }

    /// Leave a raw membership
    pub async fn leave_raw(&self, id: SubscriberId) -> Result<()> {
        self.send(MuxCommand::LeaveRaw { id }).await
    }

    /// Join as a frame subscriber
    pub async fn join_frame(&self) -> Result<FrameSubscription> {
        let (reply, rx) = oneshot::channel();
        self.send(MuxCommand::JoinFrame { reply }).await?;
        rx.await.map_err(|_| Error::HubClosed)
    }

    /// Leave a frame membership
    pub async fn leave_frame(&self, id: SubscriberId) -> Result<()> {
        self.send(MuxCommand::LeaveFrame { id }).await
    }

    /// Set or clear the upstream URL
    ///
    /// Takes effect on the next connect attempt; a live session is not
    /// touched.
    pub async fn set_source(&self, url: Option<String>) -> Result<()> {
        self.send(MuxCommand::SetSource { url }).await
    }

    /// Watch the last-known upstream status
    pub fn status(&self) -> watch::Receiver<UpstreamStatus> {
        self.status.clone()
    }

    async fn send(&self, command: MuxCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::HubClosed)
    }
}

struct MuxActor {
    config: StreamConfig,
    connector: Arc<dyn UpstreamConnector>,
    commands: mpsc::WeakSender<MuxCommand>,
    status: watch::Sender<UpstreamStatus>,
    registry: SubscriberRegistry,
    demux: FrameDemuxer,
    source_url: Option<String>,
    /// Running session (or connect attempt) task
    session: Option<JoinHandle<()>>,
    /// Whether the session reported itself connected
    online: bool,
    /// Bumped per connect attempt; stale session messages are discarded
    generation: u64,
    /// Pending idle teardown countdown
    idle_timer: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl MuxActor {
    async fn run(mut self, mut commands: mpsc::Receiver<MuxCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                MuxCommand::JoinRaw { reply } => {
                    let (id, bytes) = self.registry.join_raw();
                    if reply.send(RawSubscription { id, bytes }).is_err() {
                        // Caller vanished between send and reply
                        self.registry.leave_raw(id);
                    } else {
                        self.ensure_connected();
                    }
                    self.publish_status();
                }
                MuxCommand::LeaveRaw { id } => {
                    if self.registry.leave_raw(id) {
                        self.release_if_idle();
                    }
                    self.publish_status();
                }
                MuxCommand::JoinFrame { reply } => {
                    let (id, frames) = self.registry.join_frame();
                    if reply.send(FrameSubscription { id, frames }).is_err() {
                        self.registry.leave_frame(id);
                    } else {
                        self.ensure_connected();
                    }
                    self.publish_status();
                }
                MuxCommand::LeaveFrame { id } => {
                    if self.registry.leave_frame(id) {
                        self.release_if_idle();
                    }
                    self.publish_status();
                }
                MuxCommand::SetSource { url } => {
                    tracing::info!(
                        source = url.as_deref().unwrap_or("<none>"),
                        "Upstream source configured"
                    );
                    self.source_url = url;
                    // An error against the old source no longer applies
                    self.last_error = None;
                    self.publish_status();
                }
                MuxCommand::SessionUp { generation } => {
                    if self.is_current(generation) {
                        self.online = true;
                        self.last_error = None;
                        tracing::info!(generation = generation, "Upstream session online");
                        self.publish_status();
                    }
                }
                MuxCommand::SessionData { generation, chunk } => {
                    if self.is_current(generation) {
                        self.on_data(chunk);
                    }
                }
                MuxCommand::SessionEnded { generation } => {
                    if self.is_current(generation) {
                        tracing::info!(generation = generation, "Upstream stream ended");
                        self.on_session_gone(None);
                    }
                }
                MuxCommand::SessionFailed { generation, error } => {
                    if self.is_current(generation) {
                        tracing::warn!(generation = generation, error = %error, "Upstream session failed");
                        self.on_session_gone(Some(error));
                    }
                }
                MuxCommand::IdleExpired => {
                    self.idle_timer = None;
                    if self.registry.total() == 0 && self.session.is_some() {
                        self.teardown_session();
                        tracing::info!("Upstream torn down after idle grace period");
                    }
                    self.publish_status();
                }
            }
        }

        // Every handle is gone; stop the session and the countdown
        self.teardown_session();
    }

    /// Start a session if none is running
    ///
    /// Runs on every successful join. Cancels a pending teardown first, so a
    /// rejoin inside the grace window keeps the existing session.
    fn ensure_connected(&mut self) {
        self.cancel_idle_timer();

        if self.session.is_some() {
            return;
        }

        let Some(url) = self.source_url.clone() else {
            // Raw viewers cannot wait for a source that may never come
            tracing::warn!("Subscriber joined but no upstream source is configured");
            self.last_error = Some(UpstreamError::NoSource.to_string());
            if self.registry.close_raw() > 0 {
                self.release_if_idle();
            }
            return;
        };

        self.generation += 1;
        self.online = false;
        tracing::info!(source = %url, generation = self.generation, "Starting upstream session");
        self.session = Some(tokio::spawn(run_session(
            Arc::clone(&self.connector),
            url,
            self.config.connect_timeout,
            self.commands.clone(),
            self.generation,
        )));
    }

    /// Schedule the idle teardown countdown when the membership is empty
    fn release_if_idle(&mut self) {
        if self.registry.total() > 0 || self.session.is_none() || self.idle_timer.is_some() {
            return;
        }

        let grace = self.config.idle_grace;
        let commands = self.commands.clone();

        tracing::info!(
            grace_ms = grace.as_millis() as u64,
            "No subscribers left, scheduling upstream teardown"
        );
        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(MuxCommand::IdleExpired).await;
            }
        }));
    }

    fn on_data(&mut self, chunk: Bytes) {
        if self.registry.raw_count() > 0 && self.registry.fan_out_raw(&chunk) > 0 {
            // Dropping stalled subscribers can empty the membership
            self.release_if_idle();
            self.publish_status();
        }

        // Frames are only assembled while somebody wants them; a frame
        // subscriber that joins mid-stream starts on the next clean frame
        if self.registry.has_frame_subscribers() {
            for frame in self.demux.push(&chunk) {
                self.registry.emit_frame(frame);
            }
        }
    }

    /// The session task finished on its own (EOF or failure)
    fn on_session_gone(&mut self, error: Option<UpstreamError>) {
        // A clean EOF leaves no error behind
        self.last_error = error.map(|e| e.to_string());
        if let Some(session) = self.session.take() {
            session.abort();
        }
        self.online = false;
        self.demux.reset();
        self.cancel_idle_timer();

        // Raw viewers cannot resume a broken byte stream mid-way; frame
        // subscribers keep their membership and wait for the next session
        self.registry.close_raw();
        self.publish_status();
    }

    fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort();
        }
        self.online = false;
        self.demux.reset();
        self.cancel_idle_timer();
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
            tracing::debug!("Idle teardown cancelled");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session.is_some() && generation == self.generation
    }

    fn phase(&self) -> UpstreamPhase {
        if self.session.is_none() {
            UpstreamPhase::Idle
        } else if self.idle_timer.is_some() {
            UpstreamPhase::Closing
        } else if self.online {
            UpstreamPhase::Streaming
        } else {
            UpstreamPhase::Connecting
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(UpstreamStatus {
            phase: self.phase(),
            source_configured: self.source_url.is_some(),
            raw_subscribers: self.registry.raw_count(),
            frame_subscribers: self.registry.frame_count(),
            last_error: self.last_error.clone(),
        });
    }
}

/// Connect and pump one upstream session
///
/// Owns the socket for the session's lifetime. Reports back through the
/// command queue with its generation stamped on every message. The queue is
/// held only weakly: once every mux handle is dropped the mailbox closes, the
/// actor's receive loop ends, and the session task is aborted with it, so a
/// forgotten hub never keeps the upstream connection alive.
async fn run_session(
    connector: Arc<dyn UpstreamConnector>,
    url: String,
    connect_timeout: Duration,
    commands: mpsc::WeakSender<MuxCommand>,
    generation: u64,
) {
    let mut source = match tokio::time::timeout(connect_timeout, connector.open(&url)).await {
        Ok(Ok(source)) => source,
        Ok(Err(error)) => {
            report(&commands, MuxCommand::SessionFailed { generation, error }).await;
            return;
        }
        Err(_) => {
            report(
                &commands,
                MuxCommand::SessionFailed {
                    generation,
                    error: UpstreamError::ConnectTimeout(connect_timeout),
                },
            )
            .await;
            return;
        }
    };

    if !report(&commands, MuxCommand::SessionUp { generation }).await {
        return;
    }

    loop {
        match source.next_chunk().await {
            Ok(Some(chunk)) => {
                if !report(&commands, MuxCommand::SessionData { generation, chunk }).await {
                    return;
                }
            }
            Ok(None) => {
                report(&commands, MuxCommand::SessionEnded { generation }).await;
                return;
            }
            Err(error) => {
                report(&commands, MuxCommand::SessionFailed { generation, error }).await;
                return;
            }
        }
    }
}

/// Deliver one session message to the actor
///
/// Returns false when every mux handle is gone and the session should stop.
async fn report(commands: &mpsc::WeakSender<MuxCommand>, command: MuxCommand) -> bool {
    match commands.upgrade() {
        Some(commands) => commands.send(command).await.is_ok(),
        None => false,
    }
}
