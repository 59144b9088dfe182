//! The realtime synchronization client.
//!
//! One long-lived duplex connection, one event-loop task, many cheap
//! [`SyncClient`] handles. The loop owns every piece of mutable state
//! (refcount table, series cache, inbox, pre-ready queue) and processes
//! one inbound frame or observer command at a time -- mutual exclusion
//! is structural, so the state needs no locks.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use sensora_api::ack::AckClient;
use sensora_api::frame::{ClientFrame, MeasurementRequest, ServerFrame, SnapshotEntry};
use sensora_api::socket::{Socket, SocketState};
use sensora_api::duration;

use crate::config::{ClientConfig, TokenStore};
use crate::error::CoreError;
use crate::mux::SubscriptionMux;
use crate::store::inbox::{InboxSnapshot, NotificationInbox};
use crate::store::series::{SeriesSnapshot, SeriesStore};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── Commands ─────────────────────────────────────────────────────────

/// Observer requests, serialized through the event loop.
#[derive(Debug)]
enum Command {
    Subscribe(String),
    Unsubscribe(String),
    RequestSince { channel: String, duration: String },
    AckNotification(Uuid),
    Close,
}

// ── SyncEngine ───────────────────────────────────────────────────────

/// All mutable client state, owned by the event loop.
///
/// Methods return the wire frames to emit rather than sending them, so
/// the protocol logic is testable without a socket. Frames decided
/// before authentication completes are queued and flushed on the
/// `Ready` transition -- no subscription or request traffic ever
/// precedes auth.
struct SyncEngine {
    mux: SubscriptionMux,
    series: SeriesStore,
    inbox: NotificationInbox,
    /// Outstanding historical requests, keyed by channel id only: the
    /// wire protocol has no per-request token, so a second request for
    /// the same channel replaces the first.
    pending_requests: std::collections::HashSet<String>,
    /// Outbound frames held back until the connection is `Ready`.
    queued: Vec<ClientFrame>,
    ready: bool,
}

impl SyncEngine {
    fn new() -> Self {
        Self {
            mux: SubscriptionMux::new(),
            series: SeriesStore::new(),
            inbox: NotificationInbox::new(),
            pending_requests: std::collections::HashSet::new(),
            queued: Vec::new(),
            ready: false,
        }
    }

    /// Flip to ready and hand back everything queued during the
    /// handshake.
    fn mark_ready(&mut self) -> Vec<ClientFrame> {
        self.ready = true;
        std::mem::take(&mut self.queued)
    }

    /// Route one observer command; returns the frames to put on the
    /// wire now (empty while the handshake is still pending).
    fn handle_command(&mut self, command: Command) -> Vec<ClientFrame> {
        match command {
            Command::Subscribe(channel) => {
                if self.mux.acquire(&channel) {
                    self.emit(ClientFrame::Subscribe(vec![channel]))
                } else {
                    debug!(observers = self.mux.count(&channel), "channel already on the wire");
                    Vec::new()
                }
            }
            Command::Unsubscribe(channel) => {
                if self.mux.release(&channel) {
                    // Last observer left: evict the cached series and any
                    // outstanding historical request alongside the wire
                    // unsubscribe.
                    self.series.evict(&channel);
                    self.pending_requests.remove(&channel);
                    self.emit(ClientFrame::Unsubscribe(channel))
                } else {
                    Vec::new()
                }
            }
            Command::RequestSince { channel, duration } => {
                if !self.pending_requests.insert(channel.clone()) {
                    warn!(channel, "replacing an outstanding historical request");
                }
                self.emit(ClientFrame::MeasurementReq(MeasurementRequest {
                    id: channel,
                    duration,
                }))
            }
            Command::AckNotification(id) => {
                self.inbox.acknowledge(id);
                Vec::new()
            }
            // Close is intercepted by the loop before reaching here.
            Command::Close => Vec::new(),
        }
    }

    /// Apply one inbound frame to the stores.
    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Subscribe { data } => {
                for (channel, entry) in data {
                    match entry {
                        SnapshotEntry::Ok { values } => {
                            self.series.merge(&channel, &values);
                        }
                        SnapshotEntry::Error { message } => {
                            // No empty series for a failed channel.
                            warn!(channel, message, "subscription rejected by server");
                        }
                    }
                }
            }
            ServerFrame::Measurement { sensor_id, time, value } => {
                // Deliberate no-op when the channel is absent: a live
                // sample racing an unsubscribe must not resurrect the
                // evicted series.
                self.series.upsert_live(&sensor_id.to_string(), time, value);
            }
            ServerFrame::MeasurementReq { id, values } => {
                if !self.pending_requests.remove(&id) {
                    debug!(channel = id, "historical response without an outstanding request");
                }
                self.series.merge(&id, &values);
            }
            ServerFrame::Notification { data } => {
                self.inbox.push(data);
            }
            ServerFrame::NotificationsUnread { data } => {
                self.inbox.extend(data);
            }
            // The handshake is consumed by the socket layer; an auth
            // frame can only appear here if the server repeats it.
            ServerFrame::Auth { message } => {
                debug!(message, "ignoring post-handshake auth frame");
            }
        }
    }

    fn emit(&mut self, frame: ClientFrame) -> Vec<ClientFrame> {
        if self.ready {
            vec![frame]
        } else {
            debug!(?frame, "queueing frame until authentication completes");
            self.queued.push(frame);
            Vec::new()
        }
    }
}

// ── SyncClient ───────────────────────────────────────────────────────

/// Handle to the realtime synchronization client.
///
/// Cheaply cloneable; every clone talks to the same connection and the
/// same event loop. Obtain the process-wide instance through
/// [`crate::ClientRegistry`] rather than constructing ad hoc.
#[derive(Clone, Debug)]
pub struct SyncClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    command_tx: mpsc::Sender<Command>,
    socket: Arc<Socket>,
    ack: AckClient,
    token: SecretString,
    state_rx: watch::Receiver<SocketState>,
    series_rx: watch::Receiver<SeriesSnapshot>,
    inbox_rx: watch::Receiver<InboxSnapshot>,
}

impl SyncClient {
    /// Open the connection and start the sync loop.
    ///
    /// Fails fast with [`CoreError::MissingCredential`] -- before any
    /// connection attempt -- when the token store has no usable
    /// credential. Returns as soon as the socket is up; readiness is
    /// observed through [`is_ready`](Self::is_ready).
    pub async fn connect(
        config: ClientConfig,
        tokens: &dyn TokenStore,
    ) -> Result<Self, CoreError> {
        let token = tokens
            .current_token()
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or(CoreError::MissingCredential)?;

        let (socket, frame_rx) = Socket::connect(&config.socket_url, &token).await?;
        let ack = AckClient::new(config.api_url.clone())?;

        let mut engine = SyncEngine::new();
        let series_rx = engine.series.subscribe();
        let inbox_rx = engine.inbox.subscribe();

        // Seed the initial subscriptions; they queue until `Ready`.
        for channel in config.initial_channels {
            let frames = engine.handle_command(Command::Subscribe(channel));
            debug_assert!(frames.is_empty(), "nothing can be ready before the loop runs");
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let state_rx = socket.state();

        tokio::spawn(sync_loop(
            engine,
            command_rx,
            frame_rx,
            Arc::clone(&socket),
            socket.state(),
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                command_tx,
                socket,
                ack,
                token,
                state_rx,
                series_rx,
                inbox_rx,
            }),
        })
    }

    // ── Subscription operations ──────────────────────────────────

    /// Register one observer for a channel. At most one wire
    /// subscription exists per channel regardless of observer count.
    pub async fn subscribe(&self, channel: impl Into<String>) -> Result<(), CoreError> {
        self.send_command(Command::Subscribe(channel.into())).await
    }

    /// Release one observer. The wire unsubscribe (and series
    /// eviction) happens only when the last observer leaves; calling
    /// with no observers registered is a no-op.
    pub async fn unsubscribe(&self, channel: impl Into<String>) -> Result<(), CoreError> {
        self.send_command(Command::Unsubscribe(channel.into())).await
    }

    /// Request historical samples for a channel over a relative window
    /// such as `"-15m"`.
    ///
    /// The duration is validated locally first: an invalid string fails
    /// here with no side effect and no traffic.
    pub async fn request_since(
        &self,
        channel: impl Into<String>,
        duration: &str,
    ) -> Result<(), CoreError> {
        duration::parse(duration)?;
        self.send_command(Command::RequestSince {
            channel: channel.into(),
            duration: duration.to_string(),
        })
        .await
    }

    // ── Notification operations ──────────────────────────────────

    /// Acknowledge a notification through the companion endpoint.
    ///
    /// The record leaves the inbox only after the endpoint confirms; on
    /// failure it stays visible and the error is returned
    /// (at-least-once-visible-until-acknowledged).
    pub async fn mark_as_read(&self, id: Uuid) -> Result<(), CoreError> {
        self.inner.ack.mark_as_read(id, &self.inner.token).await?;
        self.send_command(Command::AckNotification(id)).await
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Close the connection. One-way: the client is never reused, and
    /// any in-flight historical request goes permanently unanswered.
    pub async fn close(&self) {
        if self.inner.command_tx.send(Command::Close).await.is_err() {
            // Loop already gone; close the transport directly.
            self.inner.socket.close().await;
        }
    }

    /// Whether authentication has completed and traffic may flow.
    pub fn is_ready(&self) -> bool {
        *self.inner.state_rx.borrow() == SocketState::Ready
    }

    /// Observe connection lifecycle changes (ready flag included).
    pub fn state(&self) -> watch::Receiver<SocketState> {
        self.inner.state_rx.clone()
    }

    // ── Reactive views ───────────────────────────────────────────

    /// Current snapshot of every cached series.
    pub fn series(&self) -> SeriesSnapshot {
        self.inner.series_rx.borrow().clone()
    }

    /// Observe series changes.
    pub fn watch_series(&self) -> watch::Receiver<SeriesSnapshot> {
        self.inner.series_rx.clone()
    }

    /// Current snapshot of the notification inbox.
    pub fn notifications(&self) -> InboxSnapshot {
        self.inner.inbox_rx.borrow().clone()
    }

    /// Observe inbox changes.
    pub fn watch_notifications(&self) -> watch::Receiver<InboxSnapshot> {
        self.inner.inbox_rx.clone()
    }

    async fn send_command(&self, command: Command) -> Result<(), CoreError> {
        self.inner
            .command_tx
            .send(command)
            .await
            .map_err(|_| CoreError::Disconnected)
    }
}

// ── Event loop ───────────────────────────────────────────────────────

/// Single task serializing every mutation: one inbound frame or one
/// command at a time, run to completion.
async fn sync_loop(
    mut engine: SyncEngine,
    mut command_rx: mpsc::Receiver<Command>,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    socket: Arc<Socket>,
    mut state_rx: watch::Receiver<SocketState>,
) {
    // The handshake may already have resolved before this task starts.
    let initial = state_rx.borrow_and_update().clone();
    if !apply_state(&mut engine, &initial, &socket).await {
        return;
    }

    loop {
        tokio::select! {
            biased;
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if !apply_state(&mut engine, &state, &socket).await {
                    break;
                }
            }
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break };
                engine.handle_frame(frame);
            }
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                if matches!(command, Command::Close) {
                    socket.close().await;
                    break;
                }
                for frame in engine.handle_command(command) {
                    send_frame(&socket, &frame).await;
                }
            }
        }
    }

    debug!("sync loop exiting");
}

/// React to a lifecycle change. Returns `false` when the loop must stop.
async fn apply_state(engine: &mut SyncEngine, state: &SocketState, socket: &Socket) -> bool {
    match state {
        SocketState::Ready => {
            let queued = engine.mark_ready();
            if !queued.is_empty() {
                debug!(frames = queued.len(), "flushing frames queued during handshake");
            }
            for frame in queued {
                send_frame(socket, &frame).await;
            }
            true
        }
        SocketState::Closed | SocketState::Faulted { .. } => false,
        _ => true,
    }
}

async fn send_frame(socket: &Socket, frame: &ClientFrame) {
    // Fire-and-forget: a failed write is logged, never retried.
    if let Err(e) = socket.send(frame).await {
        warn!(error = %e, "outbound frame not delivered");
    }
}

// ── Tests ────────────────────────────────────────────────────────────
