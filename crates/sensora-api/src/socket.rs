//! Duplex socket connection manager.
//!
//! Owns the single physical WebSocket connection to the measurement
//! endpoint and runs the open/auth/ready/closed state machine. The
//! handshake sends exactly one `auth` frame; the auth verdict flips the
//! observable state to [`Ready`](SocketState::Ready) or, on rejection,
//! to the terminal [`Faulted`](SocketState::Faulted) state. Every other
//! decoded frame is forwarded untouched to the consumer.
//!
//! There is no reconnection logic here: a lost connection stays lost
//! until something external constructs a new socket.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::frame::{self, ClientFrame, ServerFrame};

/// Subprotocol requested on the WebSocket upgrade; the server rejects
/// clients that do not speak it.
pub const SUBPROTOCOL: &str = "sensora.v1";

const FRAME_CHANNEL_CAPACITY: usize = 256;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ── SocketState ──────────────────────────────────────────────────────

/// Connection lifecycle, observable via a `watch` channel.
///
/// `Closed` and `Faulted` are terminal: once entered, no further
/// transition occurs for the lifetime of the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
    Init,
    Connecting,
    /// The `auth` frame has been sent; awaiting the verdict.
    AuthPending,
    /// Authenticated. Subscription and request traffic may now flow.
    Ready,
    /// Explicitly closed, or the server ended the stream.
    Closed,
    /// Auth rejection or transport error. Unrecoverable by design.
    Faulted { reason: String },
}

impl SocketState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Faulted { .. })
    }
}

/// Move to `next` unless the current state is terminal.
fn transition(state: &watch::Sender<SocketState>, next: SocketState) {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        *current = next.clone();
        true
    });
}

// ── Socket ───────────────────────────────────────────────────────────

/// Handle to the single duplex connection.
///
/// Created via [`Socket::connect`], which performs the upgrade, sends
/// the one-and-only `auth` frame, and spawns the reader task. Decoded
/// non-auth frames arrive on the mpsc receiver returned alongside the
/// handle; the auth handshake is consumed here and surfaces only
/// through the state channel.
#[derive(Debug)]
pub struct Socket {
    writer: Mutex<WsSink>,
    state: Arc<watch::Sender<SocketState>>,
    cancel: CancellationToken,
}

impl Socket {
    /// Connect, authenticate, and spawn the reader task.
    ///
    /// Returns as soon as the upgrade completes and the `auth` frame is
    /// on the wire -- callers observe the verdict through
    /// [`state`](Self::state) rather than by awaiting it here.
    pub async fn connect(
        url: &Url,
        token: &SecretString,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ServerFrame>), Error> {
        let (state_tx, _) = watch::channel(SocketState::Init);
        let state = Arc::new(state_tx);

        tracing::info!(url = %url, "connecting to measurement socket");
        transition(&state, SocketState::Connecting);

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUBPROTOCOL);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut writer, reader) = ws_stream.split();

        // Exactly one auth frame per connection.
        let auth = frame::encode(&ClientFrame::Auth(token.expose_secret().to_string()))?;
        writer
            .send(tungstenite::Message::text(auth))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
        transition(&state, SocketState::AuthPending);

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let socket = Arc::new(Self {
            writer: Mutex::new(writer),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
        });

        tokio::spawn(read_loop(reader, frame_tx, state, cancel));

        Ok((socket, frame_rx))
    }

    /// Subscribe to lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<SocketState> {
        self.state.subscribe()
    }

    /// Whether auth has completed successfully.
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == SocketState::Ready
    }

    /// Write one outbound frame. Fire-and-forget: no application-level
    /// acknowledgment exists for subscription traffic.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), Error> {
        let text = frame::encode(frame)?;
        self.writer
            .lock()
            .await
            .send(tungstenite::Message::text(text))
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }

    /// Close the connection. One-way and non-cancellable: the socket is
    /// never reused afterwards, and any in-flight historical request is
    /// left permanently unanswered.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Err(e) = self
            .writer
            .lock()
            .await
            .send(tungstenite::Message::Close(None))
            .await
        {
            tracing::debug!(error = %e, "close frame not delivered");
        }
        transition(&self.state, SocketState::Closed);
        tracing::info!("measurement socket closed");
    }
}

// ── Reader task ──────────────────────────────────────────────────────

/// Single reader: one inbound frame at a time, each handled to
/// completion before the next is read.
async fn read_loop(
    mut reader: WsSource,
    frame_tx: mpsc::Sender<ServerFrame>,
    state: Arc<watch::Sender<SocketState>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = reader.next() => {
                match message {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if !handle_text(text.as_str(), &frame_tx, &state).await {
                            return;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite replies with pong automatically
                        tracing::trace!("socket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(close_frame))) => {
                        if let Some(ref cf) = close_frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        } else {
                            tracing::info!("close frame received (no payload)");
                        }
                        transition(&state, SocketState::Closed);
                        return;
                    }
                    Some(Err(e)) => {
                        // Transport errors are logged and final; no retry here.
                        tracing::error!(error = %e, "socket transport error");
                        transition(&state, SocketState::Faulted { reason: e.to_string() });
                        return;
                    }
                    None => {
                        tracing::info!("socket stream ended");
                        transition(&state, SocketState::Closed);
                        return;
                    }
                    _ => {
                        // Binary, Pong, raw frames -- ignore
                    }
                }
            }
        }
    }

    tracing::debug!("socket reader exiting");
}

/// Dispatch one text payload. Returns `false` when the reader must stop.
async fn handle_text(
    text: &str,
    frame_tx: &mpsc::Sender<ServerFrame>,
    state: &watch::Sender<SocketState>,
) -> bool {
    match frame::decode(text) {
        Ok(Some(ServerFrame::Auth { message })) => {
            if message == "ok" {
                tracing::debug!("authentication accepted");
                transition(state, SocketState::Ready);
            } else {
                // The server refused the credential. Unrecoverable: the
                // connection is considered faulted, not retried.
                tracing::error!(verdict = %message, "authentication rejected");
                transition(state, SocketState::Faulted { reason: message });
                return false;
            }
        }
        Ok(Some(frame)) => {
            if frame_tx.send(frame).await.is_err() {
                tracing::debug!("frame consumer dropped, stopping reader");
                return false;
            }
        }
        Ok(None) => {
            tracing::trace!("ignoring frame with unknown discriminator");
        }
        Err(e) => {
            // Per-frame isolation: a malformed payload never takes the
            // connection down.
            tracing::debug!(error = %e, "dropping malformed frame");
        }
    }
    true
}
