use thiserror::Error;

/// Top-level error type for the `sensora-api` crate.
///
/// Covers every failure mode of the wire layer: duration validation,
/// WebSocket transport, frame (de)serialization, and the notification
/// acknowledge endpoint. `sensora-core` maps these into user-facing
/// diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Duration grammar ────────────────────────────────────────────
    /// The relative-time string failed local validation. No I/O was
    /// attempted.
    #[error("Invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection or handshake failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Outbound frame could not be written to the transport.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    // ── Transport (REST) ────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The acknowledge endpoint returned a non-success status.
    #[error("Notification acknowledge rejected (HTTP {status})")]
    AckFailed { status: u16 },

    // ── Frames ──────────────────────────────────────────────────────
    /// An inbound frame carried a known discriminator but failed
    /// structural validation. Non-fatal: the reader logs and drops it.
    #[error("Frame validation error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound frame could not be encoded.
    #[error("Frame encoding error: {0}")]
    Encode(String),
}
