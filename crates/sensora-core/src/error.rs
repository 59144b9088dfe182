// ── Core error types ──
//
// User-facing errors from sensora-core. Consumers never see raw
// transport failures directly; the `From<sensora_api::Error>` impl
// translates wire-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No bearer credential was available at construction. Checked
    /// before any I/O: no connection attempt is made.
    #[error("Missing bearer credential -- authenticate before connecting")]
    MissingCredential,

    /// A historical-request duration string failed local validation.
    /// Nothing was sent.
    #[error("Invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("Cannot connect to measurement socket: {reason}")]
    ConnectionFailed { reason: String },

    /// The sync loop has terminated (closed, faulted, or never opened).
    #[error("Sync client disconnected")]
    Disconnected,

    /// The acknowledge endpoint refused the request; the notification
    /// stays in the inbox.
    #[error("Notification acknowledge rejected (HTTP {status})")]
    AckFailed { status: u16 },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<sensora_api::Error> for CoreError {
    fn from(err: sensora_api::Error) -> Self {
        match err {
            sensora_api::Error::InvalidDuration { input, reason } => {
                CoreError::InvalidDuration { input, reason }
            }
            sensora_api::Error::WebSocketConnect(reason) => {
                CoreError::ConnectionFailed { reason }
            }
            sensora_api::Error::WebSocketSend(_) => CoreError::Disconnected,
            sensora_api::Error::Transport(e) => CoreError::Api {
                message: e.to_string(),
            },
            sensora_api::Error::InvalidUrl(e) => CoreError::Api {
                message: format!("Invalid URL: {e}"),
            },
            sensora_api::Error::AckFailed { status } => CoreError::AckFailed { status },
            sensora_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Frame validation error: {message}"))
            }
            sensora_api::Error::Encode(message) => CoreError::Internal(message),
        }
    }
}
