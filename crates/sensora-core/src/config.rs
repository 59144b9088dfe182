// ── Runtime connection configuration ──
//
// These types describe *how* to reach the platform. The embedding app
// constructs a `ClientConfig` and hands it in; core never reads config
// files or acquires tokens itself.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Read access to the current bearer credential.
///
/// Token acquisition (login, refresh) happens elsewhere; the sync
/// client only ever asks "what is the token right now". A `None` or
/// empty answer at construction time fails the precondition before any
/// connection attempt is made.
pub trait TokenStore: Send + Sync {
    fn current_token(&self) -> Option<SecretString>;
}

/// Fixed-credential store for tests and simple embedders.
pub struct StaticTokenStore {
    token: SecretString,
}

impl StaticTokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

impl TokenStore for StaticTokenStore {
    fn current_token(&self) -> Option<SecretString> {
        if self.token.expose_secret().is_empty() {
            None
        } else {
            Some(self.token.clone())
        }
    }
}

/// Configuration for one sync client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Measurement socket endpoint (e.g. `wss://host/api/v1/sensor/measurements`).
    pub socket_url: Url,
    /// REST base for the notification acknowledge endpoint.
    pub api_url: Url,
    /// Channels to subscribe as soon as authentication completes.
    pub initial_channels: Vec<String>,
}

impl ClientConfig {
    pub fn new(socket_url: Url, api_url: Url) -> Self {
        Self {
            socket_url,
            api_url,
            initial_channels: Vec::new(),
        }
    }

    pub fn with_initial_channels(mut self, channels: impl IntoIterator<Item = String>) -> Self {
        self.initial_channels = channels.into_iter().collect();
        self
    }
}
