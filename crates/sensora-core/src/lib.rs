// sensora-core: domain layer for the Sensora realtime dashboard client
//
// One long-lived duplex connection, many independent observers. The
// public `SyncClient` handle multiplexes per-channel subscriptions onto
// the wire, maintains a reactive time-series cache and notification
// inbox, and enforces the process-wide singleton through
// `ClientRegistry`.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;

mod mux;
mod store;

pub use client::SyncClient;
pub use config::{ClientConfig, StaticTokenStore, TokenStore};
pub use error::CoreError;
pub use registry::ClientRegistry;
pub use store::inbox::InboxSnapshot;
pub use store::series::{ChannelId, SeriesSnapshot};

pub use sensora_api::frame::{Notification, Series, Severity};
pub use sensora_api::socket::SocketState;
