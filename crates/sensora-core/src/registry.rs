// ── Singleton client registry ──
//
// The platform allows one physical duplex connection per process.
// Constructors go through the registry, which hands the existing
// instance to every caller after the first; the registry lock also
// serializes concurrent first constructions, so a second socket is
// never opened.

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::SyncClient;
use crate::config::{ClientConfig, TokenStore};
use crate::error::CoreError;

/// Factory and holder for the shared [`SyncClient`] instance.
///
/// A registry hands out the same instance for its whole lifetime --
/// including after an explicit `close()`, matching the connection's
/// one-way lifecycle. Use [`ClientRegistry::global`] for the
/// process-wide instance; separate registries exist mainly for tests.
pub struct ClientRegistry {
    slot: Mutex<Option<SyncClient>>,
}

impl ClientRegistry {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::const_new(None),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ClientRegistry {
        static GLOBAL: ClientRegistry = ClientRegistry::new();
        &GLOBAL
    }

    /// Return the shared client, connecting on first use.
    ///
    /// The slot lock is held across the connection attempt: concurrent
    /// first callers wait and then receive the instance the winner
    /// created. A failed attempt leaves the slot empty, so the next
    /// caller retries.
    pub async fn get_or_connect(
        &self,
        config: ClientConfig,
        tokens: &dyn TokenStore,
    ) -> Result<SyncClient, CoreError> {
        let mut slot = self.slot.lock().await;
        if let Some(client) = slot.as_ref() {
            debug!("reusing the shared sync client");
            return Ok(client.clone());
        }

        let client = SyncClient::connect(config, tokens).await?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// The shared client, if one has been constructed.
    pub async fn get(&self) -> Option<SyncClient> {
        self.slot.lock().await.clone()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
