// ── Notification acknowledge client ──
//
// The duplex socket only pushes notifications; marking one as read goes
// through a companion REST endpoint. The endpoint is idempotent, so a
// repeated acknowledge for an already-read notification is harmless.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::Error;

/// HTTP client for the notification acknowledge endpoint.
#[derive(Debug)]
pub struct AckClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AckClient {
    /// Create a client against the REST base URL (e.g. `https://host`).
    pub fn new(base_url: Url) -> Result<Self, Error> {
        let http = reqwest::Client::builder().build().map_err(Error::Transport)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client` (tests, or an
    /// embedder that shares a client across API surfaces).
    pub fn from_reqwest(base_url: Url, http: reqwest::Client) -> Self {
        Self { http, base_url }
    }

    /// Acknowledge one notification by id.
    ///
    /// Succeeds only on a 2xx response; any other status is
    /// [`Error::AckFailed`], and callers must keep the record visible.
    pub async fn mark_as_read(&self, id: Uuid, token: &SecretString) -> Result<(), Error> {
        let url = self.ack_url(id)?;
        debug!(%url, "PUT notification acknowledge");

        let response = self
            .http
            .put(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::AckFailed {
                status: status.as_u16(),
            })
        }
    }

    fn ack_url(&self, id: Uuid) -> Result<Url, Error> {
        let full = format!(
            "{}/api/v1/notification/{id}",
            self.base_url.as_str().trim_end_matches('/'),
        );
        Url::parse(&full).map_err(Error::InvalidUrl)
    }
}
