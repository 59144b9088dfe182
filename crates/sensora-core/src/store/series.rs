// ── Time-series store ──
//
// Destination of all sample-bearing frames. One ordered
// timestamp→value mapping per channel, published as a full snapshot on
// every mutation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::trace;

use sensora_api::frame::Series;

/// Logical subscription target: a sensor id, treated as opaque.
pub type ChannelId = String;

/// Snapshot of every cached series, as observers receive it.
pub type SeriesSnapshot = Arc<HashMap<ChannelId, Series>>;

/// Per-channel ordered sample cache.
///
/// A channel's series exists here iff it is actively subscribed, or a
/// historical response for it has arrived and no unsubscribe-to-zero
/// has evicted it yet.
pub(crate) struct SeriesStore {
    series: HashMap<ChannelId, Series>,
    snapshot: watch::Sender<SeriesSnapshot>,
}

impl SeriesStore {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            series: HashMap::new(),
            snapshot,
        }
    }

    /// Subscribe to snapshot changes.
    pub(crate) fn subscribe(&self) -> watch::Receiver<SeriesSnapshot> {
        self.snapshot.subscribe()
    }

    /// Merge a bulk snapshot into a channel's series, creating the
    /// series if absent. Every point is upserted individually: points
    /// outside the incoming snapshot survive.
    pub(crate) fn merge(&mut self, channel: &str, points: &Series) {
        let series = self.series.entry(channel.to_string()).or_default();
        for (timestamp, value) in points {
            series.insert(*timestamp, *value);
        }
        self.publish();
    }

    /// Upsert one live sample, but only into an existing series.
    ///
    /// Returns `false` when the channel is absent (e.g. a push racing a
    /// just-completed unsubscribe); the sample is discarded rather than
    /// resurrecting an evicted series.
    pub(crate) fn upsert_live(
        &mut self,
        channel: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> bool {
        let Some(series) = self.series.get_mut(channel) else {
            trace!(channel, "discarding live sample for absent channel");
            return false;
        };
        series.insert(timestamp, value);
        self.publish();
        true
    }

    /// Drop a channel's series. Returns `false` if it was absent.
    pub(crate) fn evict(&mut self, channel: &str) -> bool {
        let existed = self.series.remove(channel).is_some();
        if existed {
            self.publish();
        }
        existed
    }

    pub(crate) fn contains(&self, channel: &str) -> bool {
        self.series.contains_key(channel)
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.series.clone());
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|current| *current = snapshot);
    }
}
