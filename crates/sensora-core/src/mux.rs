// ── Subscription multiplexer ──
//
// Many independent UI observers may watch the same channel; the wire
// connection carries at most one subscription per channel. Reference
// counts decide when (un)subscribe traffic is actually emitted.

use std::collections::HashMap;

/// Reference-counted channel subscription table.
///
/// Counts are never negative: releasing a channel with no observers is
/// a no-op, not an error.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionMux {
    counts: HashMap<String, usize>,
}

impl SubscriptionMux {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register one observer. Returns `true` exactly when the count
    /// transitions 0→1, i.e. when a wire subscribe must be emitted.
    pub(crate) fn acquire(&mut self, channel: &str) -> bool {
        let count = self.counts.entry(channel.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Release one observer. Returns `true` exactly when the count
    /// transitions 1→0, i.e. when a wire unsubscribe must be emitted
    /// and the channel's series evicted. Releasing at zero is a no-op.
    pub(crate) fn release(&mut self, channel: &str) -> bool {
        match self.counts.get_mut(channel) {
            Some(count) if *count == 1 => {
                self.counts.remove(channel);
                true
            }
            Some(count) => {
                *count -= 1;
                false
            }
            None => false,
        }
    }

    /// Current observer count for a channel.
    pub(crate) fn count(&self, channel: &str) -> usize {
        self.counts.get(channel).copied().unwrap_or(0)
    }

    /// Whether any observer currently holds the channel.
    pub(crate) fn is_active(&self, channel: &str) -> bool {
        self.count(channel) > 0
    }
}
