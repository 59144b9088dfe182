// ── Reactive domain state ──
//
// Both stores are owned exclusively by the sync event loop; mutation is
// serialized by that loop, and observers see publish-on-mutate
// snapshots through `watch` channels.

pub(crate) mod inbox;
pub(crate) mod series;
