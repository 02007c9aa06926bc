//! Global monotonic counters.
//!
//! Two independent sequences are needed: a channel identity (for logging and
//! for the staleness check in `send`) and a predecessor insertion timestamp
//! (§9: "insertion timestamps are the channel's own monotonically increasing
//! counter"). Both are plain global atomics; contention is negligible next
//! to the per-channel mutex traffic they order, but we cache-pad them the
//! way the teacher pads its SPSC head/tail cursors to keep them off any hot
//! cache line shared with unrelated state.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

static CHANNEL_IDS: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));
static TIMESTAMPS: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));

/// Opaque, globally unique channel identity. Used for the staleness check in
/// `send` (§4.1) and in the loop-detection walk (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        ChannelId(CHANNEL_IDS.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch#{}", self.0)
    }
}

/// Monotonic predecessor-insertion timestamp (§3, §9). Sorting a
/// predecessor set by this value makes graph traversals deterministic
/// independent of any hash-table iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub(crate) fn next() -> Self {
        Timestamp(TIMESTAMPS.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_strictly_increasing() {
        let a = ChannelId::next();
        let b = ChannelId::next();
        assert!(b.0 > a.0);
    }

    #[test]
    fn timestamps_are_strictly_increasing() {
        let a = Timestamp::next();
        let b = Timestamp::next();
        assert!(b > a);
    }
}
