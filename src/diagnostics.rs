//! Read-only channel introspection (§4's supplemented diagnostics module).
//! Never exposes a live reference into channel internals — every accessor
//! here takes and releases the channel's mutex once, returning an owned
//! snapshot, consistent with the inviolable no-user-code-under-lock rule.

use crate::ids::ChannelId;
use crate::node::channel::ChannelCore;
use crate::node::phase::Phase;

/// A point-in-time snapshot of a channel's delivery state, for tests and
/// for a consumer wiring up its own metrics exporter.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub phase: Phase,
    pub queue_len: usize,
    pub hold_count: u8,
    pub activation_counter: u64,
}

impl ChannelSnapshot {
    pub fn capture<T: Send + 'static>(channel: &ChannelCore<T>) -> Self {
        ChannelSnapshot {
            id: channel.id(),
            phase: channel.phase_snapshot(),
            queue_len: channel.queue_len(),
            hold_count: channel.hold_count(),
            activation_counter: channel.activation_counter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_freshly_built_channel_snapshots_as_empty_and_disabled() {
        let channel = ChannelCore::<i32>::new();
        let snapshot = ChannelSnapshot::capture(&channel);
        assert!(snapshot.phase.is_disabled());
        assert_eq!(snapshot.queue_len, 0);
        assert_eq!(snapshot.hold_count, 0);
        assert_eq!(snapshot.activation_counter, 0);
    }
}
