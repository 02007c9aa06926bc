//! The timestamped predecessor set (§3, §4.2, §9).
//!
//! A channel's predecessor set is the set of handlers feeding it. Each entry
//! is tagged with its insertion timestamp so that activation propagation and
//! loop-detection walks iterate in a deterministic, hash-independent order.
//!
//! The set is generic over `Arc<dyn PredecessorLink>` rather than over the
//! upstream value type: a downstream channel's predecessors may carry
//! different upstream item types (e.g. the two branches of a `combine`), so
//! [`PredecessorLink`] is intentionally non-generic — it exposes only the
//! identity, activation, and loop-walk operations a downstream channel
//! needs, never the upstream item type itself.

use crate::ids::{ChannelId, Timestamp};
use crate::ledger::Ledger;
use std::sync::Arc;

/// Object-safe view of a predecessor, as seen by the channel it feeds.
///
/// Implemented by every handler type that owns a strong reference to its
/// own upstream channel (`TransformHandler`, `CombineBranch`, `JunctionLink`,
/// `CaptureLink`, ...). Holding `Arc<dyn PredecessorLink>` in a downstream
/// predecessor set is precisely the ownership edge described in §3's
/// Ownership rules: "a processor is owned by its downstream channel's
/// predecessor set."
pub trait PredecessorLink: Send + Sync {
    /// Identity of the upstream channel this link represents.
    fn upstream_id(&self) -> ChannelId;

    /// True if this predecessor (or one of *its* predecessors, transitively)
    /// is the given channel. Used by the loop-checking walk in §4.2.
    fn ancestry_contains(&self, candidate: ChannelId) -> bool;

    /// Only loop-checking predecessors (junctions, captures) participate in
    /// the walk of §4.2; ordinary processors do not declare themselves as
    /// loop-checking and are simply skipped by the walk at their own level
    /// (the walk still recurses through them to reach their own
    /// predecessors).
    fn is_loop_checking(&self) -> bool {
        false
    }

    /// Propagate deactivation toward this predecessor's own upstream
    /// channel. Called when the predecessor is removed from a downstream
    /// set (directly, or because the whole set is torn down).
    fn deactivate_upstream(&self, ledger: &mut Ledger);

    /// Propagate activation toward this predecessor's own upstream channel
    /// (§4.2: "each predecessor transitions its own channel ... propagating
    /// further"). Called by [`crate::node::channel::ChannelCore::attach`]
    /// the moment the downstream channel itself transitions out of
    /// `Disabled`, in predecessor-timestamp order.
    fn activate_upstream(&self, ledger: &mut Ledger);
}

struct Entry {
    timestamp: Timestamp,
    link: Arc<dyn PredecessorLink>,
}

/// A channel's predecessor set, always iterated and stored in insertion
/// order (§9).
#[derive(Default)]
pub struct PredecessorSet {
    entries: Vec<Entry>,
}

impl PredecessorSet {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts a new predecessor, stamping it with a fresh, globally
    /// monotonic timestamp.
    pub fn insert(&mut self, link: Arc<dyn PredecessorLink>) -> Timestamp {
        let timestamp = Timestamp::next();
        self.entries.push(Entry { timestamp, link });
        timestamp
    }

    /// Removes the predecessor matching `id`, if present, returning it so
    /// the caller can decide whether to defer its drop (and hence its
    /// `deactivate_upstream` side effects) outside the mutex.
    pub fn remove(&mut self, id: ChannelId) -> Option<Arc<dyn PredecessorLink>> {
        let idx = self.entries.iter().position(|e| e.link.upstream_id() == id)?;
        Some(self.entries.remove(idx).link)
    }

    /// Removes and returns every predecessor, in insertion order. Used when
    /// a channel is fully rewired or torn down.
    pub fn drain(&mut self) -> Vec<Arc<dyn PredecessorLink>> {
        self.entries.drain(..).map(|e| e.link).collect()
    }

    /// Iterates predecessors in insertion-timestamp order (§4.2's
    /// activation propagation order, §5's rewiring-propagation order).
    pub fn iter_in_order(&self) -> impl Iterator<Item = &Arc<dyn PredecessorLink>> {
        // Entries are always appended in increasing-timestamp order and
        // never reordered in place, so storage order already is timestamp
        // order.
        self.entries.iter().map(|e| &e.link)
    }

    /// Walks this set (and transitively, each predecessor's own ancestry)
    /// looking for `candidate`. Used by §4.2's loop prevention: before
    /// adding `candidate` as a new predecessor of some channel `C`, the
    /// engine walks `C`'s *successor*'s predecessor DAG for `candidate`.
    pub fn would_introduce_loop(&self, candidate: ChannelId) -> bool {
        self.entries
            .iter()
            .any(|e| e.link.upstream_id() == candidate || e.link.ancestry_contains(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLink {
        id: ChannelId,
        ancestry: Vec<ChannelId>,
    }

    impl PredecessorLink for StubLink {
        fn upstream_id(&self) -> ChannelId {
            self.id
        }

        fn ancestry_contains(&self, candidate: ChannelId) -> bool {
            self.ancestry.contains(&candidate)
        }

        fn deactivate_upstream(&self, _ledger: &mut Ledger) {}

        fn activate_upstream(&self, _ledger: &mut Ledger) {}
    }

    #[test]
    fn iterates_in_insertion_order_regardless_of_id_ordering() {
        let mut set = PredecessorSet::new();
        let high = ChannelId::next();
        let low = ChannelId::next();
        set.insert(Arc::new(StubLink { id: high, ancestry: vec![] }));
        set.insert(Arc::new(StubLink { id: low, ancestry: vec![] }));

        let order: Vec<ChannelId> = set.iter_in_order().map(|l| l.upstream_id()).collect();
        assert_eq!(order, vec![high, low]);
    }

    #[test]
    fn remove_detaches_only_the_matching_entry() {
        let mut set = PredecessorSet::new();
        let a = ChannelId::next();
        let b = ChannelId::next();
        set.insert(Arc::new(StubLink { id: a, ancestry: vec![] }));
        set.insert(Arc::new(StubLink { id: b, ancestry: vec![] }));

        let removed = set.remove(a).expect("a was present");
        assert_eq!(removed.upstream_id(), a);
        assert_eq!(set.len(), 1);
        assert!(set.remove(a).is_none());
    }

    #[test]
    fn would_introduce_loop_checks_direct_and_transitive_ancestry() {
        let mut set = PredecessorSet::new();
        let direct = ChannelId::next();
        let transitive = ChannelId::next();
        let unrelated = ChannelId::next();
        set.insert(Arc::new(StubLink { id: direct, ancestry: vec![transitive] }));

        assert!(set.would_introduce_loop(direct));
        assert!(set.would_introduce_loop(transitive));
        assert!(!set.would_introduce_loop(unrelated));
    }

    #[test]
    fn drain_empties_the_set_and_returns_every_entry() {
        let mut set = PredecessorSet::new();
        set.insert(Arc::new(StubLink { id: ChannelId::next(), ancestry: vec![] }));
        set.insert(Arc::new(StubLink { id: ChannelId::next(), ancestry: vec![] }));

        let drained = set.drain();
        assert_eq!(drained.len(), 2);
        assert!(set.is_empty());
    }
}
