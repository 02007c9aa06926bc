//! Merge set (§4.9): a dynamic collection of sources all feeding one shared
//! output channel, each addable and removable independently at runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler, SendTicket};
use crate::node::predecessor::PredecessorLink;

struct Member<T: Send + 'static> {
    close_output: bool,
    remove_on_deactivate: bool,
    // Kept alive for as long as this member is in the set: `source.attach`
    // only stores a `Weak<dyn Handler<T>>`, so nothing else owns this.
    handler: Arc<dyn Handler<T>>,
}

struct State<T: Send + 'static> {
    members: HashMap<ChannelId, Member<T>>,
}

/// The shared output channel plus bookkeeping for every currently-added
/// source (§4.9).
pub struct MergeSet<T: Send + 'static> {
    output: Arc<ChannelCore<T>>,
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> MergeSet<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(MergeSet { output: Arc::new(ChannelCore::new()), state: Mutex::new(State { members: HashMap::new() }) })
    }

    pub fn output(&self) -> Arc<ChannelCore<T>> {
        self.output.clone()
    }

    /// Adds `source` as a new member (§4.9). `close_output` closes the
    /// shared output once this member reaches a terminal `Failure`;
    /// `remove_on_deactivate` drops this member (without closing the
    /// output) the moment its own upstream deactivates rather than only on
    /// explicit [`MergeSet::remove`].
    pub fn add(
        self: &Arc<Self>,
        source: Arc<ChannelCore<T>>,
        context: Arc<dyn ExecutionContext>,
        close_output: bool,
        remove_on_deactivate: bool,
        ledger: &mut Ledger,
    ) {
        let member_id = source.id();
        let handler: Arc<dyn Handler<T>> = Arc::new(MemberHandler {
            set: self.clone(),
            member_id,
            output: self.output.clone(),
        });
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.members.insert(member_id, Member { close_output, remove_on_deactivate, handler: handler.clone() });
        }
        let link: Arc<dyn PredecessorLink> =
            Arc::new(MergeLink { set: self.clone(), source: source.clone(), member_id });
        self.output.add_predecessor(link);
        let _ = source.attach(Arc::downgrade(&handler), context, ledger);
    }

    /// Removes `source` from the set. Its own upstream is deactivated
    /// (§4.9: "drop sends `Cancelled` to the output" is what `disable`'s
    /// deferred-drop, relayed through the removed predecessor link's own
    /// cleanup, already provides — nothing further is delivered to
    /// `output` itself, which simply stops hearing from this member).
    pub fn remove(self: &Arc<Self>, source: &Arc<ChannelCore<T>>, ledger: &mut Ledger) {
        let id = source.id();
        self.state.lock().unwrap_or_else(|p| p.into_inner()).members.remove(&id);
        if let Some(link) = self.output.remove_predecessor(id) {
            link.deactivate_upstream(ledger);
        }
    }
}

struct MemberHandler<T: Send + 'static> {
    set: Arc<MergeSet<T>>,
    member_id: ChannelId,
    output: Arc<ChannelCore<T>>,
}

impl<T: Send + 'static> Handler<T> for MemberHandler<T> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let close_output = {
            let state = self.set.state.lock().unwrap_or_else(|p| p.into_inner());
            state.members.get(&self.member_id).map(|m| m.close_output).unwrap_or(false)
        };
        let terminal = item.is_failure();
        let ticket = SendTicket {
            predecessor: Some(self.member_id),
            activation: self.output.activation_counter(),
            activated: true,
        };
        let _ = self.output.send(item, ticket, ledger);
        if terminal && close_output {
            self.output.disable(ledger);
        }
    }
}

struct MergeLink<T: Send + 'static> {
    set: Arc<MergeSet<T>>,
    source: Arc<ChannelCore<T>>,
    member_id: ChannelId,
}

impl<T: Send + 'static> PredecessorLink for MergeLink<T> {
    fn upstream_id(&self) -> ChannelId {
        self.source.id()
    }

    fn ancestry_contains(&self, candidate: ChannelId) -> bool {
        self.source.id() == candidate || self.source.would_introduce_loop(candidate)
    }

    fn activate_upstream(&self, _ledger: &mut Ledger) {
        // The member already attached directly in `MergeSet::add`; the
        // output activating later never needs to re-trigger that.
    }

    fn deactivate_upstream(&self, ledger: &mut Ledger) {
        self.source.disable(ledger);
        if self
            .set
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .members
            .get(&self.member_id)
            .map(|m| m.remove_on_deactivate)
            .unwrap_or(false)
        {
            self.set.state.lock().unwrap_or_else(|p| p.into_inner()).members.remove(&self.member_id);
        }
    }
}
