//! A reusable [`PredecessorLink`] for the common case: a processor handler
//! that owns exactly one upstream channel and attaches itself to it on
//! activation. Used by `transform`, `combine`, `capture`, `junction`, and
//! `merge` — every handler family whose upstream wiring is "attach my own
//! `Handler<T>` impl to this one channel".

use std::sync::Arc;

use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler};
use crate::node::predecessor::PredecessorLink;
use crate::context::ExecutionContext;
use crate::ids::ChannelId;

pub(crate) struct ProcessorLink<T: Send + 'static> {
    pub(crate) upstream: Arc<ChannelCore<T>>,
    pub(crate) handler: Arc<dyn Handler<T>>,
    pub(crate) context: Arc<dyn ExecutionContext>,
    pub(crate) loop_checking: bool,
}

impl<T: Send + 'static> PredecessorLink for ProcessorLink<T> {
    fn upstream_id(&self) -> ChannelId {
        self.upstream.id()
    }

    fn ancestry_contains(&self, candidate: ChannelId) -> bool {
        self.upstream.id() == candidate || self.upstream.would_introduce_loop(candidate)
    }

    fn is_loop_checking(&self) -> bool {
        self.loop_checking
    }

    fn activate_upstream(&self, ledger: &mut Ledger) {
        let _ = self.upstream.attach(Arc::downgrade(&self.handler), self.context.clone(), ledger);
    }

    fn deactivate_upstream(&self, ledger: &mut Ledger) {
        self.upstream.disable(ledger);
    }
}
