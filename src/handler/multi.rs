//! Multi-output processor (§4.6): one upstream channel fanning out to many
//! independently-activated successor channels, under one of seven
//! caching/replay policies. Caching requires `T: Clone` — the one place in
//! this crate that constrains the item type beyond `Send + 'static`,
//! unavoidable once a single value must be replayed to an arbitrary number
//! of future subscribers.

use std::sync::{Arc, Mutex, Weak};

use crate::context::ExecutionContext;
use crate::error::{Error, Outcome};
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler, SendTicket};
use crate::node::predecessor::PredecessorLink;

/// Which values a freshly-attached successor is replayed on join, and
/// whether this multi-output keeps caching after that point (§4.6).
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheMode {
    /// `multicast`: nothing cached, nothing replayed to a new successor.
    None,
    /// `continuous` / `continuous(initial)`: only the latest value.
    Latest,
    /// `playback` / `buffer`: every value ever seen, in order.
    All,
    /// `cacheUntilActive`: behaves like `All` until the first successor
    /// attaches, then drops the cache and behaves like `None`.
    UntilFirstAttach,
}

struct Inner<T: Clone + Send + 'static> {
    mode: CacheMode,
    cache: Vec<T>,
    terminal: Option<Error>,
    successors: Vec<Weak<ChannelCore<T>>>,
    updater: Option<Arc<dyn Fn(&[T], Option<&Error>) + Send + Sync>>,
}

/// The shared fan-out state behind every multi-output variant. Acts as the
/// sole [`Handler`] attached to `upstream` (there is never more than one —
/// fan-out to many successors is internal, which is exactly how §4.6's
/// multi-output sidesteps the ordinary single-successor `Duplicate` rule).
pub(crate) struct MultiCore<T: Clone + Send + 'static> {
    id: ChannelId,
    upstream: Option<Arc<ChannelCore<T>>>,
    context: Arc<dyn ExecutionContext>,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> MultiCore<T> {
    pub(crate) fn build(
        upstream: Option<Arc<ChannelCore<T>>>,
        context: Arc<dyn ExecutionContext>,
        mode: CacheMode,
        initial: Vec<T>,
        terminal: Option<Error>,
        updater: Option<Arc<dyn Fn(&[T], Option<&Error>) + Send + Sync>>,
        eager: bool,
        ledger: &mut Ledger,
    ) -> Arc<Self> {
        let multi = Arc::new(MultiCore {
            id: ChannelId::next(),
            upstream,
            context,
            inner: Mutex::new(Inner { mode, cache: initial, terminal, successors: Vec::new(), updater }),
        });
        if eager {
            multi.ensure_upstream_attached(ledger);
        }
        multi
    }

    fn ensure_upstream_attached(self: &Arc<Self>, ledger: &mut Ledger) {
        let Some(upstream) = self.upstream.clone() else { return };
        let handler: Arc<dyn Handler<T>> = self.clone();
        let weak = Arc::downgrade(&handler);
        // A second call here hits the ordinary single-slot `Duplicate`
        // rejection and is simply ignored: attaching twice would be a bug
        // on our part, not a condition a caller needs to observe.
        let _ = upstream.attach(weak, self.context.clone(), ledger);
    }

    /// Attaches a fresh successor channel, replaying whatever this
    /// variant's cache policy dictates, and returns it.
    pub(crate) fn subscribe(self: &Arc<Self>, ledger: &mut Ledger) -> Arc<ChannelCore<T>> {
        let successor = Arc::new(ChannelCore::new());
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let (replay_values, replay_terminal) = match inner.mode {
            CacheMode::None => (Vec::new(), None),
            CacheMode::Latest | CacheMode::All => (inner.cache.clone(), inner.terminal.clone()),
            CacheMode::UntilFirstAttach => {
                let snapshot = (inner.cache.clone(), inner.terminal.clone());
                inner.cache.clear();
                inner.mode = CacheMode::None;
                snapshot
            }
        };
        inner.successors.push(Arc::downgrade(&successor));
        drop(inner);

        successor.push(replay_values, replay_terminal, ledger);

        let link: Arc<dyn PredecessorLink> =
            Arc::new(MultiSuccessorLink { multi: self.clone(), successor_id: successor.id() });
        successor.add_predecessor(link);
        successor
    }

    fn remove_successor(self: &Arc<Self>, successor_id: ChannelId, ledger: &mut Ledger) {
        let (now_empty, mode) = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.successors.retain(|w| match w.upgrade() {
                Some(ch) => ch.id() != successor_id,
                None => false,
            });
            (inner.successors.is_empty(), inner.mode)
        };
        // Only `multicast` tears its upstream down when the last successor
        // goes away (§4.6's "deactivate on drop of last"); the other
        // eagerly-activated variants stay alive to keep serving their
        // cache to the next subscriber.
        if now_empty && mode == CacheMode::None
            && let Some(upstream) = &self.upstream
        {
            upstream.disable(ledger);
        }
    }
}

impl<T: Clone + Send + 'static> Handler<T> for MultiCore<T> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match &item {
            Outcome::Success(v) => match inner.mode {
                CacheMode::None => {}
                CacheMode::Latest => {
                    inner.cache.clear();
                    inner.cache.push(v.clone());
                    inner.terminal = None;
                }
                CacheMode::All | CacheMode::UntilFirstAttach => inner.cache.push(v.clone()),
            },
            Outcome::Failure(e) => inner.terminal = Some(e.clone()),
        }
        let successors: Vec<_> = inner.successors.iter().filter_map(Weak::upgrade).collect();
        let updater = inner.updater.clone();
        let cache_snapshot = updater.is_some().then(|| inner.cache.clone());
        let terminal_snapshot = inner.terminal.clone();
        drop(inner);

        if let Some(updater) = updater {
            updater(&cache_snapshot.unwrap_or_default(), terminal_snapshot.as_ref());
        }

        for successor in successors {
            let ticket = SendTicket {
                predecessor: Some(self.id),
                activation: successor.activation_counter(),
                activated: true,
            };
            let _ = successor.send(item.clone(), ticket, ledger);
        }
    }
}

struct MultiSuccessorLink<T: Clone + Send + 'static> {
    multi: Arc<MultiCore<T>>,
    successor_id: ChannelId,
}

impl<T: Clone + Send + 'static> PredecessorLink for MultiSuccessorLink<T> {
    fn upstream_id(&self) -> ChannelId {
        self.multi.id
    }

    fn ancestry_contains(&self, candidate: ChannelId) -> bool {
        match &self.multi.upstream {
            Some(upstream) => upstream.id() == candidate || upstream.would_introduce_loop(candidate),
            None => false,
        }
    }

    fn activate_upstream(&self, ledger: &mut Ledger) {
        self.multi.ensure_upstream_attached(ledger);
    }

    fn deactivate_upstream(&self, ledger: &mut Ledger) {
        self.multi.remove_successor(self.successor_id, ledger);
    }
}
