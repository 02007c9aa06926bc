//! The escapable continuation (§4.4, §9).
//!
//! A `transform` handler is handed a [`Continuation`] alongside each item.
//! Calling [`Continuation::send`] from inside the callback is the common
//! case and is free of any bookkeeping. Cloning the continuation out of the
//! callback — into a spawned task, a stored field, anything that outlives
//! the callback's own stack frame — is the "escape" the type is named for;
//! §9 models this as "an owned handle that, on drop, atomically decrements
//! the predecessor channel's hold count if it incremented on its way out of
//! the handler", and that is exactly what this module implements: the
//! in-handler fast path never touches the upstream hold count at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Outcome};
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, SendTicket};

/// Type-erased view of "a channel whose dispatch I can block and unblock",
/// needed because a continuation's downstream item type `U` is generally
/// unrelated to its upstream's item type `T`.
pub(crate) trait HoldGate: Send + Sync {
    fn block(&self, activation: u64);
    fn unblock(&self);
}

impl<T: Send + 'static> HoldGate for Arc<ChannelCore<T>> {
    fn block(&self, activation: u64) {
        ChannelCore::block(self, activation)
    }

    fn unblock(&self) {
        let mut ledger = Ledger::new();
        ChannelCore::unblock(self, &mut ledger);
        ledger.run();
    }
}

/// Erases `channel` into a `HoldGate` trait object. The extra `Arc` layer
/// is unavoidable: `HoldGate` is implemented on the handle type
/// (`Arc<ChannelCore<T>>`) rather than on `ChannelCore<T>` itself, since
/// `unblock` needs an owned `Arc` to call `ChannelCore::unblock`.
pub(crate) fn hold_gate<T: Send + 'static>(channel: &Arc<ChannelCore<T>>) -> Arc<dyn HoldGate> {
    Arc::new(channel.clone())
}

struct Inner<U: Send + 'static> {
    downstream: Arc<ChannelCore<U>>,
    predecessor_id: ChannelId,
    upstream: Arc<dyn HoldGate>,
    upstream_activation: u64,
    retained: AtomicBool,
}

impl<U: Send + 'static> Drop for Inner<U> {
    fn drop(&mut self) {
        if self.retained.load(Ordering::SeqCst) {
            self.upstream.unblock();
        }
    }
}

/// A handle, passed to a `transform` callback, for producing zero or more
/// downstream values from a single upstream item (§4.4).
pub struct Continuation<U: Send + 'static>(Arc<Inner<U>>);

impl<U: Send + 'static> Clone for Continuation<U> {
    fn clone(&self) -> Self {
        Continuation(self.0.clone())
    }
}

impl<U: Send + 'static> Continuation<U> {
    pub(crate) fn new(
        upstream: Arc<dyn HoldGate>,
        upstream_activation: u64,
        downstream: Arc<ChannelCore<U>>,
        predecessor_id: ChannelId,
    ) -> Self {
        Continuation(Arc::new(Inner {
            downstream,
            predecessor_id,
            upstream,
            upstream_activation,
            retained: AtomicBool::new(false),
        }))
    }

    /// Sends one result downstream. Usable any number of times, from inside
    /// the callback or after it has escaped.
    pub fn send(&self, item: Outcome<U>) -> Option<Error> {
        let ticket = SendTicket {
            predecessor: Some(self.0.predecessor_id),
            activation: self.0.downstream.activation_counter(),
            activated: true,
        };
        let mut ledger = Ledger::new();
        let err = self.0.downstream.send(item, ticket, &mut ledger);
        ledger.run();
        err
    }

    /// Called by the dispatching handler immediately after its callback
    /// returns, while still holding its own clone. If the callback stashed
    /// a clone elsewhere (the strong count is still above one), this is the
    /// moment the continuation has "escaped": block the upstream channel's
    /// dispatch until every remaining clone drops.
    pub(crate) fn mark_retained_if_escaped(&self) {
        if Arc::strong_count(&self.0) > 1 && !self.0.retained.swap(true, Ordering::SeqCst) {
            self.0.upstream.block(self.0.upstream_activation);
        }
    }
}
