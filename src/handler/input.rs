//! The manual source (§4.3): `Input<T>`, paired with a `Signal<T>` by the
//! `input()` factory in [`crate::signal`].

use std::sync::{Arc, Weak};

use crate::error::{Error, Outcome};
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, SendTicket};

/// A manual, user-driven source handle (§4.3). Holds a weak reference to
/// its channel and the activation-counter snapshot current when this
/// `Input` was issued; a send whose snapshot has gone stale is rejected
/// with [`Error::Cancelled`] without ever reaching the channel's queue.
pub struct Input<T: Send + 'static> {
    channel: Weak<ChannelCore<T>>,
    activation: u64,
}

impl<T: Send + 'static> Input<T> {
    pub(crate) fn new(channel: &Arc<ChannelCore<T>>, activation: u64) -> Self {
        Input { channel: Arc::downgrade(channel), activation }
    }

    /// Recovers the strong channel reference and activation snapshot this
    /// handle was issued with, for callers (junction/capture rejoin) that
    /// need to re-derive the target channel from a caller-held `Input`
    /// rather than send through it. Returns `None` if the channel is gone.
    pub(crate) fn resolve(&self) -> Option<(Arc<ChannelCore<T>>, u64)> {
        self.channel.upgrade().map(|c| (c, self.activation))
    }

    /// Sends one result. Returns the rejection reason if the channel is
    /// gone, disabled, or this handle's activation snapshot has gone
    /// stale.
    pub fn send(&self, item: Outcome<T>) -> Option<Error> {
        let Some(channel) = self.channel.upgrade() else {
            return Some(Error::Cancelled);
        };
        let ticket = SendTicket::root(self.activation);
        let mut ledger = Ledger::new();
        let err = channel.send(item, ticket, &mut ledger);
        ledger.run();
        err
    }
}

impl<T: Send + 'static> Drop for Input<T> {
    fn drop(&mut self) {
        // Per §5's cancellation rules: dropping the last `Input` to a
        // source sends `Cancelled`. We hold no clones of `Input` (it is
        // not `Clone`), so "the last" is unconditionally "this one".
        if let Some(channel) = self.channel.upgrade() {
            let ticket = SendTicket::root(self.activation);
            let mut ledger = Ledger::new();
            let _ = channel.send(Outcome::Failure(Error::Cancelled), ticket, &mut ledger);
            ledger.run();
        }
    }
}
