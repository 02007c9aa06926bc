//! Capture handler (§4.7): buffers every result from a fixed upstream while
//! disconnected from any downstream, split into the synchronous activation
//! prefix and everything held afterward. `join` always replays the held
//! half, and replays the prefix ahead of it only when `resend` was
//! requested at construction. Structurally the mirror image of
//! [`crate::handler::junction`]: the upstream here is fixed and the
//! *downstream* is what gets disconnected and rejoined, exactly as for
//! junctions — captures additionally accumulate a buffer across the gap
//! instead of just holding the hold-count at bay.

use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::error::{Error, Outcome};
use crate::handler::input::Input;
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler, SendTicket};
use crate::node::predecessor::PredecessorLink;

pub use crate::handler::junction::JoinError;

type OnError<T> = dyn Fn(Error, Input<T>) + Send + Sync;

struct State<T: Send + 'static> {
    /// Set until `start`'s own call to `upstream.attach` returns. Anything
    /// delivered to `handle` while this is still set was produced
    /// synchronously as part of that one activation call — the prefix,
    /// kept apart from `held` because `resend` governs only this half
    /// (§4.7, §8 scenario 4).
    activating: bool,
    prefix: Vec<T>,
    prefix_terminal: Option<Error>,
    /// Everything buffered after activation completed, while still
    /// disconnected from a downstream. Always replayed on `join`,
    /// regardless of `resend`.
    held: Vec<T>,
    held_terminal: Option<Error>,
    target: Option<Arc<ChannelCore<T>>>,
    on_error: Option<Arc<OnError<T>>>,
    resend: bool,
}

/// A capture's core: fixed upstream, a growing buffer, a swappable
/// downstream (§4.7).
pub struct CaptureCore<T: Send + 'static> {
    id: ChannelId,
    upstream: Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    state: Mutex<State<T>>,
}

impl<T: Clone + Send + 'static> CaptureCore<T> {
    pub fn new(upstream: Arc<ChannelCore<T>>, context: Arc<dyn ExecutionContext>, resend: bool) -> Arc<Self> {
        Arc::new(CaptureCore {
            id: ChannelId::next(),
            upstream,
            context,
            state: Mutex::new(State {
                activating: true,
                prefix: Vec::new(),
                prefix_terminal: None,
                held: Vec::new(),
                held_terminal: None,
                target: None,
                on_error: None,
                resend,
            }),
        })
    }

    /// Attaches to `self.upstream` so buffering begins immediately, without
    /// waiting for a first `join` (§4.7's capture is eager by construction).
    /// Everything `handle` receives for the duration of this call — the
    /// synchronous activation cascade — lands in the prefix; `activating`
    /// drops as soon as `attach` returns, so anything after lands in `held`.
    pub fn start(self: &Arc<Self>, ledger: &mut Ledger) {
        let handler: Arc<dyn Handler<T>> = self.clone();
        let _ = self.upstream.attach(Arc::downgrade(&handler), self.context.clone(), ledger);
        self.state.lock().unwrap_or_else(|p| p.into_inner()).activating = false;
    }

    /// Snapshot of the synchronous activation prefix only — never the
    /// values merely held while disconnected afterward (§4.7's
    /// `activation()`, §8 scenario 4).
    pub fn activation(&self) -> (Vec<T>, Option<Error>) {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        (state.prefix.clone(), state.prefix_terminal.clone())
    }

    /// Disconnects the current downstream (if any), returning a fresh
    /// `Input` for it. Buffering continues regardless.
    pub fn disconnect(self: &Arc<Self>, _ledger: &mut Ledger) -> Option<Input<T>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let target = state.target.take()?;
        state.on_error = None;
        drop(state);
        target.remove_predecessor(self.id);
        let activation = target.bump_activation();
        Some(Input::new(&target, activation))
    }

    /// Joins a downstream identified by `input`. Everything held since
    /// activation completes is replayed unconditionally; the synchronous
    /// activation prefix is replayed first, ahead of it, only if `resend`
    /// was requested at construction (§4.7, §8 scenario 4).
    pub fn join(
        self: &Arc<Self>,
        input: Input<T>,
        on_error: Option<Arc<OnError<T>>>,
        ledger: &mut Ledger,
    ) -> Result<(), JoinError<T>> {
        let Some((target, activation)) = input.resolve() else {
            return Err(JoinError::Cancelled);
        };
        if target.activation_counter() != activation {
            return Err(JoinError::Cancelled);
        }
        if target.id() == self.upstream.id() || self.upstream.would_introduce_loop(target.id()) {
            let fresh = Input::new(&target, target.activation_counter());
            return Err(JoinError::Loop(fresh));
        }
        if target.has_predecessor() {
            let fresh = Input::new(&target, target.activation_counter());
            return Err(JoinError::Duplicate(fresh));
        }

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.target = Some(target.clone());
        state.on_error = on_error;
        let resend = state.resend;
        let prefix = std::mem::take(&mut state.prefix);
        let prefix_terminal = std::mem::take(&mut state.prefix_terminal);
        let held = std::mem::take(&mut state.held);
        let held_terminal = std::mem::take(&mut state.held_terminal);
        drop(state);

        let mut replay = if resend { prefix } else { Vec::new() };
        replay.extend(held);
        let replay_terminal = held_terminal.or_else(|| if resend { prefix_terminal } else { None });

        target.push(replay, replay_terminal, ledger);
        let link: Arc<dyn PredecessorLink> = Arc::new(CaptureLink { capture: self.clone() });
        target.add_predecessor(link);

        std::mem::forget(input);
        Ok(())
    }
}

impl<T: Clone + Send + 'static> Handler<T> for CaptureCore<T> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let (target, on_error) = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let in_prefix = state.activating;
            match (&item, in_prefix) {
                (Outcome::Success(v), true) => state.prefix.push(v.clone()),
                (Outcome::Success(v), false) => state.held.push(v.clone()),
                (Outcome::Failure(e), true) => state.prefix_terminal = Some(e.clone()),
                (Outcome::Failure(e), false) => state.held_terminal = Some(e.clone()),
            }
            (state.target.clone(), state.on_error.clone())
        };
        let Some(target) = target else { return };

        if let Outcome::Failure(err) = &item
            && let Some(on_error) = on_error
        {
            target.remove_predecessor(self.id);
            let activation = target.bump_activation();
            self.state.lock().unwrap_or_else(|p| p.into_inner()).target = None;
            on_error(err.clone(), Input::new(&target, activation));
            return;
        }

        let ticket = SendTicket {
            predecessor: Some(self.id),
            activation: target.activation_counter(),
            activated: true,
        };
        let _ = target.send(item, ticket, ledger);
    }
}

struct CaptureLink<T: Clone + Send + 'static> {
    capture: Arc<CaptureCore<T>>,
}

impl<T: Clone + Send + 'static> PredecessorLink for CaptureLink<T> {
    fn upstream_id(&self) -> ChannelId {
        self.capture.upstream.id()
    }

    fn ancestry_contains(&self, candidate: ChannelId) -> bool {
        self.capture.upstream.id() == candidate || self.capture.upstream.would_introduce_loop(candidate)
    }

    fn is_loop_checking(&self) -> bool {
        true
    }

    fn activate_upstream(&self, _ledger: &mut Ledger) {
        // The capture is already attached to its upstream from `start`
        // onward (§4.7 captures eagerly, independent of whether anything
        // is currently joined), so there is nothing further to propagate.
    }

    fn deactivate_upstream(&self, ledger: &mut Ledger) {
        let _ = ledger;
        // Captures keep buffering even with no downstream joined, so a
        // successor's deactivation never tears the upstream down here.
    }
}
