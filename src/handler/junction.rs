//! Junction handler (§4.8): a splice point with a fixed upstream and a
//! pluggable downstream. `disconnect()` hands the caller manual control
//! over the (now orphaned) downstream via a fresh [`Input`]; `join` uses
//! that same token to identify — and revalidate the liveness of — the
//! downstream channel being rejoined.

use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::error::{Error, Outcome};
use crate::handler::input::Input;
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler, SendTicket};
use crate::node::predecessor::PredecessorLink;

/// The three ways a `join` can fail to attach (§6). The two recoverable
/// cases return a fresh [`Input`] for the orphaned downstream so the
/// caller never loses manual access to it.
pub enum JoinError<T: Send + 'static> {
    /// The supplied `Input`'s channel is gone or its activation snapshot
    /// is stale.
    Cancelled,
    /// The target channel already has a live predecessor.
    Duplicate(Input<T>),
    /// Joining would introduce a cycle in the predecessor DAG.
    Loop(Input<T>),
}

type OnError<T> = dyn Fn(Error, Input<T>) + Send + Sync;

struct State<T: Send + 'static> {
    target: Option<Arc<ChannelCore<T>>>,
    on_error: Option<Arc<OnError<T>>>,
}

/// A junction's core: fixed upstream, swappable downstream (§4.8).
pub struct JunctionCore<T: Send + 'static> {
    id: ChannelId,
    upstream: Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> JunctionCore<T> {
    pub fn new(upstream: Arc<ChannelCore<T>>, context: Arc<dyn ExecutionContext>) -> Arc<Self> {
        Arc::new(JunctionCore {
            id: ChannelId::next(),
            upstream,
            context,
            state: Mutex::new(State { target: None, on_error: None }),
        })
    }

    /// Disconnects the current downstream (if any), returning a fresh
    /// `Input` for it so the caller retains manual control.
    pub fn disconnect(self: &Arc<Self>, ledger: &mut Ledger) -> Option<Input<T>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let target = state.target.take()?;
        state.on_error = None;
        drop(state);
        target.remove_predecessor(self.id);
        let activation = target.bump_activation();
        let input = Input::new(&target, activation);
        let _ = ledger;
        Some(input)
    }

    /// Rejoins to the downstream identified by `input`, subject to loop
    /// and duplicate-predecessor checks (§4.2, §4.8).
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
        if target.would_introduce_loop(self.upstream.id()) {
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
        drop(state);

        let link: Arc<dyn PredecessorLink> = Arc::new(JunctionLink { junction: self.clone() });
        target.add_predecessor(link);
        // Loop-checking predecessors activate their own upstream as soon
        // as they join, mirroring what `ProcessorLink::activate_upstream`
        // does for ordinary processors (§4.2).
        let _ = self.upstream.attach(
            Arc::downgrade(&(self.clone() as Arc<dyn Handler<T>>)),
            self.context.clone(),
            ledger,
        );
        // The token is being folded back into an attached predecessor, not
        // abandoned — suppress `Input::drop`'s `Cancelled` send. Every
        // earlier return point leaves `input` to drop normally, correctly
        // cancelling a downstream that a failed join leaves orphaned.
        std::mem::forget(input);
        Ok(())
    }

    /// Disconnect then immediately join the same downstream, forcing a
    /// fresh activation epoch (§4.8).
    pub fn rejoin(self: &Arc<Self>, ledger: &mut Ledger) -> Result<(), JoinError<T>> {
        let Some(input) = self.disconnect(ledger) else { return Ok(()) };
        self.join(input, None, ledger)
    }
}

impl<T: Send + 'static> Handler<T> for JunctionCore<T> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let (target, on_error) = {
            let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
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

struct JunctionLink<T: Send + 'static> {
    junction: Arc<JunctionCore<T>>,
}

impl<T: Send + 'static> PredecessorLink for JunctionLink<T> {
    fn upstream_id(&self) -> ChannelId {
        self.junction.upstream.id()
    }

    fn ancestry_contains(&self, candidate: ChannelId) -> bool {
        self.junction.upstream.id() == candidate || self.junction.upstream.would_introduce_loop(candidate)
    }

    fn is_loop_checking(&self) -> bool {
        true
    }

    fn activate_upstream(&self, ledger: &mut Ledger) {
        let _ = self.junction.upstream.attach(
            Arc::downgrade(&(self.junction.clone() as Arc<dyn Handler<T>>)),
            self.junction.context.clone(),
            ledger,
        );
    }

    fn deactivate_upstream(&self, ledger: &mut Ledger) {
        self.junction.upstream.disable(ledger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::immediate::ImmediateContext;

    #[test]
    fn join_onto_a_target_with_a_live_predecessor_is_rejected() {
        let ctx = ImmediateContext::new();
        let junction_a = JunctionCore::new(Arc::new(ChannelCore::<i32>::new()), ctx.clone());
        let junction_b = JunctionCore::new(Arc::new(ChannelCore::<i32>::new()), ctx);

        let target = Arc::new(ChannelCore::<i32>::new());
        let mut ledger = Ledger::new();
        let input_a = Input::new(&target, target.activation_counter());
        junction_a.join(input_a, None, &mut ledger).map_err(|_| ()).expect("first join should succeed");

        let input_b = Input::new(&target, target.activation_counter());
        let result = junction_b.join(input_b, None, &mut ledger);
        assert!(matches!(result, Err(JoinError::Duplicate(_))));
        ledger.run();
    }
}
