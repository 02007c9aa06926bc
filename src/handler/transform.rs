//! Single-output processor (§4.4): `transform` and its stateful variant.

use std::sync::{Arc, Mutex};

use crate::continuation::{hold_gate, Continuation};
use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::handler::link::ProcessorLink;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler};

type PlainFn<T, U> = dyn Fn(Outcome<T>, Continuation<U>) + Send + Sync;
type StatefulFn<T, U, S> = dyn Fn(Outcome<T>, Continuation<U>, &mut S) + Send + Sync;

pub(crate) struct TransformHandler<T: Send + 'static, U: Send + 'static> {
    upstream: Arc<ChannelCore<T>>,
    downstream: Arc<ChannelCore<U>>,
    f: Arc<PlainFn<T, U>>,
}

impl<T: Send + 'static, U: Send + 'static> Handler<T> for TransformHandler<T, U> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let cont = Continuation::new(
            hold_gate(&self.upstream),
            self.upstream.activation_counter(),
            self.downstream.clone(),
            self.upstream.id(),
        );
        (self.f)(item, cont.clone());
        cont.mark_retained_if_escaped();
        let _ = ledger;
    }
}

/// Builds the downstream channel and predecessor link for a plain
/// `transform(context, f)` (§4.4, §6).
pub(crate) fn build<T, U>(
    upstream: Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    f: impl Fn(Outcome<T>, Continuation<U>) + Send + Sync + 'static,
) -> (Arc<ChannelCore<U>>, ProcessorLink<T>)
where
    T: Send + 'static,
    U: Send + 'static,
{
    let downstream = Arc::new(ChannelCore::new());
    let handler: Arc<dyn Handler<T>> = Arc::new(TransformHandler {
        upstream: upstream.clone(),
        downstream: downstream.clone(),
        f: Arc::new(f),
    });
    let link = ProcessorLink { upstream, handler, context, loop_checking: false };
    (downstream, link)
}

pub(crate) struct StatefulTransformHandler<T: Send + 'static, U: Send + 'static, S: Send + 'static> {
    upstream: Arc<ChannelCore<T>>,
    downstream: Arc<ChannelCore<U>>,
    f: Arc<StatefulFn<T, U, S>>,
    state: Arc<Mutex<S>>,
}

impl<T: Send + 'static, U: Send + 'static, S: Send + 'static> Handler<T>
    for StatefulTransformHandler<T, U, S>
{
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let cont = Continuation::new(
            hold_gate(&self.upstream),
            self.upstream.activation_counter(),
            self.downstream.clone(),
            self.upstream.id(),
        );
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        (self.f)(item, cont.clone(), &mut state);
        drop(state);
        cont.mark_retained_if_escaped();
        let _ = ledger;
    }
}

/// Builds the downstream channel and predecessor link for
/// `transform(with_state)` (§4.4): `state` is reset to a fresh
/// `initial.clone()` every time the downstream channel activates, so a
/// deactivation/reactivation cycle never observes leftover state from a
/// previous subscriber.
pub(crate) fn build_stateful<T, U, S>(
    upstream: Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    initial: S,
    f: impl Fn(Outcome<T>, Continuation<U>, &mut S) + Send + Sync + 'static,
) -> (Arc<ChannelCore<U>>, ProcessorLink<T>)
where
    T: Send + 'static,
    U: Send + 'static,
    S: Clone + Send + 'static,
{
    let downstream = Arc::new(ChannelCore::new());
    let state = Arc::new(Mutex::new(initial.clone()));
    {
        let state = state.clone();
        downstream.set_activation_hook(Arc::new(move |active| {
            if active {
                let mut guard = state.lock().unwrap_or_else(|p| p.into_inner());
                *guard = initial.clone();
            }
        }));
    }
    let handler: Arc<dyn Handler<T>> = Arc::new(StatefulTransformHandler {
        upstream: upstream.clone(),
        downstream: downstream.clone(),
        f: Arc::new(f),
        state,
    });
    let link = ProcessorLink { upstream, handler, context, loop_checking: false };
    (downstream, link)
}
