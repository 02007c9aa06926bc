//! The channel: per-node queue, mutex, and dispatcher (§4.1 — "the heart of
//! the engine").

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::context::ExecutionContext;
use crate::error::{Error, Outcome};
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::phase::Phase;
use crate::node::predecessor::PredecessorSet;

/// The behavior attached to a channel: whatever consumes values popped from
/// its queue (§2's "Handler base"). Object-safe and fixed to the channel's
/// own item type — the type erasure needed to hold heterogeneous upstream
/// types lives one level up, in [`crate::node::predecessor::PredecessorLink`].
pub trait Handler<T>: Send + Sync {
    /// Processes one delivered item. Runs with no internal mutex held.
    /// Implementations that must forward a terminal `Failure` and then tear
    /// themselves down perform both inside this call (§4, "Failure
    /// side-effect").
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger);
}

/// A handler plus the execution context that governs how it is invoked.
/// Cached on the channel as the "item context" of §3, refreshed (here:
/// simply recomputed) whenever it is cleared by a structural change.
#[derive(Clone)]
pub(crate) struct Attachment<T> {
    pub handler: Weak<dyn Handler<T>>,
    pub context: Arc<dyn ExecutionContext>,
}

/// A fixed send-time credential: the identity a predecessor uses to address
/// a specific downstream channel, plus the activation-counter value that
/// was current when the predecessor was registered. A send tagged with a
/// stale counter is rejected by construction (§3, §4.2 invariant 4).
#[derive(Clone, Copy, Debug)]
pub struct SendTicket {
    pub predecessor: Option<ChannelId>,
    pub activation: u64,
    /// True if the upstream that issued this ticket is itself already in
    /// `Phase::Normal` — i.e. this send is "post-activation" (§4.2's
    /// `activated_flag`).
    pub activated: bool,
}

impl SendTicket {
    /// The ticket used by a source with no predecessor of its own (manual
    /// `Input`, `Generator`).
    pub fn root(activation: u64) -> Self {
        SendTicket { predecessor: None, activation, activated: true }
    }
}

/// Fires whenever this channel's own phase transitions into or out of
/// `Disabled` — `true` on activation, `false` on deactivation. The one
/// consumer with no predecessor of its own, [`crate::handler::generator`],
/// uses this to learn when to hand out (or revoke) an `Input` with no
/// `attach`-style handler in the loop at all.
pub(crate) type ActivationHook = Arc<dyn Fn(bool) + Send + Sync>;

struct State<T> {
    phase: Phase,
    activation_counter: u64,
    hold_count: u8,
    item_processing: bool,
    queue: VecDeque<Outcome<T>>,
    predecessors: PredecessorSet,
    attachment: Option<Attachment<T>>,
    activation_hook: Option<ActivationHook>,
}

impl<T> State<T> {
    fn with_capacity(cap: usize) -> Self {
        State {
            phase: Phase::Disabled,
            activation_counter: 0,
            hold_count: 0,
            item_processing: false,
            queue: VecDeque::with_capacity(cap),
            predecessors: PredecessorSet::new(),
            attachment: None,
            activation_hook: None,
        }
    }

    /// Whether the dispatcher may proceed straight to the fast path instead
    /// of merely enqueuing (§4.1 step 2).
    fn can_fast_path(&self) -> bool {
        self.queue.is_empty() && !self.item_processing && self.hold_count == 0
    }
}

/// The queue-bearing, mutex-protected node state (§3).
///
/// `ChannelCore<T>` is always held behind an `Arc`; successors created from
/// an immediate-context processor may instead share the predecessor's own
/// `Arc<Mutex<..>>` (§4.1, §5) by cloning [`ChannelCore::mutex`] directly
/// rather than allocating a fresh one — see [`ChannelCore::new_sharing`].
pub struct ChannelCore<T> {
    pub(crate) id: ChannelId,
    mutex: Arc<Mutex<State<T>>>,
}

impl<T> Clone for ChannelCore<T> {
    fn clone(&self) -> Self {
        ChannelCore { id: self.id, mutex: self.mutex.clone() }
    }
}

impl<T: Send + 'static> ChannelCore<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Like [`ChannelCore::new`], but pre-sizing the queue's backing storage
    /// per [`crate::config::EngineConfig::initial_queue_capacity`].
    pub fn with_capacity(cap: usize) -> Self {
        ChannelCore { id: ChannelId::next(), mutex: Arc::new(Mutex::new(State::with_capacity(cap))) }
    }

    /// Constructs a channel whose mutex is shared with an existing one —
    /// the optimization of §5: "successor channels created from an
    /// immediate-context processor share the predecessor's mutex". Only
    /// valid when `T` is the same type as the shared channel, which is
    /// always true for the pass-through handlers that use it (identity
    /// transforms under an immediate context).
    pub(crate) fn new_sharing(mutex: Arc<Mutex<State<T>>>) -> Self {
        ChannelCore { id: ChannelId::next(), mutex }
    }

    /// Exposes the underlying mutex `Arc` so a sibling channel can be built
    /// with [`ChannelCore::new_sharing`] over the same lock.
    pub(crate) fn shared_mutex(&self) -> Arc<Mutex<State<T>>> {
        self.mutex.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.mutex.lock().unwrap_or_else(|poison| {
            #[cfg(feature = "tracing")]
            tracing::error!(channel = %self.id, "channel mutex poisoned; this is an engine bug");
            poison.into_inner()
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Installs (or replaces) the activation hook (see [`ActivationHook`]).
    pub(crate) fn set_activation_hook(&self, hook: ActivationHook) {
        self.lock().activation_hook = Some(hook);
    }

    // ---- wiring --------------------------------------------------------

    /// Attaches `handler` as this channel's sole successor under `context`.
    /// Fails with [`Error::Duplicate`] if a (live) handler is already
    /// attached, matching §4.6's "attaching a second subscriber to a
    /// non-multi channel yields a pre-closed successor delivering
    /// `Duplicate`" — the multi-output handler is the one caller that
    /// bypasses this by fanning out internally instead of calling this
    /// method twice.
    ///
    /// If this is the channel's first successor, this is also precisely
    /// the activation point of §4.2: the channel's own activation hook (if
    /// any) fires, and activation propagates to every predecessor in
    /// insertion-timestamp order.
    pub fn attach(
        self: &Arc<Self>,
        handler: Weak<dyn Handler<T>>,
        context: Arc<dyn ExecutionContext>,
        ledger: &mut Ledger,
    ) -> Result<(), Error> {
        let mut state = self.lock();
        if let Some(existing) = &state.attachment
            && existing.handler.upgrade().is_some()
        {
            return Err(Error::Duplicate);
        }
        state.attachment = Some(Attachment { handler, context });
        let was_disabled = state.phase.is_disabled();
        if !was_disabled {
            return Ok(());
        }
        // No bump here: the counter only needs to strictly increase across
        // a *teardown* (`disable`/`invalidate`, which already bump) or a
        // predecessor-set change from empty (`add_predecessor`, which
        // already bumps). Bumping here too would invalidate a manual
        // `Input`'s snapshot the moment anything downstream first
        // subscribes, before it ever got to send anything.
        state.phase = Phase::Synchronous(0);
        let hook = state.activation_hook.clone();
        let predecessors: Vec<_> = state.predecessors.iter_in_order().cloned().collect();
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::trace!(channel = %self.id, "activating");

        if let Some(hook) = hook {
            hook(true);
        }
        for link in predecessors {
            // Each call recurses synchronously into that predecessor's own
            // `attach`, which — by the same rule, at whatever depth it
            // bottoms out — completes its own activation before returning.
            // So by the time every predecessor here has been walked, the
            // whole upstream prefix is already `Normal`.
            link.activate_upstream(ledger);
        }
        self.complete_activation(ledger);
        Ok(())
    }

    pub fn activation_counter(&self) -> u64 {
        self.lock().activation_counter
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().phase.is_disabled()
    }

    /// Adds a predecessor, bumping the activation counter only if the set
    /// was previously empty (§3: "predecessor added when previously
    /// empty" is one of the counter-bumping transitions).
    pub fn add_predecessor(
        &self,
        link: Arc<dyn crate::node::predecessor::PredecessorLink>,
    ) -> u64 {
        let mut state = self.lock();
        let was_empty = state.predecessors.is_empty();
        state.predecessors.insert(link);
        if was_empty {
            state.activation_counter += 1;
        }
        state.activation_counter
    }

    pub fn would_introduce_loop(&self, candidate: ChannelId) -> bool {
        self.lock().predecessors.would_introduce_loop(candidate)
    }

    /// Whether this channel already has at least one predecessor — the
    /// single-splice-point rule a `join` checks before wiring up a second
    /// one (§4.8, §6).
    pub fn has_predecessor(&self) -> bool {
        !self.lock().predecessors.is_empty()
    }

    pub fn remove_predecessor(
        &self,
        id: ChannelId,
    ) -> Option<Arc<dyn crate::node::predecessor::PredecessorLink>> {
        self.lock().predecessors.remove(id)
    }

    /// Forces `activationCount += 1` with no other side effect. Used by
    /// rewiring operations (junction disconnect/rejoin) that alter the
    /// predecessor set outside of `add_predecessor`'s own bookkeeping, so
    /// sends tagged with the pre-rewire counter are rejected as `Cancelled`
    /// (§4.2 invariant 4).
    pub fn bump_activation(&self) -> u64 {
        let mut state = self.lock();
        state.activation_counter += 1;
        state.activation_counter
    }

    /// Forces `activationCount += 1`, drops the queue (outside the mutex,
    /// via `ledger`), and marks the channel `Disabled` so the caller can
    /// re-activate it from scratch if it is still reachable (§4.2
    /// Invalidation).
    pub fn invalidate(&self, ledger: &mut Ledger) {
        let mut state = self.lock();
        let was_disabled = state.phase.is_disabled();
        state.activation_counter += 1;
        state.attachment = None;
        state.phase = Phase::Disabled;
        let dropped = std::mem::take(&mut state.queue);
        let hook = if was_disabled { None } else { state.activation_hook.clone() };
        drop(state);
        if !dropped.is_empty() {
            ledger.defer(move || drop(dropped));
        }
        if let Some(hook) = hook {
            hook(false);
        }
    }

    /// Marks the channel `Disabled`, dropping any queued values outside the
    /// mutex, firing the activation hook, and propagating deactivation to
    /// every predecessor. Idempotent.
    pub fn disable(self: &Arc<Self>, ledger: &mut Ledger) {
        let mut state = self.lock();
        if state.phase.is_disabled() {
            return;
        }
        state.activation_counter += 1;
        state.phase = Phase::Disabled;
        state.attachment = None;
        let dropped = std::mem::take(&mut state.queue);
        let hook = state.activation_hook.clone();
        let predecessors = state.predecessors.drain();
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::trace!(channel = %self.id, "deactivating");

        if !dropped.is_empty() {
            ledger.defer(move || drop(dropped));
        }
        if let Some(hook) = hook {
            hook(false);
        }
        for link in predecessors {
            link.deactivate_upstream(ledger);
        }
    }

    /// Transitions `Synchronous(n)` to `Normal` once the activation prefix
    /// is fully established, and kicks off dispatch of anything already
    /// queued (§4.2).
    pub fn complete_activation(self: &Arc<Self>, ledger: &mut Ledger) {
        {
            let mut state = self.lock();
            if matches!(state.phase, Phase::Synchronous(_)) {
                state.phase = Phase::Normal;
            }
        }
        self.kick(ledger);
    }

    // ---- hold semantics --------------------------------------------------

    /// Increments the hold count if `activation` still matches the current
    /// counter (a stale hold from a torn-down activation epoch is a no-op).
    pub fn block(&self, activation: u64) {
        let mut state = self.lock();
        if state.activation_counter == activation && state.hold_count < 2 {
            state.hold_count += 1;
        }
    }

    /// Decrements the hold count and, if it reaches zero, attempts to
    /// resume dispatch.
    pub fn unblock(self: &Arc<Self>, ledger: &mut Ledger) {
        {
            let mut state = self.lock();
            if state.hold_count > 0 {
                state.hold_count -= 1;
            }
        }
        self.kick(ledger);
    }

    // ---- sending -----------------------------------------------------

    /// The delivery algorithm of §4.1. Returns an operational error (never
    /// delivered downstream) when the send is rejected outright.
    pub fn send(self: &Arc<Self>, item: Outcome<T>, ticket: SendTicket, ledger: &mut Ledger) -> Option<Error> {
        let mut state = self.lock();

        // 1. staleness / phase-independent rejection.
        if state.predecessors.is_empty() {
            if ticket.predecessor.is_some() || state.activation_counter != ticket.activation {
                return Some(Error::Cancelled);
            }
        } else {
            let known = state
                .predecessors
                .iter_in_order()
                .any(|p| Some(p.upstream_id()) == ticket.predecessor);
            if !known || state.activation_counter != ticket.activation {
                return Some(Error::Cancelled);
            }
        }

        // 2. phase gate.
        match state.phase {
            Phase::Disabled => {
                drop(state);
                return Some(Error::Inactive);
            }
            Phase::Synchronous(n) => {
                if ticket.activated {
                    state.queue.push_back(item);
                    return None;
                }
                if state.can_fast_path() {
                    // fall through to fast path below
                } else {
                    let idx = n.min(state.queue.len());
                    state.queue.insert(idx, item);
                    state.phase.grow_prefix();
                    return None;
                }
            }
            Phase::Normal => {
                if !state.can_fast_path() {
                    state.queue.push_back(item);
                    return None;
                }
            }
        }

        // 3. fast path: refresh attachment, dispatch outside the mutex.
        let Some(attachment) = state.attachment.clone() else {
            drop(state);
            return Some(Error::Inactive);
        };
        let Some(handler) = attachment.handler.upgrade() else {
            drop(state);
            return Some(Error::Inactive);
        };
        state.item_processing = true;
        drop(state);

        self.clone().dispatch(item, handler, attachment.context);
        let _ = ledger;
        None
    }

    /// Always enqueues, callable while the caller already holds a
    /// *different* channel's mutex (§4.1's `push`). Used to build an
    /// activation prefix (replay caches, capture buffers) without
    /// attempting a nested dispatch.
    pub fn push(self: &Arc<Self>, values: impl IntoIterator<Item = T>, terminal: Option<Error>, ledger: &mut Ledger) {
        {
            let mut state = self.lock();
            for v in values {
                state.queue.push_back(Outcome::Success(v));
                state.phase.grow_prefix();
            }
            if let Some(err) = terminal {
                state.queue.push_back(Outcome::Failure(err));
                state.phase.grow_prefix();
            }
        }
        self.kick(ledger);
    }

    /// Attempts to start dispatch if the channel is currently idle with
    /// queued work (used after `unblock`, `complete_activation`, and
    /// `push`, none of which go through the `send` fast path directly).
    fn kick(self: &Arc<Self>, ledger: &mut Ledger) {
        let (attachment, first) = {
            let mut state = self.lock();
            if !state.can_fast_path() || state.queue.is_empty() {
                return;
            }
            let Some(attachment) = state.attachment.clone() else { return };
            let Some(handler) = attachment.handler.upgrade() else { return };
            let first = state.queue.pop_front().unwrap();
            if matches!(state.phase, Phase::Synchronous(_)) {
                state.phase.shrink_prefix();
            }
            state.item_processing = true;
            ((attachment.context, handler), first)
        };
        let (context, handler) = attachment;
        self.clone().dispatch(first, handler, context);
        let _ = ledger;
    }

    /// Dispatches `item` through `handler` under `context`, outside the
    /// mutex (§4.1's "outside the mutex" rules).
    fn dispatch(
        self: Arc<Self>,
        item: Outcome<T>,
        handler: Arc<dyn Handler<T>>,
        context: Arc<dyn ExecutionContext>,
    ) {
        if context.kind().is_synchronous() {
            let mut current = item;
            loop {
                let mut ledger = Ledger::new();
                handler.handle(current, &mut ledger);
                ledger.run();
                match self.pop_next() {
                    Some(next) => current = next,
                    None => break,
                }
            }
        } else {
            let channel = self.clone();
            let next_ctx = context.clone();
            context.invoke_async(Box::new(move || {
                let mut ledger = Ledger::new();
                handler.handle(item, &mut ledger);
                ledger.run();
                channel.continue_async(handler, next_ctx);
            }));
        }
    }

    fn continue_async(self: Arc<Self>, handler: Arc<dyn Handler<T>>, context: Arc<dyn ExecutionContext>) {
        if let Some(next) = self.pop_next() {
            let channel = self.clone();
            let next_ctx = context.clone();
            context.invoke_async(Box::new(move || {
                let mut ledger = Ledger::new();
                handler.handle(next, &mut ledger);
                ledger.run();
                channel.continue_async(handler, next_ctx);
            }));
        }
    }

    /// The `pop` algorithm of §4.1.
    fn pop_next(&self) -> Option<Outcome<T>> {
        let mut state = self.lock();
        if state.hold_count == 0 && !state.queue.is_empty() {
            if matches!(state.phase, Phase::Synchronous(_)) {
                state.phase.shrink_prefix();
            }
            return state.queue.pop_front();
        }
        state.item_processing = false;
        None
    }

    /// Current queue depth, for diagnostics only.
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn hold_count(&self) -> u8 {
        self.lock().hold_count
    }

    pub fn phase_snapshot(&self) -> Phase {
        self.lock().phase
    }
}

impl<T: Send + 'static> Default for ChannelCore<T> {
    fn default() -> Self {
        Self::new()
    }
}
