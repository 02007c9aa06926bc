//! The public composition API (§6): `Signal<T>` wraps a channel and offers
//! every composition operation as a method; free functions are the factory
//! operations that create a signal with no upstream of its own.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{Error, Outcome};
use crate::handler::capture::CaptureCore;
pub use crate::handler::capture::JoinError;
use crate::handler::combine::{self, Combined2, Combined3, Combined4, Combined5};
use crate::handler::endpoint::{self, EndpointCore};
use crate::handler::generator;
use crate::handler::input::Input;
use crate::handler::junction::JunctionCore;
use crate::handler::merge::MergeSet;
use crate::handler::multi::{CacheMode, MultiCore};
use crate::handler::transform;
use crate::ledger::Ledger;
use crate::node::channel::ChannelCore;

/// A fan-out source: yields a fresh successor channel, replaying whatever
/// its cache policy dictates, each time it is tapped. Backs every
/// multi-output variant (§4.6) so that calling `subscribe`/`transform`/etc.
/// more than once on the same [`Signal`] gives each caller its own
/// independent successor rather than fighting over one shared channel's
/// single-handler slot.
type Tap<T> = Arc<dyn Fn(&mut Ledger) -> Arc<ChannelCore<T>> + Send + Sync>;

/// A typed, push-based signal: a handle to one channel, with every
/// composition operation of §6 as a method. Cloning a `Signal` is cheap —
/// for an ordinary (single-successor) signal it shares the underlying
/// channel; for a multi-output signal it shares the same fan-out tap.
pub struct Signal<T: Send + 'static> {
    pub(crate) channel: Arc<ChannelCore<T>>,
    tap: Option<Tap<T>>,
}

impl<T: Send + 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal { channel: self.channel.clone(), tap: self.tap.clone() }
    }
}

impl<T: Send + 'static> Signal<T> {
    pub(crate) fn wrap(channel: Arc<ChannelCore<T>>) -> Self {
        Signal { channel, tap: None }
    }

    /// Wraps a multi-output core (§4.6): every subsequent use of this
    /// signal as a composition root mints its own fresh successor from
    /// `multi` rather than reusing a single shared channel.
    fn wrap_multi(multi: Arc<MultiCore<T>>) -> Self
    where
        T: Clone,
    {
        let mut ledger = Ledger::new();
        let channel = multi.subscribe(&mut ledger);
        ledger.run();
        let tap_source = multi;
        Signal { channel, tap: Some(Arc::new(move |ledger| tap_source.subscribe(ledger))) }
    }

    /// The channel a composition root should actually wire into: a fresh
    /// successor for a multi-output signal, or the one shared channel
    /// otherwise.
    fn tap_channel(&self, ledger: &mut Ledger) -> Arc<ChannelCore<T>> {
        match &self.tap {
            Some(tap) => tap(ledger),
            None => self.channel.clone(),
        }
    }

    /// Attaches a terminal callback (§4.10). `keep_alive` holds a strong
    /// self-reference on the endpoint for as long as the upstream stays
    /// active, so the signal runs even with no other owner; without it, the
    /// returned [`Endpoint`] is the only thing keeping the subscription
    /// alive — dropping it disables the channel.
    ///
    /// Always succeeds: a channel that already has a live subscriber hands
    /// `f` an in-band `Failure(Error::Duplicate)` over a synthetic
    /// pre-closed channel rather than failing this call (§4.6, §7). The
    /// `Result` stays in the signature to match every other fallible
    /// operation on `Signal`.
    pub fn subscribe(
        &self,
        context: Arc<dyn ExecutionContext>,
        keep_alive: bool,
        f: impl Fn(Outcome<T>) + Send + Sync + 'static,
    ) -> Result<Endpoint<T>, Error> {
        let endpoint = EndpointCore::new(f);
        let mut ledger = Ledger::new();
        let channel = self.tap_channel(&mut ledger);
        let result = endpoint::attach(&channel, context, endpoint, keep_alive, &mut ledger);
        ledger.run();
        Ok(Endpoint(result))
    }

    /// Plain `transform(context, f)` (§4.4).
    pub fn transform<U: Send + 'static>(
        &self,
        context: Arc<dyn ExecutionContext>,
        f: impl Fn(Outcome<T>, crate::continuation::Continuation<U>) + Send + Sync + 'static,
    ) -> Signal<U> {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        let (downstream, link) = transform::build(upstream, context, f);
        downstream.add_predecessor(Arc::new(link));
        ledger.run();
        Signal::wrap(downstream)
    }

    /// Stateful `transform(with_state)` (§4.4): `state` resets to
    /// `initial.clone()` on every activation of the returned signal.
    pub fn transform_with_state<U: Send + 'static, S: Clone + Send + 'static>(
        &self,
        context: Arc<dyn ExecutionContext>,
        initial: S,
        f: impl Fn(Outcome<T>, crate::continuation::Continuation<U>, &mut S) + Send + Sync + 'static,
    ) -> Signal<U> {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        let (downstream, link) = transform::build_stateful(upstream, context, initial, f);
        downstream.add_predecessor(Arc::new(link));
        ledger.run();
        Signal::wrap(downstream)
    }

    /// `continuous` (§4.6): replays only the latest value to each new
    /// subscriber; caches eagerly as soon as it is built.
    pub fn continuous(&self, context: Arc<dyn ExecutionContext>) -> Signal<T>
    where
        T: Clone,
    {
        self.multi(context, CacheMode::Latest, None, true)
    }

    /// `continuous(initial)` (§4.6): like [`Signal::continuous`], but a
    /// fresh subscriber sees `initial` before anything has arrived.
    pub fn continuous_with_initial(&self, context: Arc<dyn ExecutionContext>, initial: T) -> Signal<T>
    where
        T: Clone,
    {
        self.multi(context, CacheMode::Latest, Some(initial), true)
    }

    /// `playback` (§4.6): replays every value seen so far, in order, to
    /// each new subscriber.
    pub fn playback(&self, context: Arc<dyn ExecutionContext>) -> Signal<T>
    where
        T: Clone,
    {
        self.multi(context, CacheMode::All, None, true)
    }

    /// `multicast` (§4.6): no caching or replay; the upstream tears down
    /// once the last subscriber goes away.
    pub fn multicast(&self, context: Arc<dyn ExecutionContext>) -> Signal<T>
    where
        T: Clone,
    {
        self.multi(context, CacheMode::None, None, false)
    }

    /// `cacheUntilActive` (§4.6): caches every value until the first
    /// subscriber attaches, then behaves like [`Signal::multicast`].
    pub fn cache_until_active(&self, context: Arc<dyn ExecutionContext>) -> Signal<T>
    where
        T: Clone,
    {
        self.multi(context, CacheMode::UntilFirstAttach, None, false)
    }

    /// `buffer(initials, updater)` (§4.6): like [`Signal::playback`], plus
    /// an `updater` invoked with the full cache (and any terminal error)
    /// after every update.
    pub fn buffer(
        &self,
        context: Arc<dyn ExecutionContext>,
        initials: Vec<T>,
        updater: impl Fn(&[T], Option<&Error>) + Send + Sync + 'static,
    ) -> Signal<T>
    where
        T: Clone,
    {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        let multi = MultiCore::build(
            Some(upstream),
            context,
            CacheMode::All,
            initials,
            None,
            Some(Arc::new(updater)),
            true,
            &mut ledger,
        );
        ledger.run();
        Signal::wrap_multi(multi)
    }

    fn multi(
        &self,
        context: Arc<dyn ExecutionContext>,
        mode: CacheMode,
        initial: Option<T>,
        eager: bool,
    ) -> Signal<T>
    where
        T: Clone,
    {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        let multi = MultiCore::build(
            Some(upstream),
            context,
            mode,
            initial.into_iter().collect(),
            None,
            None,
            eager,
            &mut ledger,
        );
        ledger.run();
        Signal::wrap_multi(multi)
    }

    /// Starts an eagerly-attached capture of this signal (§4.7): buffers
    /// every result starting now, independent of whether anything is
    /// joined.
    pub fn capture(&self, context: Arc<dyn ExecutionContext>, resend: bool) -> Capture<T>
    where
        T: Clone,
    {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        let core = CaptureCore::new(upstream, context, resend);
        core.start(&mut ledger);
        ledger.run();
        Capture { core }
    }

    /// Builds a junction splice point with this signal as its fixed
    /// upstream (§4.8). The downstream is attached later via
    /// [`Junction::join`].
    pub fn junction(&self, context: Arc<dyn ExecutionContext>) -> Junction<T> {
        let mut ledger = Ledger::new();
        let upstream = self.tap_channel(&mut ledger);
        ledger.run();
        Junction { core: JunctionCore::new(upstream, context) }
    }

    /// Convenience over [`Signal::junction`]: also builds a fresh manual
    /// `Input`/`Signal` pair and joins it immediately.
    pub fn junction_signal(&self, context: Arc<dyn ExecutionContext>) -> (Junction<T>, Signal<T>) {
        let junction = self.junction(context);
        let (downstream_input, downstream_signal) = input::<T>();
        let mut ledger = Ledger::new();
        // A brand-new channel has activation counter 0; `input()` hands out
        // its `Input` at that same snapshot, so this join cannot fail.
        let result = junction.core.join(downstream_input, None, &mut ledger);
        ledger.run();
        debug_assert!(result.is_ok(), "joining a freshly-built channel cannot fail");
        (junction, downstream_signal)
    }
}

/// Builds a manual source and its paired signal (§6).
pub fn input<T: Send + 'static>() -> (Input<T>, Signal<T>) {
    input_with_config(&EngineConfig::default())
}

pub fn input_with_config<T: Send + 'static>(config: &EngineConfig) -> (Input<T>, Signal<T>) {
    let channel = Arc::new(ChannelCore::with_capacity(config.initial_queue_capacity));
    let handle = Input::new(&channel, channel.activation_counter());
    (handle, Signal::wrap(channel))
}

/// Builds a lazily-activated generator signal (§4.3, §6): `callback` is
/// invoked with a fresh `Input` the instant the returned signal gets its
/// first live subscriber, and with `None` the instant it goes fully
/// inactive again.
pub fn generator<T: Send + 'static>(
    context: Arc<dyn ExecutionContext>,
    callback: impl Fn(Option<Input<T>>) + Send + Sync + 'static,
) -> Signal<T> {
    let channel = Arc::new(ChannelCore::new());
    generator::install(&channel, context, Arc::new(callback));
    Signal::wrap(channel)
}

/// Builds a signal that is already closed, delivering `values` (in order)
/// and then `error` to its first subscriber, with no live upstream (§4.6's
/// `preclosed`).
pub fn preclosed<T: Clone + Send + 'static>(
    context: Arc<dyn ExecutionContext>,
    values: Vec<T>,
    error: Option<Error>,
) -> Signal<T> {
    let mut ledger = Ledger::new();
    // No live upstream (`None`): the cache is seeded once, at construction,
    // and every future subscriber simply replays it (§4.6's `preclosed`).
    let multi = MultiCore::build(None, context, CacheMode::All, values, error, None, false, &mut ledger);
    ledger.run();
    Signal::wrap_multi(multi)
}

/// Builds an empty merge set and its output signal (§4.9, §6).
pub fn merge<T: Send + 'static>() -> (Arc<MergeSet<T>>, Signal<T>) {
    let set = MergeSet::new();
    let output = set.output();
    (set, Signal::wrap(output))
}

/// Ergonomic `Signal`-typed wrappers over [`MergeSet`]'s raw-channel API,
/// so a user of this crate (for whom `Signal::channel` is invisible) never
/// has to reach for a `ChannelCore` directly.
impl<T: Send + 'static> MergeSet<T> {
    pub fn add_signal(
        self: &Arc<Self>,
        source: &Signal<T>,
        context: Arc<dyn ExecutionContext>,
        close_output: bool,
        remove_on_deactivate: bool,
    ) {
        let mut ledger = Ledger::new();
        let upstream = source.tap_channel(&mut ledger);
        self.add(upstream, context, close_output, remove_on_deactivate, &mut ledger);
        ledger.run();
    }

    pub fn remove_signal(self: &Arc<Self>, source: &Signal<T>) {
        let mut ledger = Ledger::new();
        self.remove(&source.channel, &mut ledger);
        ledger.run();
    }
}

/// A live subscription (§4.10). Dropping it disables the channel it is
/// attached to, unless `subscribe` was called with `keep_alive = true`, in
/// which case the endpoint keeps itself alive until its upstream
/// deactivates on its own and this handle is merely a convenience for early,
/// explicit teardown.
pub struct Endpoint<T: Send + 'static>(Arc<EndpointCore<T>>);

/// A capture handle (§4.7): wraps [`CaptureCore`], opening and draining its
/// own [`Ledger`] per call so callers never see the internal bookkeeping
/// type.
pub struct Capture<T: Clone + Send + 'static> {
    core: Arc<CaptureCore<T>>,
}

impl<T: Clone + Send + 'static> Capture<T> {
    pub fn activation(&self) -> (Vec<T>, Option<Error>) {
        self.core.activation()
    }

    pub fn disconnect(&self) -> Option<Input<T>> {
        let mut ledger = Ledger::new();
        let input = self.core.disconnect(&mut ledger);
        ledger.run();
        input
    }

    pub fn join(
        &self,
        input: Input<T>,
        on_error: Option<Arc<dyn Fn(Error, Input<T>) + Send + Sync>>,
    ) -> Result<(), JoinError<T>> {
        let mut ledger = Ledger::new();
        let result = self.core.join(input, on_error, &mut ledger);
        ledger.run();
        result
    }
}

/// A junction handle (§4.8): a splice point whose downstream can be
/// disconnected and rejoined at runtime.
pub struct Junction<T: Send + 'static> {
    core: Arc<JunctionCore<T>>,
}

impl<T: Send + 'static> Junction<T> {
    pub fn disconnect(&self) -> Option<Input<T>> {
        let mut ledger = Ledger::new();
        let input = self.core.disconnect(&mut ledger);
        ledger.run();
        input
    }

    pub fn join(
        &self,
        input: Input<T>,
        on_error: Option<Arc<dyn Fn(Error, Input<T>) + Send + Sync>>,
    ) -> Result<(), JoinError<T>> {
        let mut ledger = Ledger::new();
        let result = self.core.join(input, on_error, &mut ledger);
        ledger.run();
        result
    }

    /// Disconnect then immediately rejoin the same downstream (§4.8).
    pub fn rejoin(&self) -> Result<(), JoinError<T>> {
        let mut ledger = Ledger::new();
        let result = self.core.rejoin(&mut ledger);
        ledger.run();
        result
    }
}

/// Free functions for §4.5's combiner, one per supported arity.
pub fn combine2<A: Send + 'static, B: Send + 'static>(
    a: (Signal<A>, Arc<dyn ExecutionContext>),
    b: (Signal<B>, Arc<dyn ExecutionContext>),
) -> Signal<Combined2<A, B>> {
    let mut ledger = Ledger::new();
    let ua = a.0.tap_channel(&mut ledger);
    let ub = b.0.tap_channel(&mut ledger);
    let (downstream, link_a, link_b) = combine::combine2((ua, a.1), (ub, b.1));
    downstream.add_predecessor(Arc::new(link_a));
    downstream.add_predecessor(Arc::new(link_b));
    ledger.run();
    Signal::wrap(downstream)
}

pub fn combine3<A: Send + 'static, B: Send + 'static, C: Send + 'static>(
    a: (Signal<A>, Arc<dyn ExecutionContext>),
    b: (Signal<B>, Arc<dyn ExecutionContext>),
    c: (Signal<C>, Arc<dyn ExecutionContext>),
) -> Signal<Combined3<A, B, C>> {
    let mut ledger = Ledger::new();
    let ua = a.0.tap_channel(&mut ledger);
    let ub = b.0.tap_channel(&mut ledger);
    let uc = c.0.tap_channel(&mut ledger);
    let (downstream, link_a, link_b, link_c) = combine::combine3((ua, a.1), (ub, b.1), (uc, c.1));
    downstream.add_predecessor(Arc::new(link_a));
    downstream.add_predecessor(Arc::new(link_b));
    downstream.add_predecessor(Arc::new(link_c));
    ledger.run();
    Signal::wrap(downstream)
}

pub fn combine4<A: Send + 'static, B: Send + 'static, C: Send + 'static, D: Send + 'static>(
    a: (Signal<A>, Arc<dyn ExecutionContext>),
    b: (Signal<B>, Arc<dyn ExecutionContext>),
    c: (Signal<C>, Arc<dyn ExecutionContext>),
    d: (Signal<D>, Arc<dyn ExecutionContext>),
) -> Signal<Combined4<A, B, C, D>> {
    let mut ledger = Ledger::new();
    let ua = a.0.tap_channel(&mut ledger);
    let ub = b.0.tap_channel(&mut ledger);
    let uc = c.0.tap_channel(&mut ledger);
    let ud = d.0.tap_channel(&mut ledger);
    let (downstream, link_a, link_b, link_c, link_d) =
        combine::combine4((ua, a.1), (ub, b.1), (uc, c.1), (ud, d.1));
    downstream.add_predecessor(Arc::new(link_a));
    downstream.add_predecessor(Arc::new(link_b));
    downstream.add_predecessor(Arc::new(link_c));
    downstream.add_predecessor(Arc::new(link_d));
    ledger.run();
    Signal::wrap(downstream)
}

#[allow(clippy::too_many_arguments)]
pub fn combine5<
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    D: Send + 'static,
    E: Send + 'static,
>(
    a: (Signal<A>, Arc<dyn ExecutionContext>),
    b: (Signal<B>, Arc<dyn ExecutionContext>),
    c: (Signal<C>, Arc<dyn ExecutionContext>),
    d: (Signal<D>, Arc<dyn ExecutionContext>),
    e: (Signal<E>, Arc<dyn ExecutionContext>),
) -> Signal<Combined5<A, B, C, D, E>> {
    let mut ledger = Ledger::new();
    let ua = a.0.tap_channel(&mut ledger);
    let ub = b.0.tap_channel(&mut ledger);
    let uc = c.0.tap_channel(&mut ledger);
    let ud = d.0.tap_channel(&mut ledger);
    let ue = e.0.tap_channel(&mut ledger);
    let (downstream, link_a, link_b, link_c, link_d, link_e) =
        combine::combine5((ua, a.1), (ub, b.1), (uc, c.1), (ud, d.1), (ue, e.1));
    downstream.add_predecessor(Arc::new(link_a));
    downstream.add_predecessor(Arc::new(link_b));
    downstream.add_predecessor(Arc::new(link_c));
    downstream.add_predecessor(Arc::new(link_d));
    downstream.add_predecessor(Arc::new(link_e));
    ledger.run();
    Signal::wrap(downstream)
}
