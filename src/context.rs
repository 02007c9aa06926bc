//! The execution-context contract (§1, §5, §6): consumed, never
//! implemented, by the core. `cascade` treats a context as a black box with
//! a known *kind*; the dispatcher only ever asks "does this kind run
//! inline or does it hand off?" (§4.1's direct/synchronous vs.
//! asynchronous dispatch paths).
//!
//! This module also ships two concrete contexts as worked examples and test
//! fixtures, not as part of the scoped-in core (§1 explicitly scopes
//! execution-context *implementations* out): [`ImmediateContext`], used by
//! nearly every unit test in this crate, and, behind `tokio-context`,
//! [`context::tokio::TokioContext`].

use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod immediate;
#[cfg(feature = "tokio-context")]
pub mod tokio;
pub mod threadpool;

/// The seven execution-context kinds named in §5. The dispatcher only
/// distinguishes synchronous from asynchronous kinds
/// ([`ContextKind::is_synchronous`]); the full enumeration is kept because
/// handler authors (e.g. the `Generator` source, §4.3) must reason about
/// reentrancy and thread affinity, which are finer-grained than the
/// sync/async split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextKind {
    /// Synchronous, reentrant, concurrent. Handlers run on the sending
    /// thread; nested sends from within a handler are safe.
    Immediate,
    /// Synchronous, non-reentrant, serial. Handlers run on the sending
    /// thread, serialized by a non-reentrant lock internal to the context.
    Mutex,
    /// Synchronous, reentrant, serial.
    RecursiveMutex,
    /// Asynchronous, one handler in flight per channel at a time, possibly
    /// on different threads from call to call.
    SerialAsync,
    /// Asynchronous, no serialization guarantee beyond per-channel FIFO.
    ConcurrentAsync,
    /// Synchronous only when already on the context's target thread;
    /// otherwise behaves like an asynchronous hand-off.
    ThreadAffine,
    /// Always asynchronous, always delivered on the context's target
    /// thread.
    ThreadAffineAsync,
}

impl ContextKind {
    /// True for kinds the dispatcher may drive with an inline pop-loop
    /// (§4.1's "Immediate or synchronous context" path); false for kinds
    /// that must go through `invoke_async` and resume via their own
    /// callback (§4.1's "Asynchronous context" path).
    ///
    /// `ThreadAffine` is conservatively treated as asynchronous here: the
    /// core has no reliable, context-agnostic way to ask "am I on the
    /// target thread right now?" without calling into the context, and a
    /// context that *is* already on its target thread is free to complete
    /// `invoke_async`'s callback synchronously before returning — giving
    /// the same observable ordering as the inline path, just routed through
    /// one extra call.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, ContextKind::Immediate | ContextKind::Mutex | ContextKind::RecursiveMutex)
    }

    /// True for kinds where the *same* handler may safely be invoked
    /// reentrantly from within its own callback (relevant to the
    /// exactly-once serialization requirement on `Generator`, §4.3).
    pub fn is_reentrant(&self) -> bool {
        matches!(self, ContextKind::Immediate | ContextKind::RecursiveMutex)
    }
}

/// A cancellable timer handle (§6).
pub trait TimerHandle: Send + Sync {
    fn cancel(&self);
}

/// The execution-context contract (§6). Implementors are a black box to
/// the core beyond this surface.
pub trait ExecutionContext: Send + Sync + 'static {
    fn kind(&self) -> ContextKind;

    /// Synchronous invocation: for synchronous kinds, `f` has completed by
    /// the time this call returns.
    fn invoke(&self, f: Box<dyn FnOnce() + Send + 'static>);

    /// Explicit asynchronous invocation: `f` is scheduled and this call
    /// returns immediately, regardless of kind. Used by the dispatcher for
    /// every asynchronous-kind context, and by sources that must guarantee
    /// a callback never runs on the caller's own stack.
    fn invoke_async(&self, f: Box<dyn FnOnce() + Send + 'static>);

    /// Synchronous invocation that additionally guarantees serialization
    /// against concurrent `invoke_sync` calls on the same context, even for
    /// an otherwise-concurrent kind. Used by [`crate::handler::generator`]
    /// to guarantee the "exactly-one serialization" rule of §4.3.
    fn invoke_sync(&self, f: Box<dyn FnOnce() + Send + 'static>);

    /// A monotonic timestamp, per §6.
    fn now(&self) -> Instant;

    fn schedule_once(
        &self,
        delay: Duration,
        f: Box<dyn FnOnce() + Send + 'static>,
    ) -> Arc<dyn TimerHandle>;

    /// Periodic timers fire repeatedly, so (unlike `schedule_once`) the
    /// callback must be reusable across ticks.
    fn schedule_periodic(
        &self,
        interval: Duration,
        f: Arc<dyn Fn() + Send + Sync + 'static>,
    ) -> Arc<dyn TimerHandle>;
}
