//! A trivial, fully synchronous execution context: runs everything on the
//! calling thread, immediately. Used throughout this crate's own test
//! suite as the default context, and a reasonable default for callers who
//! have no scheduler of their own.

use super::{ContextKind, ExecutionContext, TimerHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The `Immediate` context: synchronous, reentrant, concurrent.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateContext;

impl ImmediateContext {
    pub fn new() -> Arc<Self> {
        Arc::new(ImmediateContext)
    }
}

struct NoopTimer;
impl TimerHandle for NoopTimer {
    fn cancel(&self) {}
}

impl ExecutionContext for ImmediateContext {
    fn kind(&self) -> ContextKind {
        ContextKind::Immediate
    }

    fn invoke(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        f();
    }

    fn invoke_async(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        // No scheduler of our own to hand off to; run inline. Safe because
        // `Immediate` is reentrant and handlers never block waiting on
        // another dispatch.
        f();
    }

    fn invoke_sync(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        f();
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_once(
        &self,
        delay: Duration,
        f: Box<dyn FnOnce() + Send + 'static>,
    ) -> Arc<dyn TimerHandle> {
        // No background clock; fire immediately. Sufficient for a context
        // whose entire contract is "everything happens now".
        let _ = delay;
        f();
        Arc::new(NoopTimer)
    }

    fn schedule_periodic(
        &self,
        interval: Duration,
        f: Arc<dyn Fn() + Send + Sync + 'static>,
    ) -> Arc<dyn TimerHandle> {
        // Fires once, synchronously, rather than looping forever on the
        // caller's thread — an immediate context has no background clock
        // to drive further ticks.
        let _ = interval;
        f();
        Arc::new(NoopTimer)
    }
}
