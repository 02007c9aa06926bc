//! A `tokio`-backed execution context: `kind() == ConcurrentAsync`.
//!
//! Feature-gated behind `tokio-context`. Grounded the same way as
//! [`super::threadpool::ThreadPoolContext`] — a fixed runtime handle stands
//! in for the worker pool — but hands jobs to `tokio::task::spawn_blocking`
//! rather than a `flume` queue, and uses `tokio::time` for timers, so that
//! crate users already running a `tokio` runtime can drive `cascade` on it
//! instead of spinning up a second thread pool.

use super::{ContextKind, ExecutionContext, TimerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// A `ConcurrentAsync` context backed by a `tokio::runtime::Handle`.
pub struct TokioContext {
    handle: Handle,
}

impl TokioContext {
    /// Captures the handle of the runtime calling this constructor. Panics
    /// outside a `tokio` runtime, per `Handle::current`'s own contract.
    pub fn new() -> Arc<Self> {
        Arc::new(TokioContext { handle: Handle::current() })
    }

    pub fn from_handle(handle: Handle) -> Arc<Self> {
        Arc::new(TokioContext { handle })
    }
}

struct CancelFlag(AtomicBool);
impl TimerHandle for CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ExecutionContext for TokioContext {
    fn kind(&self) -> ContextKind {
        ContextKind::ConcurrentAsync
    }

    fn invoke(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.handle.spawn_blocking(f);
    }

    fn invoke_async(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.handle.spawn_blocking(f);
    }

    fn invoke_sync(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        // No per-context serialization primitive here, mirroring
        // `ThreadPoolContext`: run on the calling thread directly.
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
        let flag = Arc::new(CancelFlag(AtomicBool::new(false)));
        let handle = flag.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !handle.0.load(Ordering::SeqCst) {
                f();
            }
        });
        flag
    }

    fn schedule_periodic(
        &self,
        interval: Duration,
        f: Arc<dyn Fn() + Send + Sync + 'static>,
    ) -> Arc<dyn TimerHandle> {
        let flag = Arc::new(CancelFlag(AtomicBool::new(false)));
        let handle = flag.clone();
        self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if handle.0.load(Ordering::SeqCst) {
                    break;
                }
                f();
            }
        });
        flag
    }
}
