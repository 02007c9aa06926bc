//! A small worker-pool execution context: `kind() == ConcurrentAsync`.
//!
//! Grounded on the teacher's own channel-crate dependency (`flume`) rather
//! than on a hand-rolled queue: jobs are handed to a fixed pool of worker
//! threads (sized via `num_cpus`, also already part of the teacher's
//! dependency set) over an unbounded MPMC channel. This is the "concurrent"
//! context used by the cross-thread-ordering integration tests.

use super::{ContextKind, ExecutionContext, TimerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A `ConcurrentAsync` context backed by a fixed pool of worker threads.
pub struct ThreadPoolContext {
    sender: flume::Sender<Job>,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPoolContext {
    /// Spawns a pool sized to the available parallelism.
    pub fn new() -> Arc<Self> {
        Self::with_threads(num_cpus::get().max(1))
    }

    pub fn with_threads(n: usize) -> Arc<Self> {
        let (sender, receiver) = flume::unbounded::<Job>();
        let workers = (0..n)
            .map(|_| {
                let receiver = receiver.clone();
                thread::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
            })
            .collect();
        Arc::new(ThreadPoolContext { sender, _workers: workers })
    }
}

impl Drop for ThreadPoolContext {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; workers exit their `recv`
        // loop on their own. We intentionally do not join them here —
        // outstanding jobs already queued are allowed to finish
        // independently of this context's lifetime.
    }
}

struct CancelFlag(AtomicBool);
impl TimerHandle for CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ExecutionContext for ThreadPoolContext {
    fn kind(&self) -> ContextKind {
        ContextKind::ConcurrentAsync
    }

    fn invoke(&self, f: Job) {
        let _ = self.sender.send(f);
    }

    fn invoke_async(&self, f: Job) {
        let _ = self.sender.send(f);
    }

    fn invoke_sync(&self, f: Job) {
        // No per-context serialization primitive here: run on the calling
        // thread directly so "synchronous" is actually synchronous.
        f();
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_once(&self, delay: Duration, f: Job) -> Arc<dyn TimerHandle> {
        let flag = Arc::new(CancelFlag(AtomicBool::new(false)));
        let sender = self.sender.clone();
        let handle = flag.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            if !handle.0.load(Ordering::SeqCst) {
                let _ = sender.send(f);
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
        let sender = self.sender.clone();
        let handle = flag.clone();
        thread::spawn(move || {
            loop {
                thread::sleep(interval);
                if handle.0.load(Ordering::SeqCst) {
                    break;
                }
                let f = f.clone();
                if sender.send(Box::new(move || f())).is_err() {
                    break;
                }
            }
        });
        flag
    }
}
