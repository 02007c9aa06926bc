//! Concurrency properties: dispatch never runs with a channel mutex held
//! (§8 invariant 5), and a `ConcurrentAsync` context actually delivers
//! across threads in the order each source sent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cascade::context::immediate::ImmediateContext;
use cascade::context::threadpool::ThreadPoolContext;
use cascade::error::Outcome;
use cascade::signal;

#[test]
fn handler_may_reentrantly_send_on_its_own_upstream() {
    // If a channel's mutex were held across the dispatch call, a handler
    // that calls `source.send` again from inside its own callback would
    // deadlock against the very lock its outer `send` is still holding.
    let ctx = ImmediateContext::new();
    let (source, root) = signal::input::<i32>();
    let source = Arc::new(source);
    let depth = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let recurse_source = source.clone();
    let recurse_depth = depth.clone();
    let recurse_seen = seen.clone();
    root.subscribe(ctx, true, move |item| {
        if let Outcome::Success(v) = item {
            recurse_seen.lock().unwrap().push(v);
            if recurse_depth.fetch_add(1, Ordering::SeqCst) < 3 {
                recurse_source.send(Outcome::Success(v + 1));
            }
        }
    })
    .unwrap();

    source.send(Outcome::Success(0));

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn threadpool_context_delivers_every_sent_value_in_order() {
    let ctx = ThreadPoolContext::new();
    let (source, root) = signal::input::<u32>();

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let done = Arc::new(AtomicUsize::new(0));
    let done_handler = done.clone();
    root.subscribe(ctx, true, move |item| {
        if let Outcome::Success(v) = item {
            sink.lock().unwrap().push(v);
            done_handler.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();

    const N: u32 = 200;
    for i in 0..N {
        source.send(Outcome::Success(i));
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while (done.load(Ordering::SeqCst) as u32) < N && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let log = log.lock().unwrap();
    let expected: Vec<u32> = (0..N).collect();
    assert_eq!(*log, expected);
}
