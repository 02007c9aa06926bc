//! End-to-end scenarios from the crate's worked examples: a basic
//! transform pipeline, the multi-output replay variants, capture/join, and
//! graph-loop rejection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cascade::context::immediate::ImmediateContext;
use cascade::error::{Error, Outcome};
use cascade::handler::input::Input;
use cascade::signal;

fn collect<T: Send + 'static>() -> (Arc<Mutex<Vec<Outcome<T>>>>, impl Fn(Outcome<T>) + Send + Sync + 'static)
where
    T: Clone,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, move |item: Outcome<T>| sink.lock().unwrap().push(item))
}

#[test]
fn basic_transform_pipeline_delivers_in_order() {
    let ctx = ImmediateContext::new();
    let (source, root) = signal::input::<i32>();
    let doubled = root.transform(ctx.clone(), |item, cont| {
        let _ = cont.send(item.map(|v| v * 2));
    });

    let (log, sink) = collect::<i32>();
    doubled.subscribe(ctx, true, sink).unwrap();

    source.send(Outcome::Success(1));
    source.send(Outcome::Success(2));
    source.send(Outcome::Success(3));
    drop(source);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert!(matches!(log[0], Outcome::Success(2)));
    assert!(matches!(log[1], Outcome::Success(4)));
    assert!(matches!(log[2], Outcome::Success(6)));
    assert!(matches!(&log[3], Outcome::Failure(Error::Cancelled)));
}

#[test]
fn continuous_replays_latest_to_each_new_subscriber() {
    let ctx = ImmediateContext::new();
    let (source, root) = signal::input::<i32>();
    let hot = root.continuous(ctx.clone());

    source.send(Outcome::Success(5));

    // Two independent subscribers, each immediately seeing the latest
    // cached value — the multi-output fan-out contract this crate's
    // tap-channel indirection exists to support.
    let (log_a, sink_a) = collect::<i32>();
    hot.subscribe(ctx.clone(), true, sink_a).unwrap();
    let (log_b, sink_b) = collect::<i32>();
    hot.subscribe(ctx, true, sink_b).unwrap();

    assert!(matches!(log_a.lock().unwrap()[0], Outcome::Success(5)));
    assert!(matches!(log_b.lock().unwrap()[0], Outcome::Success(5)));

    source.send(Outcome::Success(9));
    assert!(matches!(log_a.lock().unwrap()[1], Outcome::Success(9)));
    assert!(matches!(log_b.lock().unwrap()[1], Outcome::Success(9)));
}

#[test]
fn playback_replays_every_value_on_a_closed_upstream() {
    let ctx = ImmediateContext::new();
    let preclosed = signal::preclosed::<i32>(ctx.clone(), vec![1, 2, 3], None);
    let recorded = preclosed.playback(ctx.clone());

    let (log_a, sink_a) = collect::<i32>();
    recorded.subscribe(ctx.clone(), true, sink_a).unwrap();
    let (log_b, sink_b) = collect::<i32>();
    recorded.subscribe(ctx, true, sink_b).unwrap();

    for log in [log_a, log_b] {
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(matches!(log[0], Outcome::Success(1)));
        assert!(matches!(log[1], Outcome::Success(2)));
        assert!(matches!(log[2], Outcome::Success(3)));
    }
}

#[test]
fn capture_separates_the_activation_prefix_from_values_held_while_disconnected() {
    let ctx = ImmediateContext::new();
    let held: Arc<Mutex<Option<Input<i32>>>> = Arc::new(Mutex::new(None));
    let slot = held.clone();
    // The generator's callback runs synchronously as part of activation, so
    // the value it sends here lands in the prefix; the `Input` it hands
    // over is kept around to send more once activation has settled.
    let root = signal::generator::<i32>(ctx.clone(), move |maybe_input| {
        if let Some(input) = maybe_input {
            let _ = input.send(Outcome::Success(1));
            *slot.lock().unwrap() = Some(input);
        }
    });
    let capture = root.capture(ctx.clone(), false);

    held.lock().unwrap().as_ref().unwrap().send(Outcome::Success(5));

    let (prefix, terminal) = capture.activation();
    assert_eq!(prefix, vec![1]);
    assert!(terminal.is_none());

    let (downstream_input, downstream_signal) = signal::input::<i32>();
    let (log, sink) = collect::<i32>();
    downstream_signal.subscribe(ctx, true, sink).unwrap();
    capture.join(downstream_input, None).map_err(|_| ()).expect("join should succeed");

    held.lock().unwrap().as_ref().unwrap().send(Outcome::Success(3));
    held.lock().unwrap().as_ref().unwrap().send(Outcome::Failure(Error::Closed));

    let log = log.lock().unwrap();
    // `resend = false`: the prefix (`1`) never replays, only what was held
    // since activation, then the live stream continues.
    assert_eq!(log.len(), 3);
    assert!(matches!(log[0], Outcome::Success(5)));
    assert!(matches!(log[1], Outcome::Success(3)));
    assert!(matches!(&log[2], Outcome::Failure(Error::Closed)));
}

#[test]
fn capture_resend_true_replays_the_activation_prefix_ahead_of_held_values() {
    let ctx = ImmediateContext::new();
    let held: Arc<Mutex<Option<Input<i32>>>> = Arc::new(Mutex::new(None));
    let slot = held.clone();
    let root = signal::generator::<i32>(ctx.clone(), move |maybe_input| {
        if let Some(input) = maybe_input {
            let _ = input.send(Outcome::Success(1));
            *slot.lock().unwrap() = Some(input);
        }
    });
    let capture = root.capture(ctx.clone(), true);

    held.lock().unwrap().as_ref().unwrap().send(Outcome::Success(5));

    let (downstream_input, downstream_signal) = signal::input::<i32>();
    let (log, sink) = collect::<i32>();
    downstream_signal.subscribe(ctx, true, sink).unwrap();
    capture.join(downstream_input, None).map_err(|_| ()).expect("join should succeed");

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(matches!(log[0], Outcome::Success(1)));
    assert!(matches!(log[1], Outcome::Success(5)));
}

#[test]
fn subscribing_twice_to_a_non_multi_channel_delivers_duplicate_in_band() {
    let ctx = ImmediateContext::new();
    let (_source, root) = signal::input::<i32>();

    let (log_a, sink_a) = collect::<i32>();
    let _first = root.subscribe(ctx.clone(), true, sink_a).unwrap();

    let (log_b, sink_b) = collect::<i32>();
    let _second = root.subscribe(ctx, true, sink_b).unwrap();

    assert!(log_a.lock().unwrap().is_empty());
    let log_b = log_b.lock().unwrap();
    assert_eq!(log_b.len(), 1);
    assert!(matches!(&log_b[0], Outcome::Failure(Error::Duplicate)));
}

#[test]
fn junction_rejoin_delivers_only_to_the_new_downstream() {
    let ctx = ImmediateContext::new();
    let (source, root) = signal::input::<i32>();
    let junction = root.junction(ctx.clone());

    let (first_input, first_signal) = signal::input::<i32>();
    let (first_log, first_sink) = collect::<i32>();
    first_signal.subscribe(ctx.clone(), true, first_sink).unwrap();
    junction.join(first_input, None).map_err(|_| ()).unwrap();

    source.send(Outcome::Success(1));
    assert_eq!(first_log.lock().unwrap().len(), 1);

    // Held, not dropped: dropping a disconnected `Input` would signal
    // `Cancelled` to the very downstream this test still inspects.
    let _orphaned = junction.disconnect().expect("a live downstream was joined");

    let (second_input, second_signal) = signal::input::<i32>();
    let (second_log, second_sink) = collect::<i32>();
    second_signal.subscribe(ctx, true, second_sink).unwrap();
    junction.join(second_input, None).map_err(|_| ()).unwrap();

    source.send(Outcome::Success(2));
    assert_eq!(first_log.lock().unwrap().len(), 1);
    assert!(matches!(second_log.lock().unwrap()[0], Outcome::Success(2)));
}

#[test]
fn joining_a_channel_that_would_create_a_cycle_is_rejected() {
    let ctx = ImmediateContext::new();
    let (feedback_input, feedback_signal) = signal::input::<i32>();
    let doubled = feedback_signal.transform(ctx.clone(), |item, cont| {
        let _ = cont.send(item);
    });
    let junction = doubled.junction(ctx);

    // `doubled` descends from the feedback channel; joining the junction
    // back onto that same channel would close the cycle
    // feedback -> doubled -> junction -> feedback.
    let result = junction.join(feedback_input, None);
    assert!(matches!(result, Err(cascade::signal::JoinError::Loop(_))));
}

#[test]
fn merge_set_forwards_every_member_and_only_closes_output_when_flagged() {
    let ctx = ImmediateContext::new();
    let (set, output) = signal::merge::<i32>();

    let (source_a, signal_a) = signal::input::<i32>();
    let (source_b, signal_b) = signal::input::<i32>();
    set.add_signal(&signal_a, ctx.clone(), false, true);
    set.add_signal(&signal_b, ctx.clone(), false, false);

    let (log, sink) = collect::<i32>();
    output.subscribe(ctx, true, sink).unwrap();

    source_a.send(Outcome::Success(1));
    source_b.send(Outcome::Success(2));
    assert_eq!(log.lock().unwrap().len(), 2);

    // `source_a`'s member was added with `close_output = false`: its own
    // terminal `Cancelled` (from dropping its last `Input`) forwards
    // through to `output`, but does not close it.
    drop(source_a);
    source_b.send(Outcome::Success(3));

    let log = log.lock().unwrap();
    assert!(log.iter().any(|o| matches!(o, Outcome::Success(3))));
    assert!(!log.iter().any(|o| matches!(o, Outcome::Failure(Error::Closed))));
}

#[test]
fn merge_set_close_output_true_closes_the_aggregate_on_member_failure() {
    let ctx = ImmediateContext::new();
    let (set, output) = signal::merge::<i32>();

    let (source_a, signal_a) = signal::input::<i32>();
    let (source_b, signal_b) = signal::input::<i32>();
    set.add_signal(&signal_a, ctx.clone(), true, false);
    set.add_signal(&signal_b, ctx.clone(), false, false);

    let (log, sink) = collect::<i32>();
    output.subscribe(ctx, true, sink).unwrap();

    source_a.send(Outcome::Success(1));
    // `source_a`'s member was added with `close_output = true`: its own
    // terminal `Cancelled` closes the aggregate once delivered.
    drop(source_a);
    assert!(source_b.send(Outcome::Success(2)).is_some());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(matches!(log[0], Outcome::Success(1)));
    assert!(matches!(&log[1], Outcome::Failure(Error::Cancelled)));
}

#[test]
fn merge_set_remove_detaches_a_member_without_affecting_output() {
    let ctx = ImmediateContext::new();
    let (set, output) = signal::merge::<i32>();

    let (source_a, signal_a) = signal::input::<i32>();
    let (source_b, signal_b) = signal::input::<i32>();
    set.add_signal(&signal_a, ctx.clone(), false, false);
    set.add_signal(&signal_b, ctx.clone(), false, false);

    let (log, sink) = collect::<i32>();
    output.subscribe(ctx, true, sink).unwrap();

    set.remove_signal(&signal_a);
    // `source_a` is detached from the set; a send through it is now
    // rejected outright rather than reaching `output`.
    assert!(source_a.send(Outcome::Success(1)).is_some());
    source_b.send(Outcome::Success(2));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(matches!(log[0], Outcome::Success(2)));
}

#[test]
fn generator_activates_lazily_on_first_subscriber() {
    let ctx = ImmediateContext::new();
    let activated = Arc::new(AtomicBool::new(false));
    let sent = Arc::new(AtomicU64::new(0));

    let flag_a = activated.clone();
    let gen = signal::generator::<i32>(ctx.clone(), move |maybe_input| {
        if let Some(input) = maybe_input {
            flag_a.store(true, Ordering::SeqCst);
            let _ = input.send(Outcome::Success(7));
            std::mem::forget(input);
        }
    });

    assert!(!activated.load(Ordering::SeqCst));

    let (log, sink) = collect::<i32>();
    let counter = sent.clone();
    gen.subscribe(ctx, true, move |item| {
        counter.fetch_add(1, Ordering::SeqCst);
        sink(item);
    })
    .unwrap();

    assert!(activated.load(Ordering::SeqCst));
    assert_eq!(sent.load(Ordering::SeqCst), 1);
    assert!(matches!(log.lock().unwrap()[0], Outcome::Success(7)));
}
