//! Property-based checks for the engine's three composition laws.

use std::sync::{Arc, Mutex};

use cascade::context::immediate::ImmediateContext;
use cascade::error::Outcome;
use cascade::handler::combine::Combined2;
use cascade::handler::input::Input;
use cascade::signal::{self, combine2};
use proptest::prelude::*;

fn send_all(source: &Input<i32>, values: &[i32]) {
    for &v in values {
        source.send(Outcome::Success(v));
    }
}

proptest! {
    /// Identity: `transform(|r, n| n.send(r))` observes exactly the same
    /// sequence of results as its input (§8's Identity law).
    #[test]
    fn identity_transform_reproduces_input(values in prop::collection::vec(any::<i32>(), 0..64)) {
        let ctx = ImmediateContext::new();
        let (source, root) = signal::input::<i32>();
        let identity = root.transform(ctx.clone(), |item, cont| {
            let _ = cont.send(item);
        });

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        identity.subscribe(ctx, true, move |item| sink.lock().unwrap().push(item)).unwrap();

        send_all(&source, &values);

        let log = log.lock().unwrap();
        prop_assert_eq!(log.len(), values.len());
        for (observed, expected) in log.iter().zip(values.iter()) {
            match observed {
                Outcome::Success(v) => prop_assert_eq!(v, expected),
                Outcome::Failure(_) => prop_assert!(false, "identity transform must not fail"),
            }
        }
    }

    /// Fan-in/fan-out: combining two sources preserves each source's own
    /// send order once the combined stream is flattened back to "whichever
    /// branch it came from" (§8's Fan-in/fan-out law).
    #[test]
    fn combine_preserves_per_source_order(
        from_a in prop::collection::vec(any::<i32>(), 0..32),
        from_b in prop::collection::vec(any::<i32>(), 0..32),
    ) {
        let ctx = ImmediateContext::new();
        let (source_a, signal_a) = signal::input::<i32>();
        let (source_b, signal_b) = signal::input::<i32>();
        let combined = combine2((signal_a, ctx.clone()), (signal_b, ctx.clone()));

        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let sink_a = seen_a.clone();
        let sink_b = seen_b.clone();
        combined
            .subscribe(ctx, true, move |item| {
                if let Outcome::Success(tagged) = item {
                    match tagged {
                        Combined2::First(Outcome::Success(v)) => sink_a.lock().unwrap().push(v),
                        Combined2::Second(Outcome::Success(v)) => sink_b.lock().unwrap().push(v),
                        _ => {}
                    }
                }
            })
            .unwrap();

        send_all(&source_a, &from_a);
        send_all(&source_b, &from_b);

        prop_assert_eq!(&*seen_a.lock().unwrap(), &from_a);
        prop_assert_eq!(&*seen_b.lock().unwrap(), &from_b);
    }

    /// Idempotent disconnect: calling `junction.disconnect()` a second time
    /// with no intervening join yields the same `None` state as the first
    /// superfluous call (§8's Idempotent-disconnect law).
    #[test]
    fn junction_disconnect_is_idempotent(send_before in prop::bool::ANY) {
        let ctx = ImmediateContext::new();
        let (source, root) = signal::input::<i32>();
        let junction = root.junction(ctx.clone());
        let (input, downstream) = signal::input::<i32>();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        downstream.subscribe(ctx, true, move |item| sink.lock().unwrap().push(item)).unwrap();
        junction.join(input, None).map_err(|_| ()).unwrap();

        if send_before {
            source.send(Outcome::Success(1));
        }

        let first = junction.disconnect();
        prop_assert!(first.is_some());
        let second = junction.disconnect();
        prop_assert!(second.is_none());
        let third = junction.disconnect();
        prop_assert!(third.is_none());
    }
}
