//! Endpoint handler (§4.10): the terminal consumer. Runs a user callback on
//! every item and stays attached until the first `Failure`, at which point
//! it detaches itself — there is nothing further downstream to notify.

use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler};

type Callback<T> = dyn Fn(Outcome<T>) + Send + Sync;

/// An endpoint's core. `keep_alive`, when set, holds a strong
/// self-reference so the endpoint survives even if every other owner of it
/// has gone away — broken the moment the upstream deactivates, matching
/// §4.10's "optional keep-alive broken on deactivation".
///
/// Without `keep_alive`, the caller's own [`crate::signal::Endpoint`] handle
/// is the *only* strong reference: dropping it disables `upstream`, matching
/// §4's "an endpoint owns its handler; dropping the endpoint disables the
/// channel".
pub struct EndpointCore<T: Send + 'static> {
    f: Box<Callback<T>>,
    upstream: Mutex<Option<Arc<ChannelCore<T>>>>,
    keep_alive: Mutex<Option<Arc<EndpointCore<T>>>>,
}

impl<T: Send + 'static> EndpointCore<T> {
    pub(crate) fn new(f: impl Fn(Outcome<T>) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(EndpointCore { f: Box::new(f), upstream: Mutex::new(None), keep_alive: Mutex::new(None) })
    }
}

/// Attaches `endpoint` to `upstream`. If `keep_alive` is true, the endpoint
/// holds a strong reference to itself for the lifetime of the attachment,
/// released as soon as `upstream` deactivates. Either way, the `Arc` handed
/// back must be kept alive by the caller for the subscription to keep
/// receiving items — see [`EndpointCore`]'s own doc comment.
///
/// `upstream` already having a live subscriber never fails this call: per
/// §4.6/§7, a second subscriber on a non-multi channel is instead handed a
/// synthetic, already-closed channel that delivers `Failure(Duplicate)` and
/// nothing else, so the callback sees a uniform in-band failure rather than
/// the subscription itself being rejected.
pub(crate) fn attach<T: Send + 'static>(
    upstream: &Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    endpoint: Arc<EndpointCore<T>>,
    keep_alive: bool,
    ledger: &mut Ledger,
) -> Arc<EndpointCore<T>> {
    let handler: Arc<dyn Handler<T>> = endpoint.clone();
    let target = match upstream.attach(Arc::downgrade(&handler), context.clone(), ledger) {
        Ok(()) => upstream.clone(),
        Err(crate::error::Error::Duplicate) => {
            let synthetic = Arc::new(ChannelCore::new());
            synthetic.push(std::iter::empty(), Some(crate::error::Error::Duplicate), ledger);
            synthetic
                .attach(Arc::downgrade(&handler), context, ledger)
                .expect("a freshly built channel has no existing attachment");
            synthetic
        }
        Err(other) => unreachable!("ChannelCore::attach only ever fails with Duplicate, got {other:?}"),
    };
    *endpoint.upstream.lock().unwrap_or_else(|p| p.into_inner()) = Some(target.clone());
    if keep_alive {
        *endpoint.keep_alive.lock().unwrap_or_else(|p| p.into_inner()) = Some(endpoint.clone());
        let guard = endpoint.clone();
        target.set_activation_hook(Arc::new(move |active| {
            if !active {
                *guard.keep_alive.lock().unwrap_or_else(|p| p.into_inner()) = None;
            }
        }));
    }
    endpoint
}

impl<T: Send + 'static> Handler<T> for EndpointCore<T> {
    fn handle(&self, item: Outcome<T>, ledger: &mut Ledger) {
        let is_failure = item.is_failure();
        (self.f)(item);
        if is_failure {
            *self.keep_alive.lock().unwrap_or_else(|p| p.into_inner()) = None;
        }
        let _ = ledger;
    }
}

impl<T: Send + 'static> Drop for EndpointCore<T> {
    fn drop(&mut self) {
        let upstream = self.upstream.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(channel) = upstream {
            let mut ledger = Ledger::new();
            channel.disable(&mut ledger);
            ledger.run();
        }
    }
}
