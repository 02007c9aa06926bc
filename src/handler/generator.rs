//! The lazy-activation source (§4.3): a user callback invoked with a fresh
//! [`Input`] on activation and `None` on deactivation.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::handler::input::Input;
use crate::node::channel::ChannelCore;

/// Wires `callback` to `channel`'s activation hook: invoked with
/// `Some(Input)` the instant the channel gets its first live successor,
/// and with `None` the instant it goes fully inactive again; a later
/// reactivation hands out a brand-new `Input` rather than reusing the
/// stale one (§4.3). Every invocation is routed through
/// `context.invoke_sync`, which is how the "exactly-one serialization,
/// even under a concurrent context" guarantee is met.
pub(crate) fn install<T: Send + 'static>(
    channel: &Arc<ChannelCore<T>>,
    context: Arc<dyn ExecutionContext>,
    callback: Arc<dyn Fn(Option<Input<T>>) + Send + Sync>,
) {
    let weak = Arc::downgrade(channel);
    channel.set_activation_hook(Arc::new(move |active| {
        let Some(channel) = weak.upgrade() else { return };
        let callback = callback.clone();
        let arg = if active {
            Some(Input::new(&channel, channel.activation_counter()))
        } else {
            None
        };
        context.invoke_sync(Box::new(move || callback(arg)));
    }));
}
