//! Combiner processor (§4.5): each combined upstream is tagged into a
//! distinct branch of an arity-N tagged union (N ∈ {2,3,4,5}), all
//! funneling into one downstream channel. Per-branch mutexes are never
//! shared — each branch keeps its own upstream channel and predecessor
//! link — so per-branch source order is simply the upstream's own FIFO
//! order, and cross-branch order is whatever order sends actually arrive
//! at the shared downstream channel.

use std::sync::Arc;

use paste::paste;

use crate::context::ExecutionContext;
use crate::error::Outcome;
use crate::handler::link::ProcessorLink;
use crate::ids::ChannelId;
use crate::ledger::Ledger;
use crate::node::channel::{ChannelCore, Handler, SendTicket};

/// Forwards one branch's items into the shared combined channel, tagging
/// each with `tag` (an enum tuple-variant constructor, used as a plain
/// function pointer). One instance per branch per arity; the arity itself
/// is invisible to this type, which is why no macro is needed to generate
/// it.
struct BranchHandler<Ti: Send + 'static, C: Send + 'static> {
    downstream: Arc<ChannelCore<C>>,
    predecessor_id: ChannelId,
    tag: fn(Outcome<Ti>) -> C,
}

impl<Ti: Send + 'static, C: Send + 'static> Handler<Ti> for BranchHandler<Ti, C> {
    fn handle(&self, item: Outcome<Ti>, ledger: &mut Ledger) {
        let ticket = SendTicket {
            predecessor: Some(self.predecessor_id),
            activation: self.downstream.activation_counter(),
            activated: true,
        };
        let _ = self.downstream.send((self.tag)(item), ticket, ledger);
    }
}

// `$ty_all` repeats the same identifiers as the `$branch: $ty` pairs below,
// as its own top-level list. This duplication (rather than reusing `$ty`
// from the paired group) is required: macro_rules ties a captured
// variable's repetition depth to the group it was matched in, so `$ty`
// cannot be re-expanded "all at once" from inside the per-branch loop that
// already iterates it one at a time. `$ty_all`, bound as an independent
// list, can.
macro_rules! define_combine {
    ($name:ident, $build:ident, [$($ty_all:ident),+]; $( $branch:ident : $ty:ident ),+) => {
        paste! {
            /// A tagged union of upstream results (§4.5).
            #[derive(Debug, Clone)]
            pub enum $name<$($ty_all),+> {
                $($branch(Outcome<$ty>)),+
            }

            /// Builds the combined downstream channel and one
            /// [`ProcessorLink`] per upstream branch.
            pub(crate) fn $build<$($ty_all: Send + 'static),+>(
                $($branch: (Arc<ChannelCore<$ty>>, Arc<dyn ExecutionContext>)),+
            ) -> (Arc<ChannelCore<$name<$($ty_all),+>>>, $(ProcessorLink<$ty>),+) {
                let downstream: Arc<ChannelCore<$name<$($ty_all),+>>> = Arc::new(ChannelCore::new());
                $(
                    let ($branch, [<$branch _ctx>]) = $branch;
                    let [<$branch _handler>]: Arc<dyn Handler<$ty>> = Arc::new(BranchHandler {
                        downstream: downstream.clone(),
                        predecessor_id: $branch.id(),
                        tag: $name::$branch as fn(Outcome<$ty>) -> $name<$($ty_all),+>,
                    });
                    let [<$branch _link>] = ProcessorLink {
                        upstream: $branch,
                        handler: [<$branch _handler>],
                        context: [<$branch _ctx>],
                        loop_checking: false,
                    };
                )+
                (downstream, $([<$branch _link>]),+)
            }
        }
    };
}

define_combine!(Combined2, combine2, [A, B]; First: A, Second: B);
define_combine!(Combined3, combine3, [A, B, C]; First: A, Second: B, Third: C);
define_combine!(Combined4, combine4, [A, B, C, D]; First: A, Second: B, Third: C, Fourth: D);
define_combine!(Combined5, combine5, [A, B, C, D, E]; First: A, Second: B, Third: C, Fourth: D, Fifth: E);
