use derivative::Derivative;

use crate::event::{CallId, Event};
use crate::node::NodeId;
use crate::reply::ClientReply;

/// A side-effecting instruction emitted by the decision core. The driver
/// folds a `Vec<Effect<..>>` left to right, applying each in order
/// (§4.2); nothing here is optional to honor — an effect the interpreter
/// doesn't recognize would be a compile error, not a runtime one.
#[derive(Derivative)]
#[derivative(Debug(bound = "U: std::fmt::Debug, B: std::fmt::Debug"))]
pub enum Effect<M, U, B> {
    /// Inject an event into the driver's own queue, processed after the
    /// current handler returns, preserving its originating class.
    NextEvent(Box<Event<M, U>>),
    /// Fire-and-forget to a peer or local process.
    SendMsg { to: NodeId, message: U },
    /// Send an asynchronous `{consensus, reply}` notification.
    Notify { to: NodeId, reply: ClientReply },
    /// Queue a reply to a call. `None` is only valid when the triggering
    /// event was itself a `Call` — the driver resolves it to that call's
    /// id; enforcing this is the interpreter's job (§4.2, §7).
    Reply {
        to: Option<CallId>,
        reply: ClientReply,
    },
    /// Spawn a transient task per peer performing a short, synchronous
    /// vote request, casting the result back as it resolves.
    SendVoteRequests(Vec<(NodeId, U)>),
    /// Route a batch of append-entries to the proxy, creating it if
    /// absent. Urgent batches bypass proxy-side coalescing.
    SendRpcs { urgent: bool, batch: B },
    /// Ask the decision core to take a snapshot up to `index`.
    ReleaseCursor(u64),
    /// Ask the decision core to record a candidate snapshot point.
    SnapshotPoint(u64),
    /// Arm the sync timer if it isn't already armed.
    ScheduleSync,
}
