use derivative::Derivative;
use tokio::sync::oneshot;

use crate::command::{QueryFn, ReplyMode, StateQuerySpec};
use crate::reply::ClientReply;

/// Correlates a `Call` event with the caller waiting on its reply. Owned
/// by the driver; the decision core only ever sees it as an opaque id it
/// hands back inside a `reply`/`notify` effect.
pub type CallId = u64;

/// Timer-originated pseudo-events (§4.3). `Sync` is handed to the
/// decision core as-is once the driver clears `sync_scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ElectionTimeout,
    Sync,
}

/// What a leader call is actually asking for (§4.1, §4.6).
#[derive(Debug)]
pub enum LeaderCallBody<U> {
    Command { kind: U, reply_mode: ReplyMode },
    StateQuery(StateQuerySpec),
}

/// The body of a synchronous client request (§4.1).
#[derive(Derivative)]
#[derivative(Debug(bound = "U: std::fmt::Debug"))]
pub enum CallRequest<M, U> {
    /// Must eventually be answered by the leader, one way or another.
    LeaderCall(LeaderCallBody<U>),
    /// Answered locally from `machine_state`, bypassing the decision core.
    DirtyQuery(#[derivative(Debug = "ignore")] QueryFn<M>),
}

/// Unsolicited messages delivered to the driver's inbox (§4.1 info/system
/// class): peer RPCs, and notice that a linked child (the proxy) exited.
#[derive(Debug, Clone)]
pub enum InfoMessage<U> {
    Rpc(U),
    ProxyExited { reason: String },
}

/// One inbound event, tagged with its dispatch class. The class is
/// preserved across `next_event` effects (invariant: "a reply effect
/// without a handle requires the originating event to be a Call").
#[derive(Derivative)]
#[derivative(Debug(bound = "U: std::fmt::Debug"))]
pub enum Event<M, U> {
    Call(CallId, CallRequest<M, U>),
    Cast(U),
    Info(InfoMessage<U>),
    Timer(TimerKind),
}

impl<M, U> Event<M, U> {
    pub fn is_call(&self) -> bool {
        matches!(self, Event::Call(..))
    }

    pub fn call_id(&self) -> Option<CallId> {
        match self {
            Event::Call(id, _) => Some(*id),
            _ => None,
        }
    }
}

/// What arrives on the driver's public inbox, before a `CallId` has been
/// assigned. `Call`s carry the caller's own reply channel; the driver
/// registers it in its call table and only then constructs an `Event`.
pub enum Inbound<M, U> {
    Call(CallRequest<M, U>, oneshot::Sender<ClientReply>),
    Cast(U),
    Info(InfoMessage<U>),
}
