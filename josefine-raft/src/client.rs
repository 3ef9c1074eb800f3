//! The client API surface (§4.6, §6): `command`, `query` (dirty or
//! consistent), and `state_query`. Everything here is a thin wrapper
//! around `DriverHandle::call` that knows how to follow a `Redirect`
//! reply to the actual leader, bounded by a single deadline computed
//! once at the start of the call.

use std::time::Duration;

use tokio::time::Instant;

use josefine_core::error::{Error, Result};

use crate::command::{QueryFn, ReplyMode, StateQuerySpec};
use crate::driver::DriverHandle;
use crate::event::{CallRequest, LeaderCallBody};
use crate::node::NodeId;
use crate::reply::ClientReply;

/// How many hops the redirect loop is willing to follow before giving
/// up, distinct from the deadline itself — a cluster that keeps
/// redirecting in a cycle should not be allowed to spin until the
/// deadline on CPU alone.
const MAX_REDIRECTS: u32 = 16;

/// Send a command to the cluster, following at most `MAX_REDIRECTS`
/// redirects to the actual leader until `deadline` elapses.
///
/// The deadline is computed once, by the caller, and carried through
/// every hop — a call that gets redirected three times has the same
/// total time budget as one that reaches the leader immediately. This
/// was an open question in the original design; re-deriving a fresh
/// relative timeout per hop was rejected because a pathological
/// redirect cycle would then never time out.
pub async fn command<M, U: Send + 'static>(
    entry: &DriverHandle<M, U>,
    peers: &dyn PeerLookup<M, U>,
    kind: U,
    reply_mode: ReplyMode,
    timeout: Duration,
) -> Result<ClientReply>
where
    U: Clone,
{
    let deadline = Instant::now() + timeout;
    let body = LeaderCallBody::Command { kind, reply_mode };
    call_following_redirects(entry, peers, CallRequest::LeaderCall(body), deadline).await
}

/// `query(.., dirty)`: answered locally against whatever state this
/// node currently has, never redirected, never touching the decision
/// core or the log.
pub async fn query_dirty<M, U: Send + 'static>(
    entry: &DriverHandle<M, U>,
    query: QueryFn<M>,
    timeout: Duration,
) -> Result<ClientReply> {
    let deadline = Instant::now() + timeout;
    let reply = tokio::time::timeout_at(deadline, entry.call(CallRequest::DirtyQuery(query)))
        .await
        .map_err(|_| Error::timeout(entry.id.to_string()))??;
    Ok(reply)
}

/// `query(.., consistent)`: routed to the leader and answered only
/// after the query's piggybacked entry commits — `command` under the
/// hood, per §4.6.
pub async fn query_consistent<M, U>(
    entry: &DriverHandle<M, U>,
    peers: &dyn PeerLookup<M, U>,
    ra_query_message: impl Fn(QueryFn<M>) -> U,
    query: QueryFn<M>,
    timeout: Duration,
) -> Result<ClientReply>
where
    U: Clone + Send + 'static,
{
    let message = ra_query_message(query);
    command(entry, peers, message, ReplyMode::AwaitConsensus, timeout).await
}

/// `state_query`: a leader call like `command` (§4.6) — a follower or
/// candidate redirects it, so it follows redirects the same way.
pub async fn state_query<M, U: Send + 'static>(
    entry: &DriverHandle<M, U>,
    peers: &dyn PeerLookup<M, U>,
    spec: StateQuerySpec,
    timeout: Duration,
) -> Result<ClientReply>
where
    U: Clone,
{
    let deadline = Instant::now() + timeout;
    let body = LeaderCallBody::StateQuery(spec);
    call_following_redirects(entry, peers, CallRequest::LeaderCall(body), deadline).await
}

/// How the client locates a peer's handle by `NodeId`, so the redirect
/// loop can hop across nodes without this module knowing how handles
/// are discovered (registry, static config, service discovery, ...).
pub trait PeerLookup<M, U> {
    fn lookup(&self, id: &NodeId) -> Option<DriverHandle<M, U>>;
}

async fn call_following_redirects<M, U: Send + 'static>(
    entry: &DriverHandle<M, U>,
    peers: &dyn PeerLookup<M, U>,
    request: CallRequest<M, U>,
    deadline: Instant,
) -> Result<ClientReply>
where
    U: Clone,
{
    let mut current = entry.clone();
    for _ in 0..=MAX_REDIRECTS {
        let outcome = tokio::time::timeout_at(deadline, current.call(clone_request(&request)))
            .await
            .map_err(|_| Error::timeout(current.id.to_string()))?;

        match outcome? {
            ClientReply::Redirect(leader) => {
                current = peers
                    .lookup(&leader)
                    .ok_or_else(|| Error::transport(format!("no route to {}", leader)))?;
                continue;
            }
            other => return Ok(other),
        }
    }
    Err(Error::timeout(current.id.to_string()))
}

fn clone_request<M, U: Clone>(request: &CallRequest<M, U>) -> CallRequest<M, U> {
    match request {
        CallRequest::LeaderCall(LeaderCallBody::Command { kind, reply_mode }) => {
            CallRequest::LeaderCall(LeaderCallBody::Command {
                kind: kind.clone(),
                reply_mode: *reply_mode,
            })
        }
        CallRequest::LeaderCall(LeaderCallBody::StateQuery(spec)) => {
            CallRequest::LeaderCall(LeaderCallBody::StateQuery(*spec))
        }
        CallRequest::DirtyQuery(query) => CallRequest::DirtyQuery(query.clone()),
    }
}
