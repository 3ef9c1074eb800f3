use crate::node::NodeId;

/// Client-visible reply shapes (§6). These are what a `reply`/`notify`
/// effect carries and what the client API surface eventually hands back
/// to a caller of `command`/`query`/`state_query`.
#[derive(Debug, Clone)]
pub enum ClientReply {
    /// Leader call succeeded.
    Ok {
        result: serde_json::Value,
        server: NodeId,
    },
    /// Internal only — consumed by the client wrapper's redirect loop,
    /// never handed to application code.
    Redirect(NodeId),
    /// Result of a dirty query: `(last_applied, current_term)` plus the
    /// function's result and the currently known leader, if any (§4.6).
    Query {
        last_applied: u64,
        current_term: u64,
        result: serde_json::Value,
        leader: Option<NodeId>,
    },
    /// The full node state, for `state_query(.., all)`.
    State(serde_json::Value),
    /// The cluster member set, for `state_query(.., members)`.
    Members(Vec<NodeId>),
    /// Asynchronous `{consensus, correlation}` notification for
    /// `notify_on_consensus` commands.
    Consensus(serde_json::Value),
}
