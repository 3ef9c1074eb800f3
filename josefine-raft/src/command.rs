use std::sync::Arc;

/// How a leader command's reply should be produced by the decision core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Reply once the entry has been appended locally.
    AfterLogAppend,
    /// Reply once the entry has been committed by consensus.
    AwaitConsensus,
    /// Reply immediately after append; send a separate `notify` once
    /// the entry commits.
    NotifyOnConsensus,
}

/// What `state_query` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateQuerySpec {
    /// The full node state.
    All,
    /// Just the cluster member set.
    Members,
}

/// A read-only function applied to the state machine, supplied by a
/// caller of `query`. Boxed as a closure over `&M -> Value` so the driver
/// can carry it without knowing the application's result type.
pub type QueryFn<M> = Arc<dyn Fn(&M) -> serde_json::Value + Send + Sync>;
