//! The decision core interface (§6). The core itself is out of scope —
//! a referentially transparent `(role, node_state, event) -> (role',
//! node_state', effects)` function — this module only states its
//! contract so the driver can be written against it.

use crate::command::QueryFn;
use crate::effect::Effect;
use crate::event::Event;
use crate::node::NodeId;
use crate::role::{LeaderTransition, Transition};

/// Implemented by the pure Raft decision logic. Everything here is
/// synchronous and side-effect free; the driver (`crate::driver`) is the
/// only thing that ever calls it, and it calls it at most once per
/// inbound event (invariant 5, §3).
pub trait Core: Send + 'static {
    /// Opaque state owned by the decision core: `id`, `current_term`,
    /// `leader_id`, `machine_state`, `last_applied`, `cluster`, and
    /// whatever else the concrete algorithm needs.
    type State: Send;
    /// The application/protocol message type: vote requests and
    /// responses, append-entries, heartbeats, user commands — the
    /// decision core's own unified wire vocabulary.
    type Message: Send + Clone + std::fmt::Debug + 'static;
    /// The state machine the core applies committed entries to.
    type Machine: Send + Sync + 'static;
    /// An append-entries batch as produced by `make_rpcs` and consumed
    /// by the replication proxy.
    type Batch: Send + Clone + 'static;
    /// Whatever `init` needs to construct the first `State`.
    type Config;

    fn init(config: Self::Config) -> Self::State;

    fn handle_follower(
        event: Event<Self::Machine, Self::Message>,
        state: Self::State,
    ) -> (Transition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>);

    fn handle_candidate(
        event: Event<Self::Machine, Self::Message>,
        state: Self::State,
    ) -> (Transition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>);

    fn handle_leader(
        event: Event<Self::Machine, Self::Message>,
        state: Self::State,
    ) -> (LeaderTransition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>);

    /// Build the current RPC batch, used to rebuild a fresh proxy after
    /// it crashes (§4.7) and to answer `make_rpcs` directly.
    fn make_rpcs(state: &Self::State) -> Self::Batch;

    fn maybe_snapshot(index: u64, state: Self::State) -> Self::State;

    fn record_snapshot_point(index: u64, state: Self::State) -> Self::State;

    fn terminate(state: Self::State);

    fn leader_id(state: &Self::State) -> Option<NodeId>;

    fn current_term(state: &Self::State) -> u64;

    fn last_applied(state: &Self::State) -> u64;

    fn machine(state: &Self::State) -> &Self::Machine;

    /// Wrap a read-only query function into a `Message` the core will
    /// recognize as `'$ra_query'` and answer with a `reply` effect only
    /// after the entry it's piggybacked on commits. Backs
    /// `query(.., consistent)` (§4.6), which is otherwise just
    /// `command(server, ra_query_message(fun), await_consensus)`.
    fn ra_query_message(query: QueryFn<Self::Machine>) -> Self::Message;
}
