//! The role driver (component B) and effect interpreter (component A).
//! A single cooperative task: it owns the current role, dispatches every
//! inbound event to the decision core under that role, and folds the
//! returned effects into outbound messages, timer arms, and replies.

use std::collections::VecDeque;
use std::sync::Arc;

use slog::Logger;
use tokio::sync::{mpsc, oneshot};

use josefine_core::error::{Error, Result};

use crate::command::QueryFn;
use crate::config::RaftConfig;
use crate::core::Core;
use crate::effect::Effect;
use crate::event::{CallId, CallRequest, Event, Inbound, InfoMessage, LeaderCallBody, TimerKind};
use crate::node::NodeId;
use crate::pending::{CallTable, PendingCommands};
use crate::proxy::{ExitNotifier, ProxyRuntime, ProxySupervisor};
use crate::reply::ClientReply;
use crate::role::{LeaderTransition, Role};
use crate::timer::TimerManager;
use crate::vote::{spawn_vote_requests, PeerTransport, VoteRequestError};

/// A cloneable reference to a running driver's inbox. This is the
/// `server_ref` of §4.6 — what the client API surface and peer-facing
/// transport send events through.
pub struct DriverHandle<M, U> {
    pub id: NodeId,
    tx: mpsc::UnboundedSender<Inbound<M, U>>,
}

impl<M, U> Clone for DriverHandle<M, U> {
    fn clone(&self) -> Self {
        DriverHandle {
            id: self.id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<M, U: Send + 'static> DriverHandle<M, U> {
    pub fn cast(&self, message: U) -> Result<()> {
        self.tx
            .send(Inbound::Cast(message))
            .map_err(|_| Error::ChannelClosed(self.id.to_string()))
    }

    pub fn info(&self, message: InfoMessage<U>) -> Result<()> {
        self.tx
            .send(Inbound::Info(message))
            .map_err(|_| Error::ChannelClosed(self.id.to_string()))
    }

    pub async fn call(&self, request: CallRequest<M, U>) -> Result<ClientReply> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Inbound::Call(request, tx))
            .map_err(|_| Error::ChannelClosed(self.id.to_string()))?;
        rx.await.map_err(|_| Error::ChannelClosed(self.id.to_string()))
    }
}

/// Type alias for the peer cast mapper handed to `SendVoteRequests`:
/// turns a transport outcome into whatever `Message` variant the
/// decision core expects to see, e.g. a `VoteResponse`.
pub type VoteCastFn<U> = Arc<dyn Fn(NodeId, std::result::Result<U, VoteRequestError>) -> U + Send + Sync>;

/// Owns everything the role driver needs across the lifetime of one node
/// (§3 driver state): the decision core's opaque state, the current
/// role, the timer manager, the pending-command buffer, the proxy
/// supervisor, and the call table mapping `CallId`s to live callers.
pub struct Driver<C, PR, T>
where
    C: Core,
    PR: ProxyRuntime<Batch = C::Batch>,
    T: PeerTransport<C::Message>,
{
    id: NodeId,
    role: Role,
    /// `None` only transiently, while ownership is passed into a
    /// decision-core call; always restored before the next await point.
    state: Option<C::State>,
    config: RaftConfig,
    timers: TimerManager,
    proxy: ProxySupervisor<PR>,
    pending: PendingCommands<LeaderCallBody<C::Message>>,
    calls: CallTable,
    queue: VecDeque<Event<C::Machine, C::Message>>,
    rx: mpsc::UnboundedReceiver<Inbound<C::Machine, C::Message>>,
    self_tx: mpsc::UnboundedSender<Inbound<C::Machine, C::Message>>,
    vote_transport: Arc<T>,
    vote_cast_fn: VoteCastFn<C::Message>,
    log: Logger,
}

enum Control {
    Continue,
    Stop,
}

impl<C, PR, T> Driver<C, PR, T>
where
    C: Core,
    PR: ProxyRuntime<Batch = C::Batch>,
    T: PeerTransport<C::Message>,
{
    /// Create a new driver and its public handle, initializing the
    /// decision core. Does not start running it — call `run` (typically
    /// from `tokio::spawn`) to do that.
    pub fn start_link(
        config: RaftConfig,
        core_config: C::Config,
        proxy_runtime: Arc<PR>,
        vote_transport: Arc<T>,
        vote_cast_fn: VoteCastFn<C::Message>,
        log: Logger,
        rng_seed: Option<u64>,
    ) -> (Self, DriverHandle<C::Machine, C::Message>) {
        let id = config.id.clone();
        let (self_tx, rx) = mpsc::unbounded_channel();
        let timers = TimerManager::new(&config, rng_seed);
        let proxy = ProxySupervisor::new(proxy_runtime, config.broadcast_time());
        let state = C::init(core_config);

        let driver = Driver {
            id: id.clone(),
            role: Role::default(),
            state: Some(state),
            config,
            timers,
            proxy,
            pending: PendingCommands::new(),
            calls: CallTable::new(),
            queue: VecDeque::new(),
            rx,
            self_tx: self_tx.clone(),
            vote_transport,
            vote_cast_fn,
            log,
        };
        let handle = DriverHandle { id, tx: self_tx };
        (driver, handle)
    }

    pub fn handle(&self) -> DriverHandle<C::Machine, C::Message> {
        DriverHandle {
            id: self.id.clone(),
            tx: self.self_tx.clone(),
        }
    }

    /// The dispatch loop: pulls one event at a time (internal queue
    /// first, then the inbox, then timers) and handles it to completion
    /// before looking at the next one (§5 ordering guarantees).
    pub async fn run(mut self) {
        loop {
            let event = match self.next_event().await {
                Some(event) => event,
                None => break,
            };
            match self.handle_event(event).await {
                Control::Continue => continue,
                Control::Stop => break,
            }
        }
        self.shutdown().await;
    }

    async fn next_event(&mut self) -> Option<Event<C::Machine, C::Message>> {
        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }
        tokio::select! {
            biased;
            inbound = self.rx.recv() => {
                let inbound = inbound?;
                Some(self.admit(inbound))
            }
            kind = self.timers.next_fired() => Some(Event::Timer(kind)),
        }
    }

    /// Assign a `CallId` to a freshly arrived `Call`, or pass casts/info
    /// through untouched.
    fn admit(&mut self, inbound: Inbound<C::Machine, C::Message>) -> Event<C::Machine, C::Message> {
        match inbound {
            Inbound::Call(request, reply_to) => {
                let id = self.calls.register(reply_to);
                Event::Call(id, request)
            }
            Inbound::Cast(message) => Event::Cast(message),
            Inbound::Info(info) => Event::Info(info),
        }
    }

    async fn shutdown(mut self) {
        info!(self.log, "driver shutting down"; "id" => %self.id);
        self.proxy.stop(self.config.proxy_stop_grace());
        if let Some(state) = self.state.take() {
            C::terminate(state);
        }
    }

    /// §4.1 dispatch contract: leader-call special-casing while not
    /// Leader, then dirty-query bypass regardless of role, then proxy
    /// crash recovery while Leader (§4.7, driver-level, never seen by
    /// the decision core), else hand the event to the decision core for
    /// the current role.
    async fn handle_event(&mut self, event: Event<C::Machine, C::Message>) -> Control {
        match (self.role, event) {
            (Role::Follower | Role::Candidate, Event::Call(id, CallRequest::LeaderCall(body))) => {
                self.handle_leader_call_while_not_leader(id, body);
                Control::Continue
            }
            (_, Event::Call(id, CallRequest::DirtyQuery(query))) => {
                self.answer_dirty_query(id, &query);
                Control::Continue
            }
            (Role::Leader, Event::Info(InfoMessage::ProxyExited { reason })) => {
                self.recover_proxy(reason);
                Control::Continue
            }
            (_, event) => self.dispatch_to_core(event).await,
        }
    }

    /// §4.7: rebuild the current RPC batch from the decision core, start
    /// a fresh proxy, and push the urgent batch immediately. This is
    /// purely a proxy-supervisor concern — the decision core never sees
    /// an unexpected proxy exit.
    fn recover_proxy(&mut self, reason: String) {
        warn!(self.log, "proxy exited unexpectedly, restarting"; "reason" => reason);
        self.proxy.mark_dead();
        let batch = C::make_rpcs(self.state());
        let on_exit = self.make_exit_notifier();
        if let Err(err) = self.proxy.restart_with(batch, on_exit) {
            error!(self.log, "failed to restart proxy after crash"; "error" => %err);
        }
    }

    fn handle_leader_call_while_not_leader(&mut self, id: CallId, body: LeaderCallBody<C::Message>) {
        match C::leader_id(self.state()) {
            Some(leader) => {
                debug!(self.log, "redirecting leader call"; "leader" => %leader);
                self.calls.reply(id, ClientReply::Redirect(leader));
            }
            None => {
                debug!(self.log, "buffering leader call, no known leader yet");
                self.pending.push(id, body);
            }
        }
    }

    fn answer_dirty_query(&mut self, id: CallId, query: &QueryFn<C::Machine>) {
        let state = self.state();
        let result = query(C::machine(state));
        self.calls.reply(
            id,
            ClientReply::Query {
                last_applied: C::last_applied(state),
                current_term: C::current_term(state),
                result,
                leader: C::leader_id(state),
            },
        );
    }

    fn state(&self) -> &C::State {
        self.state.as_ref().expect("driver state missing")
    }

    /// Step 3 of §4.1: call the decision core for the current role and
    /// fold its effects, then apply the resulting role transition.
    async fn dispatch_to_core(&mut self, event: Event<C::Machine, C::Message>) -> Control {
        if matches!(event, Event::Timer(TimerKind::Sync)) {
            self.timers.clear_sync();
        }

        let call_id = event.call_id();
        let role_before = self.role;
        let state = self.state.take().expect("driver state missing");

        let (next_role, state, effects, stop) = match role_before {
            Role::Follower => {
                let (t, s, e) = C::handle_follower(event, state);
                (t.role(), s, e, false)
            }
            Role::Candidate => {
                let (t, s, e) = C::handle_candidate(event, state);
                (t.role(), s, e, false)
            }
            Role::Leader => match C::handle_leader(event, state) {
                (LeaderTransition::Leader, s, e) => (Role::Leader, s, e, false),
                (LeaderTransition::Follower, s, e) => (Role::Follower, s, e, false),
                (LeaderTransition::Stop, s, e) => (Role::Leader, s, e, true),
            },
        };
        self.state = Some(state);

        self.apply_effects(effects, call_id).await;

        if stop {
            return Control::Stop;
        }

        self.apply_transition(role_before, next_role).await;
        Control::Continue
    }

    /// Fold the effects left to right, in order (§4.2). `call_id` is the
    /// id of the Call event being processed, if any — a handle-less
    /// `Reply` effect answers that call (§3/§4.2).
    async fn apply_effects(
        &mut self,
        effects: Vec<Effect<C::Machine, C::Message, C::Batch>>,
        call_id: Option<CallId>,
    ) {
        for effect in effects {
            self.apply_effect(effect, call_id).await;
        }
    }

    async fn apply_effect(&mut self, effect: Effect<C::Machine, C::Message, C::Batch>, call_id: Option<CallId>) {
        match effect {
            Effect::NextEvent(event) => {
                self.queue.push_back(*event);
            }
            Effect::SendMsg { to, message } => {
                debug!(self.log, "send_msg"; "to" => %to);
                let _ = message; // handed to transport, out of scope here
            }
            Effect::Notify { to, reply } => {
                debug!(self.log, "notify"; "to" => %to);
                let _ = reply;
            }
            Effect::Reply { to, reply } => match to.or(call_id) {
                Some(id) => self.calls.reply(id, reply),
                None => {
                    let err = Error::protocol_violation(
                        "reply effect without a handle outside a call context",
                    );
                    error!(self.log, "protocol violation"; "error" => %err);
                    panic!("{}", err);
                }
            },
            Effect::SendVoteRequests(requests) => {
                spawn_vote_requests(
                    requests,
                    self.vote_transport.clone(),
                    self.config.vote_request_timeout(),
                    self.vote_cast_fn.clone(),
                    self.self_tx.clone(),
                );
            }
            Effect::SendRpcs { urgent, batch } => {
                let on_exit = self.make_exit_notifier();
                if let Err(err) = self.proxy.send_rpcs(urgent, batch, on_exit) {
                    error!(self.log, "failed to route rpcs to proxy"; "error" => %err);
                }
            }
            Effect::ReleaseCursor(index) => {
                let state = self.state.take().expect("driver state missing");
                self.state = Some(C::maybe_snapshot(index, state));
            }
            Effect::SnapshotPoint(index) => {
                let state = self.state.take().expect("driver state missing");
                self.state = Some(C::record_snapshot_point(index, state));
            }
            Effect::ScheduleSync => {
                self.timers.schedule_sync();
            }
        }
    }

    fn make_exit_notifier(&self) -> ExitNotifier {
        let tx = self.self_tx.clone();
        Box::new(move |reason: String| {
            let _ = tx.send(Inbound::Info(InfoMessage::ProxyExited { reason }));
        })
    }

    /// §4.4 role transitions: arm the right election timer, stop or
    /// start bookkeeping around the proxy, and flush or replay pending
    /// commands as required.
    async fn apply_transition(&mut self, from: Role, to: Role) {
        if from != to {
            info!(self.log, "role transition"; "from" => ?from, "to" => ?to);
        }
        self.role = to;

        if from != Role::Leader && to == Role::Leader {
            for (id, body) in self.pending.drain() {
                self.queue.push_back(Event::Call(id, CallRequest::LeaderCall(body)));
            }
        }
        if from == Role::Leader && to == Role::Follower {
            self.proxy.stop(self.config.proxy_stop_grace());
        }

        match to {
            Role::Follower | Role::Candidate => self.timers.arm_election(to),
            Role::Leader => self.timers.disarm_election(),
        }

        if to == Role::Follower {
            self.maybe_flush_pending_on_leader_known();
        }
    }

    /// §4.4 Follower -> Follower: if `leader_id` just became known (or
    /// changed to a different known value), flush the pending buffer by
    /// redirecting every entry (§8 leader-change flush, scenario S6).
    fn maybe_flush_pending_on_leader_known(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Some(leader) = C::leader_id(self.state()) {
            for (id, _body) in self.pending.drain() {
                self.calls.reply(id, ClientReply::Redirect(leader.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use crate::fixture::{LogEntry, Msg, TestConfig, TestCore};
    use crate::proxy::LoopbackProxy;
    use crate::vote::VoteRequestError;

    use super::*;

    struct NoopTransport;

    impl PeerTransport<Msg> for NoopTransport {
        fn call(&self, _peer: NodeId, message: Msg) -> Pin<Box<dyn Future<Output = std::result::Result<Msg, String>> + Send>> {
            Box::pin(async move { Ok(message) })
        }
    }

    fn vote_cast_fn() -> VoteCastFn<Msg> {
        Arc::new(|_peer: NodeId, result: std::result::Result<Msg, VoteRequestError>| match result {
            Ok(reply) => reply,
            Err(_) => Msg::VoteResponse { term: 0, granted: false },
        })
    }

    fn test_logger() -> Logger {
        josefine_core::logger::get_root_logger()
    }

    fn single_node_driver() -> (Driver<TestCore, LoopbackProxy<Vec<LogEntry>>, NoopTransport>, DriverHandle<crate::fixture::Machine, Msg>) {
        let config = RaftConfig {
            id: NodeId::Name("n1".into()),
            peers: Vec::new(),
            broadcast_time_ms: 20,
            sync_interval_ms: 10,
            proxy_stop_grace_ms: 10,
            vote_request_timeout_ms: 50,
        };
        let core_config = TestConfig {
            id: NodeId::Name("n1".into()),
            peers: Vec::new(),
        };
        let (sink, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let proxy = Arc::new(LoopbackProxy::new(sink));
        Driver::start_link(config, core_config, proxy, Arc::new(NoopTransport), vote_cast_fn(), test_logger(), Some(1))
    }

    /// A lone node's election timer fires, it becomes a candidate, and
    /// with zero peers the majority of one vote (its own) immediately
    /// promotes it to Leader (§8 scenario S1-ish single-node election).
    #[tokio::test(start_paused = true)]
    async fn single_node_becomes_leader_on_election_timeout() {
        let (driver, handle) = single_node_driver();
        tokio::spawn(driver.run());

        tokio::time::advance(Duration::from_millis(200)).await;

        let reply = handle
            .call(CallRequest::LeaderCall(LeaderCallBody::Command {
                kind: Msg::Command("set x".into()),
                reply_mode: ReplyMode::AfterLogAppend,
            }))
            .await
            .unwrap();

        assert!(matches!(reply, ClientReply::Ok { .. }));
    }

    /// A command sent before any leader is known is buffered, not
    /// rejected, and answered only once the node itself becomes leader
    /// (§4.5 pending buffer, §8 scenario).
    #[tokio::test(start_paused = true)]
    async fn command_before_leader_known_is_buffered_then_answered() {
        let (driver, handle) = single_node_driver();
        tokio::spawn(driver.run());

        let call = handle.call(CallRequest::LeaderCall(LeaderCallBody::Command {
            kind: Msg::Command("buffered".into()),
            reply_mode: ReplyMode::AfterLogAppend,
        }));

        tokio::time::advance(Duration::from_millis(200)).await;
        let reply = call.await.unwrap();
        assert!(matches!(reply, ClientReply::Ok { .. }));
    }

    /// A dirty query never goes through the decision core and is
    /// answered immediately, without waiting on any timer.
    #[tokio::test(start_paused = true)]
    async fn dirty_query_answers_without_leader() {
        let (driver, handle) = single_node_driver();
        tokio::spawn(driver.run());

        let query: QueryFn<crate::fixture::Machine> = Arc::new(|m| serde_json::json!(m.applied.len()));
        let reply = handle.call(CallRequest::DirtyQuery(query)).await.unwrap();
        assert!(matches!(reply, ClientReply::Query { .. }));
    }

    /// Learning the leader from an `AppendEntries` while still a
    /// follower flushes the pending buffer as redirects to that leader,
    /// rather than leaving buffered calls stuck forever (§8 scenario S6).
    #[tokio::test(start_paused = true)]
    async fn follower_learns_leader_flushes_pending_buffer() {
        let (driver, handle) = single_node_driver();
        tokio::spawn(driver.run());

        let call = handle.call(CallRequest::LeaderCall(LeaderCallBody::Command {
            kind: Msg::Command("buffered".into()),
            reply_mode: ReplyMode::AfterLogAppend,
        }));

        let leader = NodeId::Name("n2".into());
        handle
            .info(InfoMessage::Rpc(Msg::AppendEntries {
                term: 1,
                entries: Vec::new(),
                leader_commit: 0,
                leader: leader.clone(),
            }))
            .unwrap();

        let reply = call.await.unwrap();
        match reply {
            ClientReply::Redirect(to) => assert_eq!(to, leader),
            other => panic!("expected a redirect, got {:?}", other),
        }
    }

    /// An unexpected proxy exit while still Leader is recovered by
    /// rebuilding the batch from the decision core and starting a fresh
    /// proxy, rather than leaving the node unable to replicate (§4.7,
    /// §8 scenario S5).
    #[tokio::test(start_paused = true)]
    async fn leader_restarts_proxy_after_unexpected_exit() {
        let (driver, handle) = single_node_driver();
        tokio::spawn(driver.run());

        tokio::time::advance(Duration::from_millis(200)).await;

        handle
            .call(CallRequest::LeaderCall(LeaderCallBody::Command {
                kind: Msg::Command("set x".into()),
                reply_mode: ReplyMode::AfterLogAppend,
            }))
            .await
            .unwrap();

        handle.info(InfoMessage::ProxyExited { reason: "peer connection reset".into() }).unwrap();

        let reply = handle
            .call(CallRequest::LeaderCall(LeaderCallBody::Command {
                kind: Msg::Command("set y".into()),
                reply_mode: ReplyMode::AfterLogAppend,
            }))
            .await
            .unwrap();
        assert!(matches!(reply, ClientReply::Ok { .. }));
    }
}
