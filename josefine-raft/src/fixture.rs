//! A small, deterministic `Core` implementation used only by tests
//! (§8 testable properties, scenarios S1-S6). It is not a complete Raft
//! algorithm — the decision core is an external collaborator and out
//! of scope for this crate — just enough state and logic to exercise
//! the driver, timers, pending buffer and proxy supervisor end to end.
#![cfg(test)]

use std::collections::HashSet;
use std::fmt;

use crate::command::{QueryFn, ReplyMode, StateQuerySpec};
use crate::core::Core;
use crate::effect::Effect;
use crate::event::{CallRequest, Event, InfoMessage, LeaderCallBody};
use crate::node::NodeId;
use crate::role::{LeaderTransition, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub term: u64,
    pub command: String,
}

#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub applied: Vec<String>,
}

#[derive(Clone)]
pub enum Msg {
    VoteRequest { term: u64, candidate: NodeId },
    VoteResponse { term: u64, granted: bool },
    AppendEntries { term: u64, entries: Vec<LogEntry>, leader_commit: u64, leader: NodeId },
    AppendResponse { term: u64, success: bool, match_index: u64 },
    Command(String),
    Query(QueryFn<Machine>),
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::VoteRequest { term, candidate } => {
                f.debug_struct("VoteRequest").field("term", term).field("candidate", candidate).finish()
            }
            Msg::VoteResponse { term, granted } => {
                f.debug_struct("VoteResponse").field("term", term).field("granted", granted).finish()
            }
            Msg::AppendEntries { term, entries, leader_commit, leader } => f
                .debug_struct("AppendEntries")
                .field("term", term)
                .field("entries", entries)
                .field("leader_commit", leader_commit)
                .field("leader", leader)
                .finish(),
            Msg::AppendResponse { term, success, match_index } => f
                .debug_struct("AppendResponse")
                .field("term", term)
                .field("success", success)
                .field("match_index", match_index)
                .finish(),
            Msg::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Msg::Query(_) => f.write_str("Query(..)"),
        }
    }
}

pub struct TestConfig {
    pub id: NodeId,
    pub peers: Vec<NodeId>,
}

pub struct TestState {
    pub id: NodeId,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub peers: Vec<NodeId>,
    pub votes_received: HashSet<NodeId>,
    pub log: Vec<LogEntry>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub machine: Machine,
}

pub struct TestCore;

impl Core for TestCore {
    type State = TestState;
    type Message = Msg;
    type Machine = Machine;
    type Batch = Vec<LogEntry>;
    type Config = TestConfig;

    fn init(config: Self::Config) -> Self::State {
        TestState {
            id: config.id,
            current_term: 0,
            voted_for: None,
            leader_id: None,
            peers: config.peers,
            votes_received: HashSet::new(),
            log: Vec::new(),
            commit_index: 0,
            last_applied: 0,
            machine: Machine::default(),
        }
    }

    fn handle_follower(
        event: Event<Self::Machine, Self::Message>,
        mut state: Self::State,
    ) -> (Transition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>) {
        let mut effects = Vec::new();
        let transition = match event {
            Event::Timer(crate::event::TimerKind::ElectionTimeout) => {
                state.current_term += 1;
                state.voted_for = Some(state.id.clone());
                state.votes_received = HashSet::from([state.id.clone()]);
                let requests = state
                    .peers
                    .iter()
                    .cloned()
                    .map(|peer| {
                        (
                            peer,
                            Msg::VoteRequest {
                                term: state.current_term,
                                candidate: state.id.clone(),
                            },
                        )
                    })
                    .collect();
                effects.push(Effect::SendVoteRequests(requests));
                Transition::Candidate
            }
            Event::Info(InfoMessage::Rpc(Msg::AppendEntries { term, entries, leader_commit, leader })) => {
                if term >= state.current_term {
                    state.current_term = term;
                    state.leader_id = Some(leader);
                    apply_entries(&mut state, entries, leader_commit);
                }
                Transition::Follower
            }
            Event::Info(InfoMessage::Rpc(Msg::VoteRequest { term, candidate })) => {
                let granted = grant_vote(&mut state, term, &candidate);
                effects.push(Effect::SendMsg {
                    to: candidate,
                    message: Msg::VoteResponse { term: state.current_term, granted },
                });
                Transition::Follower
            }
            _ => Transition::Follower,
        };
        (transition, state, effects)
    }

    fn handle_candidate(
        event: Event<Self::Machine, Self::Message>,
        mut state: Self::State,
    ) -> (Transition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>) {
        let mut effects = Vec::new();
        let transition = match event {
            Event::Timer(crate::event::TimerKind::ElectionTimeout) => {
                state.current_term += 1;
                state.voted_for = Some(state.id.clone());
                state.votes_received = HashSet::from([state.id.clone()]);
                let requests = state
                    .peers
                    .iter()
                    .cloned()
                    .map(|peer| {
                        (
                            peer,
                            Msg::VoteRequest {
                                term: state.current_term,
                                candidate: state.id.clone(),
                            },
                        )
                    })
                    .collect();
                effects.push(Effect::SendVoteRequests(requests));
                Transition::Candidate
            }
            Event::Cast(Msg::VoteResponse { term, granted }) if term == state.current_term && granted => {
                state.votes_received.insert(state.id.clone());
                if state.votes_received.len() * 2 > state.peers.len() + 1 {
                    state.leader_id = Some(state.id.clone());
                    Transition::Leader
                } else {
                    Transition::Candidate
                }
            }
            Event::Info(InfoMessage::Rpc(Msg::AppendEntries { term, entries, leader_commit, leader })) if term >= state.current_term => {
                state.current_term = term;
                state.leader_id = Some(leader);
                apply_entries(&mut state, entries, leader_commit);
                Transition::Follower
            }
            _ => Transition::Candidate,
        };
        (transition, state, effects)
    }

    fn handle_leader(
        event: Event<Self::Machine, Self::Message>,
        mut state: Self::State,
    ) -> (LeaderTransition, Self::State, Vec<Effect<Self::Machine, Self::Message, Self::Batch>>) {
        let mut effects = Vec::new();
        let transition = match event {
            Event::Call(id, CallRequest::LeaderCall(LeaderCallBody::Command { kind: Msg::Query(query), .. })) => {
                let result = query(&state.machine);
                effects.push(Effect::Reply {
                    to: Some(id),
                    reply: crate::reply::ClientReply::Query {
                        last_applied: state.last_applied,
                        current_term: state.current_term,
                        result,
                        leader: state.leader_id.clone(),
                    },
                });
                LeaderTransition::Leader
            }
            Event::Call(id, CallRequest::LeaderCall(LeaderCallBody::Command { kind: Msg::Command(cmd), reply_mode })) => {
                state.log.push(LogEntry {
                    term: state.current_term,
                    command: cmd,
                });
                state.commit_index = state.log.len() as u64;
                apply_committed(&mut state);
                effects.push(Effect::SendRpcs {
                    urgent: true,
                    batch: state.log.clone(),
                });
                match reply_mode {
                    ReplyMode::AfterLogAppend | ReplyMode::AwaitConsensus => {
                        effects.push(Effect::Reply {
                            to: Some(id),
                            reply: crate::reply::ClientReply::Ok {
                                result: serde_json::json!({"index": state.commit_index}),
                                server: state.id.clone(),
                            },
                        });
                    }
                    ReplyMode::NotifyOnConsensus => {
                        effects.push(Effect::Reply {
                            to: Some(id),
                            reply: crate::reply::ClientReply::Ok {
                                result: serde_json::json!({"index": state.commit_index}),
                                server: state.id.clone(),
                            },
                        });
                        effects.push(Effect::Notify {
                            to: state.id.clone(),
                            reply: crate::reply::ClientReply::Consensus(serde_json::json!({"index": state.commit_index})),
                        });
                    }
                }
                LeaderTransition::Leader
            }
            Event::Call(id, CallRequest::LeaderCall(LeaderCallBody::StateQuery(StateQuerySpec::Members))) => {
                effects.push(Effect::Reply {
                    to: Some(id),
                    reply: crate::reply::ClientReply::Members(state.peers.clone()),
                });
                LeaderTransition::Leader
            }
            Event::Call(id, CallRequest::LeaderCall(LeaderCallBody::StateQuery(StateQuerySpec::All))) => {
                effects.push(Effect::Reply {
                    to: Some(id),
                    reply: crate::reply::ClientReply::State(serde_json::json!({
                        "term": state.current_term,
                        "commit_index": state.commit_index,
                    })),
                });
                LeaderTransition::Leader
            }
            Event::Info(InfoMessage::Rpc(Msg::AppendEntries { term, .. })) if term > state.current_term => {
                state.current_term = term;
                state.leader_id = None;
                LeaderTransition::Follower
            }
            _ => LeaderTransition::Leader,
        };
        (transition, state, effects)
    }

    fn make_rpcs(state: &Self::State) -> Self::Batch {
        state.log.clone()
    }

    fn maybe_snapshot(_index: u64, state: Self::State) -> Self::State {
        state
    }

    fn record_snapshot_point(_index: u64, state: Self::State) -> Self::State {
        state
    }

    fn terminate(_state: Self::State) {}

    fn leader_id(state: &Self::State) -> Option<NodeId> {
        state.leader_id.clone()
    }

    fn current_term(state: &Self::State) -> u64 {
        state.current_term
    }

    fn last_applied(state: &Self::State) -> u64 {
        state.last_applied
    }

    fn machine(state: &Self::State) -> &Self::Machine {
        &state.machine
    }

    fn ra_query_message(query: QueryFn<Self::Machine>) -> Self::Message {
        Msg::Query(query)
    }
}

fn grant_vote(state: &mut TestState, term: u64, candidate: &NodeId) -> bool {
    if term < state.current_term {
        return false;
    }
    if term > state.current_term {
        state.current_term = term;
        state.voted_for = None;
    }
    match &state.voted_for {
        None => {
            state.voted_for = Some(candidate.clone());
            true
        }
        Some(voted) => voted == candidate,
    }
}

fn apply_entries(state: &mut TestState, entries: Vec<LogEntry>, leader_commit: u64) {
    if !entries.is_empty() {
        state.log = entries;
    }
    state.commit_index = leader_commit.min(state.log.len() as u64);
    apply_committed(state);
}

fn apply_committed(state: &mut TestState) {
    while state.last_applied < state.commit_index {
        let entry = &state.log[state.last_applied as usize];
        state.machine.applied.push(entry.command.clone());
        state.last_applied += 1;
    }
}
