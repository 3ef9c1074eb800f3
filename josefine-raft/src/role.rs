/// The local Raft role. Exactly one is active at any observable instant;
/// the driver dispatches every inbound event under the current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl Default for Role {
    /// Initial role on boot is always follower.
    fn default() -> Self {
        Role::Follower
    }
}

/// Transition returned by `handle_follower`/`handle_candidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Follower,
    Candidate,
    Leader,
}

impl Transition {
    pub fn role(self) -> Role {
        match self {
            Transition::Follower => Role::Follower,
            Transition::Candidate => Role::Candidate,
            Transition::Leader => Role::Leader,
        }
    }
}

/// Transition returned by `handle_leader`: leaders may additionally ask
/// the driver to stop the node entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderTransition {
    Leader,
    Follower,
    Stop,
}
