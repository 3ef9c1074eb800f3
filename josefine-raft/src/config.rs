use std::time::Duration;

use josefine_core::error::{Error, Result};

use crate::node::NodeId;

/// A peer known to this node, keyed by `NodeId` elsewhere (`cluster`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub host: String,
}

/// Per-node configuration. Loaded from a TOML file (`Config.toml` by
/// convention) via the `config` crate, with these as defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    pub id: NodeId,
    pub peers: Vec<Peer>,

    /// Base interval, in milliseconds, from which election and sync
    /// timers are derived. Must be positive.
    pub broadcast_time_ms: u64,

    /// Sync timer interval, in milliseconds. Exposed as a config knob
    /// per the open question on `sync` event semantics (§9).
    pub sync_interval_ms: u64,

    /// Grace period given to the proxy on shutdown, in milliseconds.
    pub proxy_stop_grace_ms: u64,

    /// Timeout for a single vote-request RPC, in milliseconds.
    pub vote_request_timeout_ms: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            id: NodeId::Name(names::Generator::default().next().unwrap_or_else(|| "node".to_string())),
            peers: Vec::new(),
            broadcast_time_ms: 100,
            sync_interval_ms: 10,
            proxy_stop_grace_ms: 100,
            vote_request_timeout_ms: 500,
        }
    }
}

impl RaftConfig {
    pub fn broadcast_time(&self) -> Duration {
        Duration::from_millis(self.broadcast_time_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn proxy_stop_grace(&self) -> Duration {
        Duration::from_millis(self.proxy_stop_grace_ms)
    }

    pub fn vote_request_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_request_timeout_ms)
    }

    /// Follower election timeout range, uniform in `[2T, 5T)` (§4.3).
    pub fn follower_election_range(&self) -> (Duration, Duration) {
        let t = self.broadcast_time_ms;
        (Duration::from_millis(2 * t), Duration::from_millis(5 * t))
    }

    /// Candidate election timeout range, uniform in `[2T, 7T)` (§4.3).
    pub fn candidate_election_range(&self) -> (Duration, Duration) {
        let t = self.broadcast_time_ms;
        (Duration::from_millis(2 * t), Duration::from_millis(7 * t))
    }

    /// Load config from a TOML file, falling back to built-in defaults
    /// for anything the file doesn't specify.
    pub fn from_file(path: &str) -> Result<RaftConfig> {
        let mut builder = config::Config::default();
        builder
            .merge(config::File::with_name(path))
            .map_err(|e| Error::Config(e.to_string()))?;

        builder
            .try_into()
            .map_err(|e| Error::Config(e.to_string()))
    }
}
