use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::config::RaftConfig;
use crate::event::TimerKind;
use crate::role::Role;

/// Owns the election timer and the sync timer (§4.3). Both are
/// deadline-based so the driver's dispatch loop can `select!` over them
/// without owning a `Sleep` directly.
pub struct TimerManager {
    rng: StdRng,
    follower_range: (Duration, Duration),
    candidate_range: (Duration, Duration),
    sync_interval: Duration,

    election_deadline: Option<Instant>,
    /// Mirrors the presence of a live sync timer (invariant 3, §3).
    sync_scheduled: bool,
    sync_deadline: Option<Instant>,
}

impl TimerManager {
    pub fn new(config: &RaftConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        TimerManager {
            rng,
            follower_range: config.follower_election_range(),
            candidate_range: config.candidate_election_range(),
            sync_interval: config.sync_interval(),
            election_deadline: None,
            sync_scheduled: false,
            sync_deadline: None,
        }
    }

    /// Arm a fresh election timer for `role`. Not armed for `Leader`.
    /// Every event processed in Follower or Candidate must call this
    /// before returning to the dispatch loop (§4.3 re-arming policy).
    pub fn arm_election(&mut self, role: Role) {
        let range = match role {
            Role::Follower => self.follower_range,
            Role::Candidate => self.candidate_range,
            Role::Leader => {
                self.election_deadline = None;
                return;
            }
        };
        let (low, high) = (range.0.as_millis() as u64, range.1.as_millis() as u64);
        let delay_ms = self.rng.gen_range(low..high);
        self.election_deadline = Some(Instant::now() + Duration::from_millis(delay_ms));
    }

    pub fn disarm_election(&mut self) {
        self.election_deadline = None;
    }

    /// Arm the sync timer iff it isn't already armed (§3 invariant 3,
    /// §8 sync idempotence).
    pub fn schedule_sync(&mut self) {
        if !self.sync_scheduled {
            self.sync_scheduled = true;
            self.sync_deadline = Some(Instant::now() + self.sync_interval);
        }
    }

    pub fn sync_scheduled(&self) -> bool {
        self.sync_scheduled
    }

    pub fn clear_sync(&mut self) {
        self.sync_scheduled = false;
        self.sync_deadline = None;
    }

    /// Await whichever timer is next due; used inside the driver's
    /// `tokio::select!`. Resolves to `None` forever if neither is armed,
    /// so it never wins a `select!` race against real work.
    pub async fn next_fired(&self) -> TimerKind {
        let election = sleep_until_opt(self.election_deadline);
        let sync = sleep_until_opt(self.sync_deadline);

        tokio::select! {
            _ = election => TimerKind::ElectionTimeout,
            _ = sync => TimerKind::Sync,
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => futures::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn test_config() -> RaftConfig {
        RaftConfig {
            id: NodeId::Name("n1".into()),
            peers: Vec::new(),
            broadcast_time_ms: 100,
            sync_interval_ms: 10,
            proxy_stop_grace_ms: 100,
            vote_request_timeout_ms: 500,
        }
    }

    #[test]
    fn follower_timer_in_range() {
        let config = test_config();
        let mut timers = TimerManager::new(&config, Some(42));
        for _ in 0..100 {
            timers.arm_election(Role::Follower);
            let deadline = timers.election_deadline.unwrap();
            let delay = deadline.duration_since(Instant::now());
            assert!(delay >= Duration::from_millis(200) && delay < Duration::from_millis(500));
        }
    }

    #[test]
    fn candidate_timer_in_range() {
        let config = test_config();
        let mut timers = TimerManager::new(&config, Some(7));
        for _ in 0..100 {
            timers.arm_election(Role::Candidate);
            let deadline = timers.election_deadline.unwrap();
            let delay = deadline.duration_since(Instant::now());
            assert!(delay >= Duration::from_millis(200) && delay < Duration::from_millis(700));
        }
    }

    #[test]
    fn leader_has_no_election_timer() {
        let config = test_config();
        let mut timers = TimerManager::new(&config, Some(1));
        timers.arm_election(Role::Follower);
        assert!(timers.election_deadline.is_some());
        timers.arm_election(Role::Leader);
        assert!(timers.election_deadline.is_none());
    }

    #[test]
    fn schedule_sync_is_idempotent() {
        let config = test_config();
        let mut timers = TimerManager::new(&config, Some(1));
        timers.schedule_sync();
        let first = timers.sync_deadline.unwrap();
        assert!(timers.sync_scheduled());
        timers.schedule_sync();
        let second = timers.sync_deadline.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn clear_sync_allows_rearming() {
        let config = test_config();
        let mut timers = TimerManager::new(&config, Some(1));
        timers.schedule_sync();
        timers.clear_sync();
        assert!(!timers.sync_scheduled());
        timers.schedule_sync();
        assert!(timers.sync_scheduled());
    }
}
