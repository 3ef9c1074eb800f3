use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::event::CallId;
use crate::reply::ClientReply;

/// Buffers client commands that arrived with no known leader (§4.5).
/// FIFO; entries are added only when a leader-call cannot be answered
/// immediately, and drained either by redirect-reply or by replay as
/// call events on promotion to Leader. Never dropped silently — the
/// buffer is only ever lost wholesale, on driver termination.
#[derive(Default)]
pub struct PendingCommands<U> {
    entries: VecDeque<(CallId, U)>,
}

impl<U> PendingCommands<U> {
    pub fn new() -> Self {
        PendingCommands {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, call_id: CallId, inner: U) {
        self.entries.push_back((call_id, inner));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the buffer in FIFO order, to be replayed as synthetic call
    /// events on promotion to Leader (§4.4 Candidate -> Leader).
    pub fn drain(&mut self) -> Vec<(CallId, U)> {
        self.entries.drain(..).collect()
    }
}

/// Maps a `CallId` to the waiting caller's reply channel. Owned by the
/// driver so the decision core only ever deals in opaque ids (§3 Effect
/// `reply`/`notify`).
#[derive(Default)]
pub struct CallTable {
    next_id: CallId,
    waiting: std::collections::HashMap<CallId, oneshot::Sender<ClientReply>>,
}

impl CallTable {
    pub fn new() -> Self {
        CallTable {
            next_id: 0,
            waiting: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, reply_to: oneshot::Sender<ClientReply>) -> CallId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.waiting.insert(id, reply_to);
        id
    }

    /// Reply to a pending call. A caller that already timed out may have
    /// dropped its receiver; that's an ignored, not an error (§5
    /// cancellation: "a timed-out client may see a later, ignored
    /// reply").
    pub fn reply(&mut self, id: CallId, reply: ClientReply) {
        if let Some(tx) = self.waiting.remove(&id) {
            let _ = tx.send(reply);
        }
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.waiting.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut buf: PendingCommands<&'static str> = PendingCommands::new();
        buf.push(1, "a");
        buf.push(2, "b");
        buf.push(3, "c");
        assert_eq!(buf.drain(), vec![(1, "a"), (2, "b"), (3, "c")]);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn reply_to_dropped_receiver_is_ignored() {
        let mut table = CallTable::new();
        let (tx, rx) = oneshot::channel();
        let id = table.register(tx);
        drop(rx);
        table.reply(id, ClientReply::Redirect(crate::node::NodeId::Name("a".into())));
    }

    #[tokio::test]
    async fn reply_delivers_exactly_once() {
        let mut table = CallTable::new();
        let (tx, rx) = oneshot::channel();
        let id = table.register(tx);
        table.reply(id, ClientReply::Redirect(crate::node::NodeId::Name("a".into())));
        assert!(matches!(rx.await.unwrap(), ClientReply::Redirect(_)));
        assert!(!table.contains(id));
    }
}
