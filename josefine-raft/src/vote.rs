//! Transient per-peer tasks for the `send_vote_requests` effect (§4.2,
//! §5): each performs a synchronous call with a short bounded timeout
//! and casts whatever it got back — including a timeout — to the
//! driver's own event queue. These run outside the driver task, so the
//! driver itself never blocks on a peer reply (§5 suspension points).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::event::Inbound;
use crate::node::NodeId;

/// How a vote request can fail, for whatever the caller's `to_cast`
/// mapper wants to do with it (e.g. cast a `VoteResponse { granted:
/// false, .. }` on timeout, matching a real peer's silence).
#[derive(Debug, Clone)]
pub enum VoteRequestError {
    Timeout,
    Transport(String),
}

/// The outbound RPC mechanism a vote-request task calls through.
/// Out of scope to implement here (transport is an external collaborator,
/// §1) — this is just the seam the driver calls against.
pub trait PeerTransport<U>: Send + Sync + 'static {
    fn call(&self, peer: NodeId, message: U) -> Pin<Box<dyn Future<Output = Result<U, String>> + Send>>;
}

/// Spawn one transient task per `(peer, request)`, each bounded by
/// `timeout`, casting its outcome back onto `cast_tx` via `to_cast`
/// (which turns a transport result into whatever `Message` variant the
/// decision core expects to see, e.g. a `VoteResponse`).
pub fn spawn_vote_requests<M, U, T>(
    requests: Vec<(NodeId, U)>,
    transport: Arc<T>,
    timeout: Duration,
    to_cast: Arc<dyn Fn(NodeId, Result<U, VoteRequestError>) -> U + Send + Sync>,
    cast_tx: mpsc::UnboundedSender<Inbound<M, U>>,
) where
    T: PeerTransport<U>,
    U: Send + 'static,
    M: Send + 'static,
{
    for (peer, request) in requests {
        let transport = transport.clone();
        let to_cast = to_cast.clone();
        let cast_tx = cast_tx.clone();
        let peer_for_call = peer.clone();

        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, transport.call(peer_for_call.clone(), request)).await;
            let mapped = match outcome {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(err)) => Err(VoteRequestError::Transport(err)),
                Err(_) => Err(VoteRequestError::Timeout),
            };
            let cast = to_cast(peer_for_call, mapped);
            let _ = cast_tx.send(Inbound::Cast(cast));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowTransport;

    impl PeerTransport<String> for SlowTransport {
        fn call(&self, _peer: NodeId, message: String) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(format!("reply-to-{}", message))
            })
        }
    }

    struct InstantTransport;

    impl PeerTransport<String> for InstantTransport {
        fn call(&self, _peer: NodeId, message: String) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> {
            Box::pin(async move { Ok(format!("reply-to-{}", message)) })
        }
    }

    #[tokio::test]
    async fn casts_timeout_when_peer_is_slow() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound<(), String>>();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let to_cast = Arc::new(move |_peer: NodeId, result: Result<String, VoteRequestError>| {
            calls2.fetch_add(1, Ordering::SeqCst);
            match result {
                Ok(reply) => reply,
                Err(_) => "timed-out".to_string(),
            }
        });

        spawn_vote_requests(
            vec![(NodeId::Name("peer".into()), "req".into())],
            Arc::new(SlowTransport),
            Duration::from_millis(5),
            to_cast,
            tx,
        );

        let inbound = rx.recv().await.unwrap();
        assert!(matches!(inbound, Inbound::Cast(ref s) if s == "timed-out"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn casts_reply_when_peer_is_fast_enough() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound<(), String>>();
        let to_cast = Arc::new(|_peer: NodeId, result: Result<String, VoteRequestError>| {
            result.unwrap_or_else(|_| "timed-out".to_string())
        });

        spawn_vote_requests(
            vec![(NodeId::Name("peer".into()), "req".into())],
            Arc::new(InstantTransport),
            Duration::from_millis(500),
            to_cast,
            tx,
        );

        let inbound = rx.recv().await.unwrap();
        assert!(matches!(inbound, Inbound::Cast(ref s) if s == "reply-to-req"));
    }
}
