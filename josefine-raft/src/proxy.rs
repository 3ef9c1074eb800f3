//! The replication proxy supervisor (component E, §4.7). The proxy
//! itself — the replication sub-driver that batches and sends
//! append-entries to peers — is an external collaborator (§6); this
//! module states its contract (`ProxyRuntime`) and supervises whatever
//! concrete implementation is plugged in.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use josefine_core::error::{Error, Result};

/// A batch push, or a request to stop, sent to a live proxy.
pub enum ProxyCommand<B> {
    Push { urgent: bool, batch: B },
    Stop { grace: Duration },
}

/// A handle to a live replication sub-driver. Pushing never blocks —
/// it's fire-and-forget into the sub-driver's own mailbox, same as any
/// other `send_msg` effect (§5: "sends are non-blocking").
pub struct ProxyHandle<B> {
    tx: mpsc::UnboundedSender<ProxyCommand<B>>,
}

impl<B: Send + 'static> ProxyHandle<B> {
    pub fn new(tx: mpsc::UnboundedSender<ProxyCommand<B>>) -> Self {
        ProxyHandle { tx }
    }

    pub fn push(&self, urgent: bool, batch: B) -> Result<()> {
        self.tx
            .send(ProxyCommand::Push { urgent, batch })
            .map_err(|_| Error::ProxyFailure("proxy mailbox closed".into()))
    }

    pub fn stop(&self, grace: Duration) {
        let _ = self.tx.send(ProxyCommand::Stop { grace });
    }
}

/// Called by a running proxy when it terminates unexpectedly, so the
/// supervisor can notice and restart it while still Leader (§4.7).
pub type ExitNotifier = Box<dyn Fn(String) + Send + Sync>;

/// The contract a replication sub-driver must satisfy (§6 Proxy
/// interface): `start(parent, interval) -> handle`, `proxy(handle,
/// urgent?, batch) -> ok`, `stop(handle, reason, grace_ms) -> ok`. The
/// driver is a producer of this interface, never its implementer.
pub trait ProxyRuntime: Send + Sync + 'static {
    type Batch: Send + Clone + 'static;

    fn start(&self, interval: Duration, on_exit: ExitNotifier) -> ProxyHandle<Self::Batch>;
}

/// Supervises the (at most one) live proxy while this node is Leader
/// (invariant 2, §3; §8 proxy singularity).
pub struct ProxySupervisor<R: ProxyRuntime> {
    runtime: Arc<R>,
    interval: Duration,
    handle: Option<ProxyHandle<R::Batch>>,
}

impl<R: ProxyRuntime> ProxySupervisor<R> {
    pub fn new(runtime: Arc<R>, interval: Duration) -> Self {
        ProxySupervisor {
            runtime,
            interval,
            handle: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Discard a handle that belongs to a proxy that has already exited,
    /// so the next `send_rpcs`/`restart_with` doesn't push onto a dead
    /// mailbox (§4.7 recovery step 1).
    pub fn mark_dead(&mut self) {
        self.handle = None;
    }

    /// Route a batch to the proxy, creating it if absent (§3 `send_rpcs`).
    pub fn send_rpcs(&mut self, urgent: bool, batch: R::Batch, on_exit: ExitNotifier) -> Result<()> {
        if self.handle.is_none() {
            self.handle = Some(self.runtime.start(self.interval, on_exit));
        }
        self.handle.as_ref().unwrap().push(urgent, batch)
    }

    /// Recover from an unexpected proxy exit while still Leader: rebuild
    /// the current batch from the decision core, start a fresh proxy,
    /// and push the urgent batch immediately (§4.7, §8 scenario S5).
    pub fn restart_with(&mut self, batch: R::Batch, on_exit: ExitNotifier) -> Result<()> {
        self.handle = Some(self.runtime.start(self.interval, on_exit));
        self.handle.as_ref().unwrap().push(true, batch)
    }

    /// Stop the proxy with a short grace period and clear the handle
    /// (transition out of Leader, or driver shutdown).
    pub fn stop(&mut self, grace: Duration) {
        if let Some(handle) = self.handle.take() {
            handle.stop(grace);
        }
    }
}

/// An in-process reference implementation of the proxy contract: it
/// coalesces non-urgent pushes onto the supplied interval and forwards
/// every batch verbatim to `sink`. Good enough to drive the testable
/// properties of §8 and to demonstrate the supervisor end to end; a real
/// deployment supplies a `ProxyRuntime` that actually talks to peers.
pub struct LoopbackProxy<B> {
    sink: mpsc::UnboundedSender<(bool, B)>,
}

impl<B: Send + Clone + 'static> LoopbackProxy<B> {
    pub fn new(sink: mpsc::UnboundedSender<(bool, B)>) -> Self {
        LoopbackProxy { sink }
    }
}

impl<B: Send + Clone + 'static> ProxyRuntime for LoopbackProxy<B> {
    type Batch = B;

    fn start(&self, _interval: Duration, on_exit: ExitNotifier) -> ProxyHandle<B> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProxyCommand<B>>();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    ProxyCommand::Push { urgent, batch } => {
                        if sink.send((urgent, batch)).is_err() {
                            on_exit("sink closed".into());
                            return;
                        }
                    }
                    ProxyCommand::Stop { grace } => {
                        tokio::time::sleep(grace).await;
                        break;
                    }
                }
            }
        });
        ProxyHandle::new(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_rpcs_creates_proxy_on_first_use() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(LoopbackProxy::new(sink));
        let mut sup = ProxySupervisor::new(runtime, Duration::from_millis(10));
        assert!(!sup.is_live());

        sup.send_rpcs(false, "batch-1", Box::new(|_| {})).unwrap();
        assert!(sup.is_live());

        let (urgent, batch) = rx.recv().await.unwrap();
        assert!(!urgent);
        assert_eq!(batch, "batch-1");
    }

    #[tokio::test]
    async fn singularity_reuses_existing_proxy() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(LoopbackProxy::new(sink));
        let mut sup = ProxySupervisor::new(runtime, Duration::from_millis(10));

        sup.send_rpcs(false, "a", Box::new(|_| {})).unwrap();
        sup.send_rpcs(true, "b", Box::new(|_| {})).unwrap();

        assert_eq!(rx.recv().await.unwrap(), (false, "a"));
        assert_eq!(rx.recv().await.unwrap(), (true, "b"));
    }

    #[tokio::test]
    async fn stop_clears_handle() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(LoopbackProxy::new(sink));
        let mut sup = ProxySupervisor::new(runtime, Duration::from_millis(10));
        sup.send_rpcs(false, "a", Box::new(|_| {})).unwrap();
        assert!(sup.is_live());
        sup.stop(Duration::from_millis(0));
        assert!(!sup.is_live());
    }
}
