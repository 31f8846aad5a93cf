//! The Networker collaborator (§6A, §4.4.5): per-pod TCP port allocation
//! deduped by pod, an externally-driven periodic re-sync, and a pod-deletion
//! notification channel.
//!
//! `Networker` is the narrow async trait the spec calls for at this seam:
//! the real K8s/Istio client is explicitly out of scope (§1), so
//! [`LocalPortNetworker`] stands in for it by wrapping this crate's own
//! [`PortAllocator`] plus pod bookkeeping, the same "narrow trait, one real
//! implementation, one test double" shape `aura-agent/src/runtime/effects/network.rs`
//! uses for its own external-network seam.

use crate::port_allocator::PortAllocator;
use async_trait::async_trait;
use ephemeral_core::{CoordError, Pod};
use futures_util::stream::BoxStream;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

/// External network-allocation collaborator (§6A).
#[async_trait]
pub trait Networker: Send + Sync {
    /// Allocate a port for `pod`, or return the one already assigned to it.
    async fn create_network(&self, pod: &Pod) -> Result<u16, CoordError>;

    /// Reconcile bookkeeping against an externally observed set of in-use
    /// ports. Driven by the Discovery service's periodic 15s re-sync task.
    async fn sync(&self, used: &[u16]) -> Result<(), CoordError>;

    /// Pods the collaborator has reported deleted. Each item is delivered
    /// exactly once; Discovery erases its own `pod → playerID` entry for it
    /// on receipt (§4.4.5).
    fn done_channel(&self) -> BoxStream<'static, Pod>;
}

/// Stand-in for the K8s/Istio client: wraps a [`PortAllocator`] plus a
/// `pod → port` dedup table, and a channel an operator (or a test) can push
/// pod-deletion notifications onto.
pub struct LocalPortNetworker {
    allocator: Arc<Mutex<PortAllocator>>,
    pod_ports: Arc<Mutex<HashMap<Pod, u16>>>,
    done_tx: mpsc::Sender<Pod>,
    done_rx: Arc<Mutex<Option<mpsc::Receiver<Pod>>>>,
}

impl LocalPortNetworker {
    /// Wrap a fresh allocator over `range`.
    pub fn new(allocator: Arc<Mutex<PortAllocator>>) -> Self {
        let (done_tx, done_rx) = mpsc::channel(16);
        Self {
            allocator,
            pod_ports: Arc::new(Mutex::new(HashMap::new())),
            done_tx,
            done_rx: Arc::new(Mutex::new(Some(done_rx))),
        }
    }

    /// Notify this networker that `pod` has been deleted, releasing its
    /// port and forgetting the `pod → port` mapping. The real K8s/Istio
    /// client would call this from its own watch loop; tests call it
    /// directly to simulate one.
    pub async fn notify_pod_deleted(&self, pod: Pod) -> Result<(), CoordError> {
        if let Some(port) = self.pod_ports.lock().await.remove(&pod) {
            self.allocator.lock().await.release(port);
        }
        self.done_tx
            .send(pod)
            .await
            .map_err(|_| CoordError::fatal("networker done channel receiver dropped"))
    }
}

#[async_trait]
impl Networker for LocalPortNetworker {
    async fn create_network(&self, pod: &Pod) -> Result<u16, CoordError> {
        let mut pod_ports = self.pod_ports.lock().await;
        if let Some(port) = pod_ports.get(pod) {
            return Ok(*port);
        }
        let port = self.allocator.lock().await.allocate()?;
        pod_ports.insert(pod.clone(), port);
        Ok(port)
    }

    async fn sync(&self, used: &[u16]) -> Result<(), CoordError> {
        let externally_in_use: HashSet<u16> = used.iter().copied().collect();
        self.allocator.lock().await.reconcile(&externally_in_use)
    }

    fn done_channel(&self) -> BoxStream<'static, Pod> {
        let taken = self
            .done_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take());
        match taken {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => Box::pin(futures_util::stream::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::PortRange;
    use futures_util::StreamExt;

    fn networker() -> LocalPortNetworker {
        let allocator = Arc::new(Mutex::new(PortAllocator::new(PortRange {
            start: 30000,
            end: 30002,
        })));
        LocalPortNetworker::new(allocator)
    }

    #[tokio::test]
    async fn create_network_is_deduped_by_pod() {
        let networker = networker();
        let pod = Pod::from("pod-a");
        let first = networker.create_network(&pod).await.unwrap();
        let second = networker.create_network(&pod).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn distinct_pods_get_distinct_ports() {
        let networker = networker();
        let a = networker.create_network(&Pod::from("pod-a")).await.unwrap();
        let b = networker.create_network(&Pod::from("pod-b")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn pod_deletion_releases_its_port_and_is_observable_on_the_done_channel() {
        let networker = networker();
        let pod = Pod::from("pod-a");
        let port = networker.create_network(&pod).await.unwrap();

        let mut done = networker.done_channel();
        networker.notify_pod_deleted(pod.clone()).await.unwrap();
        assert_eq!(done.next().await, Some(pod.clone()));

        let reallocated = networker.create_network(&Pod::from("pod-b")).await.unwrap();
        assert_eq!(reallocated, port);
    }
}
