//! One-shot readiness detection over cluster watch streams
//!
//! Each resource kind gets its own watch stream and a single-assignment
//! promise. The first event satisfying the kind's predicate resolves the
//! promise with the observed object. A closed stream records its cause and
//! never resolves the promise: the watch is re-established so the promise
//! stays pending and the caller's timeout remains the sole gate.

use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, WatchParams};
use kube::core::WatchEvent;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::DRIVER_CONTAINER_NAME;

/// Action reported by a watch event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchAction {
    /// The object was added
    Added,
    /// The object was modified
    Modified,
    /// The object was deleted
    Deleted,
}

/// Single-assignment promise resolved by a watch callback.
///
/// At-most-once resolution is enforced by taking the sender out of a mutex;
/// later resolutions are no-ops.
pub struct ReadySlot<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> ReadySlot<T> {
    /// Create a slot and the receiver its value arrives on
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                sender: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Resolve the slot if it is still unresolved. Returns whether this call
    /// performed the resolution.
    pub fn resolve(&self, value: T) -> bool {
        let sender = self.sender.lock().expect("slot lock poisoned").take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Whether the slot has already been resolved
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().expect("slot lock poisoned").is_none()
    }
}

/// Watch-stream callback surface for one readiness condition.
///
/// Holds a predicate over `(action, object)` and the slot it resolves.
pub struct ReadinessWatcher<K> {
    kind: &'static str,
    predicate: Box<dyn Fn(WatchAction, &K) -> bool + Send + Sync>,
    slot: Arc<ReadySlot<K>>,
    close_cause: Mutex<Option<String>>,
}

impl<K> ReadinessWatcher<K> {
    /// Create a watcher resolving `slot` on the first event satisfying
    /// `predicate`
    pub fn new(
        kind: &'static str,
        predicate: impl Fn(WatchAction, &K) -> bool + Send + Sync + 'static,
        slot: Arc<ReadySlot<K>>,
    ) -> Self {
        Self {
            kind,
            predicate: Box::new(predicate),
            slot,
            close_cause: Mutex::new(None),
        }
    }

    /// Feed one watch event through the predicate
    pub fn on_event(&self, action: WatchAction, object: K) {
        if self.slot.is_resolved() {
            return;
        }
        if (self.predicate)(action, &object) {
            if self.slot.resolve(object) {
                debug!(kind = self.kind, ?action, "Readiness condition satisfied");
            }
        }
    }

    /// Record that the watch stream closed. Does not resolve the slot.
    pub fn on_close(&self, cause: Option<String>) {
        if let Some(ref cause) = cause {
            warn!(kind = self.kind, %cause, "Watch stream closed");
        }
        *self.close_cause.lock().expect("watcher lock poisoned") = cause;
    }

    /// Whether the underlying promise has been resolved
    pub fn is_resolved(&self) -> bool {
        self.slot.is_resolved()
    }

    /// Cause recorded by [`Self::on_close`], if any
    pub fn close_cause(&self) -> Option<String> {
        self.close_cause
            .lock()
            .expect("watcher lock poisoned")
            .clone()
    }
}

/// Guard over a spawned watch task; aborts the task when dropped so watches
/// are released on every exit path.
pub struct WatchGuard {
    handle: JoinHandle<()>,
}

impl WatchGuard {
    pub(crate) fn from_handle(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Delay before re-establishing a closed watch stream
const REWATCH_DELAY: Duration = Duration::from_secs(1);

/// Spawn a watch on a single named object, feeding its events into `watcher`.
///
/// Server-side watch windows end routinely; each closure is recorded and the
/// watch is re-established (re-delivering current state as `Added`) until the
/// promise resolves or the guard is dropped. The promise is never resolved by
/// a closure, so the caller's timeout stays the sole gate.
pub fn spawn_watch<K>(api: Api<K>, name: &str, watcher: ReadinessWatcher<K>) -> WatchGuard
where
    K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
{
    let wp = WatchParams::default().fields(&format!("metadata.name={}", name));
    let handle = tokio::spawn(async move {
        loop {
            match api.watch(&wp, "0").await {
                Ok(stream) => {
                    let mut stream = pin!(stream);
                    loop {
                        match stream.next().await {
                            Some(Ok(WatchEvent::Added(object))) => {
                                watcher.on_event(WatchAction::Added, object)
                            }
                            Some(Ok(WatchEvent::Modified(object))) => {
                                watcher.on_event(WatchAction::Modified, object)
                            }
                            Some(Ok(WatchEvent::Deleted(object))) => {
                                watcher.on_event(WatchAction::Deleted, object)
                            }
                            Some(Ok(WatchEvent::Bookmark(_))) => {}
                            Some(Ok(WatchEvent::Error(status))) => {
                                watcher.on_close(Some(status.message));
                                break;
                            }
                            Some(Err(e)) => {
                                watcher.on_close(Some(e.to_string()));
                                break;
                            }
                            None => {
                                watcher.on_close(None);
                                break;
                            }
                        }
                    }
                }
                Err(e) => watcher.on_close(Some(e.to_string())),
            }
            if watcher.is_resolved() {
                return;
            }
            tokio::time::sleep(REWATCH_DELAY).await;
        }
    });
    WatchGuard { handle }
}

/// Outcome of awaiting a readiness promise
#[derive(Debug)]
pub enum AwaitOutcome<T> {
    /// The predicate was satisfied and produced this object
    Ready(T),
    /// The timeout elapsed with the promise unresolved
    TimedOut,
    /// The watch was torn down (guard dropped) before resolution
    Closed,
}

/// Await a readiness promise with a bounded timeout.
pub async fn await_ready<T>(rx: oneshot::Receiver<T>, timeout: Duration) -> AwaitOutcome<T> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(value)) => AwaitOutcome::Ready(value),
        Ok(Err(_)) => AwaitOutcome::Closed,
        Err(_) => AwaitOutcome::TimedOut,
    }
}

/// Driver pod readiness: running, with the driver container reporting ready.
pub fn pod_running_and_ready(action: WatchAction, pod: &Pod) -> bool {
    if !matches!(action, WatchAction::Added | WatchAction::Modified) {
        return false;
    }
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .container_statuses
        .iter()
        .flatten()
        .any(|s| s.name == DRIVER_CONTAINER_NAME && s.ready)
}

/// Service readiness: the service object has been observed at all.
pub fn service_observed(action: WatchAction, _service: &Service) -> bool {
    matches!(action, WatchAction::Added | WatchAction::Modified)
}

/// Endpoints readiness: some subset carries a non-empty address list.
pub fn endpoints_populated(action: WatchAction, endpoints: &Endpoints) -> bool {
    if !matches!(action, WatchAction::Added | WatchAction::Modified) {
        return false;
    }
    endpoints
        .subsets
        .iter()
        .flatten()
        .any(|subset| subset.addresses.as_ref().is_some_and(|a| !a.is_empty()))
}

/// Ingress readiness: the load balancer has published at least one ingress
/// point.
pub fn ingress_has_load_balancer(action: WatchAction, ingress: &Ingress) -> bool {
    if !matches!(action, WatchAction::Added | WatchAction::Modified) {
        return false;
    }
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|points| !points.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerStatus, EndpointAddress, EndpointSubset, PodStatus,
    };
    use k8s_openapi::api::networking::v1::{
        IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
    };

    fn pod_with(phase: &str, container: &str, ready: bool) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: container.to_string(),
                    ready,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn endpoints_with_addresses(count: usize) -> Endpoints {
        let addresses: Vec<EndpointAddress> = (0..count)
            .map(|i| EndpointAddress {
                ip: format!("10.0.0.{}", i + 1),
                ..Default::default()
            })
            .collect();
        Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: (!addresses.is_empty()).then_some(addresses),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn slot_resolves_exactly_once() {
        let (slot, mut rx) = ReadySlot::channel();
        assert!(!slot.is_resolved());
        assert!(slot.resolve(1));
        assert!(slot.is_resolved());
        assert!(!slot.resolve(2));
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn pod_predicate_requires_running_phase_and_ready_driver_container() {
        let pending = pod_with("Pending", DRIVER_CONTAINER_NAME, true);
        assert!(!pod_running_and_ready(WatchAction::Modified, &pending));

        let not_ready = pod_with("Running", DRIVER_CONTAINER_NAME, false);
        assert!(!pod_running_and_ready(WatchAction::Modified, &not_ready));

        let other_container = pod_with("Running", "sidecar", true);
        assert!(!pod_running_and_ready(WatchAction::Modified, &other_container));

        let ready = pod_with("Running", DRIVER_CONTAINER_NAME, true);
        assert!(pod_running_and_ready(WatchAction::Added, &ready));
        assert!(pod_running_and_ready(WatchAction::Modified, &ready));
        assert!(!pod_running_and_ready(WatchAction::Deleted, &ready));
    }

    #[test]
    fn container_ready_flip_resolves_after_initial_miss() {
        let (slot, mut rx) = ReadySlot::channel();
        let watcher = ReadinessWatcher::new("pod", pod_running_and_ready, slot);

        watcher.on_event(
            WatchAction::Modified,
            pod_with("Running", DRIVER_CONTAINER_NAME, false),
        );
        assert!(rx.try_recv().is_err());

        watcher.on_event(
            WatchAction::Modified,
            pod_with("Running", DRIVER_CONTAINER_NAME, true),
        );
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn resolution_is_monotonic() {
        let (slot, mut rx) = ReadySlot::channel();
        let watcher = ReadinessWatcher::new("endpoints", endpoints_populated, slot);

        let first = endpoints_with_addresses(1);
        let second = endpoints_with_addresses(2);
        watcher.on_event(WatchAction::Added, first);
        watcher.on_event(WatchAction::Modified, second);

        let resolved = rx.try_recv().unwrap();
        let subset = &resolved.subsets.unwrap()[0];
        assert_eq!(subset.addresses.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn service_predicate_accepts_any_added_or_modified() {
        let svc = Service::default();
        assert!(service_observed(WatchAction::Added, &svc));
        assert!(service_observed(WatchAction::Modified, &svc));
        assert!(!service_observed(WatchAction::Deleted, &svc));
    }

    #[test]
    fn endpoints_predicate_requires_a_populated_subset() {
        // Added with no addresses does not count as ready
        assert!(!endpoints_populated(
            WatchAction::Added,
            &Endpoints::default()
        ));
        assert!(!endpoints_populated(
            WatchAction::Added,
            &endpoints_with_addresses(0)
        ));
        assert!(endpoints_populated(
            WatchAction::Added,
            &endpoints_with_addresses(1)
        ));
        assert!(endpoints_populated(
            WatchAction::Modified,
            &endpoints_with_addresses(1)
        ));
    }

    #[test]
    fn ingress_predicate_requires_a_load_balancer_ingress_point() {
        let bare = Ingress::default();
        assert!(!ingress_has_load_balancer(WatchAction::Added, &bare));

        let ready = Ingress {
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![IngressLoadBalancerIngress {
                        ip: Some("203.0.113.9".to_string()),
                        ..Default::default()
                    }]),
                }),
            }),
            ..Default::default()
        };
        assert!(ingress_has_load_balancer(WatchAction::Modified, &ready));
    }

    #[test]
    fn close_records_cause_without_resolving() {
        let (slot, mut rx) = ReadySlot::channel();
        let watcher: ReadinessWatcher<Service> =
            ReadinessWatcher::new("service", service_observed, slot);

        watcher.on_close(Some("stream reset".to_string()));
        assert_eq!(watcher.close_cause().as_deref(), Some("stream reset"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watcher_still_resolves_after_a_stream_closure() {
        // A watch window ending must not consume the promise; the next
        // window's events still count.
        let (slot, mut rx) = ReadySlot::channel();
        let watcher = ReadinessWatcher::new("pod", pod_running_and_ready, slot);

        watcher.on_close(Some("watch window expired".to_string()));
        assert!(!watcher.is_resolved());

        watcher.on_event(
            WatchAction::Added,
            pod_with("Running", DRIVER_CONTAINER_NAME, true),
        );
        assert!(watcher.is_resolved());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn await_ready_times_out_when_unresolved() {
        let (_slot, rx) = ReadySlot::<Service>::channel();
        let outcome = await_ready(rx, Duration::from_millis(10)).await;
        assert!(matches!(outcome, AwaitOutcome::TimedOut));
    }

    #[tokio::test]
    async fn await_ready_reports_closed_when_the_watcher_is_dropped() {
        let (slot, rx) = ReadySlot::<Service>::channel();
        drop(slot);
        let outcome = await_ready(rx, Duration::from_secs(1)).await;
        assert!(matches!(outcome, AwaitOutcome::Closed));
    }

    #[tokio::test]
    async fn await_ready_yields_the_resolved_object() {
        let (slot, rx) = ReadySlot::channel();
        let watcher = ReadinessWatcher::new("pod", pod_running_and_ready, slot);
        watcher.on_event(
            WatchAction::Modified,
            pod_with("Running", DRIVER_CONTAINER_NAME, true),
        );
        let outcome = await_ready(rx, Duration::from_secs(1)).await;
        assert!(matches!(outcome, AwaitOutcome::Ready(_)));
    }
}
