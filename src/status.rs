//! Driver pod phase monitoring and timeout diagnostics
//!
//! A dedicated watch follows the driver pod through its lifecycle: phase
//! transitions are logged as they happen, the current phase is re-reported on
//! an interval while the caller waits for completion, and a latch resolves
//! with the final pod once a terminal phase is reached. The watch re-lists
//! and restarts across server-side window closures, since the driver may run
//! for far longer than any single watch window.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::constants::DRIVER_CONTAINER_NAME;
use crate::readiness::{ReadySlot, WatchGuard};

/// Whether a pod phase is terminal
pub fn is_terminal_phase(phase: &str) -> bool {
    phase == "Succeeded" || phase == "Failed"
}

/// Phase of a pod, or "unknown" when unreported
fn phase_of(pod: &Pod) -> String {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Start watching the driver pod.
///
/// Returns a guard scoping the watch and a latch that resolves with the pod
/// once it reaches a terminal phase (or is deleted out from under us). The
/// underlying watch re-lists and restarts on every closure, so the latch
/// stays live for as long as the driver runs. When `report_interval` is set,
/// the current phase is logged on that cadence.
pub fn spawn_pod_monitor(
    api: Api<Pod>,
    pod_name: &str,
    report_interval: Option<Duration>,
) -> (WatchGuard, oneshot::Receiver<Pod>) {
    let (slot, rx) = ReadySlot::channel();
    let name = pod_name.to_string();

    let handle = tokio::spawn(async move {
        monitor_loop(api, name, report_interval, slot).await;
    });
    (WatchGuard::from_handle(handle), rx)
}

async fn monitor_loop(
    api: Api<Pod>,
    name: String,
    report_interval: Option<Duration>,
    latch: Arc<ReadySlot<Pod>>,
) {
    let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
    let stream = watcher::watcher(api, config);
    let mut stream = pin!(stream);

    let report = report_interval.is_some();
    let mut ticker =
        tokio::time::interval(report_interval.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first tick fires immediately; skip it

    let mut last_phase: Option<String> = None;
    loop {
        tokio::select! {
            event = stream.next() => {
                match event {
                    Some(Ok(Event::Apply(pod) | Event::InitApply(pod))) => {
                        let phase = phase_of(&pod);
                        if last_phase.as_deref() != Some(phase.as_str()) {
                            info!(pod = %name, %phase, "Driver pod phase changed");
                            last_phase = Some(phase.clone());
                        }
                        if is_terminal_phase(&phase) {
                            latch.resolve(pod);
                            return;
                        }
                    }
                    Some(Ok(Event::Delete(pod))) => {
                        info!(pod = %name, "Driver pod was deleted");
                        latch.resolve(pod);
                        return;
                    }
                    Some(Ok(Event::Init | Event::InitDone)) => {}
                    Some(Err(e)) => {
                        warn!(pod = %name, error = %e, "Pod status watch error, will retry");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    None => {
                        warn!(pod = %name, "Pod status stream ended");
                        return;
                    }
                }
            }
            _ = ticker.tick(), if report => {
                info!(
                    pod = %name,
                    phase = last_phase.as_deref().unwrap_or("unknown"),
                    "Driver pod status report"
                );
            }
        }
    }
}

/// Build the multi-line diagnostic block for a driver pod that missed its
/// readiness timeout.
///
/// `pod` is the state fetched after the timeout, if the fetch succeeded.
pub fn pod_not_ready_message(
    pod_name: &str,
    namespace: &str,
    timeout_secs: u64,
    pod: Option<&Pod>,
) -> String {
    let mut lines = vec![format!(
        "The driver pod {} in namespace {} was not ready in {} seconds.",
        pod_name, namespace, timeout_secs
    )];

    let status = pod.and_then(|p| p.status.as_ref());
    match status.and_then(|s| s.phase.as_deref()) {
        Some(phase) => lines.push(format!("The final phase of the pod was: {}", phase)),
        None => lines.push("The pod had no final phase.".to_string()),
    }
    match status.and_then(|s| s.message.as_deref()) {
        Some(message) => lines.push(format!("The final message from the pod was: {}", message)),
        None => lines.push("The pod had no final message.".to_string()),
    }

    let container = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|s| s.name == DRIVER_CONTAINER_NAME));
    match container.and_then(|c| c.state.as_ref()) {
        Some(state) => {
            if let Some(running) = &state.running {
                let since = running
                    .started_at
                    .as_ref()
                    .map(|t| t.0.to_rfc3339())
                    .unwrap_or_else(|| "an unknown time".to_string());
                lines.push(format!(
                    "The driver container's last state was Running, started at {}.",
                    since
                ));
            } else if let Some(waiting) = &state.waiting {
                lines.push(format!(
                    "The driver container's last state was Waiting: reason {}, message {}.",
                    waiting.reason.as_deref().unwrap_or("unknown"),
                    waiting.message.as_deref().unwrap_or("none")
                ));
            } else if let Some(terminated) = &state.terminated {
                let finished = terminated
                    .finished_at
                    .as_ref()
                    .map(|t| t.0.to_rfc3339())
                    .unwrap_or_else(|| "an unknown time".to_string());
                lines.push(format!(
                    "The driver container's last state was Terminated at {} with exit code {}: reason {}, message {}.",
                    finished,
                    terminated.exit_code,
                    terminated.reason.as_deref().unwrap_or("unknown"),
                    terminated.message.as_deref().unwrap_or("none")
                ));
            } else {
                lines.push("The driver container wasn't found in pod.".to_string());
            }
        }
        None => lines.push("The driver container wasn't found in pod.".to_string()),
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus,
        PodStatus,
    };

    #[test]
    fn terminal_phases_are_succeeded_and_failed() {
        assert!(is_terminal_phase("Succeeded"));
        assert!(is_terminal_phase("Failed"));
        assert!(!is_terminal_phase("Running"));
        assert!(!is_terminal_phase("Pending"));
    }

    #[test]
    fn message_without_a_pod_reports_missing_everything() {
        let message = pod_not_ready_message("spark-17", "default", 60, None);
        assert!(message.contains("spark-17"));
        assert!(message.contains("default"));
        assert!(message.contains("was not ready in 60 seconds"));
        assert!(message.contains("The pod had no final phase."));
        assert!(message.contains("The pod had no final message."));
        assert!(message.contains("container wasn't found in pod"));
    }

    #[test]
    fn message_reports_the_latest_phase_and_waiting_state() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                message: Some("unschedulable".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: DRIVER_CONTAINER_NAME.to_string(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("ImagePullBackOff".to_string()),
                            message: Some("image not found".to_string()),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let message = pod_not_ready_message("spark-17", "default", 30, Some(&pod));
        assert!(message.contains("The final phase of the pod was: Pending"));
        assert!(message.contains("unschedulable"));
        assert!(message.contains("Waiting"));
        assert!(message.contains("ImagePullBackOff"));
    }

    #[test]
    fn message_reports_a_terminated_container_with_exit_code() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Failed".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: DRIVER_CONTAINER_NAME.to_string(),
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 137,
                            reason: Some("OOMKilled".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let message = pod_not_ready_message("spark-17", "default", 30, Some(&pod));
        assert!(message.contains("Terminated"));
        assert!(message.contains("exit code 137"));
        assert!(message.contains("OOMKilled"));
    }

    #[test]
    fn message_notes_when_another_container_is_the_only_one_present() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "sidecar".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let message = pod_not_ready_message("spark-17", "default", 30, Some(&pod));
        assert!(message.contains("container wasn't found in pod"));
    }
}
