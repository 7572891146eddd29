//! Registry of created Kubernetes resources
//!
//! The orchestrator registers every object it creates here. Long-lived
//! objects are unregistered once the submission succeeds; whatever is still
//! registered when the run ends gets deleted, which makes failure cleanup and
//! success-path secret removal the same operation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;

use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams};
use kube::Client;
use tracing::{debug, warn};

/// Kind of a registered resource, for delete dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    /// A `v1/Secret`
    Secret,
    /// A `v1/Pod`
    Pod,
    /// A `v1/Service`
    Service,
    /// A `networking.k8s.io/v1/Ingress`
    Ingress,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Secret => "secret",
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
        };
        f.write_str(s)
    }
}

/// In-memory registry of resources created during one submission.
///
/// Thread-safe; scoped to a single orchestrator invocation.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: Mutex<BTreeSet<(ResourceKind, String)>>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource, or re-register it under the same kind and name.
    /// Idempotent.
    pub fn register_or_update(&self, kind: ResourceKind, name: &str) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.insert((kind, name.to_string()));
    }

    /// Remove a resource from the registry without deleting it from the
    /// cluster, keeping it alive past the end of the run.
    pub fn unregister(&self, kind: ResourceKind, name: &str) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.remove(&(kind, name.to_string()));
    }

    /// Current entries, for inspection
    pub fn registered(&self) -> Vec<(ResourceKind, String)> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.iter().cloned().collect()
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry lock poisoned").len()
    }

    /// Whether the registry holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every registered resource from the cluster, best-effort.
    ///
    /// Individual delete failures are logged and swallowed; the registry is
    /// drained regardless. Never fails.
    pub async fn delete_all(&self, client: &Client, namespace: &str) {
        let entries: Vec<(ResourceKind, String)> = {
            let mut entries = self.entries.lock().expect("registry lock poisoned");
            std::mem::take(&mut *entries).into_iter().collect()
        };

        let dp = DeleteParams::default();
        for (kind, name) in entries {
            let result = match kind {
                ResourceKind::Secret => {
                    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
                    api.delete(&name, &dp).await.map(|_| ())
                }
                ResourceKind::Pod => {
                    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
                    api.delete(&name, &dp).await.map(|_| ())
                }
                ResourceKind::Service => {
                    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
                    api.delete(&name, &dp).await.map(|_| ())
                }
                ResourceKind::Ingress => {
                    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
                    api.delete(&name, &dp).await.map(|_| ())
                }
            };
            match result {
                Ok(()) => debug!(%kind, %name, "Deleted resource"),
                Err(e) => warn!(%kind, %name, error = %e, "Failed to delete resource"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = ResourceRegistry::new();
        registry.register_or_update(ResourceKind::Secret, "submission-app-secret-spark-1");
        registry.register_or_update(ResourceKind::Secret, "submission-app-secret-spark-1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_name_under_different_kinds_are_distinct_entries() {
        let registry = ResourceRegistry::new();
        registry.register_or_update(ResourceKind::Pod, "spark-1");
        registry.register_or_update(ResourceKind::Service, "spark-1");
        registry.register_or_update(ResourceKind::Ingress, "spark-1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unregister_keeps_other_entries() {
        let registry = ResourceRegistry::new();
        registry.register_or_update(ResourceKind::Pod, "spark-1");
        registry.register_or_update(ResourceKind::Service, "spark-1");
        registry.register_or_update(ResourceKind::Secret, "submission-app-secret-spark-1");

        registry.unregister(ResourceKind::Pod, "spark-1");
        registry.unregister(ResourceKind::Service, "spark-1");

        let remaining = registry.registered();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, ResourceKind::Secret);
    }

    #[test]
    fn unregister_of_unknown_entry_is_a_no_op() {
        let registry = ResourceRegistry::new();
        registry.unregister(ResourceKind::Ingress, "never-registered");
        assert!(registry.is_empty());
    }
}
