//! The provisioning state machine
//!
//! One orchestrator instance performs one submission: it validates inputs,
//! builds the cluster client, creates the driver's resources in dependency
//! order, gates on readiness through watch streams, adopts everything under
//! the driver pod, hands the payload to the in-pod submission server, and
//! finally deletes whatever is still registered. Cleanup runs on every exit
//! path; after a successful hand-off only the one-time secrets remain
//! registered, so the same final sweep serves success and abort alike.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use k8s_openapi::api::core::v1::{Endpoints, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{info, warn};

use crate::components::{self, DriverPodParams};
use crate::config::SubmitConfig;
use crate::constants::{
    SUBMISSION_CLIENT_CONNECT_TIMEOUT_MS, SUBMISSION_CLIENT_RETRIES_INGRESS,
    SUBMISSION_CLIENT_RETRIES_NODE_PORT,
};
use crate::endpoints;
use crate::labels;
use crate::master;
use crate::readiness::{self, await_ready, AwaitOutcome, ReadinessWatcher, ReadySlot};
use crate::registry::{ResourceKind, ResourceRegistry};
use crate::rpc::{HttpClientFactory, HttpClientParams, ReqwestClientFactory};
use crate::ssl::{FileSslProvider, SslBundle, SslConfigurationProvider};
use crate::status;
use crate::submission;
use crate::{Error, Result};

/// How a successful run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The driver accepted the payload; the client did not wait for it to
    /// finish
    Launched,
    /// The driver pod reached a terminal phase while the client waited
    Completed {
        /// The terminal phase, `Succeeded` or `Failed`
        phase: String,
    },
}

impl LaunchOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchOutcome::Launched => 0,
            LaunchOutcome::Completed { phase } if phase == "Succeeded" => 0,
            LaunchOutcome::Completed { .. } => 1,
        }
    }
}

/// Inputs resolved during validation
#[derive(Debug)]
struct ValidatedPlan {
    master_url: String,
    selectors: BTreeMap<String, String>,
}

/// Drives one submission end to end
pub struct Orchestrator {
    config: SubmitConfig,
    app_id: String,
    ssl_provider: Box<dyn SslConfigurationProvider>,
    client_factory: Box<dyn HttpClientFactory>,
}

impl Orchestrator {
    /// Create an orchestrator with the default collaborators. The app id is
    /// fixed at construction from the app name and the current time.
    pub fn new(config: SubmitConfig) -> Self {
        let launch_time_millis = chrono::Utc::now().timestamp_millis() as u64;
        let app_id = components::app_id(&config.app_name, launch_time_millis);
        let ssl_provider = Box::new(FileSslProvider::from_config(&config));
        Self {
            config,
            app_id,
            ssl_provider,
            client_factory: Box::new(ReqwestClientFactory),
        }
    }

    /// Replace the SSL provider and RPC client factory
    pub fn with_collaborators(
        mut self,
        ssl_provider: Box<dyn SslConfigurationProvider>,
        client_factory: Box<dyn HttpClientFactory>,
    ) -> Self {
        self.ssl_provider = ssl_provider;
        self.client_factory = client_factory;
        self
    }

    /// The unique id of this submission; also the name of the driver Pod,
    /// Service, and Ingress
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Run the full submission.
    pub async fn run(&self) -> Result<LaunchOutcome> {
        let plan = self.validate()?;
        let client = self.build_client(&plan.master_url).await?;
        let registry = ResourceRegistry::new();

        let outcome = self.provision(&client, &registry, &plan).await;
        if outcome.is_err() {
            info!(phase = "abort", "Tearing down partially created resources");
        }
        registry.delete_all(&client, &self.config.namespace).await;
        outcome
    }

    /// Pre-flight checks; no cluster calls are made before this passes.
    fn validate(&self) -> Result<ValidatedPlan> {
        let master_url = master::resolve_master_url(&self.config.master)?;
        let custom = labels::parse_custom_labels(self.config.driver_labels.as_deref())?;
        let selectors = labels::driver_selectors(&self.app_id, &self.config.app_name, &custom);

        if self.config.expose_ingress && self.config.ingress_base_path.is_none() {
            return Err(Error::MissingIngressBasePath);
        }

        for path in self.config.files.iter().chain(self.config.jars.iter()) {
            require_regular_file(path)?;
        }
        if let Some(path) = submitter_local_main(&self.config.main_app_resource) {
            require_regular_file(&path)?;
        }

        info!(
            phase = "validate",
            app_id = %self.app_id,
            master = %master_url,
            "Submission inputs validated"
        );
        Ok(ValidatedPlan {
            master_url,
            selectors,
        })
    }

    /// Build the cluster API client from an in-memory kubeconfig carrying
    /// the resolved master, the namespace, and any credential paths.
    async fn build_client(&self, master_url: &str) -> Result<Client> {
        let mut cluster = serde_json::json!({ "server": master_url });
        if let Some(ca) = &self.config.ca_cert_file {
            cluster["certificate-authority"] =
                serde_json::json!(ca.to_string_lossy().into_owned());
        }
        let mut user = serde_json::json!({});
        if let Some(cert) = &self.config.client_cert_file {
            user["client-certificate"] = serde_json::json!(cert.to_string_lossy().into_owned());
        }
        if let Some(key) = &self.config.client_key_file {
            user["client-key"] = serde_json::json!(key.to_string_lossy().into_owned());
        }

        let kubeconfig: Kubeconfig = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": "submit-target", "cluster": cluster }],
            "users": [{ "name": "submitter", "user": user }],
            "contexts": [{
                "name": "submit",
                "context": {
                    "cluster": "submit-target",
                    "user": "submitter",
                    "namespace": self.config.namespace,
                },
            }],
            "current-context": "submit",
        }))
        .map_err(|e| Error::client_config(e.to_string()))?;

        let kube_config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::client_config(e.to_string()))?;
        Ok(Client::try_from(kube_config)?)
    }

    /// Steps between client bootstrap and the optional completion wait.
    /// Everything created here is registered; the caller sweeps the registry
    /// afterwards no matter how this returns.
    async fn provision(
        &self,
        client: &Client,
        registry: &ResourceRegistry,
        plan: &ValidatedPlan,
    ) -> Result<LaunchOutcome> {
        let ns = self.config.namespace.as_str();
        let app_id = self.app_id.as_str();
        let timeout = self.config.driver_submit_timeout();
        let timeout_secs = self.config.driver_submit_timeout_secs;
        let pp = PostParams::default();

        let secrets_api: Api<Secret> = Api::namespaced(client.clone(), ns);
        let services_api: Api<Service> = Api::namespaced(client.clone(), ns);
        let pods_api: Api<Pod> = Api::namespaced(client.clone(), ns);
        let endpoints_api: Api<Endpoints> = Api::namespaced(client.clone(), ns);
        let ingresses_api: Api<Ingress> = Api::namespaced(client.clone(), ns);

        // Submission secret first; the pod mounts it.
        info!(phase = "secret", "Creating submission secret");
        let generated = components::submission_secret(app_id, ns, &plan.selectors);
        let secret_name = components::submission_secret_name(app_id);
        secrets_api.create(&pp, &generated.secret).await?;
        registry.register_or_update(ResourceKind::Secret, &secret_name);

        info!(phase = "ssl", "Requesting TLS material");
        let ssl = self.ssl_provider.bundle(app_id, ns, &plan.selectors)?;
        let mut ssl_secret_names = Vec::new();
        for secret in &ssl.secrets {
            let name = secret
                .metadata
                .name
                .clone()
                .ok_or_else(|| Error::ssl("ssl provider produced a secret without a name"))?;
            secrets_api.create(&pp, secret).await?;
            registry.register_or_update(ResourceKind::Secret, &name);
            ssl_secret_names.push(name);
        }
        if !ssl.options.enabled {
            warn!("Submitting over plain HTTP; the driver endpoint will not be verified");
        }

        // Lifecycle watch: phase logging plus the completion latch.
        let report_interval = self
            .config
            .wait_for_app_completion
            .then(|| self.config.report_interval());
        let (_monitor_guard, completion_rx) =
            status::spawn_pod_monitor(pods_api.clone(), app_id, report_interval);

        // Readiness watchers are armed before anything they watch exists so
        // no event can be missed.
        info!(phase = "watchers", "Arming readiness watchers");
        let (pod_slot, pod_rx) = ReadySlot::channel();
        let _pod_watch = readiness::spawn_watch(
            pods_api.clone(),
            app_id,
            ReadinessWatcher::new("pod", readiness::pod_running_and_ready, pod_slot),
        );
        let (service_slot, service_rx) = ReadySlot::channel();
        let _service_watch = readiness::spawn_watch(
            services_api.clone(),
            app_id,
            ReadinessWatcher::new("service", readiness::service_observed, service_slot),
        );
        let (endpoints_slot, endpoints_rx) = ReadySlot::channel();
        let _endpoints_watch = readiness::spawn_watch(
            endpoints_api.clone(),
            app_id,
            ReadinessWatcher::new("endpoints", readiness::endpoints_populated, endpoints_slot),
        );
        let mut ingress_rx = None;
        let _ingress_watch = self.config.expose_ingress.then(|| {
            let (slot, rx) = ReadySlot::channel();
            ingress_rx = Some(rx);
            readiness::spawn_watch(
                ingresses_api.clone(),
                app_id,
                ReadinessWatcher::new("ingress", readiness::ingress_has_load_balancer, slot),
            )
        });

        // Service before Pod so the selector has something to match; Pod
        // before Ingress so the routes point at something real.
        info!(phase = "create", "Creating driver service");
        let service =
            components::driver_service(app_id, ns, &plan.selectors, self.config.expose_ingress);
        services_api.create(&pp, &service).await?;
        registry.register_or_update(ResourceKind::Service, app_id);

        info!(phase = "create", "Creating driver pod");
        let pod = components::driver_pod(&DriverPodParams {
            app_id,
            namespace: ns,
            selectors: &plan.selectors,
            image: &self.config.driver_docker_image,
            service_account: &self.config.service_account,
            driver_port: self.config.driver_port,
            blockmanager_port: self.config.blockmanager_port,
            ui_port: self.config.ui_port,
            submission_secret_name: &secret_name,
            ssl: &ssl,
        });
        pods_api.create(&pp, &pod).await?;
        registry.register_or_update(ResourceKind::Pod, app_id);

        if self.config.expose_ingress {
            info!(phase = "create", "Creating driver ingress");
            let ingress = components::driver_ingress(app_id, ns, &plan.selectors);
            ingresses_api.create(&pp, &ingress).await?;
            registry.register_or_update(ResourceKind::Ingress, app_id);
        }

        info!(phase = "readiness", timeout_secs, "Waiting for the driver pod");
        let ready_pod = match await_ready(pod_rx, timeout).await {
            AwaitOutcome::Ready(pod) => pod,
            AwaitOutcome::TimedOut | AwaitOutcome::Closed => {
                return Err(self.pod_timeout_error(&pods_api, timeout_secs).await);
            }
        };
        info!(phase = "readiness", "Waiting for the driver service");
        if !matches!(await_ready(service_rx, timeout).await, AwaitOutcome::Ready(_)) {
            return Err(Error::ServiceNotReady {
                name: app_id.to_string(),
                timeout_secs,
            });
        }
        info!(phase = "readiness", "Waiting for service endpoints");
        if !matches!(
            await_ready(endpoints_rx, timeout).await,
            AwaitOutcome::Ready(_)
        ) {
            return Err(Error::EndpointsNotReady {
                name: app_id.to_string(),
                timeout_secs,
            });
        }
        if let Some(rx) = ingress_rx {
            info!(phase = "readiness", "Waiting for the driver ingress");
            if !matches!(await_ready(rx, timeout).await, AwaitOutcome::Ready(_)) {
                return Err(Error::IngressNotReady {
                    name: app_id.to_string(),
                    timeout_secs,
                });
            }
        }

        // The pod exists and has a UID; everything else becomes its
        // dependent so deleting the driver garbage-collects the lot.
        info!(phase = "adopt", "Adopting created resources under the driver pod");
        let owner = components::driver_owner_reference(&ready_pod)
            .ok_or_else(|| Error::Internal("driver pod has no uid".to_string()))?;
        let owner_patch = Patch::Merge(serde_json::json!({
            "metadata": { "ownerReferences": [owner] }
        }));
        let patch_params = PatchParams::default();
        secrets_api
            .patch(&secret_name, &patch_params, &owner_patch)
            .await?;
        for name in &ssl_secret_names {
            secrets_api.patch(name, &patch_params, &owner_patch).await?;
        }
        services_api
            .patch(app_id, &patch_params, &owner_patch)
            .await?;
        if self.config.expose_ingress {
            ingresses_api
                .patch(app_id, &patch_params, &owner_patch)
                .await?;
        }

        info!(phase = "discover", "Discovering submission endpoints");
        let scheme = ssl.options.scheme();
        let current_service = services_api.get(app_id).await?;
        let urls = endpoints::discover_submission_urls(
            client,
            scheme,
            app_id,
            self.config.ingress_base_path.as_deref(),
            &current_service,
        )
        .await?;

        info!(phase = "rpc", candidates = urls.len(), "Building submission client");
        let SslBundle {
            client_identity,
            client_trust,
            ..
        } = ssl;
        let retries = if self.config.expose_ingress {
            SUBMISSION_CLIENT_RETRIES_INGRESS
        } else {
            SUBMISSION_CLIENT_RETRIES_NODE_PORT
        };
        let rpc = self
            .client_factory
            .build(HttpClientParams {
                base_urls: urls,
                max_retries_per_server: retries,
                connect_timeout: Duration::from_millis(SUBMISSION_CLIENT_CONNECT_TIMEOUT_MS),
                identity: client_identity,
                trust_root: client_trust,
            })
            .await?;

        info!(phase = "ping", "Pinging the submission server");
        tokio::time::timeout(timeout, rpc.ping())
            .await
            .map_err(|_| {
                Error::submission_rpc(format!(
                    "submission server did not answer a ping in {} seconds",
                    timeout_secs
                ))
            })??;

        info!(phase = "submit", "Uploading application payload");
        let request = submission::build_submission_request(&self.config, &generated.token)?;
        rpc.submit_application(&request).await?;

        // The submission port has served its purpose; keep only the UI
        // reachable for the rest of the driver's life.
        info!(phase = "rewrite", "Rewriting driver service for UI-only access");
        let latest = services_api.get(app_id).await?;
        let rewritten = components::ui_only_service(&latest, self.config.ui_port);
        services_api.replace(app_id, &pp, &rewritten).await?;

        // Long-lived resources leave the registry and survive the final
        // sweep; the one-time secrets stay behind and get deleted.
        registry.unregister(ResourceKind::Pod, app_id);
        registry.unregister(ResourceKind::Service, app_id);
        registry.unregister(ResourceKind::Ingress, app_id);
        info!(phase = "persist", "Driver resources handed over to the cluster");

        if !self.config.wait_for_app_completion {
            return Ok(LaunchOutcome::Launched);
        }

        info!(phase = "wait", "Waiting for the driver pod to terminate");
        match completion_rx.await {
            Ok(pod) => {
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                info!(%phase, "Driver pod terminated");
                Ok(LaunchOutcome::Completed { phase })
            }
            Err(_) => Err(Error::Internal(
                "pod status watch ended before the driver terminated".to_string(),
            )),
        }
    }

    /// Turn a pod readiness timeout into its diagnostic error.
    async fn pod_timeout_error(&self, pods_api: &Api<Pod>, timeout_secs: u64) -> Error {
        let timeout_desc = format!(
            "driver pod {} was not ready in {} seconds",
            self.app_id, timeout_secs
        );
        match pods_api.get(&self.app_id).await {
            Ok(pod) => Error::PodNotReady(status::pod_not_ready_message(
                &self.app_id,
                &self.config.namespace,
                timeout_secs,
                Some(&pod),
            )),
            Err(e) => Error::DiagnosticFetchFailed {
                timeout: timeout_desc,
                source: e,
            },
        }
    }
}

/// The main resource path when it refers to a submitter-local file
fn submitter_local_main(raw: &str) -> Option<PathBuf> {
    match raw.split_once("://") {
        None => Some(PathBuf::from(raw)),
        Some(("file", rest)) => Some(PathBuf::from(rest)),
        Some(_) => None,
    }
}

fn require_regular_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::LocalFileMissing(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::APP_ID_LABEL;
    use std::fs;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "spark-submit-orchestrator-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"contents").unwrap();
        path
    }

    fn base_config() -> SubmitConfig {
        SubmitConfig {
            master: "k8s://cluster.example:6443".to_string(),
            main_app_resource: scratch_file("main.jar").to_string_lossy().into_owned(),
            main_class: "com.example.Main".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn exit_codes_follow_the_terminal_phase() {
        assert_eq!(LaunchOutcome::Launched.exit_code(), 0);
        assert_eq!(
            LaunchOutcome::Completed {
                phase: "Succeeded".to_string()
            }
            .exit_code(),
            0
        );
        assert_eq!(
            LaunchOutcome::Completed {
                phase: "Failed".to_string()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn app_id_is_stable_for_one_orchestrator() {
        let orchestrator = Orchestrator::new(base_config());
        assert_eq!(orchestrator.app_id(), orchestrator.app_id());
        assert!(orchestrator.app_id().starts_with("spark-"));
    }

    #[test]
    fn validation_resolves_master_and_selectors() {
        let orchestrator = Orchestrator::new(base_config());
        let plan = orchestrator.validate().unwrap();
        assert_eq!(plan.master_url, "https://cluster.example:6443");
        assert_eq!(
            plan.selectors.get(APP_ID_LABEL).map(String::as_str),
            Some(orchestrator.app_id())
        );
    }

    #[test]
    fn validation_rejects_ingress_mode_without_a_base_path() {
        let config = SubmitConfig {
            expose_ingress: true,
            ..base_config()
        };
        let err = Orchestrator::new(config).validate().unwrap_err();
        assert!(matches!(err, Error::MissingIngressBasePath));
    }

    #[test]
    fn validation_rejects_missing_local_files() {
        let config = SubmitConfig {
            files: vec![PathBuf::from("/nonexistent/extra.conf")],
            ..base_config()
        };
        let err = Orchestrator::new(config).validate().unwrap_err();
        assert!(matches!(err, Error::LocalFileMissing(_)));
    }

    #[test]
    fn validation_rejects_a_missing_main_resource() {
        let config = SubmitConfig {
            main_app_resource: "file:///nonexistent/main.jar".to_string(),
            ..base_config()
        };
        let err = Orchestrator::new(config).validate().unwrap_err();
        assert!(matches!(err, Error::LocalFileMissing(_)));
    }

    #[test]
    fn remote_main_resource_is_not_stat_checked() {
        let config = SubmitConfig {
            main_app_resource: "https://repo.example/app.jar".to_string(),
            ..base_config()
        };
        assert!(Orchestrator::new(config).validate().is_ok());
    }

    #[test]
    fn malformed_labels_fail_validation() {
        let config = SubmitConfig {
            driver_labels: Some("team=ads,bad".to_string()),
            ..base_config()
        };
        let err = Orchestrator::new(config).validate().unwrap_err();
        assert!(matches!(err, Error::MalformedLabel(_)));
    }
}
