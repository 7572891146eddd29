//! Submission configuration
//!
//! Everything the orchestrator needs to know, assembled by the CLI layer and
//! read-only from then on. Arbitrary user properties are forwarded verbatim
//! to the driver in the submission payload.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BLOCK_MANAGER_PORT, DEFAULT_DRIVER_PORT, DEFAULT_DRIVER_SUBMIT_TIMEOUT_SECS,
    DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_UI_PORT,
};

/// Configuration for one driver submission
#[derive(Clone, Debug)]
pub struct SubmitConfig {
    /// Raw master string, `k8s://` prefixed
    pub master: String,
    /// Namespace all driver resources are created in
    pub namespace: String,
    /// User-visible application name; lowercased into the app id
    pub app_name: String,
    /// Docker image the driver container runs
    pub driver_docker_image: String,
    /// Service account assigned to the driver pod
    pub service_account: String,
    /// Raw custom driver labels, CSV of `key=value` tokens
    pub driver_labels: Option<String>,
    /// Main application resource: local path, `file://`, `local://`, or a
    /// remote URI
    pub main_app_resource: String,
    /// Main entry-point reference passed to the driver
    pub main_class: String,
    /// Application arguments forwarded verbatim
    pub app_args: Vec<String>,
    /// Submitter-local auxiliary files uploaded alongside the application
    pub files: Vec<PathBuf>,
    /// Submitter-local jars uploaded alongside the application
    pub jars: Vec<PathBuf>,
    /// Driver UI port
    pub ui_port: i32,
    /// Driver RPC port
    pub driver_port: i32,
    /// Block manager port
    pub blockmanager_port: i32,
    /// CA certificate the cluster API client trusts, if any
    pub ca_cert_file: Option<PathBuf>,
    /// Client key authenticating to the cluster API, if any
    pub client_key_file: Option<PathBuf>,
    /// Client certificate authenticating to the cluster API, if any
    pub client_cert_file: Option<PathBuf>,
    /// How long to wait for the driver to become submittable
    pub driver_submit_timeout_secs: u64,
    /// Route submissions through an Ingress instead of node ports
    pub expose_ingress: bool,
    /// External base path of the ingress controller, e.g. `edge.example/spark`
    pub ingress_base_path: Option<String>,
    /// Block until the driver pod reaches a terminal phase
    pub wait_for_app_completion: bool,
    /// Interval between pod phase reports while waiting
    pub report_interval_secs: u64,
    /// Arbitrary properties forwarded verbatim to the driver
    pub properties: BTreeMap<String, String>,
    /// Serve the driver over HTTPS and verify it from the client
    pub driver_ssl_enabled: bool,
    /// PEM certificate the driver serves, when SSL is enabled
    pub driver_ssl_cert_pem: Option<PathBuf>,
    /// PEM private key for the driver certificate, when SSL is enabled
    pub driver_ssl_key_pem: Option<PathBuf>,
    /// PEM trust root the RPC client verifies the driver against
    pub client_trust_cert_pem: Option<PathBuf>,
    /// PEM identity (cert + key) the RPC client presents, if any
    pub client_identity_pem: Option<PathBuf>,
}

impl SubmitConfig {
    /// Readiness timeout as a [`Duration`]
    pub fn driver_submit_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_submit_timeout_secs)
    }

    /// Pod phase report interval as a [`Duration`]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            master: String::new(),
            namespace: "default".to_string(),
            app_name: "spark".to_string(),
            driver_docker_image: "spark-driver:latest".to_string(),
            service_account: "default".to_string(),
            driver_labels: None,
            main_app_resource: String::new(),
            main_class: String::new(),
            app_args: Vec::new(),
            files: Vec::new(),
            jars: Vec::new(),
            ui_port: DEFAULT_UI_PORT,
            driver_port: DEFAULT_DRIVER_PORT,
            blockmanager_port: DEFAULT_BLOCK_MANAGER_PORT,
            ca_cert_file: None,
            client_key_file: None,
            client_cert_file: None,
            driver_submit_timeout_secs: DEFAULT_DRIVER_SUBMIT_TIMEOUT_SECS,
            expose_ingress: false,
            ingress_base_path: None,
            wait_for_app_completion: true,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            properties: BTreeMap::new(),
            driver_ssl_enabled: false,
            driver_ssl_cert_pem: None,
            driver_ssl_key_pem: None,
            client_trust_cert_pem: None,
            client_identity_pem: None,
        }
    }
}
