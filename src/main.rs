//! spark-submit - launch a Spark driver into a Kubernetes cluster

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spark_submit::config::SubmitConfig;
use spark_submit::constants::{
    DEFAULT_BLOCK_MANAGER_PORT, DEFAULT_DRIVER_PORT, DEFAULT_DRIVER_SUBMIT_TIMEOUT_SECS,
    DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_UI_PORT,
};
use spark_submit::orchestrator::Orchestrator;

/// Launch a driver into a Kubernetes cluster and hand it the local
/// application payload
#[derive(Parser, Debug)]
#[command(name = "spark-submit", version, about, long_about = None)]
struct Cli {
    /// Main application resource: local path, file://, local://, or a remote URI
    main_app_resource: String,

    /// Main entry-point reference passed to the driver
    main_class: String,

    /// Application arguments, forwarded verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    app_args: Vec<String>,

    /// Cluster master, k8s:// prefixed
    #[arg(long, env = "SPARK_MASTER")]
    master: String,

    /// Namespace driver resources are created in
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Application name; lowercased into the app id
    #[arg(long, default_value = "spark")]
    app_name: String,

    /// Driver container image
    #[arg(long, default_value = "spark-driver:latest")]
    driver_docker_image: String,

    /// Service account assigned to the driver pod
    #[arg(long, default_value = "default")]
    service_account: String,

    /// Custom driver labels as k1=v1,k2=v2
    #[arg(long)]
    driver_labels: Option<String>,

    /// Submitter-local file uploaded alongside the application (repeatable)
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Submitter-local jar uploaded alongside the application (repeatable)
    #[arg(long = "jar")]
    jars: Vec<PathBuf>,

    /// Driver UI port
    #[arg(long, default_value_t = DEFAULT_UI_PORT)]
    ui_port: i32,

    /// Driver RPC port
    #[arg(long, default_value_t = DEFAULT_DRIVER_PORT)]
    driver_port: i32,

    /// Block manager port
    #[arg(long, default_value_t = DEFAULT_BLOCK_MANAGER_PORT)]
    blockmanager_port: i32,

    /// CA certificate the cluster API client trusts
    #[arg(long)]
    ca_cert_file: Option<PathBuf>,

    /// Client key authenticating to the cluster API
    #[arg(long)]
    client_key_file: Option<PathBuf>,

    /// Client certificate authenticating to the cluster API
    #[arg(long)]
    client_cert_file: Option<PathBuf>,

    /// How long to wait for the driver to become submittable, in seconds
    #[arg(long, default_value_t = DEFAULT_DRIVER_SUBMIT_TIMEOUT_SECS)]
    driver_submit_timeout_secs: u64,

    /// Route submissions through an Ingress instead of node ports
    #[arg(long)]
    expose_ingress: bool,

    /// External base path of the ingress controller, e.g. edge.example/spark
    #[arg(long)]
    ingress_base_path: Option<String>,

    /// Block until the driver pod reaches a terminal phase
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    wait_for_app_completion: bool,

    /// Seconds between pod phase reports while waiting for completion
    #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL_SECS)]
    report_interval_secs: u64,

    /// Arbitrary property forwarded verbatim to the driver (repeatable)
    #[arg(long = "conf", value_parser = parse_key_val)]
    conf: Vec<(String, String)>,

    /// Serve the driver over HTTPS and verify it from the client
    #[arg(long)]
    driver_ssl_enabled: bool,

    /// PEM certificate the driver serves
    #[arg(long)]
    driver_ssl_cert_pem: Option<PathBuf>,

    /// PEM private key for the driver certificate
    #[arg(long)]
    driver_ssl_key_pem: Option<PathBuf>,

    /// PEM trust root the RPC client verifies the driver against
    #[arg(long)]
    client_trust_cert_pem: Option<PathBuf>,

    /// PEM identity (cert + key) the RPC client presents
    #[arg(long)]
    client_identity_pem: Option<PathBuf>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", s))
}

impl Cli {
    fn into_config(self) -> SubmitConfig {
        SubmitConfig {
            master: self.master,
            namespace: self.namespace,
            app_name: self.app_name,
            driver_docker_image: self.driver_docker_image,
            service_account: self.service_account,
            driver_labels: self.driver_labels,
            main_app_resource: self.main_app_resource,
            main_class: self.main_class,
            app_args: self.app_args,
            files: self.files,
            jars: self.jars,
            ui_port: self.ui_port,
            driver_port: self.driver_port,
            blockmanager_port: self.blockmanager_port,
            ca_cert_file: self.ca_cert_file,
            client_key_file: self.client_key_file,
            client_cert_file: self.client_cert_file,
            driver_submit_timeout_secs: self.driver_submit_timeout_secs,
            expose_ingress: self.expose_ingress,
            ingress_base_path: self.ingress_base_path,
            wait_for_app_completion: self.wait_for_app_completion,
            report_interval_secs: self.report_interval_secs,
            properties: self.conf.into_iter().collect::<BTreeMap<_, _>>(),
            driver_ssl_enabled: self.driver_ssl_enabled,
            driver_ssl_cert_pem: self.driver_ssl_cert_pem,
            driver_ssl_key_pem: self.driver_ssl_key_pem,
            client_trust_cert_pem: self.client_trust_cert_pem,
            client_identity_pem: self.client_identity_pem,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let orchestrator = Orchestrator::new(cli.into_config());
    info!(app_id = %orchestrator.app_id(), "Starting submission");

    match orchestrator.run().await {
        Ok(outcome) => {
            info!(?outcome, "Submission finished");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            error!(error = %e, "Submission failed");
            ExitCode::FAILURE
        }
    }
}
