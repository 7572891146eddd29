//! Error types for the submission client

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for submission operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The master URL did not carry the `k8s://` prefix
    #[error("invalid master URL {0:?}: expected the form k8s://host:port")]
    InvalidMasterUrl(String),

    /// A custom driver label token was not of the form `key=value`
    #[error("malformed driver label {0:?}: expected key=value")]
    MalformedLabel(String),

    /// A custom driver label used a key this client reserves
    #[error("driver label key {0:?} is reserved")]
    ReservedLabel(String),

    /// Ingress mode was enabled without an ingress base path
    #[error("exposing the driver through an ingress requires an ingress base path")]
    MissingIngressBasePath,

    /// A submitter-local file (or the main resource) is missing
    #[error("local file {0} does not exist or is not a regular file")]
    LocalFileMissing(PathBuf),

    /// The driver pod did not become ready in time; carries the diagnostic
    /// block built from the pod's last observed state
    #[error("{0}")]
    PodNotReady(String),

    /// The driver service was not observed in time
    #[error("service {name} was not ready in {timeout_secs} seconds")]
    ServiceNotReady {
        /// Name of the driver service
        name: String,
        /// Readiness timeout that elapsed
        timeout_secs: u64,
    },

    /// The driver service endpoints never gained an address
    #[error("endpoints for service {name} were not ready in {timeout_secs} seconds")]
    EndpointsNotReady {
        /// Name of the driver service
        name: String,
        /// Readiness timeout that elapsed
        timeout_secs: u64,
    },

    /// The driver ingress never received a load balancer address
    #[error("ingress {name} was not ready in {timeout_secs} seconds")]
    IngressNotReady {
        /// Name of the driver ingress
        name: String,
        /// Readiness timeout that elapsed
        timeout_secs: u64,
    },

    /// Fetching the driver pod for timeout diagnostics itself failed
    #[error("failed to inspect the driver pod after a readiness timeout: {source}; original timeout: {timeout}")]
    DiagnosticFetchFailed {
        /// Description of the readiness timeout being diagnosed
        timeout: String,
        /// The API error that prevented diagnostics collection
        #[source]
        source: kube::Error,
    },

    /// Endpoint discovery produced no candidate driver URLs
    #[error("no reachable addresses for the submission service: {0}")]
    NoReachableNodes(String),

    /// Ping or submission against the driver's HTTP endpoint failed
    #[error("submission RPC failed: {0}")]
    SubmissionRpc(String),

    /// Packaging the local payload (tar + gzip + base64) failed
    #[error("failed to encode local payload: {0}")]
    PayloadEncoding(String),

    /// Building TLS material for the driver or the RPC client failed
    #[error("ssl configuration error: {0}")]
    Ssl(String),

    /// Building the cluster API client failed
    #[error("failed to configure cluster client: {0}")]
    ClientConfig(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    ClusterApi(#[from] kube::Error),

    /// Invariant violation that should not happen in a healthy cluster
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a submission RPC error with the given message
    pub fn submission_rpc(msg: impl Into<String>) -> Self {
        Self::SubmissionRpc(msg.into())
    }

    /// Create a payload encoding error with the given message
    pub fn payload_encoding(msg: impl Into<String>) -> Self {
        Self::PayloadEncoding(msg.into())
    }

    /// Create an ssl configuration error with the given message
    pub fn ssl(msg: impl Into<String>) -> Self {
        Self::Ssl(msg.into())
    }

    /// Create a client configuration error with the given message
    pub fn client_config(msg: impl Into<String>) -> Self {
        Self::ClientConfig(msg.into())
    }
}
