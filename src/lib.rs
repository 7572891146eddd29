//! spark-submit - Kubernetes submission client for Spark drivers
//!
//! Launches a driver application into a Kubernetes cluster and streams the
//! local submission payload (application binary, auxiliary files,
//! configuration) to it over an authenticated channel.
//!
//! The client provisions every Kubernetes object the driver needs (Secret,
//! Service, Pod, optional Ingress), waits for the driver to become reachable,
//! uploads the payload over HTTP(S), and optionally blocks until the driver
//! terminates. Any failure before the hand-off completes tears down
//! everything that was created.
//!
//! # Modules
//!
//! - [`config`] - Submission configuration (cluster, driver, payload inputs)
//! - [`master`] - `k8s://` master URL resolution
//! - [`labels`] - Driver selector labels and custom-label parsing
//! - [`registry`] - Registry of created resources with bulk delete-on-abort
//! - [`readiness`] - One-shot readiness detection over cluster watch streams
//! - [`components`] - Pure builders for the driver's Kubernetes objects
//! - [`endpoints`] - Candidate driver URL discovery (ingress or NodePort)
//! - [`payload`] - Local file packaging (tar + gzip + base64)
//! - [`submission`] - Submission payload assembly
//! - [`rpc`] - HTTP client for the driver's in-pod submission server
//! - [`ssl`] - Driver/client TLS material supplied by a provider
//! - [`status`] - Driver pod phase monitoring and timeout diagnostics
//! - [`orchestrator`] - The provisioning state machine tying it all together
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod components;
pub mod config;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod labels;
pub mod master;
pub mod orchestrator;
pub mod payload;
pub mod readiness;
pub mod registry;
pub mod rpc;
pub mod ssl;
pub mod status;
pub mod submission;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
