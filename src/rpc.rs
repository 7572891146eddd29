//! HTTP client for the driver's in-pod submission server
//!
//! Discovery yields several candidate base URLs (one per reachable node, or
//! a single ingress path). The client walks the candidates in order, giving
//! each server a bounded number of attempts, and stops at the first success.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::constants::{PING_PATH, SUBMIT_PATH};
use crate::submission::SubmissionRequest;
use crate::{Error, Result};

/// Delay between attempts against the same server
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Typed surface of the driver's submission endpoint
#[async_trait]
pub trait SubmissionRpc: Send + Sync {
    /// Succeeds once any candidate server is reachable
    async fn ping(&self) -> Result<()>;

    /// Hand the submission payload to the driver
    async fn submit_application(&self, request: &SubmissionRequest) -> Result<()>;
}

/// Inputs for building a [`SubmissionRpc`] client
pub struct HttpClientParams {
    /// Candidate base URLs, each ending in the app's submission path
    pub base_urls: Vec<String>,
    /// Attempts per server before moving to the next candidate
    pub max_retries_per_server: u32,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Client identity presented to the driver, if any
    pub identity: Option<reqwest::Identity>,
    /// Trust root the driver certificate is verified against, if any
    pub trust_root: Option<reqwest::Certificate>,
}

/// Factory building RPC clients from discovered endpoints
#[async_trait]
pub trait HttpClientFactory: Send + Sync {
    /// Build a client for the given endpoints and TLS contexts
    async fn build(&self, params: HttpClientParams) -> Result<Box<dyn SubmissionRpc>>;
}

/// Join a discovered base URL with an endpoint path
fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Default [`HttpClientFactory`] backed by reqwest
pub struct ReqwestClientFactory;

#[async_trait]
impl HttpClientFactory for ReqwestClientFactory {
    async fn build(&self, params: HttpClientParams) -> Result<Box<dyn SubmissionRpc>> {
        let mut builder = reqwest::Client::builder().connect_timeout(params.connect_timeout);
        if let Some(trust) = params.trust_root {
            builder = builder.add_root_certificate(trust);
        }
        if let Some(identity) = params.identity {
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| Error::submission_rpc(format!("failed to build HTTP client: {}", e)))?;

        Ok(Box::new(ReqwestSubmissionClient {
            client,
            base_urls: params.base_urls,
            max_retries_per_server: params.max_retries_per_server.max(1),
        }))
    }
}

/// reqwest-backed submission client
pub struct ReqwestSubmissionClient {
    client: reqwest::Client,
    base_urls: Vec<String>,
    max_retries_per_server: u32,
}

impl ReqwestSubmissionClient {
    async fn execute(&self, path: &str, body: Option<&SubmissionRequest>) -> Result<()> {
        let mut last_error = String::from("no candidate servers");

        for base in &self.base_urls {
            let url = endpoint_url(base, path);
            for attempt in 1..=self.max_retries_per_server {
                let request = match body {
                    Some(body) => self.client.post(&url).json(body),
                    None => self.client.get(&url),
                };
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(%url, attempt, "Submission server responded");
                        return Ok(());
                    }
                    Ok(response) => {
                        let status = response.status();
                        let text = response.text().await.unwrap_or_default();
                        warn!(%url, attempt, %status, "Submission server rejected request");
                        last_error = format!("{} returned {}: {}", url, status, text);
                    }
                    Err(e) => {
                        warn!(%url, attempt, error = %e, "Submission server unreachable");
                        last_error = format!("{}: {}", url, e);
                    }
                }
                if attempt < self.max_retries_per_server {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }

        Err(Error::submission_rpc(format!(
            "all candidate servers failed; last error: {}",
            last_error
        )))
    }
}

#[async_trait]
impl SubmissionRpc for ReqwestSubmissionClient {
    async fn ping(&self) -> Result<()> {
        self.execute(PING_PATH, None).await
    }

    async fn submit_application(&self, request: &SubmissionRequest) -> Result<()> {
        self.execute(SUBMIT_PATH, Some(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_without_duplicate_slashes() {
        assert_eq!(
            endpoint_url("http://203.0.113.7:31000/spark-17/submission", PING_PATH),
            "http://203.0.113.7:31000/spark-17/submission/v1/submissions/ping"
        );
        assert_eq!(
            endpoint_url("https://edge.example/spark/spark-17/submission/", SUBMIT_PATH),
            "https://edge.example/spark/spark-17/submission/v1/submissions/create"
        );
    }

    #[tokio::test]
    async fn factory_builds_a_client_without_tls_material() {
        let factory = ReqwestClientFactory;
        let params = HttpClientParams {
            base_urls: vec!["http://127.0.0.1:1/x".to_string()],
            max_retries_per_server: 1,
            connect_timeout: Duration::from_millis(100),
            identity: None,
            trust_root: None,
        };
        assert!(factory.build(params).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_candidates_surface_the_last_error() {
        let factory = ReqwestClientFactory;
        let params = HttpClientParams {
            // Port 1 is never listening; both candidates fail fast
            base_urls: vec![
                "http://127.0.0.1:1/a".to_string(),
                "http://127.0.0.1:1/b".to_string(),
            ],
            max_retries_per_server: 1,
            connect_timeout: Duration::from_millis(100),
            identity: None,
            trust_root: None,
        };
        let client = factory.build(params).await.unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRpc(_)));
        assert!(err.to_string().contains("127.0.0.1:1/b"));
    }
}
