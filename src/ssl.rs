//! TLS material for the driver and the RPC client
//!
//! The orchestrator treats this as an opaque producer: it asks for a bundle
//! and gets back the secrets to create, the volumes/mounts/env the driver pod
//! needs, and the socket contexts the RPC client connects with.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use k8s_openapi::api::core::v1::{EnvVar, Secret, SecretVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use crate::config::SubmitConfig;
use crate::{Error, Result};

/// Directory the driver SSL secret is mounted under
pub const DRIVER_SSL_SECRETS_DIR: &str = "/var/run/secrets/spark-ssl";

/// Data key of the driver certificate inside the SSL secret
pub const DRIVER_SSL_CERT_KEY: &str = "driver.crt";

/// Data key of the driver private key inside the SSL secret
pub const DRIVER_SSL_KEY_KEY: &str = "driver.key";

/// Env var switching the in-pod submission server to HTTPS
pub const ENV_SUBMISSION_USE_SSL: &str = "SPARK_SUBMISSION_USE_SSL";

/// Env var pointing the driver at its mounted certificate
pub const ENV_SUBMISSION_SSL_CERT_FILE: &str = "SPARK_SUBMISSION_SSL_CERT_FILE";

/// Env var pointing the driver at its mounted private key
pub const ENV_SUBMISSION_SSL_KEY_FILE: &str = "SPARK_SUBMISSION_SSL_KEY_FILE";

/// Name of the pod volume carrying the SSL secret
const SSL_VOLUME_NAME: &str = "driver-ssl-secret-volume";

/// Whether the submission channel runs over TLS
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SslOptions {
    /// True when the driver serves HTTPS and the client verifies it
    pub enabled: bool,
}

impl SslOptions {
    /// URL scheme matching these options
    pub fn scheme(&self) -> &'static str {
        if self.enabled {
            "https"
        } else {
            "http"
        }
    }
}

/// Everything the SSL provider hands the orchestrator
#[derive(Debug)]
pub struct SslBundle {
    /// TLS on/off and the derived URL scheme
    pub options: SslOptions,
    /// Secrets to create before the driver pod; the pod mounts them
    pub secrets: Vec<Secret>,
    /// Pod volumes backing the secrets
    pub volumes: Vec<Volume>,
    /// Driver-container mounts for those volumes
    pub volume_mounts: Vec<VolumeMount>,
    /// Driver-container env pointing at the mounted material
    pub env: Vec<EnvVar>,
    /// Client identity presented to the driver, if any
    pub client_identity: Option<reqwest::Identity>,
    /// Trust root the client verifies the driver against, if any
    pub client_trust: Option<reqwest::Certificate>,
}

impl SslBundle {
    /// A bundle for plain-HTTP submissions
    pub fn disabled() -> Self {
        Self {
            options: SslOptions { enabled: false },
            secrets: Vec::new(),
            volumes: Vec::new(),
            volume_mounts: Vec::new(),
            env: Vec::new(),
            client_identity: None,
            client_trust: None,
        }
    }
}

/// Producer of TLS material for one submission
pub trait SslConfigurationProvider: Send + Sync {
    /// Build the bundle for the given app
    fn bundle(
        &self,
        app_id: &str,
        namespace: &str,
        selectors: &BTreeMap<String, String>,
    ) -> Result<SslBundle>;
}

/// Provider reading PEM material from configured file paths
pub struct FileSslProvider {
    enabled: bool,
    cert_pem: Option<PathBuf>,
    key_pem: Option<PathBuf>,
    client_trust_cert_pem: Option<PathBuf>,
    client_identity_pem: Option<PathBuf>,
}

impl FileSslProvider {
    /// Build a provider from the submission configuration
    pub fn from_config(config: &SubmitConfig) -> Self {
        Self {
            enabled: config.driver_ssl_enabled,
            cert_pem: config.driver_ssl_cert_pem.clone(),
            key_pem: config.driver_ssl_key_pem.clone(),
            client_trust_cert_pem: config.client_trust_cert_pem.clone(),
            client_identity_pem: config.client_identity_pem.clone(),
        }
    }

    /// Name of the driver SSL secret for the given app
    pub fn secret_name(app_id: &str) -> String {
        format!("submission-ssl-{}", app_id)
    }
}

impl SslConfigurationProvider for FileSslProvider {
    fn bundle(
        &self,
        app_id: &str,
        namespace: &str,
        selectors: &BTreeMap<String, String>,
    ) -> Result<SslBundle> {
        if !self.enabled {
            return Ok(SslBundle::disabled());
        }

        let cert_path = self
            .cert_pem
            .as_ref()
            .ok_or_else(|| Error::ssl("driver ssl is enabled but no certificate was given"))?;
        let key_path = self
            .key_pem
            .as_ref()
            .ok_or_else(|| Error::ssl("driver ssl is enabled but no private key was given"))?;

        let cert = fs::read(cert_path)
            .map_err(|e| Error::ssl(format!("failed to read {}: {}", cert_path.display(), e)))?;
        let key = fs::read(key_path)
            .map_err(|e| Error::ssl(format!("failed to read {}: {}", key_path.display(), e)))?;

        let secret_name = Self::secret_name(app_id);
        let mut data = BTreeMap::new();
        data.insert(DRIVER_SSL_CERT_KEY.to_string(), ByteString(cert.clone()));
        data.insert(DRIVER_SSL_KEY_KEY.to_string(), ByteString(key));
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(selectors.clone()),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        let volume = Volume {
            name: SSL_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: SSL_VOLUME_NAME.to_string(),
            mount_path: DRIVER_SSL_SECRETS_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        };
        let env = vec![
            EnvVar {
                name: ENV_SUBMISSION_USE_SSL.to_string(),
                value: Some("true".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_SUBMISSION_SSL_CERT_FILE.to_string(),
                value: Some(format!("{}/{}", DRIVER_SSL_SECRETS_DIR, DRIVER_SSL_CERT_KEY)),
                ..Default::default()
            },
            EnvVar {
                name: ENV_SUBMISSION_SSL_KEY_FILE.to_string(),
                value: Some(format!("{}/{}", DRIVER_SSL_SECRETS_DIR, DRIVER_SSL_KEY_KEY)),
                ..Default::default()
            },
        ];

        // The client trusts either an explicit trust root or the driver
        // certificate itself.
        let trust_path = self.client_trust_cert_pem.as_ref().unwrap_or(cert_path);
        let trust_pem = fs::read(trust_path)
            .map_err(|e| Error::ssl(format!("failed to read {}: {}", trust_path.display(), e)))?;
        let client_trust = reqwest::Certificate::from_pem(&trust_pem)
            .map_err(|e| Error::ssl(format!("invalid trust certificate: {}", e)))?;

        let client_identity = match &self.client_identity_pem {
            Some(path) => {
                let pem = fs::read(path).map_err(|e| {
                    Error::ssl(format!("failed to read {}: {}", path.display(), e))
                })?;
                Some(
                    reqwest::Identity::from_pem(&pem)
                        .map_err(|e| Error::ssl(format!("invalid client identity: {}", e)))?,
                )
            }
            None => None,
        };

        Ok(SslBundle {
            options: SslOptions { enabled: true },
            secrets: vec![secret],
            volumes: vec![volume],
            volume_mounts: vec![mount],
            env,
            client_identity,
            client_trust: Some(client_trust),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_follows_the_enabled_flag() {
        assert_eq!(SslOptions { enabled: true }.scheme(), "https");
        assert_eq!(SslOptions { enabled: false }.scheme(), "http");
    }

    #[test]
    fn disabled_provider_yields_an_empty_bundle() {
        let provider = FileSslProvider {
            enabled: false,
            cert_pem: None,
            key_pem: None,
            client_trust_cert_pem: None,
            client_identity_pem: None,
        };
        let bundle = provider
            .bundle("spark-1", "default", &BTreeMap::new())
            .unwrap();
        assert!(!bundle.options.enabled);
        assert!(bundle.secrets.is_empty());
        assert!(bundle.volumes.is_empty());
        assert!(bundle.env.is_empty());
        assert!(bundle.client_trust.is_none());
    }

    #[test]
    fn enabled_provider_without_material_is_an_error() {
        let provider = FileSslProvider {
            enabled: true,
            cert_pem: None,
            key_pem: None,
            client_trust_cert_pem: None,
            client_identity_pem: None,
        };
        let err = provider
            .bundle("spark-1", "default", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Ssl(_)));
    }
}
