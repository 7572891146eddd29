//! Master URL resolution
//!
//! Users address the cluster as `k8s://<api-server>`; the cluster API client
//! wants a plain HTTP(S) URL. Bare host:port defaults to HTTPS.

use crate::{Error, Result};

/// Prefix that selects Kubernetes as the deployment target
const MASTER_PREFIX: &str = "k8s://";

/// Resolve the raw master string into the cluster API URL.
///
/// `k8s://host:port` becomes `https://host:port`; an explicit `http://` or
/// `https://` after the prefix is kept as-is.
pub fn resolve_master_url(raw: &str) -> Result<String> {
    let rest = raw
        .strip_prefix(MASTER_PREFIX)
        .ok_or_else(|| Error::InvalidMasterUrl(raw.to_string()))?;
    if rest.starts_with("http://") || rest.starts_with("https://") {
        Ok(rest.to_string())
    } else {
        Ok(format!("https://{}", rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_https() {
        assert_eq!(
            resolve_master_url("k8s://cluster.example:6443").unwrap(),
            "https://cluster.example:6443"
        );
    }

    #[test]
    fn explicit_scheme_is_kept() {
        assert_eq!(
            resolve_master_url("k8s://http://h:8080").unwrap(),
            "http://h:8080"
        );
        assert_eq!(
            resolve_master_url("k8s://https://h:6443").unwrap(),
            "https://h:6443"
        );
    }

    #[test]
    fn explicit_https_matches_bare_form() {
        assert_eq!(
            resolve_master_url("k8s://cluster.example").unwrap(),
            resolve_master_url("k8s://https://cluster.example").unwrap()
        );
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let err = resolve_master_url("cluster").unwrap_err();
        assert!(matches!(err, Error::InvalidMasterUrl(_)));
    }
}
