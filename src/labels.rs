//! Driver selector labels
//!
//! Every object this client creates carries the driver selectors: three
//! reserved labels (driver marker, app id, app name) plus any custom labels
//! the user supplied as a `k1=v1,k2=v2` string.

use std::collections::BTreeMap;

use crate::constants::{APP_ID_LABEL, APP_NAME_LABEL, DRIVER_LABEL};
use crate::{Error, Result};

/// Parse user-supplied custom labels.
///
/// Empty or absent input yields an empty map. Tokens are comma-separated and
/// trimmed; empty tokens are dropped; each token must contain `=`. Duplicate
/// keys keep the last value. The reserved app-id key is rejected.
pub fn parse_custom_labels(raw: Option<&str>) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(labels);
    };

    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| Error::MalformedLabel(token.to_string()))?;
        if key == APP_ID_LABEL {
            return Err(Error::ReservedLabel(key.to_string()));
        }
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

/// Build the full driver selector set: reserved labels plus custom labels.
pub fn driver_selectors(
    app_id: &str,
    app_name: &str,
    custom: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut selectors = custom.clone();
    selectors.insert(DRIVER_LABEL.to_string(), app_id.to_string());
    selectors.insert(APP_ID_LABEL.to_string(), app_id.to_string());
    selectors.insert(APP_NAME_LABEL.to_string(), app_name.to_string());
    selectors
}

/// Render a label map back into its `k1=v1,k2=v2` form.
pub fn render_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
