//! Submission payload assembly
//!
//! The main application resource resolves into one of three variants based
//! on its URI scheme; local auxiliary files and jars are packaged into
//! opaque blobs; everything is combined with the one-time secret into the
//! request the driver's submission server accepts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::SubmitConfig;
use crate::payload;
use crate::{Error, Result};

/// The main application artifact, as the driver receives it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AppResource {
    /// A submitter-local file, uploaded inside the request
    #[serde(rename_all = "camelCase")]
    Uploaded {
        /// Base name of the uploaded file
        name: String,
        /// File bytes, base64-encoded
        blob_base64: String,
    },
    /// A path already present inside the driver container image
    #[serde(rename_all = "camelCase")]
    ContainerLocal {
        /// The container-local location, as given on the command line
        path: String,
    },
    /// A remote artifact the driver fetches itself
    #[serde(rename_all = "camelCase")]
    Remote {
        /// The remote URI, as given on the command line
        uri: String,
    },
}

/// The payload POSTed to the driver's submission endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Main application artifact
    pub app: AppResource,
    /// Main entry-point reference
    pub main_class: String,
    /// Application arguments, verbatim
    pub args: Vec<String>,
    /// The one-time submission secret authenticating this client
    pub secret: String,
    /// Configuration properties forwarded verbatim
    pub properties: BTreeMap<String, String>,
    /// tar+gzip+base64 blob of submitter-local files
    pub files_blob: String,
    /// tar+gzip+base64 blob of submitter-local jars
    pub jars_blob: String,
}

/// Resolve the raw main-resource string into its [`AppResource`] variant.
///
/// No scheme means a submitter-local file; `file://` likewise; `local://`
/// names a path inside the container image; anything else is remote.
pub fn resolve_app_resource(raw: &str) -> Result<AppResource> {
    match raw.split_once("://") {
        None => uploaded_from_path(Path::new(raw)),
        Some(("file", rest)) => uploaded_from_path(Path::new(rest)),
        Some(("local", _)) => Ok(AppResource::ContainerLocal {
            path: raw.to_string(),
        }),
        Some(_) => Ok(AppResource::Remote {
            uri: raw.to_string(),
        }),
    }
}

fn uploaded_from_path(path: &Path) -> Result<AppResource> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::LocalFileMissing(path.to_path_buf()))?
        .to_string_lossy()
        .into_owned();
    let bytes =
        fs::read(path).map_err(|_| Error::LocalFileMissing(path.to_path_buf()))?;
    Ok(AppResource::Uploaded {
        name,
        blob_base64: STANDARD.encode(bytes),
    })
}

/// Assemble the full submission request.
pub fn build_submission_request(config: &SubmitConfig, secret: &str) -> Result<SubmissionRequest> {
    let app = resolve_app_resource(&config.main_app_resource)?;
    let files_blob = payload::encode_file_set(&config.files)?;
    let jars_blob = payload::encode_file_set(&config.jars)?;
    Ok(SubmissionRequest {
        app,
        main_class: config.main_class.clone(),
        args: config.app_args.clone(),
        secret: secret.to_string(),
        properties: config.properties.clone(),
        files_blob,
        jars_blob,
    })
}
