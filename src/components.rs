//! Pure builders for the driver's Kubernetes objects
//!
//! No I/O happens here: each function turns inputs into a complete object
//! spec. Creation, adoption, and deletion are the orchestrator's business.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, Pod, PodSpec, Probe, Secret,
    SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;

use crate::constants::{
    BLOCK_MANAGER_PORT_NAME, DRIVER_CONTAINER_NAME, DRIVER_PORT_NAME, DRIVER_SECRETS_BASE_DIR,
    ENV_SUBMISSION_SECRET_LOCATION, ENV_SUBMISSION_SERVER_BASE_PATH, ENV_SUBMISSION_SERVER_PORT,
    PING_PATH, SUBMISSION_PATH_COMPONENT, SUBMISSION_SECRET_BYTES, SUBMISSION_SECRET_KEY,
    SUBMISSION_SECRET_NAME_PREFIX, SUBMISSION_SERVER_PORT, SUBMISSION_SERVER_PORT_NAME,
    UI_PATH_COMPONENT, UI_PORT_NAME,
};
use crate::ssl::SslBundle;

/// Name of the pod volume carrying the submission secret
const SUBMISSION_SECRET_VOLUME_NAME: &str = "submission-app-secret-volume";

/// Derive the unique per-submission app id.
///
/// The launch time component guarantees uniqueness; the result doubles as the
/// name of the driver Pod, Service, and Ingress.
pub fn app_id(app_name: &str, launch_time_millis: u64) -> String {
    format!("{}-{}", app_name, launch_time_millis)
        .to_lowercase()
        .replace('.', "-")
}

/// Name of the one-time submission Secret for the given app
pub fn submission_secret_name(app_id: &str) -> String {
    format!("{}{}", SUBMISSION_SECRET_NAME_PREFIX, app_id)
}

/// A freshly generated submission secret and the token stored inside it
pub struct SubmissionSecret {
    /// The Secret object to create
    pub secret: Secret,
    /// The base64 token; mounted into the driver and echoed in the
    /// submission request to authenticate the client
    pub token: String,
}

/// Build the one-time submission Secret: 128 random bytes, base64-encoded.
pub fn submission_secret(
    app_id: &str,
    namespace: &str,
    selectors: &BTreeMap<String, String>,
) -> SubmissionSecret {
    let mut bytes = vec![0u8; SUBMISSION_SECRET_BYTES];
    aws_lc_rs::rand::fill(&mut bytes).expect("random generation failed");
    let token = STANDARD.encode(&bytes);

    let mut data = BTreeMap::new();
    data.insert(
        SUBMISSION_SECRET_KEY.to_string(),
        ByteString(token.clone().into_bytes()),
    );

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(submission_secret_name(app_id)),
            namespace: Some(namespace.to_string()),
            labels: Some(selectors.clone()),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };

    SubmissionSecret { secret, token }
}

/// Build the driver Service.
///
/// `ClusterIP` behind an ingress, `NodePort` otherwise so the submission port
/// is reachable on every node.
pub fn driver_service(
    app_id: &str,
    namespace: &str,
    selectors: &BTreeMap<String, String>,
    expose_ingress: bool,
) -> Service {
    let service_type = if expose_ingress {
        "ClusterIP"
    } else {
        "NodePort"
    };
    Service {
        metadata: ObjectMeta {
            name: Some(app_id.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(selectors.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            selector: Some(selectors.clone()),
            ports: Some(vec![ServicePort {
                name: Some(SUBMISSION_SERVER_PORT_NAME.to_string()),
                port: SUBMISSION_SERVER_PORT,
                target_port: Some(IntOrString::String(
                    SUBMISSION_SERVER_PORT_NAME.to_string(),
                )),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Inputs for [`driver_pod`]
pub struct DriverPodParams<'a> {
    /// Unique app id; becomes the pod name
    pub app_id: &'a str,
    /// Namespace the pod lives in
    pub namespace: &'a str,
    /// Driver selector labels
    pub selectors: &'a BTreeMap<String, String>,
    /// Driver container image
    pub image: &'a str,
    /// Service account assigned to the pod
    pub service_account: &'a str,
    /// Driver RPC port
    pub driver_port: i32,
    /// Block manager port
    pub blockmanager_port: i32,
    /// Driver UI port
    pub ui_port: i32,
    /// Name of the submission Secret to mount
    pub submission_secret_name: &'a str,
    /// TLS material to weave into the pod
    pub ssl: &'a SslBundle,
}

/// Build the driver Pod.
///
/// Mounts the submission secret (read-only) plus any SSL volumes, and wires a
/// readiness probe against the in-pod submission server so pod readiness
/// implies the server answers pings.
pub fn driver_pod(params: &DriverPodParams<'_>) -> Pod {
    let secret_mount_path = format!("{}/{}", DRIVER_SECRETS_BASE_DIR, params.app_id);
    let base_path = format!("/{}/{}", params.app_id, SUBMISSION_PATH_COMPONENT);

    let mut volumes = vec![Volume {
        name: SUBMISSION_SECRET_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(params.submission_secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }];
    volumes.extend(params.ssl.volumes.iter().cloned());

    let mut volume_mounts = vec![VolumeMount {
        name: SUBMISSION_SECRET_VOLUME_NAME.to_string(),
        mount_path: secret_mount_path.clone(),
        read_only: Some(true),
        ..Default::default()
    }];
    volume_mounts.extend(params.ssl.volume_mounts.iter().cloned());

    let mut env = vec![
        EnvVar {
            name: ENV_SUBMISSION_SECRET_LOCATION.to_string(),
            value: Some(format!("{}/{}", secret_mount_path, SUBMISSION_SECRET_KEY)),
            ..Default::default()
        },
        EnvVar {
            name: ENV_SUBMISSION_SERVER_PORT.to_string(),
            value: Some(SUBMISSION_SERVER_PORT.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: ENV_SUBMISSION_SERVER_BASE_PATH.to_string(),
            value: Some(base_path.clone()),
            ..Default::default()
        },
    ];
    env.extend(params.ssl.env.iter().cloned());

    let probe_scheme = params.ssl.options.enabled.then(|| "HTTPS".to_string());
    let readiness_probe = Probe {
        http_get: Some(HTTPGetAction {
            path: Some(format!("{}/{}", base_path, PING_PATH)),
            port: IntOrString::String(SUBMISSION_SERVER_PORT_NAME.to_string()),
            scheme: probe_scheme,
            ..Default::default()
        }),
        ..Default::default()
    };

    let container = Container {
        name: DRIVER_CONTAINER_NAME.to_string(),
        image: Some(params.image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(env),
        ports: Some(vec![
            ContainerPort {
                name: Some(DRIVER_PORT_NAME.to_string()),
                container_port: params.driver_port,
                ..Default::default()
            },
            ContainerPort {
                name: Some(BLOCK_MANAGER_PORT_NAME.to_string()),
                container_port: params.blockmanager_port,
                ..Default::default()
            },
            ContainerPort {
                name: Some(SUBMISSION_SERVER_PORT_NAME.to_string()),
                container_port: SUBMISSION_SERVER_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some(UI_PORT_NAME.to_string()),
                container_port: params.ui_port,
                ..Default::default()
            },
        ]),
        volume_mounts: Some(volume_mounts),
        readiness_probe: Some(readiness_probe),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(params.app_id.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(params.selectors.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("OnFailure".to_string()),
            service_account_name: Some(params.service_account.to_string()),
            containers: vec![container],
            volumes: Some(volumes),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the driver Ingress: one rule routing the submission path and the UI
/// path to the driver Service by port name.
pub fn driver_ingress(
    app_id: &str,
    namespace: &str,
    selectors: &BTreeMap<String, String>,
) -> Ingress {
    let path_for = |component: &str, port_name: &str| HTTPIngressPath {
        path: Some(format!("/{}/{}", app_id, component)),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: app_id.to_string(),
                port: Some(ServiceBackendPort {
                    name: Some(port_name.to_string()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    };

    Ingress {
        metadata: ObjectMeta {
            name: Some(app_id.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(selectors.clone()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                http: Some(HTTPIngressRuleValue {
                    paths: vec![
                        path_for(SUBMISSION_PATH_COMPONENT, SUBMISSION_SERVER_PORT_NAME),
                        path_for(UI_PATH_COMPONENT, UI_PORT_NAME),
                    ],
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Rewrite the driver Service into its long-lived, UI-only form.
///
/// After a successful submission the submission port has served its purpose;
/// the service becomes a plain `ClusterIP` exposing only the UI.
pub fn ui_only_service(service: &Service, ui_port: i32) -> Service {
    let mut rewritten = service.clone();
    let spec = rewritten.spec.get_or_insert_with(ServiceSpec::default);
    spec.type_ = Some("ClusterIP".to_string());
    spec.ports = Some(vec![ServicePort {
        name: Some(UI_PORT_NAME.to_string()),
        port: ui_port,
        target_port: Some(IntOrString::Int(ui_port)),
        node_port: None,
        ..Default::default()
    }]);
    rewritten
}

/// Controller owner reference pointing at the driver pod.
///
/// Everything the submission creates is adopted by the pod once it exists,
/// so deleting the driver garbage-collects the rest.
pub fn driver_owner_reference(pod: &Pod) -> Option<OwnerReference> {
    let name = pod.metadata.name.clone()?;
    let uid = pod.metadata.uid.clone()?;
    Some(OwnerReference {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        name,
        uid,
        controller: Some(true),
        ..Default::default()
    })
}
