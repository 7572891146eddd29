//! Candidate driver URL discovery
//!
//! In ingress mode the single candidate is the configured external base path.
//! In NodePort mode every schedulable node with an external address yields
//! one candidate, all sharing the service's assigned NodePort.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, ListParams};
use kube::Client;

use crate::constants::{SUBMISSION_PATH_COMPONENT, SUBMISSION_SERVER_PORT_NAME};
use crate::{Error, Result};

/// Node address types that are reachable from outside the cluster
const ACCEPTED_ADDRESS_TYPES: [&str; 2] = ["ExternalIP", "LegacyHostIP"];

/// The single candidate URL for ingress mode.
pub fn ingress_url(scheme: &str, ingress_base_path: &str, app_id: &str) -> String {
    format!(
        "{}://{}/{}/{}",
        scheme,
        ingress_base_path.trim_end_matches('/'),
        app_id,
        SUBMISSION_PATH_COMPONENT
    )
}

/// NodePort assigned to the submission port of the driver service, if any.
pub fn submission_node_port(service: &Service) -> Option<i32> {
    service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .find(|p| p.name.as_deref() == Some(SUBMISSION_SERVER_PORT_NAME))?
        .node_port
}

/// Candidate URLs from node external addresses.
///
/// Unschedulable nodes are skipped, as are address entries of any type other
/// than `ExternalIP`/`LegacyHostIP`. The result is a set: one URL per
/// distinct address.
pub fn node_urls(nodes: &[Node], scheme: &str, node_port: i32, app_id: &str) -> Vec<String> {
    let urls: BTreeSet<String> = nodes
        .iter()
        .filter(|node| {
            !node
                .spec
                .as_ref()
                .and_then(|s| s.unschedulable)
                .unwrap_or(false)
        })
        .flat_map(|node| {
            node.status
                .iter()
                .flat_map(|s| s.addresses.iter().flatten())
        })
        .filter(|address| ACCEPTED_ADDRESS_TYPES.contains(&address.type_.as_str()))
        .map(|address| {
            format!(
                "{}://{}:{}/{}/{}",
                scheme, address.address, node_port, app_id, SUBMISSION_PATH_COMPONENT
            )
        })
        .collect();
    urls.into_iter().collect()
}

/// Discover the non-empty set of candidate driver URLs.
pub async fn discover_submission_urls(
    client: &Client,
    scheme: &str,
    app_id: &str,
    ingress_base_path: Option<&str>,
    service: &Service,
) -> Result<Vec<String>> {
    if let Some(base) = ingress_base_path {
        return Ok(vec![ingress_url(scheme, base, app_id)]);
    }

    let node_port = submission_node_port(service).ok_or_else(|| {
        Error::NoReachableNodes("the driver service has no assigned node port".to_string())
    })?;

    let nodes: Api<Node> = Api::all(client.clone());
    let node_list = nodes.list(&ListParams::default()).await?;
    let urls = node_urls(&node_list.items, scheme, node_port, app_id);
    if urls.is_empty() {
        return Err(Error::NoReachableNodes(
            "no schedulable node reported an ExternalIP or LegacyHostIP address".to_string(),
        ));
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        NodeAddress, NodeSpec, NodeStatus, ServicePort, ServiceSpec,
    };

    fn node(unschedulable: bool, addresses: Vec<(&str, &str)>) -> Node {
        Node {
            spec: Some(NodeSpec {
                unschedulable: Some(unschedulable),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                addresses: Some(
                    addresses
                        .into_iter()
                        .map(|(type_, address)| NodeAddress {
                            type_: type_.to_string(),
                            address: address.to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ingress_url_joins_base_path_and_app() {
        assert_eq!(
            ingress_url("https", "edge.example/spark", "spark-17"),
            "https://edge.example/spark/spark-17/submission"
        );
        // A trailing slash on the base does not double up
        assert_eq!(
            ingress_url("https", "edge.example/spark/", "spark-17"),
            "https://edge.example/spark/spark-17/submission"
        );
    }

    #[test]
    fn schedulable_external_addresses_become_urls() {
        let nodes = vec![node(false, vec![("ExternalIP", "203.0.113.7")])];
        let urls = node_urls(&nodes, "http", 31000, "spark-17");
        assert_eq!(
            urls,
            vec!["http://203.0.113.7:31000/spark-17/submission".to_string()]
        );
    }

    #[test]
    fn unschedulable_nodes_are_filtered() {
        let nodes = vec![
            node(true, vec![("ExternalIP", "203.0.113.7")]),
            node(false, vec![("ExternalIP", "203.0.113.8")]),
        ];
        let urls = node_urls(&nodes, "http", 31000, "spark-17");
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("203.0.113.8"));
    }

    #[test]
    fn only_external_and_legacy_host_addresses_qualify() {
        let nodes = vec![node(
            false,
            vec![
                ("InternalIP", "10.0.0.1"),
                ("Hostname", "node-a"),
                ("LegacyHostIP", "198.51.100.4"),
            ],
        )];
        let urls = node_urls(&nodes, "http", 31000, "spark-17");
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("198.51.100.4"));
    }

    #[test]
    fn duplicate_addresses_collapse_to_one_url() {
        let nodes = vec![
            node(false, vec![("ExternalIP", "203.0.113.7")]),
            node(false, vec![("ExternalIP", "203.0.113.7")]),
        ];
        let urls = node_urls(&nodes, "http", 31000, "spark-17");
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn node_port_is_read_from_the_submission_port() {
        let service = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(SUBMISSION_SERVER_PORT_NAME.to_string()),
                    port: 7077,
                    node_port: Some(31000),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(submission_node_port(&service), Some(31000));
        assert_eq!(submission_node_port(&Service::default()), None);
    }
}
