//! Network Exposure Publisher
//!
//! Publishes the Endpoints/Service pair through which pods reach the
//! GlusterFS servers of a volume. The Endpoints list one address per brick
//! host; ports are placeholders that only satisfy the API schema.

use crate::domain::ports::ObjectStoreRef;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Prefix of the exposure object names
pub const EXPOSURE_PREFIX: &str = "glusterfs-simple-";

/// Label linking exposure objects back to their claim
pub const PROVISIONED_FOR_LABEL: &str = "gluster.kubernetes.io/provisioned-for-pvc";

const PLACEHOLDER_PORT: i32 = 1;
const PLACEHOLDER_PROTOCOL: &str = "TCP";

/// Name of the exposure objects of a claim
pub fn exposure_name(claim_name: &str) -> String {
    format!("{}{}", EXPOSURE_PREFIX, claim_name)
}

fn metadata(namespace: &str, name: &str, claim_name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            PROVISIONED_FOR_LABEL.to_string(),
            claim_name.to_string(),
        )])),
        ..Default::default()
    }
}

/// Creates and deletes exposure objects through an [`ObjectStore`](crate::domain::ObjectStore)
pub struct ExposurePublisher {
    store: ObjectStoreRef,
}

impl ExposurePublisher {
    pub fn new(store: ObjectStoreRef) -> Self {
        Self { store }
    }

    /// Create the Endpoints and Service for `hosts`
    ///
    /// Objects that already exist count as created, so a retry is always
    /// safe. A half-created pair is not cleaned up here.
    pub async fn publish(
        &self,
        namespace: &str,
        name: &str,
        hosts: &[String],
        claim_name: &str,
    ) -> Result<(Endpoints, Service)> {
        let endpoints = Endpoints {
            metadata: metadata(namespace, name, claim_name),
            subsets: Some(vec![EndpointSubset {
                addresses: Some(
                    hosts
                        .iter()
                        .map(|host| EndpointAddress {
                            ip: host.clone(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ports: Some(vec![EndpointPort {
                    port: PLACEHOLDER_PORT,
                    protocol: Some(PLACEHOLDER_PROTOCOL.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
        };
        tolerate_existing(self.store.create_endpoints(&endpoints).await, "endpoints", namespace, name)?;

        let service = Service {
            metadata: metadata(namespace, name, claim_name),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: PLACEHOLDER_PORT,
                    protocol: Some(PLACEHOLDER_PROTOCOL.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        tolerate_existing(self.store.create_service(&service).await, "service", namespace, name)?;

        info!("Published endpoints/service {}/{} for {} hosts", namespace, name, hosts.len());
        Ok((endpoints, service))
    }

    /// Delete the Service; its Endpoints go with it
    ///
    /// Never fails. A missing Service counts as deleted; any other error is
    /// logged and handed back for reporting.
    pub async fn unpublish(&self, namespace: &str, name: &str) -> Option<Error> {
        match self.store.delete_service(namespace, name).await {
            Ok(()) => {
                info!("Deleted service/endpoints {}/{}", namespace, name);
                None
            }
            Err(Error::ResourceNotFound { .. }) => {
                debug!("Service {}/{} already gone", namespace, name);
                None
            }
            Err(e) => {
                error!("Failed to delete service {}/{}: {}", namespace, name, e);
                Some(e)
            }
        }
    }
}

fn tolerate_existing(result: Result<()>, kind: &str, namespace: &str, name: &str) -> Result<()> {
    match result {
        Err(e) if e.is_already_exists() => {
            debug!("{} {}/{} already exists", kind, namespace, name);
            Ok(())
        }
        Err(e) => {
            error!("Failed to create {} {}/{}: {}", kind, namespace, name, e);
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}
