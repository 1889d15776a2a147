//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the provisioning logic and
//! external systems: the remote command transport, the Kubernetes object
//! store and the gid allocator. Adapters implement these traits to provide
//! concrete functionality; tests substitute in-memory fakes.

use crate::error::{Error, Result};
use crate::provisioner::config::ProvisionerConfig;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Endpoints, PersistentVolume, PersistentVolumeClaim, Service,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Provisioning Request
// =============================================================================

/// Reclaim policy applied when the storage class doesn't name one
pub const DEFAULT_RECLAIM_POLICY: &str = "Delete";

/// Annotation carrying the gid of a volume's bricks
pub const ANN_GID: &str = "pv.beta.kubernetes.io/gid";

/// Request to provision a volume for a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Namespace of the claim
    pub namespace: String,
    /// Name of the claim
    pub claim_name: String,
    /// Name of the volume to create
    pub volume_name: String,
    /// Requested capacity
    pub capacity: Quantity,
    /// Requested access modes
    pub access_modes: Vec<String>,
    /// Claim selector, never supported
    pub selector: Option<LabelSelector>,
    /// Storage class the claim was made against
    pub storage_class: String,
    /// Reclaim policy for the resulting volume
    pub reclaim_policy: String,
    /// Mount options copied onto the volume
    pub mount_options: Vec<String>,
    /// Raw storage class parameters
    pub parameters: BTreeMap<String, String>,
}

impl ProvisionRequest {
    /// Build a request from a claim and the storage class it references
    pub fn from_claim(
        claim: &PersistentVolumeClaim,
        class: &StorageClass,
        volume_name: &str,
    ) -> Result<Self> {
        let namespace = claim.metadata.namespace.clone().ok_or_else(|| {
            Error::Configuration("claim has no namespace".into())
        })?;
        let claim_name = claim
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Configuration("claim has no name".into()))?;
        let storage_class = class
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Configuration("storage class has no name".into()))?;

        let spec = claim.spec.clone().unwrap_or_default();
        let capacity = spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "claim {}/{} requests no storage",
                    namespace, claim_name
                ))
            })?;

        Ok(Self {
            namespace,
            claim_name,
            volume_name: volume_name.to_string(),
            capacity,
            access_modes: spec.access_modes.unwrap_or_default(),
            selector: spec.selector,
            storage_class,
            reclaim_policy: class
                .reclaim_policy
                .clone()
                .unwrap_or_else(|| DEFAULT_RECLAIM_POLICY.to_string()),
            mount_options: class.mount_options.clone().unwrap_or_default(),
            parameters: class.parameters.clone().unwrap_or_default(),
        })
    }
}

/// Volume name for a claim, `pvc-<claim uid>`
pub fn volume_name_for_claim(claim: &PersistentVolumeClaim) -> Result<String> {
    claim
        .metadata
        .uid
        .as_ref()
        .map(|uid| format!("pvc-{}", uid))
        .ok_or_else(|| Error::Configuration("claim has no uid".into()))
}

// =============================================================================
// Command Runner Port
// =============================================================================

/// Port for executing shell commands on a storage host
///
/// Commands run in order and the first failure stops the batch. Remote
/// state is mutated as commands succeed; nothing is undone on failure.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `commands` on `host`
    async fn run(&self, host: &str, commands: &[String], config: &ProvisionerConfig)
        -> Result<()>;
}

// =============================================================================
// Object Store Port
// =============================================================================

/// Port for the Kubernetes objects the provisioner reads and writes
///
/// Creating an object that already exists must fail with
/// [`Error::ResourceExists`] so callers can treat it as success.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create an endpoints object
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<()>;

    /// Create a service
    async fn create_service(&self, service: &Service) -> Result<()>;

    /// Delete a service
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Parameters of a storage class
    async fn class_parameters(&self, class_name: &str) -> Result<BTreeMap<String, String>>;

    /// List all persistent volumes
    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>>;
}

// =============================================================================
// Gid Allocator Port
// =============================================================================

/// Port for allocating the group id applied to brick directories
#[async_trait]
pub trait GidAllocator: Send + Sync {
    /// Allocate the next free gid for a request
    async fn allocate_next(&self, request: &ProvisionRequest) -> Result<u32>;

    /// Release the gid recorded on a volume
    async fn release(&self, volume: &PersistentVolume) -> Result<()>;
}

// =============================================================================
// Cluster Control Endpoint Port
// =============================================================================

/// Chooses the host that receives cluster-wide `gluster` commands
pub trait ClusterControlEndpoint: Send + Sync {
    /// Pick one of `hosts`, in brick order
    fn select(&self, hosts: &[String]) -> Option<String>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type CommandRunnerRef = Arc<dyn CommandRunner>;
pub type ObjectStoreRef = Arc<dyn ObjectStore>;
pub type GidAllocatorRef = Arc<dyn GidAllocator>;
pub type ClusterControlEndpointRef = Arc<dyn ClusterControlEndpoint>;
