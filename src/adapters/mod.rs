//! Kubernetes Adapters
//!
//! Concrete implementations of the domain ports:
//! - KubeObjectStore: Endpoints, Services, StorageClasses and volumes
//! - KubeExecRunner: shell commands in the GlusterFS server pods
//! - ClassGidAllocator: per storage class gid tables

pub mod gid_allocator;
pub mod kube_exec;
pub mod kube_store;

pub use gid_allocator::*;
pub use kube_exec::*;
pub use kube_store::*;

use crate::provisioner::{GlusterfsProvisioner, ProvisionerMetrics};
use kube::Client;
use std::sync::Arc;

/// Factory wiring a provisioner to a Kubernetes cluster
pub struct KubeAdapters;

impl KubeAdapters {
    /// Build a provisioner and the object store it writes through
    pub fn provisioner(
        client: Client,
        metrics: ProvisionerMetrics,
    ) -> (KubeObjectStore, GlusterfsProvisioner) {
        let store = KubeObjectStore::new(client.clone());
        let store_ref = Arc::new(store.clone());
        let provisioner = GlusterfsProvisioner::new(
            Arc::new(KubeExecRunner::new(client)),
            store_ref.clone(),
            Arc::new(ClassGidAllocator::new(store_ref)),
            metrics,
        );
        (store, provisioner)
    }
}
