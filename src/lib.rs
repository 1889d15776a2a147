//! GlusterFS Simple Provisioner
//!
//! Provisions GlusterFS volumes for Kubernetes persistent volume claims by
//! creating brick directories on storage hosts, assembling them into a
//! started volume, and publishing the Endpoints/Service pair clients mount
//! through. Deletion reverses the steps, best effort.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     GlusterfsProvisioner                       │
//! │   provision: bricks -> volume -> exposure (rollback on error)  │
//! │   delete:    volume -> bricks -> exposure -> release gid       │
//! ├────────────────────┬────────────────────┬──────────────────────┤
//! │ BrickProvisioner   │ VolumeLifecycle    │ ExposurePublisher    │
//! ├────────────────────┴────────────────────┴──────────────────────┤
//! │                            Ports                               │
//! │   CommandRunner    ObjectStore    GidAllocator                 │
//! ├────────────────────────────────────────────────────────────────┤
//! │                     Kubernetes Adapters                        │
//! │   KubeExecRunner   KubeObjectStore   ClassGidAllocator         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provisioner`]: Configuration, bricks, volumes, exposure and orchestration
//! - [`adapters`]: Kubernetes implementations of the ports
//! - [`domain`]: Request types and port traits
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod domain;
pub mod error;
pub mod provisioner;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use adapters::{ClassGidAllocator, KubeAdapters, KubeExecRunner, KubeObjectStore};

pub use domain::ports::{
    volume_name_for_claim, ClusterControlEndpoint, CommandRunner, GidAllocator, ObjectStore,
    ProvisionRequest,
};

pub use error::{Error, ErrorAction, Result};

pub use provisioner::{
    GlusterfsProvisioner, ProvisionStage, ProvisionerConfig, ProvisionerMetrics, TeardownReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

