//! GlusterFS Provisioning
//!
//! - config: storage class parameters to validated configuration
//! - bricks: brick directories on the storage hosts
//! - volume: `gluster volume` create/start/stop/delete
//! - exposure: Endpoints/Service publication
//! - orchestrator: provision and delete sequencing with rollback

pub mod bricks;
pub mod config;
pub mod exposure;
pub mod metrics;
pub mod orchestrator;
pub mod volume;

pub use bricks::{brick_path, Brick, BrickProvisioner};
pub use config::{BrickRoot, ProvisionerConfig};
pub use exposure::{exposure_name, ExposurePublisher};
pub use metrics::ProvisionerMetrics;
pub use orchestrator::{GlusterfsProvisioner, ProvisionStage, TeardownReport};
pub use volume::{FirstHost, VolumeLifecycle};
