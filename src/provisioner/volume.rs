//! Volume Lifecycle
//!
//! Assembles bricks into a GlusterFS volume and tears it down again with
//! the `gluster` CLI. Cluster-wide commands go to a single control host,
//! chosen by a [`ClusterControlEndpoint`].

use super::bricks::Brick;
use super::config::ProvisionerConfig;
use crate::domain::ports::{ClusterControlEndpoint, ClusterControlEndpointRef, CommandRunnerRef};
use crate::error::{Error, Result};
use tracing::{debug, error, info};

const GLUSTER_CLI: &str = "gluster --mode=script";

// =============================================================================
// Control Endpoint Selection
// =============================================================================

/// Sends cluster commands to the first brick host
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstHost;

impl ClusterControlEndpoint for FirstHost {
    fn select(&self, hosts: &[String]) -> Option<String> {
        hosts.first().cloned()
    }
}

// =============================================================================
// Volume Lifecycle
// =============================================================================

/// Creates, starts, stops and deletes GlusterFS volumes
pub struct VolumeLifecycle {
    runner: CommandRunnerRef,
    control: ClusterControlEndpointRef,
}

impl VolumeLifecycle {
    pub fn new(runner: CommandRunnerRef, control: ClusterControlEndpointRef) -> Self {
        Self { runner, control }
    }

    fn control_host(&self, hosts: &[String]) -> Result<String> {
        self.control.select(hosts).ok_or_else(|| {
            Error::Configuration("no brick host available for cluster commands".into())
        })
    }

    /// Create the volume from `bricks` and start it
    pub async fn create_volume(&self, bricks: &[Brick], config: &ProvisionerConfig) -> Result<()> {
        let hosts: Vec<String> = bricks.iter().map(|b| b.host.clone()).collect();
        let host = self.control_host(&hosts)?;

        let commands = vec![
            create_command(bricks, config),
            format!("{} volume start {}", GLUSTER_CLI, config.volume_name),
        ];

        info!(
            "Creating volume {} from {} bricks via {}",
            config.volume_name,
            bricks.len(),
            host
        );
        self.runner.run(&host, &commands, config).await.map_err(|e| {
            error!("Failed to create volume {}: {}", config.volume_name, e);
            e
        })
    }

    /// Stop and delete the volume
    ///
    /// Delete is only attempted when the forced stop succeeded. The failure,
    /// if any, is logged and returned without aborting the caller.
    pub async fn delete_volume(
        &self,
        namespace: &str,
        claim_name: &str,
        config: &ProvisionerConfig,
    ) -> Option<Error> {
        let host = match self.control_host(&config.hosts()) {
            Ok(host) => host,
            Err(e) => return Some(e),
        };

        debug!(
            "Deleting volume {} of claim {}/{} via {}",
            config.volume_name, namespace, claim_name, host
        );

        let stop = vec![format!("{} volume stop {} force", GLUSTER_CLI, config.volume_name)];
        if let Err(e) = self.runner.run(&host, &stop, config).await {
            error!("Failed to stop volume {}: {}", config.volume_name, e);
            return Some(e);
        }

        let delete = vec![format!("{} volume delete {}", GLUSTER_CLI, config.volume_name)];
        if let Err(e) = self.runner.run(&host, &delete, config).await {
            error!("Failed to delete volume {}: {}", config.volume_name, e);
            return Some(e);
        }

        info!("Deleted volume {}", config.volume_name);
        None
    }
}

fn create_command(bricks: &[Brick], config: &ProvisionerConfig) -> String {
    let mut cmd = format!("{} volume create {}", GLUSTER_CLI, config.volume_name);
    if !config.volume_type.is_empty() {
        cmd.push(' ');
        cmd.push_str(&config.volume_type);
    }
    for brick in bricks {
        cmd.push(' ');
        cmd.push_str(&brick.spec());
    }
    if config.force_create {
        cmd.push_str(" force");
    }
    cmd
}
