//! Brick Provisioner
//!
//! Creates and removes the per-host brick directories that back a volume.
//! Brick paths are derived from the claim and volume names every time and
//! are never stored, so create and delete must agree on [`brick_path`].

use super::config::{BrickRoot, ProvisionerConfig};
use crate::domain::ports::CommandRunnerRef;
use crate::error::{Error, Result};
use tracing::{error, info};

/// Mode applied to every brick directory
pub const BRICK_MODE: &str = "0771";

/// One physical extent of a volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brick {
    pub host: String,
    pub path: String,
}

impl Brick {
    /// `host:path` as understood by `gluster volume create`
    pub fn spec(&self) -> String {
        format!("{}:{}", self.host, self.path)
    }
}

/// Directory of the brick for a claim under `root`
pub fn brick_path(root: &BrickRoot, namespace: &str, claim_name: &str, volume_name: &str) -> String {
    format!("{}/{}/{}-{}", root.path, namespace, claim_name, volume_name)
}

/// Issues brick directory commands through a [`CommandRunner`](crate::domain::CommandRunner)
pub struct BrickProvisioner {
    runner: CommandRunnerRef,
}

impl BrickProvisioner {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    /// Create one brick per root, in root order, owned by `gid`
    ///
    /// Returns on the first host that fails. Bricks already created on
    /// earlier hosts are left for the caller to remove.
    pub async fn create_bricks(
        &self,
        namespace: &str,
        claim_name: &str,
        config: &ProvisionerConfig,
        gid: u32,
    ) -> Result<Vec<Brick>> {
        let mut bricks = Vec::with_capacity(config.brick_roots.len());

        for root in &config.brick_roots {
            let path = brick_path(root, namespace, claim_name, &config.volume_name);
            info!("Creating brick {}:{}", root.host, path);

            let commands = vec![
                format!("mkdir -p {}", path),
                format!("chown :{} {}", gid, path),
                format!("chmod {} {}", BRICK_MODE, path),
            ];
            self.runner.run(&root.host, &commands, config).await?;

            bricks.push(Brick {
                host: root.host.clone(),
                path,
            });
        }

        Ok(bricks)
    }

    /// Remove the brick of every configured root
    ///
    /// Every host is attempted; failures are logged and returned.
    pub async fn delete_bricks(
        &self,
        namespace: &str,
        claim_name: &str,
        config: &ProvisionerConfig,
    ) -> Vec<Error> {
        let mut failures = Vec::new();

        for root in &config.brick_roots {
            let path = brick_path(root, namespace, claim_name, &config.volume_name);
            info!("Removing brick {}:{}", root.host, path);

            let commands = vec![format!("rm -rf {}", path)];
            if let Err(e) = self.runner.run(&root.host, &commands, config).await {
                error!("Failed to remove brick {}:{}: {}", root.host, path, e);
                failures.push(e);
            }
        }

        failures
    }
}
