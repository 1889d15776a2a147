//! Pod Exec Command Runner
//!
//! Runs brick and volume commands inside the GlusterFS server pod scheduled
//! on the target host. Server pods are found by label selector in the
//! namespace named by the storage class, and matched on host IP or node name.

use crate::domain::ports::CommandRunner;
use crate::error::{Error, Result};
use crate::provisioner::config::ProvisionerConfig;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Executes commands with `sh -c` in GlusterFS server pods
#[derive(Clone)]
pub struct KubeExecRunner {
    client: Client,
}

impl KubeExecRunner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn server_pod(&self, pods: &Api<Pod>, host: &str, config: &ProvisionerConfig) -> Result<String> {
        let list = pods
            .list(&ListParams::default().labels(&config.pod_selector))
            .await?;

        pod_on_host(&list.items, host).ok_or_else(|| Error::RemoteCommand {
            host: host.to_string(),
            command: String::new(),
            reason: format!(
                "no running pod matching {:?} in namespace {}",
                config.pod_selector, config.pod_namespace
            ),
        })
    }

    async fn exec(&self, pods: &Api<Pod>, pod: &str, host: &str, command: &str) -> Result<()> {
        let failed = |reason: String| Error::RemoteCommand {
            host: host.to_string(),
            command: command.to_string(),
            reason,
        };

        let params = AttachParams::default().stdin(false).stdout(true).stderr(true);
        let mut process = pods
            .exec(pod, ["sh", "-c", command], &params)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = process.take_status();
        let (stdout, stderr) = tokio::join!(drain(process.stdout()), drain(process.stderr()));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        if let Err(e) = process.join().await {
            warn!("Exec stream in pod {} did not close cleanly: {}", pod, e);
        }
        debug!("{}: {} -> {}", host, command, stdout.trim());

        match status {
            Some(s) if s.status.as_deref() == Some("Success") => Ok(()),
            Some(s) => Err(failed(format!(
                "{}: {}",
                s.message.unwrap_or_else(|| "command failed".into()),
                stderr.trim()
            ))),
            None => Err(failed(format!("no exit status: {}", stderr.trim()))),
        }
    }
}

#[async_trait]
impl CommandRunner for KubeExecRunner {
    async fn run(&self, host: &str, commands: &[String], config: &ProvisionerConfig) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &config.pod_namespace);
        let pod = self.server_pod(&pods, host, config).await?;

        for command in commands {
            debug!("Executing in pod {} on {}: {}", pod, host, command);
            self.exec(&pods, &pod, host, command).await?;
        }
        Ok(())
    }
}

/// Name of the first running pod on `host`
fn pod_on_host(pods: &[Pod], host: &str) -> Option<String> {
    pods.iter()
        .filter(|pod| {
            let status = pod.status.as_ref();
            let running = status.and_then(|s| s.phase.as_deref()) == Some("Running");
            let host_ip = status.and_then(|s| s.host_ip.as_deref()) == Some(host);
            let node = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(host);
            running && (host_ip || node)
        })
        .find_map(|pod| pod.metadata.name.clone())
}

async fn drain(reader: Option<impl AsyncRead + Unpin>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            debug!("Failed to read exec output: {}", e);
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
