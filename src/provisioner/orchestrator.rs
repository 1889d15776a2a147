//! Provisioning Orchestrator
//!
//! Sequences brick creation, volume assembly and endpoint publication for a
//! claim, and the reverse for a released volume:
//!
//! ```text
//! provision: validate -> resolve config -> allocate gid
//!            -> CreatingBricks -> CreatingVolume -> PublishingExposure -> Done
//!                 any failure after allocation -> rollback
//!
//! delete:    stop/delete volume -> remove bricks -> delete service -> release gid
//! ```
//!
//! Every call is stateless and runs its remote operations one after another
//! on the calling task. Dropping a `provision` future part-way through runs
//! no rollback; only returned errors do.

use super::bricks::BrickProvisioner;
use super::config::{validate_object_name, ProvisionerConfig};
use super::exposure::{exposure_name, ExposurePublisher};
use super::metrics::ProvisionerMetrics;
use super::volume::{FirstHost, VolumeLifecycle};
use crate::domain::ports::{
    ClusterControlEndpointRef, CommandRunnerRef, GidAllocatorRef, ObjectStoreRef,
    ProvisionRequest, ANN_GID,
};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{
    GlusterfsPersistentVolumeSource, ObjectReference, PersistentVolume, PersistentVolumeSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Constants
// =============================================================================

pub const ANN_CREATED_BY: &str = "kubernetes.io/createdby";
pub const CREATED_BY: &str = "glusterfs-simple-provisioner";

// =============================================================================
// Stages and Reports
// =============================================================================

/// Progress of a provision call once a gid is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionStage {
    CreatingBricks,
    CreatingVolume,
    PublishingExposure,
    Done,
}

impl std::fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionStage::CreatingBricks => write!(f, "creating bricks"),
            ProvisionStage::CreatingVolume => write!(f, "creating volume"),
            ProvisionStage::PublishingExposure => write!(f, "publishing endpoints"),
            ProvisionStage::Done => write!(f, "done"),
        }
    }
}

/// Failures swallowed during a best-effort teardown
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<Error>,
}

impl TeardownReport {
    /// Whether every teardown step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Provisioner
// =============================================================================

/// Provisions and deletes GlusterFS volumes for claims
pub struct GlusterfsProvisioner {
    runner: CommandRunnerRef,
    bricks: BrickProvisioner,
    volumes: VolumeLifecycle,
    exposure: ExposurePublisher,
    store: ObjectStoreRef,
    allocator: GidAllocatorRef,
    metrics: ProvisionerMetrics,
}

impl GlusterfsProvisioner {
    /// Create a provisioner sending cluster commands to the first brick host
    pub fn new(
        runner: CommandRunnerRef,
        store: ObjectStoreRef,
        allocator: GidAllocatorRef,
        metrics: ProvisionerMetrics,
    ) -> Self {
        Self {
            bricks: BrickProvisioner::new(runner.clone()),
            volumes: VolumeLifecycle::new(runner.clone(), Arc::new(FirstHost)),
            exposure: ExposurePublisher::new(store.clone()),
            runner,
            store,
            allocator,
            metrics,
        }
    }

    /// Replace the strategy choosing the host for cluster commands
    pub fn with_control_endpoint(mut self, control: ClusterControlEndpointRef) -> Self {
        self.volumes = VolumeLifecycle::new(self.runner.clone(), control);
        self
    }

    pub fn metrics(&self) -> &ProvisionerMetrics {
        &self.metrics
    }

    /// Provision a volume for a claim
    ///
    /// The returned volume is the only record of what was created; the
    /// caller persists it and hands it back to [`delete`](Self::delete).
    /// Every error is final: partial state is already torn down.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<PersistentVolume> {
        let timer = self.metrics.provision_duration.start_timer();
        let result = self.provision_volume(request).await;
        timer.observe_duration();

        let label = match &result {
            Ok(_) => "success",
            Err(Error::UnsupportedRequest(_) | Error::Configuration(_)) => "rejected",
            Err(_) => "failure",
        };
        self.metrics.provisions.with_label_values(&[label]).inc();
        result
    }

    /// Provision a volume and hand it to `record` for persisting
    ///
    /// If `record` fails, the freshly built volume is torn down again and
    /// the recording error is returned, so nothing is left without a record.
    pub async fn provision_and_record<F, Fut>(
        &self,
        request: &ProvisionRequest,
        record: F,
    ) -> Result<PersistentVolume>
    where
        F: FnOnce(PersistentVolume) -> Fut,
        Fut: Future<Output = Result<PersistentVolume>>,
    {
        let volume = self.provision(request).await?;
        match record(volume.clone()).await {
            Ok(recorded) => Ok(recorded),
            Err(e) => {
                error!(
                    "Failed to record volume {}, tearing it down: {}",
                    request.volume_name, e
                );
                self.metrics.rollbacks.inc();
                match self.delete(&volume).await {
                    Ok(report) if !report.is_clean() => warn!(
                        "Teardown of unrecorded volume {} left {} step(s) unfinished",
                        request.volume_name,
                        report.failures.len()
                    ),
                    Ok(_) => {}
                    Err(teardown) => error!(
                        "Teardown of unrecorded volume {} failed: {}",
                        request.volume_name, teardown
                    ),
                }
                Err(e)
            }
        }
    }

    async fn provision_volume(&self, request: &ProvisionRequest) -> Result<PersistentVolume> {
        if request.selector.is_some() {
            return Err(Error::UnsupportedRequest(format!(
                "claim {}/{} has a selector, which is not supported",
                request.namespace, request.claim_name
            )));
        }
        info!(
            "Provisioning volume {} for claim {}/{}",
            request.volume_name, request.namespace, request.claim_name
        );

        validate_object_name("namespace", &request.namespace)?;
        validate_object_name("claim name", &request.claim_name)?;
        let config = ProvisionerConfig::resolve(&request.volume_name, &request.parameters)?;
        let gid = self.allocator.allocate_next(request).await?;
        let volume = build_volume(request, &config, gid);

        let mut stage = ProvisionStage::CreatingBricks;
        match self.create_resources(request, &config, gid, &mut stage).await {
            Ok(()) => {
                info!(
                    "Provisioned volume {} for claim {}/{} with gid {}",
                    config.volume_name, request.namespace, request.claim_name, gid
                );
                Ok(volume)
            }
            Err(e) => {
                warn!(
                    "Provisioning volume {} failed while {}, rolling back: {}",
                    config.volume_name, stage, e
                );
                self.metrics.rollbacks.inc();

                let volume_attempted = stage >= ProvisionStage::CreatingVolume;
                let report = self
                    .teardown(&request.namespace, &request.claim_name, &config, volume_attempted)
                    .await;
                if !report.is_clean() {
                    warn!(
                        "Rollback of volume {} left {} step(s) unfinished",
                        config.volume_name,
                        report.failures.len()
                    );
                }
                if let Err(release_err) = self.allocator.release(&volume).await {
                    error!("Failed to release gid {} of volume {}: {}", gid, config.volume_name, release_err);
                }
                Err(e)
            }
        }
    }

    async fn create_resources(
        &self,
        request: &ProvisionRequest,
        config: &ProvisionerConfig,
        gid: u32,
        stage: &mut ProvisionStage,
    ) -> Result<()> {
        *stage = ProvisionStage::CreatingBricks;
        let bricks = self
            .bricks
            .create_bricks(&request.namespace, &request.claim_name, config, gid)
            .await?;

        *stage = ProvisionStage::CreatingVolume;
        self.volumes.create_volume(&bricks, config).await?;

        *stage = ProvisionStage::PublishingExposure;
        self.exposure
            .publish(
                &request.namespace,
                &exposure_name(&request.claim_name),
                &config.hosts(),
                &request.claim_name,
            )
            .await?;

        *stage = ProvisionStage::Done;
        Ok(())
    }

    /// Tear down a previously provisioned volume
    ///
    /// Configuration is rebuilt from the volume's storage class. Each step
    /// runs even if an earlier one failed; swallowed failures are returned
    /// in the report. Only a volume that can't be interpreted is an error.
    pub async fn delete(&self, volume: &PersistentVolume) -> Result<TeardownReport> {
        let result = self.delete_volume(volume).await;
        let label = match &result {
            Ok(report) if report.is_clean() => "clean",
            Ok(_) => "partial",
            Err(_) => "failure",
        };
        self.metrics.deletions.with_label_values(&[label]).inc();
        result
    }

    async fn delete_volume(&self, volume: &PersistentVolume) -> Result<TeardownReport> {
        let name = volume
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::Configuration("volume has no name".into()))?;
        let spec = volume
            .spec
            .as_ref()
            .ok_or_else(|| Error::Configuration(format!("volume {} has no spec", name)))?;

        let class = spec
            .storage_class_name
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Configuration(format!("volume {} has no storage class", name)))?;
        let params = self.store.class_parameters(class).await.map_err(|e| {
            error!("Failed to get storage class {} of volume {}: {}", class, name, e);
            e
        })?;
        let config = ProvisionerConfig::resolve(name, &params)?;

        let claim = spec
            .claim_ref
            .as_ref()
            .ok_or_else(|| Error::Configuration(format!("volume {} has no claimRef", name)))?;
        let namespace = claim
            .namespace
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Configuration(format!("claimRef of volume {} has no namespace", name)))?;
        let claim_name = claim
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Configuration(format!("claimRef of volume {} has no name", name)))?;

        validate_object_name("claimRef namespace", namespace)?;
        validate_object_name("claimRef name", claim_name)?;

        info!("Deleting volume {} of claim {}/{}", name, namespace, claim_name);
        let mut report = self.teardown(namespace, claim_name, &config, true).await;

        if let Err(e) = self.allocator.release(volume).await {
            error!("Failed to release gid of volume {}: {}", name, e);
            report.failures.push(e);
        }

        if report.is_clean() {
            info!("Deleted volume {}", name);
        } else {
            warn!("Deleted volume {} with {} cleanup failure(s)", name, report.failures.len());
        }
        Ok(report)
    }

    /// Best-effort removal of the volume, its bricks on every host and its service
    async fn teardown(
        &self,
        namespace: &str,
        claim_name: &str,
        config: &ProvisionerConfig,
        volume_attempted: bool,
    ) -> TeardownReport {
        let mut failures = Vec::new();

        if volume_attempted {
            failures.extend(self.volumes.delete_volume(namespace, claim_name, config).await);
        } else {
            debug!("Volume {} was never created, skipping stop/delete", config.volume_name);
        }
        failures.extend(self.bricks.delete_bricks(namespace, claim_name, config).await);
        failures.extend(
            self.exposure
                .unpublish(namespace, &exposure_name(claim_name))
                .await,
        );

        self.metrics.cleanup_failures.inc_by(failures.len() as u64);
        TeardownReport { failures }
    }
}

/// The volume handed back for a successful provision
fn build_volume(request: &ProvisionRequest, config: &ProvisionerConfig, gid: u32) -> PersistentVolume {
    let annotations = BTreeMap::from([
        (ANN_CREATED_BY.to_string(), CREATED_BY.to_string()),
        (ANN_GID.to_string(), gid.to_string()),
    ]);

    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(request.volume_name.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            persistent_volume_reclaim_policy: Some(request.reclaim_policy.clone()),
            access_modes: Some(request.access_modes.clone()),
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                request.capacity.clone(),
            )])),
            storage_class_name: Some(request.storage_class.clone()),
            mount_options: (!request.mount_options.is_empty())
                .then(|| request.mount_options.clone()),
            claim_ref: Some(ObjectReference {
                api_version: Some("v1".into()),
                kind: Some("PersistentVolumeClaim".into()),
                namespace: Some(request.namespace.clone()),
                name: Some(request.claim_name.clone()),
                ..Default::default()
            }),
            glusterfs: Some(GlusterfsPersistentVolumeSource {
                endpoints: exposure_name(&request.claim_name),
                endpoints_namespace: Some(request.namespace.clone()),
                path: config.volume_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedGidAllocator, MemoryObjectStore, RecordingRunner};
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    const CLASS: &str = "glusterfs-simple";

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("brickrootPaths".to_string(), "h1:/data,h2:/data".to_string()),
            ("volumeType".to_string(), "replicate".to_string()),
        ])
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            namespace: "ns1".into(),
            claim_name: "pvc-a".into(),
            volume_name: "vol1".into(),
            capacity: Quantity("1Gi".into()),
            access_modes: vec!["ReadWriteMany".into()],
            selector: None,
            storage_class: CLASS.into(),
            reclaim_policy: "Delete".into(),
            mount_options: Vec::new(),
            parameters: params(),
        }
    }

    struct Fixture {
        runner: Arc<RecordingRunner>,
        store: Arc<MemoryObjectStore>,
        allocator: Arc<FixedGidAllocator>,
        provisioner: GlusterfsProvisioner,
    }

    fn fixture(runner: RecordingRunner, store: MemoryObjectStore, allocator: FixedGidAllocator) -> Fixture {
        let runner = Arc::new(runner);
        let store = Arc::new(store.with_class(CLASS, params()));
        let allocator = Arc::new(allocator);
        let provisioner = GlusterfsProvisioner::new(
            runner.clone(),
            store.clone(),
            allocator.clone(),
            ProvisionerMetrics::new().unwrap(),
        );
        Fixture { runner, store, allocator, provisioner }
    }

    fn default_fixture() -> Fixture {
        fixture(RecordingRunner::new(), MemoryObjectStore::new(), FixedGidAllocator::new(2001))
    }

    #[tokio::test]
    async fn test_provision_issues_full_sequence() {
        let f = default_fixture();
        let volume = f.provisioner.provision(&request()).await.unwrap();

        let brick = "/data/ns1/pvc-a-vol1";
        assert_eq!(
            f.runner.executed(),
            vec![
                format!("h1: mkdir -p {}", brick),
                format!("h1: chown :2001 {}", brick),
                format!("h1: chmod 0771 {}", brick),
                format!("h2: mkdir -p {}", brick),
                format!("h2: chown :2001 {}", brick),
                format!("h2: chmod 0771 {}", brick),
                format!(
                    "h1: gluster --mode=script volume create vol1 replicate h1:{} h2:{}",
                    brick, brick
                ),
                "h1: gluster --mode=script volume start vol1".to_string(),
            ]
        );

        let endpoints = f.store.endpoints.lock()["ns1/glusterfs-simple-pvc-a"].clone();
        let ips: Vec<String> = endpoints.subsets.unwrap()[0]
            .addresses
            .clone()
            .unwrap()
            .into_iter()
            .map(|a| a.ip)
            .collect();
        assert_eq!(ips, vec!["h1".to_string(), "h2".to_string()]);
        assert!(f.store.services.lock().contains_key("ns1/glusterfs-simple-pvc-a"));

        let annotations = volume.metadata.annotations.clone().unwrap();
        assert_eq!(annotations[ANN_GID], "2001");
        assert_eq!(annotations[ANN_CREATED_BY], CREATED_BY);
        let source = volume.spec.unwrap().glusterfs.unwrap();
        assert_eq!(source.endpoints, "glusterfs-simple-pvc-a");
        assert_eq!(source.path, "vol1");
        assert!(f.allocator.released.lock().is_empty());

        let metrics = f.provisioner.metrics().encode().unwrap();
        assert!(metrics.contains("glusterfs_provisioner_provisions_total{result=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_brick_failure_rolls_back_every_host() {
        let f = fixture(
            RecordingRunner::new().failing("h2", "mkdir"),
            MemoryObjectStore::new(),
            FixedGidAllocator::new(2001),
        );
        let err = f.provisioner.provision(&request()).await.unwrap_err();

        assert_matches!(err, Error::RemoteCommand { ref host, .. } if host == "h2");
        assert!(f.runner.matching("volume create").is_empty());
        assert!(f.runner.matching("volume stop").is_empty());
        assert_eq!(
            f.runner.matching("rm -rf"),
            vec![
                "h1: rm -rf /data/ns1/pvc-a-vol1".to_string(),
                "h2: rm -rf /data/ns1/pvc-a-vol1".to_string(),
            ]
        );
        assert!(f.store.endpoints.lock().is_empty());
        assert!(f.store.services.lock().is_empty());
        assert_eq!(*f.allocator.released.lock(), vec!["vol1".to_string()]);
    }

    #[tokio::test]
    async fn test_volume_failure_tears_down_volume_and_bricks() {
        let f = fixture(
            RecordingRunner::new().failing("h1", "gluster --mode=script volume start"),
            MemoryObjectStore::new(),
            FixedGidAllocator::new(2001),
        );
        let err = f.provisioner.provision(&request()).await.unwrap_err();

        assert_matches!(err, Error::RemoteCommand { .. });
        assert_eq!(f.runner.matching("volume stop vol1 force").len(), 1);
        assert_eq!(f.runner.matching("volume delete vol1").len(), 1);
        assert_eq!(f.runner.matching("rm -rf").len(), 2);
        assert!(f.store.endpoints.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_tears_down_everything() {
        let f = fixture(
            RecordingRunner::new(),
            MemoryObjectStore {
                fail_create_service: true,
                ..Default::default()
            },
            FixedGidAllocator::new(2001),
        );
        let err = f.provisioner.provision(&request()).await.unwrap_err();

        assert_matches!(err, Error::ObjectStore { .. });
        assert_eq!(f.runner.matching("volume stop").len(), 1);
        assert_eq!(f.runner.matching("rm -rf").len(), 2);
        assert_eq!(
            *f.store.deleted_services.lock(),
            vec!["ns1/glusterfs-simple-pvc-a".to_string()]
        );
        assert_eq!(f.allocator.released.lock().len(), 1);

        let metrics = f.provisioner.metrics().encode().unwrap();
        assert!(metrics.contains("glusterfs_provisioner_rollbacks_total 1"));
    }

    #[tokio::test]
    async fn test_selector_is_rejected_without_remote_calls() {
        let f = default_fixture();
        let mut req = request();
        req.selector = Some(LabelSelector::default());

        let err = f.provisioner.provision(&req).await.unwrap_err();

        assert_matches!(err, Error::UnsupportedRequest(_));
        assert!(!err.is_retryable());
        assert!(f.runner.executed().is_empty());
        assert_eq!(*f.allocator.allocated.lock(), 0);
        assert!(f.store.deleted_services.lock().is_empty());
    }

    #[tokio::test]
    async fn test_config_error_touches_nothing() {
        let f = default_fixture();
        let mut req = request();
        req.parameters.remove("brickrootPaths");

        let err = f.provisioner.provision(&req).await.unwrap_err();

        assert_matches!(err, Error::Configuration(_));
        assert!(f.runner.executed().is_empty());
        assert_eq!(*f.allocator.allocated.lock(), 0);
    }

    #[tokio::test]
    async fn test_allocator_failure_is_terminal() {
        let mut allocator = FixedGidAllocator::new(2001);
        allocator.fail_allocate = true;
        let f = fixture(RecordingRunner::new(), MemoryObjectStore::new(), allocator);

        let err = f.provisioner.provision(&request()).await.unwrap_err();

        assert_matches!(err, Error::Allocator(_));
        assert!(f.runner.executed().is_empty());
        assert!(f.allocator.released.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reverses_provision() {
        let f = default_fixture();
        let volume = f.provisioner.provision(&request()).await.unwrap();

        let report = f.provisioner.delete(&volume).await.unwrap();

        assert!(report.is_clean());
        let executed = f.runner.executed();
        assert_eq!(
            executed[8..],
            [
                "h1: gluster --mode=script volume stop vol1 force".to_string(),
                "h1: gluster --mode=script volume delete vol1".to_string(),
                "h1: rm -rf /data/ns1/pvc-a-vol1".to_string(),
                "h2: rm -rf /data/ns1/pvc-a-vol1".to_string(),
            ]
        );
        assert!(f.store.services.lock().is_empty());
        assert_eq!(*f.allocator.released.lock(), vec!["vol1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_continues_past_failures() {
        let mut allocator = FixedGidAllocator::new(2001);
        allocator.fail_release = true;
        let f = fixture(
            RecordingRunner::new()
                .failing("h1", "gluster --mode=script volume stop")
                .failing("h1", "rm"),
            MemoryObjectStore {
                fail_delete_service: true,
                ..Default::default()
            },
            allocator,
        );
        let volume = build_volume(
            &request(),
            &ProvisionerConfig::resolve("vol1", &params()).unwrap(),
            2001,
        );

        let report = f.provisioner.delete(&volume).await.unwrap();

        // stop, rm on h1, service delete and gid release
        assert_eq!(report.failures.len(), 4);
        assert!(f.runner.matching("volume delete").is_empty());
        assert_eq!(f.runner.matching("h2: rm -rf").len(), 1);
        assert_eq!(f.store.deleted_services.lock().len(), 1);

        let metrics = f.provisioner.metrics().encode().unwrap();
        assert!(metrics.contains("glusterfs_provisioner_deletions_total{result=\"partial\"} 1"));
    }

    #[tokio::test]
    async fn test_delete_requires_claim_ref() {
        let f = default_fixture();
        let mut volume = build_volume(
            &request(),
            &ProvisionerConfig::resolve("vol1", &params()).unwrap(),
            2001,
        );
        volume.spec.as_mut().unwrap().claim_ref = None;

        let err = f.provisioner.delete(&volume).await.unwrap_err();

        assert_matches!(err, Error::Configuration(_));
        assert!(f.runner.executed().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_known_class() {
        let f = default_fixture();
        let mut req = request();
        req.storage_class = "removed-class".into();
        let volume = build_volume(&req, &ProvisionerConfig::resolve("vol1", &params()).unwrap(), 2001);

        let err = f.provisioner.delete(&volume).await.unwrap_err();

        assert_matches!(err, Error::ResourceNotFound { .. });
        assert!(f.runner.executed().is_empty());
    }

    #[tokio::test]
    async fn test_custom_control_endpoint() {
        struct SecondHost;
        impl crate::domain::ports::ClusterControlEndpoint for SecondHost {
            fn select(&self, hosts: &[String]) -> Option<String> {
                hosts.get(1).cloned()
            }
        }

        let f = default_fixture();
        let provisioner = GlusterfsProvisioner::new(
            f.runner.clone(),
            f.store.clone(),
            f.allocator.clone(),
            ProvisionerMetrics::new().unwrap(),
        )
        .with_control_endpoint(Arc::new(SecondHost));

        provisioner.provision(&request()).await.unwrap();
        assert_eq!(f.runner.matching("h2: gluster").len(), 2);
    }

    #[tokio::test]
    async fn test_provision_rejects_unsafe_claim_names() {
        let f = fixture(
            RecordingRunner::new().failing("h1", "chown"),
            MemoryObjectStore::new(),
            FixedGidAllocator::new(2001),
        );
        for (namespace, claim) in [("ns1", "x / #"), ("ns1", ".."), ("../etc", "pvc-a")] {
            let mut req = request();
            req.namespace = namespace.into();
            req.claim_name = claim.into();

            let err = f.provisioner.provision(&req).await.unwrap_err();
            assert_matches!(err, Error::Configuration(_), "accepted {}/{}", namespace, claim);
        }

        assert!(f.runner.executed().is_empty());
        assert_eq!(*f.allocator.allocated.lock(), 0);
    }

    #[tokio::test]
    async fn test_delete_rejects_unsafe_claim_ref() {
        let f = default_fixture();
        let mut volume = build_volume(
            &request(),
            &ProvisionerConfig::resolve("vol1", &params()).unwrap(),
            2001,
        );
        volume.spec.as_mut().unwrap().claim_ref.as_mut().unwrap().name = Some("x / #".into());

        let err = f.provisioner.delete(&volume).await.unwrap_err();

        assert_matches!(err, Error::Configuration(_));
        assert!(f.runner.executed().is_empty());
        assert!(f.store.deleted_services.lock().is_empty());
        assert!(f.allocator.released.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_tears_volume_down() {
        let f = default_fixture();

        let err = f
            .provisioner
            .provision_and_record(&request(), |volume| async move {
                Err(Error::ResourceExists {
                    kind: "PersistentVolume".into(),
                    name: volume.metadata.name.unwrap_or_default(),
                })
            })
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(f.runner.matching("volume stop vol1 force").len(), 1);
        assert_eq!(f.runner.matching("volume delete vol1").len(), 1);
        assert_eq!(f.runner.matching("rm -rf").len(), 2);
        assert!(f.store.services.lock().is_empty());
        assert_eq!(*f.allocator.released.lock(), vec!["vol1".to_string()]);

        let metrics = f.provisioner.metrics().encode().unwrap();
        assert!(metrics.contains("glusterfs_provisioner_rollbacks_total 1"));
    }

    #[tokio::test]
    async fn test_recorded_volume_is_returned() {
        let f = default_fixture();

        let volume = f
            .provisioner
            .provision_and_record(&request(), |volume| async move { Ok(volume) })
            .await
            .unwrap();

        assert_eq!(volume.metadata.name.as_deref(), Some("vol1"));
        assert!(f.runner.matching("rm -rf").is_empty());
        assert!(f.allocator.released.lock().is_empty());
    }
}
