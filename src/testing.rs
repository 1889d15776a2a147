//! In-memory fakes of the domain ports for unit tests

use crate::domain::ports::{CommandRunner, GidAllocator, ObjectStore, ProvisionRequest};
use crate::error::{Error, Result};
use crate::provisioner::config::ProvisionerConfig;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolume, Service};
use parking_lot::Mutex;
use std::collections::BTreeMap;

// =============================================================================
// Recording Runner
// =============================================================================

/// Records every executed command as `host: command`
#[derive(Default)]
pub struct RecordingRunner {
    executed: Mutex<Vec<String>>,
    failures: Vec<(String, String)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands on `host` starting with `prefix`
    pub fn failing(mut self, host: &str, prefix: &str) -> Self {
        self.failures.push((host.to_string(), prefix.to_string()));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Executed commands containing `needle`
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, host: &str, commands: &[String], _config: &ProvisionerConfig) -> Result<()> {
        for command in commands {
            self.executed.lock().push(format!("{}: {}", host, command));
            let fails = self
                .failures
                .iter()
                .any(|(h, prefix)| h == host && command.starts_with(prefix.as_str()));
            if fails {
                return Err(Error::RemoteCommand {
                    host: host.to_string(),
                    command: command.clone(),
                    reason: "exit status 1".into(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Memory Object Store
// =============================================================================

/// Keeps created objects in maps keyed by `namespace/name`
#[derive(Default)]
pub struct MemoryObjectStore {
    pub endpoints: Mutex<BTreeMap<String, Endpoints>>,
    pub services: Mutex<BTreeMap<String, Service>>,
    pub deleted_services: Mutex<Vec<String>>,
    pub classes: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    pub volumes: Mutex<Vec<PersistentVolume>>,
    pub fail_create_service: bool,
    pub fail_delete_service: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(self, name: &str, params: BTreeMap<String, String>) -> Self {
        self.classes.lock().insert(name.to_string(), params);
        self
    }
}

fn object_key(namespace: Option<&String>, name: Option<&String>) -> String {
    format!(
        "{}/{}",
        namespace.map(String::as_str).unwrap_or_default(),
        name.map(String::as_str).unwrap_or_default()
    )
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<()> {
        let key = object_key(
            endpoints.metadata.namespace.as_ref(),
            endpoints.metadata.name.as_ref(),
        );
        let mut all = self.endpoints.lock();
        if all.contains_key(&key) {
            return Err(Error::ResourceExists { kind: "Endpoints".into(), name: key });
        }
        all.insert(key, endpoints.clone());
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        let key = object_key(
            service.metadata.namespace.as_ref(),
            service.metadata.name.as_ref(),
        );
        if self.fail_create_service {
            return Err(Error::ObjectStore {
                kind: "Service".into(),
                name: key,
                reason: "admission webhook denied the request".into(),
            });
        }
        let mut all = self.services.lock();
        if all.contains_key(&key) {
            return Err(Error::ResourceExists { kind: "Service".into(), name: key });
        }
        all.insert(key, service.clone());
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let key = format!("{}/{}", namespace, name);
        self.deleted_services.lock().push(key.clone());
        if self.fail_delete_service {
            return Err(Error::ObjectStore {
                kind: "Service".into(),
                name: key,
                reason: "connection refused".into(),
            });
        }
        match self.services.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::ResourceNotFound { kind: "Service".into(), name: key }),
        }
    }

    async fn class_parameters(&self, class_name: &str) -> Result<BTreeMap<String, String>> {
        self.classes
            .lock()
            .get(class_name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "StorageClass".into(),
                name: class_name.to_string(),
            })
    }

    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>> {
        Ok(self.volumes.lock().clone())
    }
}

// =============================================================================
// Fixed Gid Allocator
// =============================================================================

/// Hands out one fixed gid and records releases
pub struct FixedGidAllocator {
    pub gid: u32,
    pub fail_allocate: bool,
    pub fail_release: bool,
    pub allocated: Mutex<u32>,
    pub released: Mutex<Vec<String>>,
}

impl FixedGidAllocator {
    pub fn new(gid: u32) -> Self {
        Self {
            gid,
            fail_allocate: false,
            fail_release: false,
            allocated: Mutex::new(0),
            released: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GidAllocator for FixedGidAllocator {
    async fn allocate_next(&self, _request: &ProvisionRequest) -> Result<u32> {
        if self.fail_allocate {
            return Err(Error::Allocator("gid range exhausted".into()));
        }
        *self.allocated.lock() += 1;
        Ok(self.gid)
    }

    async fn release(&self, volume: &PersistentVolume) -> Result<()> {
        self.released
            .lock()
            .push(volume.metadata.name.clone().unwrap_or_default());
        if self.fail_release {
            return Err(Error::Allocator("gid table unavailable".into()));
        }
        Ok(())
    }
}
