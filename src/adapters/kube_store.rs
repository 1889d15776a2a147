//! Kubernetes Object Store Adapter
//!
//! Implements [`ObjectStore`] on top of the Kubernetes API, plus the claim,
//! storage class and volume lookups the command line front end needs.

use crate::domain::ports::ObjectStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Endpoints, PersistentVolume, PersistentVolumeClaim, Service,
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Maps API errors onto the provisioner's error kinds
///
/// 409 becomes [`Error::ResourceExists`], 404 becomes
/// [`Error::ResourceNotFound`]; other API responses keep their message.
fn api_error(err: kube::Error, kind: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 409 => Error::ResourceExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 404 => Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(response) => Error::ObjectStore {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: format!("{} ({})", response.message, response.code),
        },
        other => Error::Kube(other),
    }
}

/// Object store backed by a Kubernetes client
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch a claim
    pub async fn claim(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| api_error(e, "PersistentVolumeClaim", &format!("{}/{}", namespace, name)))
    }

    /// Fetch a storage class
    pub async fn storage_class(&self, name: &str) -> Result<StorageClass> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| api_error(e, "StorageClass", name))
    }

    /// Fetch a persistent volume
    pub async fn volume(&self, name: &str) -> Result<PersistentVolume> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| api_error(e, "PersistentVolume", name))
    }

    /// Create a persistent volume
    pub async fn persist_volume(&self, volume: &PersistentVolume) -> Result<PersistentVolume> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let name = volume.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), volume)
            .await
            .map_err(|e| api_error(e, "PersistentVolume", &name))
    }

    /// Delete a persistent volume
    pub async fn remove_volume(&self, name: &str) -> Result<()> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| api_error(e, "PersistentVolume", name))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn create_endpoints(&self, endpoints: &Endpoints) -> Result<()> {
        let namespace = endpoints.metadata.namespace.as_deref().unwrap_or("default");
        let name = endpoints.metadata.name.as_deref().unwrap_or_default();
        debug!("Creating endpoints {}/{}", namespace, name);

        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), endpoints)
            .await
            .map_err(|e| api_error(e, "Endpoints", &format!("{}/{}", namespace, name)))?;
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        let namespace = service.metadata.namespace.as_deref().unwrap_or("default");
        let name = service.metadata.name.as_deref().unwrap_or_default();
        debug!("Creating service {}/{}", namespace, name);

        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service)
            .await
            .map_err(|e| api_error(e, "Service", &format!("{}/{}", namespace, name)))?;
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| api_error(e, "Service", &format!("{}/{}", namespace, name)))?;
        Ok(())
    }

    async fn class_parameters(&self, class_name: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.storage_class(class_name).await?.parameters.unwrap_or_default())
    }

    async fn list_volumes(&self) -> Result<Vec<PersistentVolume>> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error(e, "PersistentVolume", "*"))?;
        Ok(list.items)
    }
}
