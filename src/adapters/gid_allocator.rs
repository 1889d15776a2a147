//! Per-Class Gid Allocator
//!
//! Hands out the group id that owns a volume's brick directories. Each
//! storage class has its own range and table of used gids. Tables are
//! seeded on first use from the persistent volumes of the class that carry
//! the gid annotation.

use crate::domain::ports::{GidAllocator, ObjectStoreRef, ProvisionRequest, ANN_GID};
use crate::error::{Error, Result};
use crate::provisioner::config::{PARAM_GID_MAX, PARAM_GID_MIN};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_GID_MIN: u32 = 2000;
pub const DEFAULT_GID_MAX: u32 = i32::MAX as u32;

/// Gid range of a class, from `gidMin`/`gidMax`
pub fn gid_range(params: &BTreeMap<String, String>) -> Result<(u32, u32)> {
    let mut min = DEFAULT_GID_MIN;
    let mut max = DEFAULT_GID_MAX;

    for (key, value) in params {
        let bound = match key.to_lowercase().as_str() {
            PARAM_GID_MIN => &mut min,
            PARAM_GID_MAX => &mut max,
            _ => continue,
        };
        *bound = value
            .trim()
            .parse()
            .ok()
            .filter(|gid| *gid <= DEFAULT_GID_MAX)
            .ok_or_else(|| Error::Configuration(format!("invalid {} {:?}", key, value)))?;
    }

    if min > max {
        return Err(Error::Configuration(format!(
            "gidMin {} is greater than gidMax {}",
            min, max
        )));
    }
    Ok((min, max))
}

/// Gid annotation of a volume, if any
pub fn volume_gid(volume: &PersistentVolume) -> Result<Option<u32>> {
    let Some(value) = volume
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANN_GID))
    else {
        return Ok(None);
    };

    value.parse().map(Some).map_err(|_| {
        Error::Allocator(format!(
            "volume {} has invalid gid annotation {:?}",
            volume.metadata.name.as_deref().unwrap_or_default(),
            value
        ))
    })
}

fn volume_class(volume: &PersistentVolume) -> Option<&str> {
    volume.spec.as_ref()?.storage_class_name.as_deref()
}

#[derive(Debug, Default)]
struct GidTable {
    used: BTreeSet<u32>,
}

impl GidTable {
    fn lowest_free(&self, min: u32, max: u32) -> Option<u32> {
        let mut candidate = min;
        for gid in self.used.range(min..=max) {
            if *gid != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        (candidate <= max).then_some(candidate)
    }
}

/// [`GidAllocator`] keeping one table per storage class
pub struct ClassGidAllocator {
    store: ObjectStoreRef,
    tables: Mutex<HashMap<String, GidTable>>,
}

impl ClassGidAllocator {
    pub fn new(store: ObjectStoreRef) -> Self {
        Self {
            store,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the table of `class` from existing volumes, once
    async fn seed(&self, class: &str) -> Result<()> {
        if self.tables.lock().contains_key(class) {
            return Ok(());
        }

        let volumes = self.store.list_volumes().await?;
        let mut table = GidTable::default();
        for volume in volumes.iter().filter(|v| volume_class(v) == Some(class)) {
            match volume_gid(volume) {
                Ok(Some(gid)) => {
                    table.used.insert(gid);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping volume while seeding gids: {}", e),
            }
        }

        debug!("Seeded gid table of class {} with {} gids", class, table.used.len());
        self.tables.lock().entry(class.to_string()).or_insert(table);
        Ok(())
    }
}

#[async_trait]
impl GidAllocator for ClassGidAllocator {
    async fn allocate_next(&self, request: &ProvisionRequest) -> Result<u32> {
        let (min, max) = gid_range(&request.parameters)?;
        self.seed(&request.storage_class).await?;

        let mut tables = self.tables.lock();
        let table = tables.entry(request.storage_class.clone()).or_default();
        let gid = table.lowest_free(min, max).ok_or_else(|| {
            Error::Allocator(format!(
                "gid range {}-{} of class {} is exhausted",
                min, max, request.storage_class
            ))
        })?;
        table.used.insert(gid);

        info!("Allocated gid {} for {}/{}", gid, request.namespace, request.claim_name);
        Ok(gid)
    }

    async fn release(&self, volume: &PersistentVolume) -> Result<()> {
        let Some(gid) = volume_gid(volume)? else {
            return Ok(());
        };
        let Some(class) = volume_class(volume) else {
            return Ok(());
        };

        if let Some(table) = self.tables.lock().get_mut(class) {
            table.used.remove(&gid);
        }
        debug!("Released gid {} of class {}", gid, class);
        Ok(())
    }
}
