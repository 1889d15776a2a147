//! Provisioner Metrics
//!
//! Prometheus counters and a duration histogram for provision and delete
//! calls, kept in a dedicated registry.

use crate::error::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::path::Path;

/// Metrics of one provisioner instance
#[derive(Clone)]
pub struct ProvisionerMetrics {
    registry: Registry,
    /// Provision calls by result (`success`, `failure`, `rejected`)
    pub provisions: IntCounterVec,
    /// Delete calls by result (`clean`, `partial`, `failure`)
    pub deletions: IntCounterVec,
    /// Provision calls that tore down partial state
    pub rollbacks: IntCounter,
    /// Cleanup steps that failed and were skipped
    pub cleanup_failures: IntCounter,
    /// Duration of provision calls
    pub provision_duration: Histogram,
}

impl ProvisionerMetrics {
    /// Create and register all metrics in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let provisions = IntCounterVec::new(
            Opts::new("glusterfs_provisioner_provisions_total", "Provision calls by result"),
            &["result"],
        )?;
        let deletions = IntCounterVec::new(
            Opts::new("glusterfs_provisioner_deletions_total", "Delete calls by result"),
            &["result"],
        )?;
        let rollbacks = IntCounter::new(
            "glusterfs_provisioner_rollbacks_total",
            "Failed provision calls that tore down partial state",
        )?;
        let cleanup_failures = IntCounter::new(
            "glusterfs_provisioner_cleanup_failures_total",
            "Teardown steps that failed and were skipped",
        )?;
        let provision_duration = Histogram::with_opts(HistogramOpts::new(
            "glusterfs_provisioner_provision_duration_seconds",
            "Duration of provision calls",
        ))?;

        registry.register(Box::new(provisions.clone()))?;
        registry.register(Box::new(deletions.clone()))?;
        registry.register(Box::new(rollbacks.clone()))?;
        registry.register(Box::new(cleanup_failures.clone()))?;
        registry.register(Box::new(provision_duration.clone()))?;

        Ok(Self {
            registry,
            provisions,
            deletions,
            rollbacks,
            cleanup_failures,
            provision_duration,
        })
    }

    /// Text exposition of all metrics
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write the exposition for node-exporter's textfile collector
    ///
    /// Writes to a temporary sibling first so the collector never reads a
    /// partial file.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.encode()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
