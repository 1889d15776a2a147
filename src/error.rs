//! Error types for the GlusterFS provisioner
//!
//! Provides structured error types for configuration resolution, remote
//! command execution, Kubernetes object handling and gid allocation.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    // =========================================================================
    // Remote Command Errors
    // =========================================================================
    #[error("Remote command failed on {host}: `{command}`: {reason}")]
    RemoteCommand {
        host: String,
        command: String,
        reason: String,
    },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Object store error: {kind}/{name}: {reason}")]
    ObjectStore {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("Gid allocation failed: {0}")]
    Allocator(String),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Serialization / IO Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action the calling controller should take for a failed claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry the claim later with exponential backoff
    RequeueWithBackoff,
    /// Don't retry, wait for the claim or class to change
    NoRequeue,
}

impl Error {
    /// Determine what the controller should do with this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Bad parameters or unsupported claims won't fix themselves
            Error::Configuration(_) | Error::UnsupportedRequest(_) => ErrorAction::NoRequeue,

            // Remote hosts, API server and allocator may recover
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::RemoteCommand { .. })
    }

    /// Check if this error reports an object that already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::ResourceExists { .. })
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
