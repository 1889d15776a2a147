//! Provisioner Configuration
//!
//! Resolves the flat storage class parameter map into a validated
//! [`ProvisionerConfig`]. Every value that ends up inside a shell command is
//! checked here, so later stages can format commands without quoting.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Constants
// =============================================================================

/// Comma separated `host:path` brick roots (required)
pub const PARAM_BRICK_ROOT_PATHS: &str = "brickrootpaths";
/// Volume type passed through to `gluster volume create`
pub const PARAM_VOLUME_TYPE: &str = "volumetype";
/// Append `force` to `gluster volume create`
pub const PARAM_FORCE_CREATE: &str = "forcecreate";
/// Namespace of the GlusterFS server pods
pub const PARAM_NAMESPACE: &str = "namespace";
/// Label selector of the GlusterFS server pods
pub const PARAM_SELECTOR: &str = "selector";
/// Lower bound of the gid range, consumed by the gid allocator
pub const PARAM_GID_MIN: &str = "gidmin";
/// Upper bound of the gid range, consumed by the gid allocator
pub const PARAM_GID_MAX: &str = "gidmax";

pub const DEFAULT_POD_NAMESPACE: &str = "default";
pub const DEFAULT_POD_SELECTOR: &str = "glusterfs-node==pod";

// =============================================================================
// Brick Roots
// =============================================================================

/// Directory on a storage host under which bricks are created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickRoot {
    /// Storage host, as reachable by the command transport
    pub host: String,
    /// Absolute directory path without trailing slash
    pub path: String,
}

impl BrickRoot {
    /// Parse a `host:path` pair
    pub fn parse(pair: &str) -> Result<Self> {
        let (host, path) = pair.trim().split_once(':').ok_or_else(|| {
            Error::Configuration(format!("brick root {:?} is not host:path", pair))
        })?;

        if host.is_empty() || !host.chars().all(is_host_char) {
            return Err(Error::Configuration(format!(
                "brick root {:?} has an invalid host",
                pair
            )));
        }
        if !path.starts_with('/') || !path.chars().all(is_path_char) {
            return Err(Error::Configuration(format!(
                "brick root {:?} needs an absolute path of [A-Za-z0-9/._-]",
                pair
            )));
        }

        let path = path.trim_end_matches('/');
        if path
            .split('/')
            .skip(1)
            .any(|segment| matches!(segment, "" | "." | ".."))
        {
            return Err(Error::Configuration(format!(
                "brick root {:?} has an empty, . or .. path segment",
                pair
            )));
        }

        Ok(Self {
            host: host.to_string(),
            path: path.to_string(),
        })
    }
}

// =============================================================================
// Provisioner Config
// =============================================================================

/// Validated configuration for one provision or delete call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
    /// Brick roots, one per host, in brick order
    pub brick_roots: Vec<BrickRoot>,
    /// GlusterFS volume name
    pub volume_name: String,
    /// Volume type words, e.g. `replica 3`; empty for a distributed volume
    pub volume_type: String,
    /// Pass `force` to volume creation
    pub force_create: bool,
    /// Namespace of the GlusterFS server pods
    pub pod_namespace: String,
    /// Label selector of the GlusterFS server pods
    pub pod_selector: String,
}

impl ProvisionerConfig {
    /// Resolve configuration for `volume_name` from storage class parameters
    ///
    /// Keys are matched case-insensitively. Unknown keys are rejected.
    pub fn resolve(volume_name: &str, params: &BTreeMap<String, String>) -> Result<Self> {
        if volume_name.is_empty() || !volume_name.chars().all(is_name_char) {
            return Err(Error::Configuration(format!(
                "volume name {:?} must be non-empty [A-Za-z0-9_.-]",
                volume_name
            )));
        }

        let mut brick_roots = None;
        let mut volume_type = String::new();
        let mut force_create = false;
        let mut pod_namespace = DEFAULT_POD_NAMESPACE.to_string();
        let mut pod_selector = DEFAULT_POD_SELECTOR.to_string();

        let mut seen = BTreeSet::new();
        for (key, value) in params {
            let normalized = key.to_lowercase();
            if !seen.insert(normalized.clone()) {
                return Err(Error::Configuration(format!(
                    "storage class parameter {:?} is given more than once",
                    key
                )));
            }
            match normalized.as_str() {
                PARAM_BRICK_ROOT_PATHS => brick_roots = Some(parse_brick_roots(value)?),
                PARAM_VOLUME_TYPE => volume_type = parse_volume_type(value)?,
                PARAM_FORCE_CREATE => {
                    force_create = value.trim().parse().map_err(|_| {
                        Error::Configuration(format!("forceCreate {:?} is not a bool", value))
                    })?
                }
                PARAM_NAMESPACE => pod_namespace = value.trim().to_string(),
                PARAM_SELECTOR => pod_selector = value.trim().to_string(),
                PARAM_GID_MIN | PARAM_GID_MAX => {}
                _ => {
                    return Err(Error::Configuration(format!(
                        "invalid storage class parameter {:?}",
                        key
                    )))
                }
            }
        }

        let brick_roots = brick_roots.ok_or_else(|| {
            Error::Configuration("storage class parameter brickrootPaths is required".into())
        })?;

        Ok(Self {
            brick_roots,
            volume_name: volume_name.to_string(),
            volume_type,
            force_create,
            pod_namespace,
            pod_selector,
        })
    }

    /// Hosts of all brick roots, in brick order
    pub fn hosts(&self) -> Vec<String> {
        self.brick_roots.iter().map(|r| r.host.clone()).collect()
    }
}

/// Check a namespace or claim name before it is used in a brick path
///
/// Accepts DNS-1123 subdomains: lowercase alphanumerics, `-` and `.`, at
/// most 253 characters, starting and ending with an alphanumeric.
pub fn validate_object_name(kind: &str, name: &str) -> Result<()> {
    let edge_ok =
        |c: Option<char>| c.map_or(false, |c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let valid = name.len() <= 253
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.'));

    if !valid {
        return Err(Error::Configuration(format!(
            "{} {:?} is not a valid DNS-1123 subdomain",
            kind, name
        )));
    }
    Ok(())
}

fn parse_brick_roots(value: &str) -> Result<Vec<BrickRoot>> {
    let roots = value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(BrickRoot::parse)
        .collect::<Result<Vec<_>>>()?;

    if roots.is_empty() {
        return Err(Error::Configuration("brickrootPaths lists no brick roots".into()));
    }
    Ok(roots)
}

fn parse_volume_type(value: &str) -> Result<String> {
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.iter().any(|w| !w.chars().all(is_name_char)) {
        return Err(Error::Configuration(format!(
            "volumeType {:?} contains unsupported characters",
            value
        )));
    }
    Ok(words.join(" "))
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-')
}

fn is_path_char(c: char) -> bool {
    is_name_char(c) || c == '/'
}
