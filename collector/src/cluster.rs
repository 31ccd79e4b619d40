//! Clustering support
//!
//! When several collector instances share the same target set, each
//! target is guarded by a distributed lock so exactly one instance
//! collects from it. This module derives the lock keys and defines the
//! [`Locker`] seam a lock backend plugs into; the collector itself only
//! ever talks to the trait.

use async_trait::async_trait;
use virta_core::PluginError;

/// Lock key namespace shared with other collector implementations
///
/// Instances from different implementations must contend for the same
/// keys, so the literal is fixed and not configurable.
const LOCK_NAMESPACE: &str = "gnmic";

/// Cluster membership configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    /// Name of the cluster this instance belongs to
    pub cluster_name: String,
    /// This instance's name within the cluster
    pub instance_name: String,
}

/// Derive the distributed lock key for a target
///
/// With clustering enabled and a non-empty target name the key is
/// `gnmic/<cluster>/targets/<target>`. Without clustering, or for an
/// empty target name, the target name passes through unchanged.
pub fn lock_key(clustering: Option<&Clustering>, target: &str) -> String {
    match clustering {
        Some(c) if !target.is_empty() => {
            format!("{LOCK_NAMESPACE}/{}/targets/{target}", c.cluster_name)
        }
        _ => target.to_string(),
    }
}

/// Distributed lock backend
#[async_trait]
pub trait Locker: Send + Sync {
    /// Try to acquire a lock, returning whether this instance now holds it
    ///
    /// A held-elsewhere lock is `Ok(false)`, not an error.
    async fn lock(&self, key: &str) -> Result<bool, PluginError>;

    /// Keep a held lock alive until `unlock` or the instance dies
    async fn keep_lock(&self, key: &str) -> Result<(), PluginError>;

    /// Release a held lock
    async fn unlock(&self, key: &str) -> Result<(), PluginError>;
}

/// Lock backend that always grants the lock
///
/// Used when clustering is disabled so the subscription path does not
/// branch on the presence of a locker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLocker;

#[async_trait]
impl Locker for NoopLocker {
    async fn lock(&self, _key: &str) -> Result<bool, PluginError> {
        Ok(true)
    }

    async fn keep_lock(&self, _key: &str) -> Result<(), PluginError> {
        Ok(())
    }

    async fn unlock(&self, _key: &str) -> Result<(), PluginError> {
        Ok(())
    }
}
