//! Snapshot-backed directory
//!
//! Serves regions and instances from a YAML or JSON document instead of the
//! live API. The document maps region names to instance lists:
//!
//! ```yaml
//! regions:
//!   ap-guangzhou:
//!     - id: ins-2k4j8d1x
//!       name: web-01
//!       instance_type: S5.MEDIUM4
//!       state: RUNNING
//!       public_addresses: [1.2.3.1]
//!       private_addresses: [10.0.0.4]
//!       zone: ap-guangzhou-3
//!       image_id: img-l8og963d
//!       vpc_id: vpc-1a2b
//!       subnet_id: subnet-9z8y
//!       security_group_ids: [sg-web]
//!       tags:
//!         - key: env
//!           value: prod
//!   ap-beijing: []
//! ```
//!
//! Paging honours offset/limit and reports the region total, so the engine
//! exercises the same code path it does against the provider.

use super::{DirectoryClient, DirectoryError, DirectoryResult, Instance, InstancePage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

/// On-disk layout of a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<Instance>>,
}

/// Directory client answering from an in-memory snapshot
#[derive(Debug, Clone, Default)]
pub struct SnapshotDirectory {
    snapshot: Snapshot,
}

impl SnapshotDirectory {
    /// Wrap an already-built snapshot
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot file; `.json` is parsed as JSON, anything else as YAML
    pub fn from_file(path: &Path) -> DirectoryResult<Self> {
        let snapshot_error = |message: String| DirectoryError::Snapshot {
            path: path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| snapshot_error(e.to_string()))?;

        let snapshot: Snapshot = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| snapshot_error(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| snapshot_error(e.to_string()))?
        };

        tracing::debug!(
            path = %path.display(),
            regions = snapshot.regions.len(),
            "loaded directory snapshot"
        );
        Ok(Self::new(snapshot))
    }

    /// Add an instance to a region
    pub fn with_instance(mut self, region: impl Into<String>, instance: Instance) -> Self {
        self.snapshot
            .regions
            .entry(region.into())
            .or_default()
            .push(instance);
        self
    }

    /// Add a region with no instances
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.snapshot.regions.entry(region.into()).or_default();
        self
    }
}

#[async_trait]
impl DirectoryClient for SnapshotDirectory {
    async fn list_regions(&self) -> DirectoryResult<Vec<String>> {
        Ok(self.snapshot.regions.keys().cloned().collect())
    }

    async fn list_instances(
        &self,
        region: &str,
        offset: usize,
        limit: usize,
    ) -> DirectoryResult<InstancePage> {
        let all = self
            .snapshot
            .regions
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(InstancePage {
            instances: all.iter().skip(offset).take(limit).cloned().collect(),
            total_count: Some(all.len()),
        })
    }

    async fn get_instance(
        &self,
        region: &str,
        instance_id: &str,
    ) -> DirectoryResult<Option<Instance>> {
        Ok(self
            .snapshot
            .regions
            .get(region)
            .and_then(|instances| instances.iter().find(|i| i.id == instance_id))
            .cloned())
    }
}

/// Snapshot directory that reads its file on the first directory call
///
/// A run answered entirely from a fresh cache never touches the snapshot,
/// so it does not need one configured.
#[derive(Debug)]
pub struct LazySnapshotDirectory {
    path: Option<PathBuf>,
    loaded: OnceCell<SnapshotDirectory>,
}

impl LazySnapshotDirectory {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            loaded: OnceCell::new(),
        }
    }

    /// True once the snapshot file has been read
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    async fn directory(&self) -> DirectoryResult<&SnapshotDirectory> {
        self.loaded
            .get_or_try_init(|| async {
                match &self.path {
                    Some(path) => SnapshotDirectory::from_file(path),
                    None => Err(DirectoryError::NotConfigured(
                        "pass --snapshot or set snapshot_path".to_string(),
                    )),
                }
            })
            .await
    }
}

#[async_trait]
impl DirectoryClient for LazySnapshotDirectory {
    async fn list_regions(&self) -> DirectoryResult<Vec<String>> {
        self.directory().await?.list_regions().await
    }

    async fn list_instances(
        &self,
        region: &str,
        offset: usize,
        limit: usize,
    ) -> DirectoryResult<InstancePage> {
        self.directory()
            .await?
            .list_instances(region, offset, limit)
            .await
    }

    async fn get_instance(
        &self,
        region: &str,
        instance_id: &str,
    ) -> DirectoryResult<Option<Instance>> {
        self.directory()
            .await?
            .get_instance(region, instance_id)
            .await
    }
}
