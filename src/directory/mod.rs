//! Cloud directory access for the CVM inventory.
//!
//! The inventory engine never talks to the provider directly. It goes through
//! the [`DirectoryClient`] trait, which exposes the three calls the engine
//! needs: region listing, paginated instance listing and single-instance
//! lookup.
//!
//! # Available Directories
//!
//! - [`snapshot`]: serves a YAML/JSON snapshot of regions and instances,
//!   either preloaded ([`SnapshotDirectory`]) or read on first use
//!   ([`LazySnapshotDirectory`])
//!
//! # Pagination
//!
//! [`fetch_region_instances`] walks a region page by page, strictly in
//! sequence, and stops on the first empty page, once a reported total has
//! been reached, or (when no total is reported) on a short page.

pub mod snapshot;

pub use snapshot::{LazySnapshotDirectory, SnapshotDirectory};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default number of instances requested per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Errors raised by a directory client
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request rate limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to load directory snapshot '{path}': {message}")]
    Snapshot { path: String, message: String },

    #[error("no directory configured: {0}")]
    NotConfigured(String),
}

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A key/value tag attached to an instance. The value is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Tag {
    /// Create a tag carrying a value
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Create a tag with no value
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// The tag value, treating an empty string as absent
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

/// A compute instance as returned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance ID (e.g. ins-2k4j8d1x)
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Instance type (e.g. S5.MEDIUM4)
    pub instance_type: String,
    /// Lifecycle state (RUNNING, STOPPED, ...)
    pub state: String,
    #[serde(default)]
    pub public_addresses: Vec<String>,
    #[serde(default)]
    pub private_addresses: Vec<String>,
    pub zone: String,
    pub image_id: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// One page of an instance listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePage {
    pub instances: Vec<Instance>,
    /// Total number of instances in the region, when the provider reports it
    pub total_count: Option<usize>,
}

/// Narrow interface onto the provider's compute API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryClient: Send + Sync + fmt::Debug {
    /// List every region the account can query
    async fn list_regions(&self) -> DirectoryResult<Vec<String>>;

    /// List one page of instances in a region
    async fn list_instances(
        &self,
        region: &str,
        offset: usize,
        limit: usize,
    ) -> DirectoryResult<InstancePage>;

    /// Look up a single instance by id
    async fn get_instance(
        &self,
        region: &str,
        instance_id: &str,
    ) -> DirectoryResult<Option<Instance>>;
}

/// Fetch every instance of a region, one page at a time
pub async fn fetch_region_instances<D>(
    directory: &D,
    region: &str,
    page_size: usize,
) -> DirectoryResult<Vec<Instance>>
where
    D: DirectoryClient + ?Sized,
{
    let limit = page_size.max(1);
    let mut instances = Vec::new();
    let mut offset = 0;

    loop {
        let page = directory.list_instances(region, offset, limit).await?;
        let received = page.instances.len();
        tracing::debug!(region, offset, received, "fetched instance page");

        instances.extend(page.instances);
        offset += received;

        if received == 0 {
            break;
        }
        match page.total_count {
            Some(total) if offset >= total => break,
            Some(_) => {}
            None if received < limit => break,
            None => {}
        }
    }

    Ok(instances)
}

/// Resolve the regions to query, applying the exclusion list
///
/// `configured` of `None` means every region the directory reports.
pub async fn resolve_regions<D>(
    directory: &D,
    configured: Option<&[String]>,
    excluded: &[String],
) -> DirectoryResult<Vec<String>>
where
    D: DirectoryClient + ?Sized,
{
    let regions = match configured {
        Some(regions) => regions.to_vec(),
        None => directory.list_regions().await?,
    };

    Ok(regions
        .into_iter()
        .filter(|region| {
            let skip = excluded.iter().any(|ex| ex == region);
            if skip {
                tracing::debug!(region = %region, "region excluded by configuration");
            }
            !skip
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Instance, Tag};

    /// A running instance with one public and one private address
    pub fn instance(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: format!("{id}-name"),
            instance_type: "S5.MEDIUM4".to_string(),
            state: "RUNNING".to_string(),
            public_addresses: vec!["1.2.3.1".to_string()],
            private_addresses: vec!["10.0.0.1".to_string()],
            zone: "ap-guangzhou-3".to_string(),
            image_id: "img-abc123".to_string(),
            vpc_id: "vpc-1a2b".to_string(),
            subnet_id: "subnet-9z8y".to_string(),
            security_group_ids: vec!["sg-web".to_string()],
            tags: vec![Tag::new("env", "prod")],
        }
    }
}
