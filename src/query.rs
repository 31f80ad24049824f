//! Query facade: decides cache versus refresh and answers list and host requests.
//!
//! ```text
//!          prepare(force)
//!   Cold ──────────────────► Fresh      (cache valid, nothing loaded yet)
//!     │
//!     └─ forced or stale ──► Building ──► Ready   (document built this run)
//! ```
//!
//! A host request against a `Fresh` cache whose index does not know the
//! address triggers one refresh before giving up.

use crate::config::Settings;
use crate::directory::{fetch_region_instances, resolve_regions, DirectoryClient};
use crate::error::Result;
use crate::inventory::document::to_json_pretty;
use crate::inventory::{AddressIndex, CacheStore, HostVars, InventoryBuilder, InventoryDocument};
use std::collections::BTreeMap;
use std::fmt;

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The full inventory document
    List,
    /// Variables of one host, keyed by its connect address
    Host(String),
}

/// Lifecycle of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Cold,
    Fresh,
    Building,
    Ready,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Cold => "cold",
            QueryState::Fresh => "fresh",
            QueryState::Building => "building",
            QueryState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// One invocation's view of the inventory
#[derive(Debug)]
pub struct InventoryQuery<'a, D: DirectoryClient + ?Sized> {
    settings: &'a Settings,
    directory: &'a D,
    cache: CacheStore,
    state: QueryState,
    document: Option<InventoryDocument>,
    index: AddressIndex,
}

impl<'a, D: DirectoryClient + ?Sized> InventoryQuery<'a, D> {
    pub fn new(settings: &'a Settings, directory: &'a D) -> Self {
        Self {
            settings,
            directory,
            cache: settings.cache_store(),
            state: QueryState::Cold,
            document: None,
            index: AddressIndex::new(),
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Answer a request, refreshing first when forced or when the cache is stale
    pub async fn run(&mut self, request: &Request, force_refresh: bool) -> Result<String> {
        self.prepare(force_refresh).await?;
        match request {
            Request::List => self.list(),
            Request::Host(address) => self.host(address).await,
        }
    }

    /// Leave the `Cold` state
    pub async fn prepare(&mut self, force_refresh: bool) -> Result<()> {
        if force_refresh {
            tracing::info!("cache refresh requested");
            return self.refresh().await;
        }

        if self.cache.is_fresh() {
            tracing::debug!(
                path = %self.cache.document_path().display(),
                "using cached inventory"
            );
            self.state = QueryState::Fresh;
            Ok(())
        } else {
            tracing::info!("inventory cache is stale or missing");
            self.refresh().await
        }
    }

    /// Rebuild the document and index from the directory and persist both
    pub async fn refresh(&mut self) -> Result<()> {
        self.state = QueryState::Building;

        let regions = resolve_regions(
            self.directory,
            self.settings.regions.configured(),
            &self.settings.regions_exclude,
        )
        .await?;

        let mut builder = InventoryBuilder::new(self.settings);
        for region in &regions {
            let instances =
                fetch_region_instances(self.directory, region, self.settings.page_size).await?;
            tracing::info!(region = %region, instances = instances.len(), "fetched region");
            builder.add_instances(&instances, region);
        }
        tracing::info!(
            regions = regions.len(),
            hosts = builder.added(),
            skipped = builder.skipped(),
            "inventory built"
        );

        let (document, index) = builder.finish();
        self.cache.write_document(&document)?;
        self.cache.write_index(&index)?;

        self.document = Some(document);
        self.index = index;
        self.state = QueryState::Ready;
        Ok(())
    }

    /// The full document as pretty JSON
    ///
    /// A document built during this run is formatted directly; otherwise the
    /// cached text is returned unchanged.
    pub fn list(&self) -> Result<String> {
        match &self.document {
            Some(document) => Ok(document.to_json_pretty()?),
            None => self.cache.read_document_raw(),
        }
    }

    /// Variables of the host behind `address`, or `{}` when it is unknown
    pub async fn host(&mut self, address: &str) -> Result<String> {
        if self.index.is_empty() && self.state != QueryState::Ready {
            self.index = self.cache.read_index()?;
        }

        if !self.index.contains_key(address) && self.state != QueryState::Ready {
            tracing::info!(address, "address not in cache index, refreshing");
            self.refresh().await?;
        }

        let Some(entry) = self.index.get(address) else {
            tracing::debug!(address, "address not found");
            return empty_object();
        };

        match self
            .directory
            .get_instance(&entry.region, &entry.instance_id)
            .await?
        {
            Some(instance) => {
                let vars = HostVars::from_instance(&instance).with_connect_address(address);
                Ok(to_json_pretty(&vars)?)
            }
            None => {
                tracing::debug!(
                    address,
                    instance = %entry.instance_id,
                    "instance no longer exists"
                );
                empty_object()
            }
        }
    }
}

fn empty_object() -> Result<String> {
    Ok(to_json_pretty(&BTreeMap::<String, String>::new())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionSelection;
    use crate::directory::{fixtures, InstancePage, MockDirectoryClient};
    use crate::inventory::IndexEntry;
    use mockall::predicate::eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            regions: RegionSelection::Only(vec!["ap-guangzhou".to_string()]),
            cache_path: dir.path().to_path_buf(),
            cache_max_age: Duration::from_secs(300),
            ..Settings::default()
        }
    }

    fn one_instance_directory() -> MockDirectoryClient {
        let mut directory = MockDirectoryClient::new();
        directory
            .expect_list_instances()
            .with(eq("ap-guangzhou"), eq(0), eq(20))
            .times(1)
            .returning(|_, _, _| {
                Ok(InstancePage {
                    instances: vec![fixtures::instance("ins-1")],
                    total_count: Some(1),
                })
            });
        directory
    }

    #[tokio::test]
    async fn test_stale_cache_builds_and_persists() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let directory = one_instance_directory();

        let mut query = InventoryQuery::new(&settings, &directory);
        assert_eq!(query.state(), QueryState::Cold);

        let output = query.run(&Request::List, false).await.unwrap();
        assert_eq!(query.state(), QueryState::Ready);
        assert!(output.contains("\"tencentcloud\""));
        assert!(query.cache().is_fresh());
        assert_eq!(query.cache().read_document_raw().unwrap(), output);
    }

    #[tokio::test]
    async fn test_fresh_cache_makes_no_directory_calls() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let cache = settings.cache_store();
        cache.write_document(&InventoryDocument::new()).unwrap();
        cache.write_index(&AddressIndex::new()).unwrap();
        std::fs::write(cache.document_path(), "{\"cached\": true}").unwrap();

        // any call on an unprimed mock panics
        let directory = MockDirectoryClient::new();
        let mut query = InventoryQuery::new(&settings, &directory);

        let output = query.run(&Request::List, false).await.unwrap();
        assert_eq!(query.state(), QueryState::Fresh);
        assert_eq!(output, "{\"cached\": true}");
    }

    #[tokio::test]
    async fn test_forced_refresh_ignores_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let cache = settings.cache_store();
        cache.write_document(&InventoryDocument::new()).unwrap();
        cache.write_index(&AddressIndex::new()).unwrap();

        let directory = one_instance_directory();
        let mut query = InventoryQuery::new(&settings, &directory);
        let output = query.run(&Request::List, true).await.unwrap();
        assert!(output.contains("1.2.3.1"));
    }

    #[tokio::test]
    async fn test_host_served_from_cached_index() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let cache = settings.cache_store();
        let mut index = AddressIndex::new();
        index.insert("1.2.3.1".into(), IndexEntry::new("ap-guangzhou", "ins-1"));
        cache.write_document(&InventoryDocument::new()).unwrap();
        cache.write_index(&index).unwrap();

        let mut directory = MockDirectoryClient::new();
        directory
            .expect_get_instance()
            .with(eq("ap-guangzhou"), eq("ins-1"))
            .times(1)
            .returning(|_, id| Ok(Some(fixtures::instance(id))));

        let mut query = InventoryQuery::new(&settings, &directory);
        let output = query
            .run(&Request::Host("1.2.3.1".into()), false)
            .await
            .unwrap();

        let vars: HostVars = serde_json::from_str(&output).unwrap();
        assert_eq!(vars.id, "ins-1");
        assert_eq!(vars.ansible_ssh_host.as_deref(), Some("1.2.3.1"));
    }

    #[tokio::test]
    async fn test_unknown_host_refreshes_once_then_empty() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let cache = settings.cache_store();
        cache.write_document(&InventoryDocument::new()).unwrap();
        cache.write_index(&AddressIndex::new()).unwrap();

        let directory = one_instance_directory();
        let mut query = InventoryQuery::new(&settings, &directory);
        let output = query
            .run(&Request::Host("203.0.113.9".into()), false)
            .await
            .unwrap();

        assert_eq!(output, "{}");
        assert_eq!(query.state(), QueryState::Ready);
    }

    #[tokio::test]
    async fn test_vanished_instance_is_empty() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);

        let mut directory = one_instance_directory();
        directory
            .expect_get_instance()
            .times(1)
            .returning(|_, _| Ok(None));

        let mut query = InventoryQuery::new(&settings, &directory);
        let output = query
            .run(&Request::Host("1.2.3.1".into()), true)
            .await
            .unwrap();
        assert_eq!(output, "{}");
    }
}
