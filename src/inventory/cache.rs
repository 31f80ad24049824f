//! On-disk inventory cache.
//!
//! Two files live side by side in the cache directory:
//!
//! - `ansible-tencentcloud.cache`: the inventory document
//! - `ansible-tencentcloud.index`: the address index
//!
//! Both are pretty-printed, key-sorted JSON and are rewritten in full on every
//! refresh. The cache is fresh while both files exist and the document file
//! is younger than the configured max age.
//!
//! # Example
//!
//! ```rust,ignore
//! use cvm_inventory::inventory::cache::CacheStore;
//! use std::time::Duration;
//!
//! let cache = CacheStore::new("~/.ansible/tmp", Duration::from_secs(300));
//! if cache.is_fresh() {
//!     println!("{}", cache.read_document_raw()?);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::document::{to_json_pretty, AddressIndex, InventoryDocument};
use crate::error::{Error, Result};

/// Base name shared by both cache files
pub const CACHE_NAME: &str = "ansible-tencentcloud";

/// Document and index files plus the freshness window
#[derive(Debug, Clone)]
pub struct CacheStore {
    document_path: PathBuf,
    index_path: PathBuf,
    max_age: Duration,
}

impl CacheStore {
    /// Create a store rooted at `cache_dir`
    pub fn new(cache_dir: impl AsRef<Path>, max_age: Duration) -> Self {
        let cache_dir = cache_dir.as_ref();
        Self {
            document_path: cache_dir.join(format!("{CACHE_NAME}.cache")),
            index_path: cache_dir.join(format!("{CACHE_NAME}.index")),
            max_age,
        }
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Check freshness against the current time
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(SystemTime::now())
    }

    /// Check freshness against a given instant
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        if !self.document_path.is_file() || !self.index_path.is_file() {
            return false;
        }

        let Ok(modified) = std::fs::metadata(&self.document_path).and_then(|m| m.modified())
        else {
            return false;
        };

        modified
            .checked_add(self.max_age)
            .is_some_and(|expires_at| expires_at > now)
    }

    /// Write the inventory document
    pub fn write_document(&self, document: &InventoryDocument) -> Result<()> {
        self.write_json(&self.document_path, document)
    }

    /// Write the address index
    pub fn write_index(&self, index: &AddressIndex) -> Result<()> {
        self.write_json(&self.index_path, index)
    }

    /// Return the cached document text exactly as stored
    pub fn read_document_raw(&self) -> Result<String> {
        std::fs::read_to_string(&self.document_path)
            .map_err(|source| Error::cache(&self.document_path, source))
    }

    /// Load the address index
    pub fn read_index(&self) -> Result<AddressIndex> {
        let content = std::fs::read_to_string(&self.index_path)
            .map_err(|source| Error::cache(&self.index_path, source))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::cache(parent, source))?;
            }
        }

        let json = to_json_pretty(value)?;
        std::fs::write(path, json).map_err(|source| Error::cache(path, source))?;
        tracing::debug!(path = %path.display(), "wrote cache file");
        Ok(())
    }
}
