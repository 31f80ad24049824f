//! # cvm-inventory - Ansible dynamic inventory for TencentCloud CVM
//!
//! Queries a compute directory region by region, filters instances by
//! lifecycle state and address patterns, and groups the survivors into an
//! Ansible inventory document. The last successful build is cached on disk
//! so repeated invocations within the max age make no API calls.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ DirectoryClient  │──►│    Classifier    │──►│ InventoryBuilder │
//! │ (regions, pages) │   │ (filter + keys)  │   │ (groups + vars)  │
//! └──────────────────┘   └──────────────────┘   └──────────────────┘
//!                                                        │
//!                       ┌──────────────────┐   ┌─────────▼────────┐
//!        stdout ◄───────│  InventoryQuery  │◄──│    CacheStore    │
//!                       │ (--list/--host)  │   │ (.cache, .index) │
//!                       └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use cvm_inventory::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = Settings::load(None)?;
//!     let directory = SnapshotDirectory::from_file("fleet.yml".as_ref())?;
//!
//!     let mut query = InventoryQuery::new(&settings, &directory);
//!     println!("{}", query.run(&Request::List, false).await?);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod inventory;
pub mod query;

pub use error::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Destination, GroupBy, RegionSelection, Settings};
    pub use crate::directory::{DirectoryClient, Instance, SnapshotDirectory, Tag};
    pub use crate::error::{Error, Result};
    pub use crate::inventory::{
        AddressIndex, CacheStore, GroupEntry, HostVars, InventoryBuilder, InventoryDocument,
    };
    pub use crate::query::{InventoryQuery, QueryState, Request};
}
