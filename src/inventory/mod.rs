//! Inventory assembly for CVM instances.
//!
//! This module turns directory records into an Ansible inventory document:
//! - Filtering and group-key computation ([`classifier`])
//! - Flat and nested group entries ([`group`])
//! - The document, host variables and address index ([`document`])
//! - Accumulation of instances into a document ([`builder`])
//! - The freshness-gated on-disk cache ([`cache`])

pub mod builder;
pub mod cache;
pub mod classifier;
pub mod document;
pub mod group;

pub use builder::InventoryBuilder;
pub use cache::CacheStore;
pub use classifier::{
    to_safe, Classification, Classifier, GroupEdge, SkipReason, Verdict, CATCH_ALL_GROUP,
    TAG_NONE_GROUP,
};
pub use document::{AddressIndex, HostVars, IndexEntry, InventoryDocument, Meta, META_KEY};
pub use group::GroupEntry;
