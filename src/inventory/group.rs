//! Group entries for the generated inventory.
//!
//! A group starts out as a flat set of host addresses. The first time it is
//! given a child group it is promoted to the nested form, which keeps the
//! hosts it already had.
//!
//! On the wire the two forms follow the Ansible inventory-script layout:
//!
//! ```json
//! {
//!   "ap_guangzhou": ["1.2.3.1", "1.2.3.2"],
//!   "regions": { "children": ["ap_guangzhou"] },
//!   "tag_env": { "children": ["tag_env_prod"], "hosts": ["1.2.3.9"] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Membership of a single inventory group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupEntry {
    /// Plain set of host addresses
    Flat(BTreeSet<String>),
    /// Hosts plus child group names
    Nested {
        #[serde(default)]
        children: BTreeSet<String>,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        hosts: BTreeSet<String>,
    },
}

impl Default for GroupEntry {
    fn default() -> Self {
        GroupEntry::Flat(BTreeSet::new())
    }
}

impl GroupEntry {
    /// Create a flat group holding a single host
    pub fn with_host(host: impl Into<String>) -> Self {
        GroupEntry::Flat(BTreeSet::from([host.into()]))
    }

    /// Create a nested group holding a single child
    pub fn with_child(child: impl Into<String>) -> Self {
        GroupEntry::Nested {
            hosts: BTreeSet::new(),
            children: BTreeSet::from([child.into()]),
        }
    }

    /// Add a host, whichever form the group is in
    pub fn add_host(&mut self, host: impl Into<String>) {
        match self {
            GroupEntry::Flat(hosts) | GroupEntry::Nested { hosts, .. } => {
                hosts.insert(host.into());
            }
        }
    }

    /// Convert to the nested form, keeping existing hosts
    pub fn promote(&mut self) {
        if let GroupEntry::Flat(hosts) = self {
            let hosts = std::mem::take(hosts);
            *self = GroupEntry::Nested {
                hosts,
                children: BTreeSet::new(),
            };
        }
    }

    /// Add a child group, promoting the group first if needed
    pub fn add_child(&mut self, child: impl Into<String>) {
        self.promote();
        if let GroupEntry::Nested { children, .. } = self {
            children.insert(child.into());
        }
    }

    /// Direct host members
    pub fn hosts(&self) -> &BTreeSet<String> {
        match self {
            GroupEntry::Flat(hosts) | GroupEntry::Nested { hosts, .. } => hosts,
        }
    }

    /// Child group names (empty for flat groups)
    pub fn children(&self) -> impl Iterator<Item = &String> {
        match self {
            GroupEntry::Flat(_) => None,
            GroupEntry::Nested { children, .. } => Some(children.iter()),
        }
        .into_iter()
        .flatten()
    }

    /// Check if a host belongs to this group
    pub fn has_host(&self, host: &str) -> bool {
        self.hosts().contains(host)
    }

    /// Check if a group is a child of this group
    pub fn has_child(&self, child: &str) -> bool {
        self.children().any(|c| c == child)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, GroupEntry::Nested { .. })
    }
}
