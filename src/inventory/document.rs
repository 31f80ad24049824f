//! The inventory document, its host variables and the address index.

use super::group::GroupEntry;
use crate::directory::Instance;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved top-level key holding per-host variables
pub const META_KEY: &str = "_meta";

/// Normalized variables for one host
///
/// Fields are declared in sorted order so the serialized form is key-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVars {
    /// Address the automation system connects to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_ssh_host: Option<String>,
    pub availability_zone: String,
    pub id: String,
    pub instance_name: String,
    pub instance_type: String,
    pub private_ip_address: Vec<String>,
    pub public_ip_address: Vec<String>,
    pub status: String,
}

impl HostVars {
    /// Map an instance record onto host variables
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            ansible_ssh_host: None,
            availability_zone: instance.zone.clone(),
            id: instance.id.clone(),
            instance_name: instance.name.clone(),
            instance_type: instance.instance_type.clone(),
            private_ip_address: instance.private_addresses.clone(),
            public_ip_address: instance.public_addresses.clone(),
            status: instance.state.clone(),
        }
    }

    /// Set the connect address
    pub fn with_connect_address(mut self, address: impl Into<String>) -> Self {
        self.ansible_ssh_host = Some(address.into());
        self
    }
}

/// Contents of the `_meta` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub hostvars: BTreeMap<String, HostVars>,
}

/// Where an address was found: the region and the instance that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct IndexEntry {
    pub region: String,
    pub instance_id: String,
}

impl IndexEntry {
    pub fn new(region: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl From<(String, String)> for IndexEntry {
    fn from((region, instance_id): (String, String)) -> Self {
        Self {
            region,
            instance_id,
        }
    }
}

impl From<IndexEntry> for (String, String) {
    fn from(entry: IndexEntry) -> Self {
        (entry.region, entry.instance_id)
    }
}

/// Address → (region, instance id)
pub type AddressIndex = BTreeMap<String, IndexEntry>;

/// A complete inventory: named groups plus `_meta.hostvars`
///
/// Serializes to the inventory-script JSON layout with every key sorted,
/// `_meta` included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryDocument {
    groups: BTreeMap<String, GroupEntry>,
    meta: Meta,
}

impl InventoryDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host to a group, creating a flat group if it does not exist
    ///
    /// The reserved `_meta` name is never used as a group.
    pub fn push(&mut self, group: &str, host: &str) {
        if group == META_KEY {
            tracing::warn!(host, "ignoring group named {META_KEY}");
            return;
        }
        match self.groups.get_mut(group) {
            Some(entry) => entry.add_host(host),
            None => {
                self.groups
                    .insert(group.to_string(), GroupEntry::with_host(host));
            }
        }
    }

    /// Make `child` a child group of `parent`
    ///
    /// A flat parent is promoted to the nested form first; its hosts are kept.
    pub fn push_group(&mut self, parent: &str, child: &str) {
        if parent == META_KEY || child == META_KEY {
            tracing::warn!(parent, child, "ignoring group named {META_KEY}");
            return;
        }
        match self.groups.get_mut(parent) {
            Some(entry) => entry.add_child(child),
            None => {
                self.groups
                    .insert(parent.to_string(), GroupEntry::with_child(child));
            }
        }
    }

    /// Record the variables of a host
    pub fn set_host_vars(&mut self, host: impl Into<String>, vars: HostVars) {
        self.meta.hostvars.insert(host.into(), vars);
    }

    pub fn group(&self, name: &str) -> Option<&GroupEntry> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &GroupEntry)> {
        self.groups.iter()
    }

    pub fn host_vars(&self, host: &str) -> Option<&HostVars> {
        self.meta.hostvars.get(host)
    }

    pub fn hostvars(&self) -> &BTreeMap<String, HostVars> {
        &self.meta.hostvars
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// True when there are neither groups nor host variables
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.meta.hostvars.is_empty()
    }

    /// Names of all groups whose direct members include `host`
    pub fn groups_of(&self, host: &str) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|(_, entry)| entry.has_host(host))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Pretty-printed, key-sorted JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        to_json_pretty(self)
    }
}

impl Serialize for InventoryDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        let mut meta_written = false;

        for (name, entry) in &self.groups {
            if !meta_written && name.as_str() > META_KEY {
                map.serialize_entry(META_KEY, &self.meta)?;
                meta_written = true;
            }
            map.serialize_entry(name, entry)?;
        }
        if !meta_written {
            map.serialize_entry(META_KEY, &self.meta)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for InventoryDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = InventoryDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an inventory document object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut document = InventoryDocument::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == META_KEY {
                        document.meta = access.next_value()?;
                    } else if document.groups.contains_key(&key) {
                        return Err(de::Error::custom(format!("duplicate group '{key}'")));
                    } else {
                        let entry = access.next_value()?;
                        document.groups.insert(key, entry);
                    }
                }
                Ok(document)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Serialize a value as 2-space indented JSON
///
/// Map keys come out sorted because every map in the inventory model is a
/// `BTreeMap` and every struct declares its fields alphabetically.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
