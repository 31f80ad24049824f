//! Folds classified instances into an inventory document and address index.

use super::classifier::{Classifier, Verdict};
use super::document::{AddressIndex, HostVars, IndexEntry, InventoryDocument};
use crate::config::Settings;
use crate::directory::Instance;

/// Accumulates instances into an [`InventoryDocument`] and [`AddressIndex`]
///
/// Entries are only ever added; an instance that is gone from the provider
/// simply does not appear in the next build.
#[derive(Debug)]
pub struct InventoryBuilder<'a> {
    classifier: Classifier<'a>,
    document: InventoryDocument,
    index: AddressIndex,
    added: usize,
    skipped: usize,
}

impl<'a> InventoryBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            classifier: Classifier::new(settings),
            document: InventoryDocument::new(),
            index: AddressIndex::new(),
            added: 0,
            skipped: 0,
        }
    }

    /// Add an instance if it is eligible; returns whether it was added
    pub fn add_instance(&mut self, instance: &Instance, region: &str) -> bool {
        let classification = match self.classifier.classify(instance, region) {
            Verdict::Include(classification) => classification,
            Verdict::Skip(reason) => {
                tracing::debug!(instance = %instance.id, region, %reason, "skipping instance");
                self.skipped += 1;
                return false;
            }
        };

        let address = classification.address.as_str();
        self.index.insert(
            address.to_string(),
            IndexEntry::new(region, instance.id.as_str()),
        );

        for group in &classification.groups {
            self.document.push(group, address);
        }
        for edge in &classification.edges {
            self.document.push_group(&edge.parent, &edge.child);
        }

        self.document.set_host_vars(
            address,
            HostVars::from_instance(instance).with_connect_address(address),
        );
        self.added += 1;
        true
    }

    /// Add every instance of a region
    pub fn add_instances<'i>(&mut self, instances: impl IntoIterator<Item = &'i Instance>, region: &str) {
        for instance in instances {
            self.add_instance(instance, region);
        }
    }

    /// Number of instances added so far
    pub fn added(&self) -> usize {
        self.added
    }

    /// Number of instances rejected by the classifier so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Finish the build
    pub fn finish(self) -> (InventoryDocument, AddressIndex) {
        (self.document, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Destination, GroupBy};
    use crate::directory::fixtures;
    use crate::inventory::classifier::CATCH_ALL_GROUP;

    fn settings() -> Settings {
        Settings {
            destination: Some(Destination::PublicIpAddress),
            group_by: GroupBy::all(),
            nested_groups: true,
            ..Settings::default()
        }
    }

    #[test]
    fn test_add_instance_populates_all_structures() {
        let settings = settings();
        let mut builder = InventoryBuilder::new(&settings);
        assert!(builder.add_instance(&fixtures::instance("ins-1"), "ap-guangzhou"));

        let (doc, index) = builder.finish();
        assert!(doc.group(CATCH_ALL_GROUP).unwrap().has_host("1.2.3.1"));
        assert_eq!(
            doc.host_vars("1.2.3.1").unwrap().ansible_ssh_host.as_deref(),
            Some("1.2.3.1")
        );
        assert_eq!(index["1.2.3.1"], IndexEntry::new("ap-guangzhou", "ins-1"));

        // region group holds the host and the zone as a child
        let region = doc.group("ap_guangzhou").unwrap();
        assert!(region.has_host("1.2.3.1"));
        assert!(region.has_child("ap_guangzhou_3"));
    }

    #[test]
    fn test_skipped_instance_leaves_no_trace() {
        let settings = settings();
        let mut builder = InventoryBuilder::new(&settings);
        let mut stopped = fixtures::instance("ins-1");
        stopped.state = "STOPPED".to_string();

        assert!(!builder.add_instance(&stopped, "ap-guangzhou"));
        assert_eq!(builder.skipped(), 1);

        let (doc, index) = builder.finish();
        assert!(doc.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_every_grouped_address_has_host_vars() {
        let settings = settings();
        let mut builder = InventoryBuilder::new(&settings);
        for (i, addr) in ["1.1.1.1", "2.2.2.2", "3.3.3.3"].iter().enumerate() {
            let mut instance = fixtures::instance(&format!("ins-{i}"));
            instance.public_addresses = vec![addr.to_string()];
            builder.add_instance(&instance, "ap-guangzhou");
        }
        assert_eq!(builder.added(), 3);

        let (doc, _) = builder.finish();
        for (_, entry) in doc.groups() {
            for host in entry.hosts() {
                assert!(doc.host_vars(host).is_some(), "{host} has no hostvars");
            }
        }
        for host in doc.hostvars().keys() {
            assert!(!doc.groups_of(host).is_empty());
        }
    }
}
