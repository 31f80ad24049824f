//! Instance filtering and group-key computation.
//!
//! [`Classifier::classify`] is a pure function of the instance, its region
//! and the settings. It either rejects the instance with a [`SkipReason`] or
//! returns the selected address together with every group the address
//! belongs to and, when nested grouping is on, the parent/child edges that
//! wire those groups into the hierarchy.

use crate::config::{Destination, Settings};
use crate::directory::Instance;
use std::fmt;

/// Group that receives every eligible instance
pub const CATCH_ALL_GROUP: &str = "tencentcloud";

/// Group for instances that carry no tags at all
pub const TAG_NONE_GROUP: &str = "tag_none";

/// Root groups used when nested grouping is enabled
pub mod roots {
    pub const INSTANCES: &str = "instances";
    pub const REGIONS: &str = "regions";
    pub const ZONES: &str = "zones";
    pub const IMAGES: &str = "images";
    pub const TYPES: &str = "types";
    pub const VPCS: &str = "vpcs";
    pub const SUBNETS: &str = "subnets";
    pub const SECURITY_GROUPS: &str = "security_groups";
    pub const TAGS: &str = "tags";
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`
pub fn to_safe(word: &str) -> String {
    word.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Why an instance was left out of the inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Lifecycle state not in the allowed set
    State(String),
    /// No destination variable configured
    NoDestination,
    /// The selected address list is empty
    NoAddress,
    /// Address does not match the include pattern
    NotIncluded(String),
    /// Address matches the exclude pattern
    Excluded(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::State(state) => write!(f, "state {state} not selected"),
            SkipReason::NoDestination => write!(f, "no destination variable configured"),
            SkipReason::NoAddress => write!(f, "no address for destination"),
            SkipReason::NotIncluded(addr) => write!(f, "{addr} does not match include pattern"),
            SkipReason::Excluded(addr) => write!(f, "{addr} matches exclude pattern"),
        }
    }
}

/// A parent/child relationship between two groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEdge {
    pub parent: String,
    pub child: String,
}

impl GroupEdge {
    fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Grouping of an eligible instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The selected host address
    pub address: String,
    /// Groups the address is pushed into, in push order; ends with the catch-all
    pub groups: Vec<String>,
    /// Nesting edges, empty unless nested grouping is enabled
    pub edges: Vec<GroupEdge>,
}

impl Classification {
    fn new(address: String) -> Self {
        Self {
            address,
            groups: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn member_of(&mut self, group: impl Into<String>) {
        self.groups.push(group.into());
    }

    fn child_of(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        let edge = GroupEdge::new(parent, child);
        // A valueless tag's group is its own key group; never nest it in itself.
        if edge.parent != edge.child {
            self.edges.push(edge);
        }
    }
}

/// Outcome of classifying one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Skip(SkipReason),
    Include(Classification),
}

/// Applies the filter and grouping settings to instances
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    settings: &'a Settings,
}

impl<'a> Classifier<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Pick the address that identifies the instance, if any
    pub fn select_address<'i>(&self, instance: &'i Instance) -> Result<&'i str, SkipReason> {
        let candidates = match self.settings.destination {
            Some(Destination::PublicIpAddress) => &instance.public_addresses,
            Some(Destination::PrivateIpAddress) => &instance.private_addresses,
            None => return Err(SkipReason::NoDestination),
        };

        candidates
            .first()
            .map(String::as_str)
            .filter(|addr| !addr.is_empty())
            .ok_or(SkipReason::NoAddress)
    }

    /// Decide eligibility and compute the groups of an instance
    pub fn classify(&self, instance: &Instance, region: &str) -> Verdict {
        match self.try_classify(instance, region) {
            Ok(classification) => Verdict::Include(classification),
            Err(reason) => Verdict::Skip(reason),
        }
    }

    fn try_classify(&self, instance: &Instance, region: &str) -> Result<Classification, SkipReason> {
        let settings = self.settings;

        if !settings.instance_states.contains(&instance.state) {
            return Err(SkipReason::State(instance.state.clone()));
        }

        let address = self.select_address(instance)?;

        if let Some(pattern) = &settings.pattern_include {
            if !pattern.is_match(address) {
                return Err(SkipReason::NotIncluded(address.to_string()));
            }
        }
        if let Some(pattern) = &settings.pattern_exclude {
            if pattern.is_match(address) {
                return Err(SkipReason::Excluded(address.to_string()));
            }
        }

        let group_by = &settings.group_by;
        let nested = settings.nested_groups;
        let mut out = Classification::new(address.to_string());

        if group_by.instance_id {
            let key = to_safe(&instance.id);
            out.member_of(key.clone());
            if nested {
                out.child_of(roots::INSTANCES, key);
            }
        }

        let region_key = to_safe(region);
        if group_by.region {
            out.member_of(region_key.clone());
            if nested {
                out.child_of(roots::REGIONS, region_key.clone());
            }
        }

        if group_by.availability_zone {
            let key = to_safe(&instance.zone);
            out.member_of(key.clone());
            if nested {
                if group_by.region {
                    out.child_of(region_key.clone(), key.clone());
                }
                out.child_of(roots::ZONES, key);
            }
        }

        if group_by.image_id {
            let key = to_safe(&instance.image_id);
            out.member_of(key.clone());
            if nested {
                out.child_of(roots::IMAGES, key);
            }
        }

        if group_by.instance_type {
            let key = to_safe(&format!("type_{}", instance.instance_type));
            out.member_of(key.clone());
            if nested {
                out.child_of(roots::TYPES, key);
            }
        }

        if group_by.vpc_id {
            let key = to_safe(&format!("vpc_{}", instance.vpc_id));
            out.member_of(key.clone());
            if nested {
                out.child_of(roots::VPCS, key);
            }
        }

        if group_by.subnet_id {
            let key = to_safe(&format!("subnet_{}", instance.subnet_id));
            out.member_of(key.clone());
            if nested {
                out.child_of(roots::SUBNETS, key);
            }
        }

        if group_by.security_group {
            for group in &instance.security_group_ids {
                let key = to_safe(&format!("security_group_{group}"));
                out.member_of(key.clone());
                if nested {
                    out.child_of(roots::SECURITY_GROUPS, key);
                }
            }
        }

        if group_by.tag_keys {
            for tag in &instance.tags {
                let tag_key = to_safe(&format!("tag_{}", tag.key));
                let key = match tag.value() {
                    Some(value) => to_safe(&format!("tag_{}={}", tag.key, value)),
                    None => tag_key.clone(),
                };
                out.member_of(key.clone());
                if nested {
                    out.child_of(roots::TAGS, tag_key.clone());
                    out.child_of(tag_key, key);
                }
            }
        }

        if group_by.tag_none && instance.tags.is_empty() {
            out.member_of(TAG_NONE_GROUP);
            if nested {
                out.child_of(roots::TAGS, TAG_NONE_GROUP);
            }
        }

        out.member_of(CATCH_ALL_GROUP);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupBy;
    use crate::directory::{fixtures, Tag};
    use regex::Regex;

    fn settings() -> Settings {
        Settings {
            destination: Some(Destination::PublicIpAddress),
            group_by: GroupBy::none(),
            ..Settings::default()
        }
    }

    fn include(verdict: Verdict) -> Classification {
        match verdict {
            Verdict::Include(c) => c,
            Verdict::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_to_safe() {
        assert_eq!(to_safe("ap-guangzhou-3"), "ap_guangzhou_3");
        assert_eq!(to_safe("tag_env=prod"), "tag_env_prod");
        assert_eq!(to_safe("Already_Safe_01"), "Already_Safe_01");
        assert_eq!(to_safe("é.x"), "__x");
    }

    #[test]
    fn test_state_filter() {
        let settings = settings();
        let mut instance = fixtures::instance("ins-1");
        instance.state = "STOPPED".to_string();

        let verdict = Classifier::new(&settings).classify(&instance, "ap-guangzhou");
        assert_eq!(verdict, Verdict::Skip(SkipReason::State("STOPPED".into())));
    }

    #[test]
    fn test_no_destination_drops() {
        let settings = Settings {
            destination: None,
            ..settings()
        };
        let verdict = Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "r");
        assert_eq!(verdict, Verdict::Skip(SkipReason::NoDestination));
    }

    #[test]
    fn test_empty_address_list_drops() {
        let settings = settings();
        let mut instance = fixtures::instance("ins-1");
        instance.public_addresses.clear();

        let verdict = Classifier::new(&settings).classify(&instance, "r");
        assert_eq!(verdict, Verdict::Skip(SkipReason::NoAddress));
    }

    #[test]
    fn test_private_destination() {
        let settings = Settings {
            destination: Some(Destination::PrivateIpAddress),
            ..settings()
        };
        let c = include(Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "r"));
        assert_eq!(c.address, "10.0.0.1");
        assert_eq!(c.groups, vec![CATCH_ALL_GROUP]);
    }

    #[test]
    fn test_include_pattern_is_anchored() {
        let settings = Settings {
            pattern_include: Some(Regex::new(r"^(?:2\.3)").unwrap()),
            ..settings()
        };
        // "1.2.3.1" contains "2.3" but not at the start
        let verdict = Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "r");
        assert_eq!(verdict, Verdict::Skip(SkipReason::NotIncluded("1.2.3.1".into())));
    }

    #[test]
    fn test_exclude_after_include() {
        let settings = Settings {
            pattern_include: Some(Regex::new(r"^(?:1\.)").unwrap()),
            pattern_exclude: Some(Regex::new(r"^(?:1\.2\.)").unwrap()),
            ..settings()
        };
        let verdict = Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "r");
        assert_eq!(verdict, Verdict::Skip(SkipReason::Excluded("1.2.3.1".into())));
    }

    #[test]
    fn test_all_dimensions_flat() {
        let settings = Settings {
            group_by: GroupBy::all(),
            ..settings()
        };
        let c = include(Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "ap-guangzhou"));

        assert_eq!(
            c.groups,
            vec![
                "ins_1",
                "ap_guangzhou",
                "ap_guangzhou_3",
                "img_abc123",
                "type_S5_MEDIUM4",
                "vpc_vpc_1a2b",
                "subnet_subnet_9z8y",
                "security_group_sg_web",
                "tag_env_prod",
                CATCH_ALL_GROUP,
            ]
        );
        assert!(c.edges.is_empty());
    }

    #[test]
    fn test_nested_edges() {
        let settings = Settings {
            group_by: GroupBy::all(),
            nested_groups: true,
            ..settings()
        };
        let c = include(Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "ap-guangzhou"));

        let has = |p: &str, ch: &str| c.edges.iter().any(|e| e.parent == p && e.child == ch);
        assert!(has("instances", "ins_1"));
        assert!(has("regions", "ap_guangzhou"));
        assert!(has("ap_guangzhou", "ap_guangzhou_3"));
        assert!(has("zones", "ap_guangzhou_3"));
        assert!(has("images", "img_abc123"));
        assert!(has("types", "type_S5_MEDIUM4"));
        assert!(has("vpcs", "vpc_vpc_1a2b"));
        assert!(has("subnets", "subnet_subnet_9z8y"));
        assert!(has("security_groups", "security_group_sg_web"));
        assert!(has("tags", "tag_env"));
        assert!(has("tag_env", "tag_env_prod"));
    }

    #[test]
    fn test_zone_not_under_region_without_region_grouping() {
        let mut group_by = GroupBy::none();
        group_by.availability_zone = true;
        let settings = Settings {
            group_by,
            nested_groups: true,
            ..settings()
        };
        let c = include(Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "ap-guangzhou"));
        assert_eq!(c.edges, vec![GroupEdge::new("zones", "ap_guangzhou_3")]);
    }

    #[test]
    fn test_valueless_tag_has_no_self_edge() {
        let mut group_by = GroupBy::none();
        group_by.tag_keys = true;
        let settings = Settings {
            group_by,
            nested_groups: true,
            ..settings()
        };
        let mut instance = fixtures::instance("ins-1");
        instance.tags = vec![Tag::bare("web")];

        let c = include(Classifier::new(&settings).classify(&instance, "r"));
        assert_eq!(c.groups, vec!["tag_web", CATCH_ALL_GROUP]);
        assert_eq!(c.edges, vec![GroupEdge::new("tags", "tag_web")]);
    }

    #[test]
    fn test_tag_none_only_without_tags() {
        let mut group_by = GroupBy::none();
        group_by.tag_keys = true;
        group_by.tag_none = true;
        let settings = Settings {
            group_by,
            ..settings()
        };

        let tagged = include(Classifier::new(&settings).classify(&fixtures::instance("ins-1"), "r"));
        assert!(!tagged.groups.iter().any(|g| g == TAG_NONE_GROUP));

        let mut untagged = fixtures::instance("ins-2");
        untagged.tags.clear();
        let c = include(Classifier::new(&settings).classify(&untagged, "r"));
        assert_eq!(c.groups, vec![TAG_NONE_GROUP, CATCH_ALL_GROUP]);
    }
}
