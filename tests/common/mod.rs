//! Shared helpers for integration tests

#![allow(dead_code)]

use cvm_inventory::config::{Destination, GroupBy, RegionSelection, Settings};
use cvm_inventory::directory::{Instance, Tag};
use std::path::Path;
use std::time::Duration;

/// A running instance in ap-guangzhou-3 with one public and one private address
pub fn instance(id: &str, public: &str, private: &str) -> Instance {
    Instance {
        id: id.to_string(),
        name: format!("{id}-name"),
        instance_type: "S5.MEDIUM4".to_string(),
        state: "RUNNING".to_string(),
        public_addresses: vec![public.to_string()],
        private_addresses: vec![private.to_string()],
        zone: "ap-guangzhou-3".to_string(),
        image_id: "img-abc123".to_string(),
        vpc_id: "vpc-1a2b".to_string(),
        subnet_id: "subnet-9z8y".to_string(),
        security_group_ids: vec!["sg-web".to_string()],
        tags: vec![Tag::new("env", "prod")],
    }
}

/// Settings with every dimension on, caching under `cache_dir`
pub fn settings(cache_dir: &Path) -> Settings {
    Settings {
        regions: RegionSelection::Only(vec!["ap-guangzhou".to_string()]),
        cache_path: cache_dir.to_path_buf(),
        cache_max_age: Duration::from_secs(300),
        destination: Some(Destination::PublicIpAddress),
        group_by: GroupBy::all(),
        ..Settings::default()
    }
}

/// YAML snapshot with two running instances and one stopped instance
pub const SNAPSHOT_YAML: &str = r#"regions:
  ap-guangzhou:
    - id: ins-web1
      name: web-01
      instance_type: S5.MEDIUM4
      state: RUNNING
      public_addresses: [1.2.3.1]
      private_addresses: [10.0.0.1]
      zone: ap-guangzhou-3
      image_id: img-abc123
      vpc_id: vpc-1a2b
      subnet_id: subnet-9z8y
      security_group_ids: [sg-web]
      tags:
        - key: env
          value: prod
    - id: ins-db1
      name: db-01
      instance_type: S5.LARGE8
      state: STOPPED
      public_addresses: [1.2.3.2]
      private_addresses: [10.0.0.2]
      zone: ap-guangzhou-3
      image_id: img-abc123
  ap-beijing:
    - id: ins-bj1
      name: bj-01
      instance_type: S5.MEDIUM4
      state: RUNNING
      public_addresses: [5.6.7.8]
      private_addresses: [10.1.0.1]
      zone: ap-beijing-1
      image_id: img-def456
"#;

/// Write a settings file pointing the cache at `cache_dir`
pub fn write_settings(dir: &Path, cache_dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("tencent_cloud.ini");
    let content = format!(
        "[credentials]\ntencentcloud_secret_id = AKIDtest\ntencentcloud_secret_key = secret\n\n\
         [cvm]\ncache_path = {}\ncache_max_age = 300\n{extra}",
        cache_dir.display()
    );
    std::fs::write(&path, content).unwrap();
    path
}
