//! Configuration module for cvm-inventory
//!
//! Settings are built once at startup and passed by reference afterwards.
//! Sources are layered, later ones winning:
//! - Default values
//! - System settings (/etc/ansible/tencent_cloud.ini)
//! - User settings (~/.ansible/tencent_cloud.ini)
//! - Project settings (./tencent_cloud.ini)
//! - Environment variables
//!
//! An explicit path (`--config` or `TENCENTCLOUD_INI_PATH`) replaces the
//! standard locations and must exist. Files may be INI, TOML, YAML or JSON;
//! the format follows the extension and defaults to INI.
//!
//! ```ini
//! [credentials]
//! tencentcloud_secret_id = AKIDxxxx
//! tencentcloud_secret_key = xxxx
//!
//! [cvm]
//! regions = all
//! regions_exclude = ap-shenzhen-fsi
//! cache_path = ~/.ansible/tmp
//! cache_max_age = 300
//! destination_variable = public_ip_address
//! instance_states = RUNNING, STOPPED
//! nested_groups = true
//! group_by_tag_none = false
//! pattern_include = ^10\.
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::directory::DEFAULT_PAGE_SIZE;
use crate::inventory::CacheStore;

/// Lifecycle states an instance can be filtered on
pub const VALID_INSTANCE_STATES: [&str; 6] = [
    "PENDING",
    "RUNNING",
    "STOPPED",
    "STARTING",
    "STOPPING",
    "REBOOTING",
];

/// Default cache directory
pub const DEFAULT_CACHE_PATH: &str = "~/.ansible/tmp";

/// Default cache max age in seconds
pub const DEFAULT_CACHE_MAX_AGE: u64 = 300;

/// Settings file name looked up in the standard locations
pub const SETTINGS_FILE_NAME: &str = "tencent_cloud.ini";

/// Errors that can occur when loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("invalid pattern for '{key}': {source}")]
    Pattern {
        key: String,
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Provider credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
}

impl Credentials {
    /// True when both the secret id and key are present
    pub fn is_complete(&self) -> bool {
        self.secret_id.is_some() && self.secret_key.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &redact(&self.secret_key))
            .field("security_token", &redact(&self.security_token))
            .finish()
    }
}

/// Which regions to query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegionSelection {
    /// Every region the directory reports
    #[default]
    All,
    /// An explicit list
    Only(Vec<String>),
}

impl RegionSelection {
    /// The explicit list, or `None` for all regions
    pub fn configured(&self) -> Option<&[String]> {
        match self {
            RegionSelection::All => None,
            RegionSelection::Only(regions) => Some(regions),
        }
    }
}

/// Address family that identifies a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    PublicIpAddress,
    PrivateIpAddress,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::PublicIpAddress => "public_ip_address",
            Destination::PrivateIpAddress => "private_ip_address",
        }
    }
}

impl FromStr for Destination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public_ip_address" => Ok(Destination::PublicIpAddress),
            "private_ip_address" => Ok(Destination::PrivateIpAddress),
            other => Err(ConfigError::invalid(
                "destination_variable",
                format!("expected public_ip_address or private_ip_address, got '{other}'"),
            )),
        }
    }
}

/// Grouping dimensions, each independently toggleable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBy {
    pub instance_id: bool,
    pub region: bool,
    pub availability_zone: bool,
    pub instance_type: bool,
    pub image_id: bool,
    pub vpc_id: bool,
    pub subnet_id: bool,
    pub security_group: bool,
    pub tag_keys: bool,
    pub tag_none: bool,
}

impl GroupBy {
    /// Every dimension enabled
    pub fn all() -> Self {
        Self {
            instance_id: true,
            region: true,
            availability_zone: true,
            instance_type: true,
            image_id: true,
            vpc_id: true,
            subnet_id: true,
            security_group: true,
            tag_keys: true,
            tag_none: true,
        }
    }

    /// Every dimension disabled; only the catch-all group remains
    pub fn none() -> Self {
        Self {
            instance_id: false,
            region: false,
            availability_zone: false,
            instance_type: false,
            image_id: false,
            vpc_id: false,
            subnet_id: false,
            security_group: false,
            tag_keys: false,
            tag_none: false,
        }
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        Self::all()
    }
}

/// Immutable settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub regions: RegionSelection,
    pub regions_exclude: Vec<String>,
    /// Directory holding the cache files
    pub cache_path: PathBuf,
    pub cache_max_age: Duration,
    /// `None` drops every instance
    pub destination: Option<Destination>,
    pub instance_states: BTreeSet<String>,
    pub nested_groups: bool,
    pub group_by: GroupBy,
    /// Anchored at the start of the address
    pub pattern_include: Option<Regex>,
    /// Anchored at the start of the address
    pub pattern_exclude: Option<Regex>,
    pub page_size: usize,
    /// Snapshot file served in place of the live API
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            regions: RegionSelection::All,
            regions_exclude: Vec::new(),
            cache_path: expand_path(DEFAULT_CACHE_PATH),
            cache_max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE),
            destination: Some(Destination::PublicIpAddress),
            instance_states: BTreeSet::from(["RUNNING".to_string()]),
            nested_groups: false,
            group_by: GroupBy::all(),
            pattern_include: None,
            pattern_exclude: None,
            page_size: DEFAULT_PAGE_SIZE,
            snapshot_path: None,
        }
    }
}

/// Raw settings file, every value kept as text until validated
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    credentials: CredentialsSection,
    cvm: CvmSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CredentialsSection {
    tencentcloud_secret_id: Option<String>,
    tencentcloud_secret_key: Option<String>,
    tencentcloud_security_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CvmSection {
    regions: Option<String>,
    regions_exclude: Option<String>,
    cache_path: Option<String>,
    cache_max_age: Option<String>,
    destination_variable: Option<String>,
    all_instances: Option<String>,
    instance_states: Option<String>,
    nested_groups: Option<String>,
    group_by_instance_id: Option<String>,
    group_by_region: Option<String>,
    group_by_availability_zone: Option<String>,
    group_by_instance_type: Option<String>,
    group_by_image_id: Option<String>,
    group_by_vpc_id: Option<String>,
    group_by_subnet_id: Option<String>,
    group_by_security_group: Option<String>,
    group_by_tag_keys: Option<String>,
    group_by_tag_none: Option<String>,
    pattern_include: Option<String>,
    pattern_exclude: Option<String>,
    page_size: Option<String>,
    snapshot_path: Option<String>,
}

impl Settings {
    /// Load settings from all sources
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let paths = Self::get_settings_paths(explicit_path)?;

        let mut builder = ::config::Config::builder();
        for path in &paths {
            tracing::debug!(path = %path.display(), "adding settings source");
            builder = match file_format(path) {
                ::config::FileFormat::Ini => builder.add_source(IniSource::from_file(path)?),
                format => {
                    let name = path.to_string_lossy();
                    builder.add_source(
                        ::config::File::new(&name, format).required(explicit_path.is_some()),
                    )
                }
            };
        }
        let file: SettingsFile = builder.build()?.try_deserialize()?;

        let mut settings = Self::from_file(file)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Parse settings from text in the given format
    pub fn from_str_with_format(
        content: &str,
        format: ::config::FileFormat,
    ) -> Result<Self, ConfigError> {
        let builder = ::config::Config::builder();
        let builder = match format {
            ::config::FileFormat::Ini => builder.add_source(IniSource::new("<string>", content)),
            format => builder.add_source(::config::File::from_str(content, format)),
        };
        let file: SettingsFile = builder.build()?.try_deserialize()?;
        Self::from_file(file)
    }

    /// Get the list of settings file paths to read
    fn get_settings_paths(explicit_path: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
        if let Some(path) = explicit_path {
            let expanded = shellexpand::full(&path.to_string_lossy())
                .map(|p| PathBuf::from(p.as_ref()))
                .map_err(|e| ConfigError::invalid("config", e.to_string()))?;
            if !expanded.is_file() {
                return Err(ConfigError::NotFound(expanded));
            }
            return Ok(vec![expanded]);
        }

        Ok([
            PathBuf::from("/etc/ansible").join(SETTINGS_FILE_NAME),
            expand_path("~/.ansible").join(SETTINGS_FILE_NAME),
            PathBuf::from(SETTINGS_FILE_NAME),
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect())
    }

    fn from_file(file: SettingsFile) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let cvm = file.cvm;
        let creds = file.credentials;

        let regions = match non_empty(cvm.regions) {
            None => RegionSelection::All,
            Some(r) if r.eq_ignore_ascii_case("all") => RegionSelection::All,
            Some(r) => RegionSelection::Only(split_list(&r)),
        };

        let cache_max_age = match non_empty(cvm.cache_max_age) {
            None => defaults.cache_max_age,
            Some(raw) => {
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| ConfigError::invalid("cache_max_age", format!("'{raw}' is not a number")))?;
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    ConfigError::invalid("cache_max_age", format!("'{raw}': {e}"))
                })?
            }
        };

        // Present but blank means "no destination": every instance is dropped.
        let destination = match cvm.destination_variable {
            None => defaults.destination,
            Some(raw) if raw.trim().is_empty() => {
                tracing::warn!("destination_variable is empty; no instance will be listed");
                None
            }
            Some(raw) => Some(raw.parse()?),
        };

        let instance_states = if parse_flag("all_instances", cvm.all_instances)?.unwrap_or(false) {
            VALID_INSTANCE_STATES.iter().map(|s| s.to_string()).collect()
        } else if let Some(raw) = non_empty(cvm.instance_states) {
            split_list(&raw)
                .into_iter()
                .map(|s| s.to_uppercase())
                .filter(|s| {
                    let known = VALID_INSTANCE_STATES.contains(&s.as_str());
                    if !known {
                        tracing::warn!(state = %s, "ignoring unknown instance state");
                    }
                    known
                })
                .collect()
        } else {
            defaults.instance_states
        };

        let toggle = |key: &str, raw: Option<String>, default: bool| {
            parse_flag(key, raw).map(|v| v.unwrap_or(default))
        };
        let all = GroupBy::all();
        let group_by = GroupBy {
            instance_id: toggle("group_by_instance_id", cvm.group_by_instance_id, all.instance_id)?,
            region: toggle("group_by_region", cvm.group_by_region, all.region)?,
            availability_zone: toggle(
                "group_by_availability_zone",
                cvm.group_by_availability_zone,
                all.availability_zone,
            )?,
            instance_type: toggle("group_by_instance_type", cvm.group_by_instance_type, all.instance_type)?,
            image_id: toggle("group_by_image_id", cvm.group_by_image_id, all.image_id)?,
            vpc_id: toggle("group_by_vpc_id", cvm.group_by_vpc_id, all.vpc_id)?,
            subnet_id: toggle("group_by_subnet_id", cvm.group_by_subnet_id, all.subnet_id)?,
            security_group: toggle(
                "group_by_security_group",
                cvm.group_by_security_group,
                all.security_group,
            )?,
            tag_keys: toggle("group_by_tag_keys", cvm.group_by_tag_keys, all.tag_keys)?,
            tag_none: toggle("group_by_tag_none", cvm.group_by_tag_none, all.tag_none)?,
        };

        let page_size = match non_empty(cvm.page_size) {
            None => defaults.page_size,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::invalid(
                        "page_size",
                        format!("'{raw}' is not a positive integer"),
                    ))
                }
            },
        };

        Ok(Settings {
            credentials: Credentials {
                secret_id: non_empty(creds.tencentcloud_secret_id),
                secret_key: non_empty(creds.tencentcloud_secret_key),
                security_token: non_empty(creds.tencentcloud_security_token),
            },
            regions,
            regions_exclude: non_empty(cvm.regions_exclude)
                .map(|r| split_list(&r))
                .unwrap_or_default(),
            cache_path: non_empty(cvm.cache_path)
                .map(|p| expand_path(&p))
                .unwrap_or(defaults.cache_path),
            cache_max_age,
            destination,
            instance_states,
            nested_groups: parse_flag("nested_groups", cvm.nested_groups)?.unwrap_or(false),
            group_by,
            pattern_include: compile_pattern("pattern_include", cvm.pattern_include)?,
            pattern_exclude: compile_pattern("pattern_exclude", cvm.pattern_exclude)?,
            page_size,
            snapshot_path: non_empty(cvm.snapshot_path).map(|p| expand_path(&p)),
        })
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // TENCENTCLOUD_SECRET_ID
        if let Some(id) = env_non_empty("TENCENTCLOUD_SECRET_ID") {
            self.credentials.secret_id = Some(id);
        }

        // TENCENTCLOUD_SECRET_KEY
        if let Some(key) = env_non_empty("TENCENTCLOUD_SECRET_KEY") {
            self.credentials.secret_key = Some(key);
        }

        // TENCENTCLOUD_SECURITY_TOKEN
        if let Some(token) = env_non_empty("TENCENTCLOUD_SECURITY_TOKEN") {
            self.credentials.security_token = Some(token);
        }
    }

    /// Cache store for these settings
    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(&self.cache_path, self.cache_max_age)
    }
}

fn file_format(path: &Path) -> ::config::FileFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => ::config::FileFormat::Toml,
        Some("yml" | "yaml") => ::config::FileFormat::Yaml,
        Some("json") => ::config::FileFormat::Json,
        _ => ::config::FileFormat::Ini,
    }
}

/// INI settings source that keeps values exactly as written
///
/// Backslashes are literal, so patterns such as `^10\.` survive intact.
/// Section and key names are lower-cased; keys outside any section land at
/// the top level.
#[derive(Debug, Clone)]
struct IniSource {
    origin: String,
    content: String,
}

impl IniSource {
    fn new(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            content: content.into(),
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), content))
    }
}

impl ::config::Source for IniSource {
    fn clone_into_box(&self) -> Box<dyn ::config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<::config::Map<String, ::config::Value>, ::config::ConfigError> {
        let options = ini::ParseOption {
            enabled_escape: false,
            ..ini::ParseOption::default()
        };
        let parsed = ini::Ini::load_from_str_opt(&self.content, options)
            .map_err(|e| ::config::ConfigError::Foreign(Box::new(e)))?;

        let origin = Some(&self.origin);
        let mut root = ::config::Map::new();
        for (section, properties) in parsed.iter() {
            let mut entries = ::config::Map::new();
            for (key, value) in properties.iter() {
                entries.insert(
                    key.to_lowercase(),
                    ::config::Value::new(origin, value.to_string()),
                );
            }
            match section {
                Some(name) => {
                    root.insert(name.to_lowercase(), ::config::Value::new(origin, entries));
                }
                None => root.extend(entries),
            }
        }
        Ok(root)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn env_non_empty(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(key: &str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(Some(true)),
        "false" | "no" | "off" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(key, format!("'{raw}' is not a boolean"))),
    }
}

/// Compile a pattern that must match at the start of the address
fn compile_pattern(key: &str, raw: Option<String>) -> Result<Option<Regex>, ConfigError> {
    non_empty(raw)
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::Pattern {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}
