//! CLI module for cvm-inventory
//!
//! Implements the Ansible dynamic inventory script protocol: `--list` prints
//! the whole inventory, `--host <address>` prints the variables of one host.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::query::Request;

/// Ansible dynamic inventory for TencentCloud CVM instances
#[derive(Parser, Debug, Clone)]
#[command(name = "cvm-inventory")]
#[command(version)]
#[command(about = "Ansible dynamic inventory for TencentCloud CVM", long_about = None)]
pub struct Cli {
    /// List all instances (default)
    #[arg(long, default_value_t = true, conflicts_with = "host")]
    pub list: bool,

    /// Get all the variables about a specific instance
    #[arg(long, value_name = "ADDRESS")]
    pub host: Option<String>,

    /// Force a refresh of the cache by making API requests
    #[arg(long)]
    pub refresh_cache: bool,

    /// Path to the settings file
    #[arg(short = 'c', long, env = "TENCENTCLOUD_INI_PATH")]
    pub config: Option<PathBuf>,

    /// Serve instances from a YAML or JSON snapshot file
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// The request this invocation makes
    pub fn request(&self) -> Request {
        match &self.host {
            Some(address) => Request::Host(address.clone()),
            None => Request::List,
        }
    }
}
