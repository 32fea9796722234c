use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dnsfleet_events::NodeStatus;
use serde::{Deserialize, Serialize};

/// Identifier of a managed node.
pub type NodeId = i64;

/// How the transport authenticates to a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NodeCredentials {
    /// Use whatever the local agent or default identities provide.
    #[default]
    Agent,
    /// Use a specific private key file.
    KeyFile {
        /// Path to the private key on the control plane host.
        path: PathBuf,
    },
}

/// A remote resolver host under management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    /// Store identifier.
    pub id: NodeId,
    /// Operator-facing label.
    pub name: String,
    /// Hostname or address used by the transport.
    pub host: String,
    /// Transport port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Authentication method.
    pub credentials: NodeCredentials,
    /// Optional bastion (`user@host:port`) hop.
    pub jump_host: Option<String>,
    /// Remote configuration file; falls back to the fleet default.
    pub config_path: Option<PathBuf>,
    /// Last observed status.
    pub status: NodeStatus,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Configuration path for this node, falling back to `default`.
    #[must_use]
    pub fn config_path_or<'a>(&'a self, default: &'a Path) -> &'a Path {
        self.config_path.as_deref().unwrap_or(default)
    }
}

/// Payload used when registering a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNode {
    /// Operator-facing label.
    pub name: String,
    /// Hostname or address used by the transport.
    pub host: String,
    /// Transport port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    #[serde(default = "default_username")]
    pub username: String,
    /// Authentication method.
    #[serde(default)]
    pub credentials: NodeCredentials,
    /// Optional bastion hop.
    #[serde(default)]
    pub jump_host: Option<String>,
    /// Remote configuration file override.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

const fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "root".to_string()
}
