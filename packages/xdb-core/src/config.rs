//! Storage configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolved connection settings.
///
/// Loading these from files or the environment is the host's job; the
/// storage layer only reads the values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Server host name or address
    pub server: String,
    /// Server port (dialect default when unset)
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Always require an encrypted transport, even on loopback
    pub require_secure_transport: bool,
    /// Permit unencrypted transport to remote hosts
    pub allow_insecure_transport: bool,
    /// Directory holding the files of embedded databases
    pub location: PathBuf,
    /// Connections per database, checked out or idle
    pub max_connections: u32,
    /// Lock wait for embedded engines in milliseconds
    pub busy_timeout_ms: u64,
    /// Wait for a pooled connection, and connect timeout for server engines, in milliseconds
    pub connect_timeout_ms: u64,
    /// Allow the non-atomic read-modify-write upsert when a dialect has no native one
    pub emulate_upsert: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            require_secure_transport: false,
            allow_insecure_transport: false,
            location: PathBuf::from("./data"),
            max_connections: 8,
            busy_timeout_ms: 5000,
            connect_timeout_ms: 10000,
            emulate_upsert: true,
        }
    }
}

impl StorageConfig {
    /// Config for embedded databases stored under `location`.
    pub fn embedded(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    /// Returns `true` when `server` names the local machine.
    pub fn is_loopback(&self) -> bool {
        let host = self.server.trim_start_matches('[').trim_end_matches(']');
        if host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        host.parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}
