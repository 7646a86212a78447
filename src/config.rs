// Distributed under the MIT software license.

//! Configuration file parsing: `key = value` / `key=value`, `#` comments,
//! whitespace trimmed, one entry per line.
//!
//! Grounded on `original_source/src/autod/configuration.cpp`. The original
//! builds this on top of Boost.StringAlgo (`boost::split`/`trim`); the
//! direct idiomatic translation is a hand-rolled parser over
//! `str::split_once`/`str::trim`, keeping no new dependency surface.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't open config file {0:?}: {1}")]
    Open(std::path::PathBuf, std::io::Error),
    #[error("missing required key: {0}")]
    MissingKey(String),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue { key: String, value: String, reason: String },
}

/// A parsed `key = value` table, as read from a config file.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    entries: HashMap<String, String>,
}

impl RawConfig {
    pub fn parse_str(contents: &str) -> Self {
        let mut entries = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            } else {
                tracing::warn!("can't parse config line: {line:?}");
            }
        }
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Open(path.to_path_buf(), e))?;
        Ok(Self::parse_str(&contents))
    }

    fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.entries
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self.get_str(key)?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "could not parse".to_string(),
        })
    }
}

/// The coordinator's immutable configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub vpnip_range_begin: Ipv4Addr,
    pub vpnip_range_end: Ipv4Addr,
    pub this_vpn_ip: Ipv4Addr,
    pub this_vpn_netmask: Ipv4Addr,
    pub this_endpoint_ip: Ipv4Addr,
    pub this_endpoint_port: u16,
    pub this_allowed_ips: String,
    pub this_public_key: String,
}

impl ServerConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            vpnip_range_begin: raw.get_parsed("vpnip_range_begin")?,
            vpnip_range_end: raw.get_parsed("vpnip_range_end")?,
            this_vpn_ip: raw.get_parsed("this_vpn_ip")?,
            this_vpn_netmask: raw.get_parsed("this_vpn_netmask")?,
            this_endpoint_ip: raw.get_parsed("this_endpoint_ip")?,
            this_endpoint_port: raw.get_parsed("this_endpoint_port")?,
            this_allowed_ips: raw.get_str("this_allowed_ips")?.to_string(),
            this_public_key: raw.get_str("this_public_key")?.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::load(path)?)
    }
}

/// The client driver's configuration: which coordinator to dial and what
/// to advertise about itself once provisioned.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub coordinator_addr: String,
    pub mac_addr: crate::types::MacAddr,
    pub this_public_key: String,
    pub this_endpoint_ip: Ipv4Addr,
    pub this_endpoint_port: u16,
    pub this_allowed_ips: String,
}

impl ClientConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            coordinator_addr: raw.get_str("coordinator_addr")?.to_string(),
            mac_addr: raw.get_parsed("mac_addr")?,
            this_public_key: raw.get_str("this_public_key")?.to_string(),
            this_endpoint_ip: raw.get_parsed("this_endpoint_ip")?,
            this_endpoint_port: raw.get_parsed("this_endpoint_port")?,
            this_allowed_ips: raw.get_str("this_allowed_ips")?.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::load(path)?)
    }
}
