// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Validates the remote server and iperf3 settings at startup.
//! Any invalid field results in a HardValidationError that prevents startup.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, KeywordError, KeywordResult};
use crate::runner::{DEFAULT_BINARY, DEFAULT_TIMEOUT_MARGIN};
use crate::types::Port;

/// Default XML-RPC listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Default XML-RPC listen port (Robot Framework's remote library default).
pub const DEFAULT_LISTEN_PORT: u16 = 8270;

/// Raw remote server configuration as parsed from YAML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRemoteConfig {
    #[serde(default = "default_address")]
    address: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

impl Default for RawRemoteConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

/// Raw iperf3 configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIperfConfig {
    #[serde(default = "default_binary")]
    binary: String,
    #[serde(default = "default_timeout_margin_secs")]
    timeout_margin_secs: u64,
}

fn default_binary() -> String {
    DEFAULT_BINARY.to_string()
}

fn default_timeout_margin_secs() -> u64 {
    DEFAULT_TIMEOUT_MARGIN.as_secs()
}

impl Default for RawIperfConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_margin_secs: default_timeout_margin_secs(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    remote: RawRemoteConfig,
    #[serde(default)]
    iperf3: RawIperfConfig,
}

/// Validated remote server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub address: IpAddr,
    pub port: Port,
}

/// Validated iperf3 configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IperfConfig {
    pub binary: String,
    /// Zero disables the time bound.
    pub timeout_margin: Duration,
}

/// Complete validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub remote: RemoteConfig,
    pub iperf3: IperfConfig,
}

impl Default for Config {
    fn default() -> Self {
        // The built-in defaults are valid by construction.
        ConfigLoader::validate(RawConfig::default()).unwrap_or_else(|e| {
            unreachable!("built-in defaults failed validation: {}", e)
        })
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> KeywordResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(KeywordError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KeywordError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    /// An empty document yields the defaults.
    pub fn load_string(content: &str) -> KeywordResult<Config> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| KeywordError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> KeywordResult<Config> {
        let remote = Self::validate_remote(raw.remote)?;
        let iperf3 = Self::validate_iperf(raw.iperf3)?;
        Ok(Config { remote, iperf3 })
    }

    fn validate_remote(raw: RawRemoteConfig) -> KeywordResult<RemoteConfig> {
        let address: IpAddr =
            raw.address
                .trim()
                .parse()
                .map_err(|_| HardValidationError::InvalidFieldValue {
                    field: "remote.address",
                    value: raw.address.clone(),
                    reason: "Must be an IPv4 or IPv6 address".to_string(),
                })?;

        let port = Port::new(raw.port)?;

        Ok(RemoteConfig { address, port })
    }

    fn validate_iperf(raw: RawIperfConfig) -> KeywordResult<IperfConfig> {
        if raw.binary.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "iperf3.binary",
                value: raw.binary,
                reason: "Executable name cannot be empty".to_string(),
            }
            .into());
        }

        // One hour is far beyond any sensible shutdown grace.
        if raw.timeout_margin_secs > 3600 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "iperf3.timeout_margin_secs",
                value: raw.timeout_margin_secs.to_string(),
                reason: "Timeout margin must not exceed 3600 seconds".to_string(),
            }
            .into());
        }

        Ok(IperfConfig {
            binary: raw.binary.trim().to_string(),
            timeout_margin: Duration::from_secs(raw.timeout_margin_secs),
        })
    }
}
