// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! iperf3-remote CLI
//!
//! Serves the iperf3 keyword library to Robot Framework over XML-RPC, or runs
//! a single measurement locally.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use iperf3_remote_core::{Config, ConfigLoader, KeywordError, KeywordResult, Port};

mod commands;
mod remote;

/// iperf3-remote - iperf3 keywords for Robot Framework
#[derive(Parser)]
#[command(name = "iperf3-remote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server listen address or host name [default: 0.0.0.0]
    #[arg(short, long)]
    pub address: Option<String>,

    /// Server listen port [default: 8270]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the keyword library over XML-RPC (the default)
    Serve,

    /// Run one client measurement and print the report as JSON
    Client(commands::client::ClientArgs),

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },
}

impl Cli {
    /// Load the configuration file, if any, and apply flag overrides.
    async fn resolve_config(&self) -> KeywordResult<Config> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_file(path)?,
            None => Config::default(),
        };

        if let Some(address) = &self.address {
            config.remote.address = resolve_host(address).await?;
        }
        if let Some(port) = self.port {
            config.remote.port = Port::new(port)?;
        }

        Ok(config)
    }
}

/// Turn an IP literal or host name into the address to listen on.
async fn resolve_host(host: &str) -> KeywordResult<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
        KeywordError::invalid_argument("address", host, format!("cannot resolve host: {}", e))
    })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| KeywordError::invalid_argument("address", host, "host has no addresses"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::Validate { file }) = &cli.command {
        return commands::validate::execute(file).await;
    }

    let config = cli.resolve_config().await?;

    // Dispatch to command handlers
    match cli.command {
        None | Some(Commands::Serve) => commands::serve::execute(config).await,
        Some(Commands::Client(args)) => commands::client::execute(config, args).await,
        Some(Commands::Validate { .. }) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_without_flags() {
        let cli = Cli::parse_from(["iperf3-remote"]);
        assert!(cli.command.is_none());

        let config = cli.resolve_config().await.unwrap();
        assert_eq!(config.remote.address.to_string(), "0.0.0.0");
        assert_eq!(config.remote.port.value(), 8270);
    }

    #[tokio::test]
    async fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.yaml");
        std::fs::write(&path, "remote:\n  address: 127.0.0.1\n  port: 9000\n").unwrap();

        let cli = Cli::parse_from([
            "iperf3-remote",
            "-c",
            path.to_str().unwrap(),
            "-p",
            "8271",
        ]);
        let config = cli.resolve_config().await.unwrap();
        assert_eq!(config.remote.address.to_string(), "127.0.0.1");
        assert_eq!(config.remote.port.value(), 8271);
    }

    #[tokio::test]
    async fn test_host_name_address() {
        let cli = Cli::parse_from(["iperf3-remote", "-a", "localhost"]);
        let config = cli.resolve_config().await.unwrap();
        assert!(config.remote.address.is_loopback());

        let cli = Cli::parse_from(["iperf3-remote", "-a", "::1"]);
        let config = cli.resolve_config().await.unwrap();
        assert_eq!(config.remote.address.to_string(), "::1");
    }

    #[tokio::test]
    async fn test_zero_port_rejected() {
        let cli = Cli::parse_from(["iperf3-remote", "--port", "0"]);
        assert!(cli.resolve_config().await.is_err());
    }
}
