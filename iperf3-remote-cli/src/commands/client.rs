// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `iperf3-remote client` command - Run one measurement locally.
//!
//! Goes through the same keyword binding as a remote `Run Client` call and
//! prints the widened report.

use clap::Args;

use iperf3_remote_core::{ArgValue, Config};

use super::library_from_config;

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// IPv4 or IPv6 address of the iperf3 server
    pub server_address: String,

    /// Port of the iperf3 server
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Local address to bind to
    #[arg(long)]
    pub bind_address: Option<String>,

    /// "tcp" or "udp"
    #[arg(long, default_value = "tcp")]
    pub protocol: String,

    /// Seconds to transmit for
    #[arg(long, default_value_t = 10)]
    pub duration: u32,

    /// Number of parallel client streams
    #[arg(long)]
    pub num_streams: Option<u32>,

    /// Server sends, client receives
    #[arg(long)]
    pub reverse: bool,

    /// Target bitrate, n[KMG] bits/s
    #[arg(long)]
    pub bitrate: Option<String>,

    /// Bytes to transmit instead of a duration, n[KMG]
    #[arg(long)]
    pub num_bytes: Option<String>,

    /// Send and receive at the same time
    #[arg(long)]
    pub bidir: bool,

    /// IP type of service
    #[arg(long)]
    pub tos: Option<String>,

    /// IP DSCP bits
    #[arg(long)]
    pub dscp: Option<String>,
}

impl ClientArgs {
    /// Named keyword arguments for `Run Client`.
    fn named(self) -> Vec<(String, ArgValue)> {
        let duration = if self.num_bytes.is_some() {
            ArgValue::Nil
        } else {
            ArgValue::Int(self.duration.into())
        };

        vec![
            ("server_address".to_string(), self.server_address.into()),
            (
                "server_port".to_string(),
                self.server_port.map(i64::from).into(),
            ),
            ("bind_address".to_string(), self.bind_address.into()),
            ("protocol".to_string(), self.protocol.into()),
            ("duration".to_string(), duration),
            (
                "num_streams".to_string(),
                self.num_streams.map(i64::from).into(),
            ),
            ("reverse".to_string(), self.reverse.into()),
            ("bitrate".to_string(), self.bitrate.into()),
            ("num_bytes".to_string(), self.num_bytes.into()),
            ("bidir".to_string(), self.bidir.into()),
            ("tos".to_string(), self.tos.into()),
            ("dscp".to_string(), self.dscp.into()),
        ]
    }
}

pub async fn execute(config: Config, args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(server = %args.server_address, "Running client measurement");

    let library = library_from_config(&config);
    let report = library.run_keyword("run_client", vec![], args.named()).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
