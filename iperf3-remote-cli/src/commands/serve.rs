// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `iperf3-remote serve` command - Start the remote library server.
//!
//! Serves until Ctrl+C or a `stop_remote_server` call, then stops any iperf3
//! server the keywords started and releases the listen socket.

use std::net::SocketAddr;
use std::sync::Arc;

use iperf3_remote_core::Config;

use super::library_from_config;
use crate::remote;

pub async fn execute(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::new(config.remote.address, config.remote.port.value());

    tracing::info!(
        address = %addr,
        binary = %config.iperf3.binary,
        "Starting remote library server"
    );

    let library = Arc::new(library_from_config(&config));

    // Not fatal: the keywords report a missing binary on every call.
    match library.runner().probe_version().await {
        Ok(version) if !version.supports_bidir() => {
            tracing::warn!(
                version = %version,
                "iperf3 is older than 3.7, the bidir argument will be rejected"
            );
        }
        Ok(version) => tracing::info!(version = %version, "Found iperf3"),
        Err(e) => tracing::warn!(error = %e, "Could not determine iperf3 version"),
    }

    remote::serve(Arc::clone(&library), addr).await?;

    let leftover = library.stop_server().await;
    if !leftover.is_empty() {
        tracing::info!(
            reports = leftover.len(),
            "Discarded reports of iperf3 server still running at shutdown"
        );
    }

    tracing::info!("Remote library server stopped");
    Ok(())
}
