// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `iperf3-remote validate` command - Validate configuration file.

use std::path::Path;

use iperf3_remote_core::ConfigLoader;

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Remote Server:");
            println!("  Listen Address:     {}", config.remote.address);
            println!("  Listen Port:        {}", config.remote.port);
            println!();
            println!("iperf3:");
            println!("  Executable:         {}", config.iperf3.binary);
            if config.iperf3.timeout_margin.is_zero() {
                println!("  Timeout Margin:     disabled");
            } else {
                println!(
                    "  Timeout Margin:     {}s",
                    config.iperf3.timeout_margin.as_secs()
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
