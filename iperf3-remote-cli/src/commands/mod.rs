// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod client;
pub mod serve;
pub mod validate;

use iperf3_remote_core::{Config, Iperf3Library, Runner};

/// Build the keyword library from validated configuration.
pub fn library_from_config(config: &Config) -> Iperf3Library {
    Iperf3Library::new(Runner::new(
        config.iperf3.binary.clone(),
        config.iperf3.timeout_margin,
    ))
}
