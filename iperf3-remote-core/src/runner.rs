// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! iperf3 execution.
//!
//! Spawns exactly one child per call, waits for it under an optional time
//! bound and turns its JSON report into a transport-safe value. A failed run
//! is reported, never retried.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::command::{ClientOptions, CommandLine};
use crate::error::{KeywordError, KeywordResult};
use crate::report::{self, RemoteValue};
use crate::types::Executable;

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "iperf3";

/// Default grace period on top of the measurement duration.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Bound for `iperf3 --version`.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured output of a successful run.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
}

/// Runs iperf3 invocations.
#[derive(Debug, Clone)]
pub struct Runner {
    /// Executable name or path.
    binary: String,
    /// Added to the measurement duration to form the time bound.
    /// Zero disables the bound.
    timeout_margin: Duration,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY, DEFAULT_TIMEOUT_MARGIN)
    }
}

impl Runner {
    /// Create a runner for the given executable.
    pub fn new(binary: impl Into<String>, timeout_margin: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout_margin,
        }
    }

    /// Executable name or path.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Time bound for a measurement of `duration` seconds.
    pub fn timeout_for(&self, duration: Option<u32>) -> Option<Duration> {
        if self.timeout_margin.is_zero() {
            return None;
        }
        duration.map(|secs| Duration::from_secs(u64::from(secs)) + self.timeout_margin)
    }

    /// Run a client measurement and return its widened report.
    pub async fn run_client(&self, options: &ClientOptions) -> KeywordResult<RemoteValue> {
        let cmd = options.to_command(&self.binary)?;
        let output = self.run(&cmd, self.timeout_for(options.duration)).await?;
        let report = report::parse_report(&output.stdout)?;

        tracing::info!(
            server = %options.server_address,
            protocol = %options.protocol,
            "Client measurement finished"
        );

        Ok(report::widen(report))
    }

    /// Run a command to completion.
    ///
    /// # Errors
    /// - `BinaryNotFound` if the executable cannot be resolved; nothing is spawned.
    /// - `Timeout` if the bound expires; the child is killed and its output dropped.
    /// - `Execution` on non-zero exit, with iperf3's own error message or stderr.
    pub async fn run(
        &self,
        cmd: &CommandLine,
        timeout: Option<Duration>,
    ) -> KeywordResult<RunOutput> {
        let executable = Executable::locate(&cmd.program)?;

        tracing::debug!(
            command = %cmd,
            executable = %executable,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Spawning iperf3"
        );

        let child = Command::new(executable.as_path())
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;

        let pid = child.id();

        // Dropping the future on timeout drops the child, which kills it.
        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(
                        pid = pid,
                        timeout_ms = limit.as_millis() as u64,
                        "iperf3 exceeded its time bound, killed"
                    );
                    return Err(KeywordError::Timeout { after: limit });
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| KeywordError::Io {
            context: "waiting for iperf3",
            source: e,
        })?;

        if !output.status.success() {
            let reason = report::error_message(&output.stdout)
                .or_else(|| {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    (!stderr.is_empty()).then_some(stderr)
                })
                .unwrap_or_else(|| format!("{} exited with {}", cmd.program, output.status));

            tracing::warn!(pid = pid, status = %output.status, reason = %reason, "iperf3 failed");
            return Err(KeywordError::Execution { reason });
        }

        Ok(RunOutput {
            stdout: output.stdout,
        })
    }

    /// Ask the executable for its version.
    pub async fn probe_version(&self) -> KeywordResult<ToolVersion> {
        let cmd = CommandLine {
            program: self.binary.clone(),
            args: vec!["--version".to_string()],
        };
        let output = self.run(&cmd, Some(VERSION_PROBE_TIMEOUT)).await?;
        let text = String::from_utf8_lossy(&output.stdout);

        ToolVersion::parse(&text).ok_or_else(|| KeywordError::Parse {
            message: format!(
                "unrecognized version output: {}",
                text.lines().next().unwrap_or_default()
            ),
        })
    }
}

pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> KeywordError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            KeywordError::BinaryNotFound {
                binary: program.to_string(),
            }
        }
        _ => KeywordError::Io {
            context: "spawning iperf3",
            source: e,
        },
    }
}

/// Version reported by `iperf3 --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    /// Oldest release with `--bidir`.
    pub const BIDIR: ToolVersion = ToolVersion {
        major: 3,
        minor: 7,
        patch: 0,
    };

    /// Parse the first line of `iperf3 --version`, e.g.
    /// `iperf 3.9 (cJSON 1.7.13)` or `iperf 3.16+`.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.lines().next()?;
        let rest = first.trim().strip_prefix("iperf ")?;
        let number: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let mut parts = number.split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;

        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Whether `--bidir` is available.
    pub fn supports_bidir(&self) -> bool {
        *self >= Self::BIDIR
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
