// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! iperf3 server process management.
//!
//! A server runs until stopped. Its JSON output (one report per served
//! client) is drained in the background so the pipe never fills, and handed
//! back when the server is stopped.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::command::ServerOptions;
use crate::error::{KeywordError, KeywordResult};
use crate::report::{self, RemoteValue};
use crate::runner::spawn_error;
use crate::types::Executable;

/// A running `iperf3 -s` child.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    pid: Option<u32>,
    options: ServerOptions,
    stdout: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl ServerProcess {
    /// Spawn an iperf3 server.
    ///
    /// Startup success is not checked. A server that failed to bind shows up
    /// as a client error on the next measurement.
    pub fn spawn(binary: &str, options: &ServerOptions) -> KeywordResult<Self> {
        let cmd = options.to_command(binary);
        let executable = Executable::locate(&cmd.program)?;

        let mut child = Command::new(executable.as_path())
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;

        let pid = child.id();
        let stdout = child.stdout.take().ok_or_else(|| KeywordError::Io {
            context: "capturing iperf3 server output",
            source: std::io::Error::other("stdout not piped"),
        })?;

        tracing::info!(pid = pid, command = %cmd, "Started iperf3 server");

        Ok(Self {
            child,
            pid,
            options: options.clone(),
            stdout: tokio::spawn(drain(stdout)),
        })
    }

    /// Process ID, if the child has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Options the server was started with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the server and collect one report per served client.
    pub async fn stop(mut self) -> KeywordResult<Vec<RemoteValue>> {
        // The child may already be gone; that is not an error here.
        if let Err(e) = self.child.kill().await {
            tracing::debug!(pid = self.pid, error = %e, "iperf3 server already exited");
        }

        let captured = self
            .stdout
            .await
            .map_err(|e| KeywordError::Io {
                context: "collecting iperf3 server output",
                source: std::io::Error::other(e),
            })?
            .map_err(|e| KeywordError::Io {
                context: "reading iperf3 server output",
                source: e,
            })?;

        let text = String::from_utf8_lossy(&captured);
        let reports = report::split_reports(&text)?;

        tracing::info!(
            pid = self.pid,
            reports = reports.len(),
            "Stopped iperf3 server"
        );

        Ok(reports.into_iter().map(report::widen).collect())
    }
}

async fn drain(mut stdout: ChildStdout) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stdout.read_to_end(&mut buf).await?;
    Ok(buf)
}
