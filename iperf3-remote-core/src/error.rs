// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for iperf3-remote.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.
//! Nothing here is retried: a failed measurement is reported to the caller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for keyword execution.
#[derive(Debug, Error)]
pub enum KeywordError {
    // =========================================================================
    // Caller Input Errors
    // =========================================================================
    #[error("Invalid argument: {field} = {value} - {reason}")]
    InvalidArgument {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No keyword with name '{0}' found")]
    UnknownKeyword(String),

    // =========================================================================
    // Environment Errors
    // =========================================================================
    #[error("Executable '{binary}' not found in PATH or not executable")]
    BinaryNotFound { binary: String },

    // =========================================================================
    // External Tool Errors
    // =========================================================================
    #[error("{reason}")]
    Execution { reason: String },

    #[error("iperf3 did not finish within {}s and was terminated", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("Unexpected iperf3 output: {message}")]
    Parse { message: String },

    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl KeywordError {
    /// Shorthand for an [`KeywordError::InvalidArgument`].
    pub fn invalid_argument(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Hard validation errors stop startup.
/// Used when configuration is invalid and the server cannot safely start.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },
}

/// Result type alias using KeywordError.
pub type KeywordResult<T> = Result<T, KeywordError>;
