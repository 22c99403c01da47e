// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers and coercions for keyword inputs.
//!
//! Keyword arguments arrive loosely typed (Robot Framework passes most values
//! as strings). Everything is normalized here into validated types before a
//! command line is built.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, KeywordError, KeywordResult};

/// A primitive keyword argument as delivered by a local or remote caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    /// Normalize to a strict boolean.
    ///
    /// Accepts native booleans, `true`/`false` in any letter case and the
    /// framework's own literal rendering `${TRUE}`/`${FALSE}`.
    pub fn to_bool(&self, field: &str) -> KeywordResult<bool> {
        match self {
            ArgValue::Bool(b) => Ok(*b),
            ArgValue::Str(s) => parse_bool_literal(s)
                .ok_or_else(|| KeywordError::invalid_argument(field, s, "value not bool-like")),
            other => Err(KeywordError::invalid_argument(
                field,
                other,
                "value not bool-like",
            )),
        }
    }

    /// Coerce to an integer. Strings must parse as a base-10 integer.
    pub fn to_int(&self, field: &str) -> KeywordResult<i64> {
        match self {
            ArgValue::Int(i) => Ok(*i),
            ArgValue::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| KeywordError::invalid_argument(field, s, "expected an integer")),
            other => Err(KeywordError::invalid_argument(
                field,
                other,
                "expected an integer",
            )),
        }
    }

    /// Coerce to a non-negative integer that fits in `u32`.
    pub fn to_u32(&self, field: &str) -> KeywordResult<u32> {
        let value = self.to_int(field)?;
        u32::try_from(value)
            .map_err(|_| KeywordError::invalid_argument(field, value, "out of range"))
    }

    /// Render as a command-line token. Integers and strings only.
    pub fn to_token(&self, field: &str) -> KeywordResult<String> {
        match self {
            ArgValue::Int(i) => Ok(i.to_string()),
            ArgValue::Str(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            other => Err(KeywordError::invalid_argument(
                field,
                other,
                "expected a number or a non-empty string",
            )),
        }
    }

    /// `None` for nil or an empty string, otherwise `Some(self)`.
    ///
    /// Robot sends `${None}` across XML-RPC as an empty string.
    pub fn non_nil(&self) -> Option<&ArgValue> {
        match self {
            ArgValue::Nil => None,
            ArgValue::Str(s) if s.trim().is_empty() => None,
            _ => Some(self),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Nil => write!(f, "None"),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(i) => write!(f, "{}", i),
            ArgValue::Float(x) => write!(f, "{}", x),
            ArgValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(value.into())
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ArgValue::Nil, Into::into)
    }
}

/// Map a boolean-ish literal to a boolean. Returns `None` for anything else.
pub fn parse_bool_literal(text: &str) -> Option<bool> {
    let lowered = text.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "true" | "${true}" => Some(true),
        "false" | "${false}" => Some(false),
        _ => None,
    }
}

/// Validated network port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Coerce a keyword argument into a port.
    pub fn from_arg(field: &str, value: &ArgValue) -> KeywordResult<Self> {
        let raw = value.to_int(field)?;
        let port = u16::try_from(raw)
            .map_err(|_| KeywordError::invalid_argument(field, raw, "port out of range"))?;
        Self::new(port).map_err(|e| KeywordError::invalid_argument(field, raw, e.to_string()))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// Transport protocol for a measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(KeywordError::invalid_argument(
                "protocol",
                s,
                format!("unsupported protocol: {}", s),
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved path of an executable.
/// Must exist and be executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable(PathBuf);

impl Executable {
    /// Resolve `name` the way a shell would.
    ///
    /// Names containing a path separator are checked as given; bare names
    /// are searched for in `PATH`.
    pub fn locate(name: &str) -> KeywordResult<Self> {
        let not_found = || KeywordError::BinaryNotFound {
            binary: name.to_string(),
        };

        if name.is_empty() {
            return Err(not_found());
        }

        if name.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(name);
            return if is_executable(&path) {
                Ok(Self(path))
            } else {
                Err(not_found())
            };
        }

        let search_path = std::env::var_os("PATH").ok_or_else(not_found)?;
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
            .map(Self)
            .ok_or_else(not_found)
    }

    /// Get the inner path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
