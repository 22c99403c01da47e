// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! iperf3 JSON reports and their transport-safe form.
//!
//! XML-RPC only carries 32-bit signed integers (`<i4>`). Byte counters in an
//! iperf3 report routinely exceed that, so every integer outside the `i32`
//! range is widened to a double. All other values pass through unchanged.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{KeywordError, KeywordResult};

/// A value restricted to what the remote transport can represent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemoteValue {
    Nil,
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
    Array(Vec<RemoteValue>),
    Struct(BTreeMap<String, RemoteValue>),
}

impl RemoteValue {
    /// Look up a member of a struct value.
    pub fn get(&self, key: &str) -> Option<&RemoteValue> {
        match self {
            RemoteValue::Struct(members) => members.get(key),
            _ => None,
        }
    }

    /// Numeric view of an int or double value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RemoteValue::Int(i) => Some(f64::from(*i)),
            RemoteValue::Double(x) => Some(*x),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for RemoteValue {
    fn from(value: serde_json::Value) -> Self {
        widen(value)
    }
}

/// Convert a parsed report into its transport-safe form.
pub fn widen(value: serde_json::Value) -> RemoteValue {
    use serde_json::Value;

    match value {
        Value::Null => RemoteValue::Nil,
        Value::Bool(b) => RemoteValue::Bool(b),
        Value::Number(n) => widen_number(&n),
        Value::String(s) => RemoteValue::String(s),
        Value::Array(items) => RemoteValue::Array(items.into_iter().map(widen).collect()),
        Value::Object(members) => RemoteValue::Struct(
            members
                .into_iter()
                .map(|(key, member)| (key, widen(member)))
                .collect(),
        ),
    }
}

fn widen_number(n: &serde_json::Number) -> RemoteValue {
    if let Some(i) = n.as_i64() {
        return match i32::try_from(i) {
            Ok(small) => RemoteValue::Int(small),
            Err(_) => RemoteValue::Double(i as f64),
        };
    }
    // u64 above i64::MAX, or a real float.
    RemoteValue::Double(n.as_f64().unwrap_or(f64::NAN))
}

/// Parse the captured stdout of a client run.
pub fn parse_report(stdout: &[u8]) -> KeywordResult<serde_json::Value> {
    serde_json::from_slice(stdout).map_err(|e| KeywordError::Parse {
        message: format!("invalid JSON report: {}", e),
    })
}

/// Parse the captured stdout of an iperf3 server.
///
/// A server prints one JSON object per served test, back to back. Objects are
/// separated where a closing brace ends one line and an opening brace starts
/// the next.
pub fn split_reports(stdout: &str) -> KeywordResult<Vec<serde_json::Value>> {
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices("}\n{") {
        reports.push(parse_report(text[start..=index].as_bytes())?);
        start = index + 2;
    }
    reports.push(parse_report(text[start..].as_bytes())?);

    Ok(reports)
}

/// Extract the `error` message iperf3 puts into its JSON output on failure.
pub fn error_message(stdout: &[u8]) -> Option<String> {
    let report: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    report
        .get("error")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
