// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Robot Framework remote library server.
//!
//! Speaks the remote library protocol (`get_keyword_names`, `run_keyword`,
//! ...) over XML-RPC using `dxr_server`. Keyword failures are returned as
//! `FAIL` results; only malformed calls become XML-RPC faults.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dxr::{DxrError, Fault, TryFromValue, TryToValue, Value};
use dxr_server::axum::http::HeaderMap;
use dxr_server::{Handler, HandlerResult, RouteBuilder, Server};
use thiserror::Error;
use tokio::sync::Notify;

use iperf3_remote_core::{find_keyword, ArgValue, Iperf3Library, RemoteValue, LIBRARY_DOC};

/// Path Robot's `Remote` library posts to for `http://host:port`.
pub const RPC_PATH: &str = "/RPC2";

/// Lets the `stop_remote_server` response go out before the listener closes.
const STOP_DELAY: Duration = Duration::from_millis(200);

/// Fault code for calls with wrong parameter count or types.
const FAULT_INVALID_PARAMS: i32 = -32602;
/// Fault code for results that cannot be encoded.
const FAULT_INTERNAL: i32 = -32603;

/// Remote server startup and runtime errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("XML-RPC server error: {0}")]
    Serve(String),
}

/// Remote library protocol methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    GetKeywordNames,
    RunKeyword,
    GetKeywordArguments,
    GetKeywordDocumentation,
    GetKeywordTags,
    GetKeywordTypes,
    GetLibraryInformation,
    StopRemoteServer,
}

const METHODS: &[(&str, Method)] = &[
    ("get_keyword_names", Method::GetKeywordNames),
    ("run_keyword", Method::RunKeyword),
    ("get_keyword_arguments", Method::GetKeywordArguments),
    ("get_keyword_documentation", Method::GetKeywordDocumentation),
    ("get_keyword_tags", Method::GetKeywordTags),
    ("get_keyword_types", Method::GetKeywordTypes),
    ("get_library_information", Method::GetLibraryInformation),
    ("stop_remote_server", Method::StopRemoteServer),
];

/// The keyword library as seen through the remote protocol.
pub struct RemoteLibrary {
    library: Arc<Iperf3Library>,
    shutdown: Arc<Notify>,
}

impl RemoteLibrary {
    pub fn new(library: Arc<Iperf3Library>, shutdown: Arc<Notify>) -> Self {
        Self { library, shutdown }
    }

    pub fn keyword_names(&self) -> RemoteValue {
        RemoteValue::Array(
            self.library
                .keyword_names()
                .into_iter()
                .map(|name| RemoteValue::String(name.to_string()))
                .collect(),
        )
    }

    /// Run a keyword and wrap the outcome in a remote result struct.
    pub async fn run_keyword(
        &self,
        name: &str,
        args: Vec<ArgValue>,
        kwargs: Vec<(String, ArgValue)>,
    ) -> RemoteValue {
        let mut result = BTreeMap::new();
        result.insert("output".to_string(), RemoteValue::String(String::new()));

        match self.library.run_keyword(name, args, kwargs).await {
            Ok(value) => {
                result.insert("status".to_string(), string("PASS"));
                result.insert("return".to_string(), value);
            }
            Err(e) => {
                tracing::warn!(keyword = %name, error = %e, "Keyword failed");
                result.insert("status".to_string(), string("FAIL"));
                result.insert("return".to_string(), string(""));
                result.insert("error".to_string(), RemoteValue::String(e.to_string()));
                result.insert("traceback".to_string(), string(""));
            }
        }

        RemoteValue::Struct(result)
    }

    pub fn keyword_arguments(&self, name: &str) -> RemoteValue {
        let signatures = find_keyword(name)
            .map(|spec| spec.signatures())
            .unwrap_or_default();
        RemoteValue::Array(signatures.into_iter().map(RemoteValue::String).collect())
    }

    pub fn keyword_documentation(&self, name: &str) -> RemoteValue {
        let doc = match name {
            "__intro__" => LIBRARY_DOC,
            "__init__" => "",
            _ => find_keyword(name).map_or("", |spec| spec.doc),
        };
        string(doc)
    }

    /// Everything Robot needs in one call.
    pub fn library_information(&self) -> RemoteValue {
        let mut info = BTreeMap::new();
        info.insert("__intro__".to_string(), doc_only(LIBRARY_DOC));
        info.insert("__init__".to_string(), doc_only(""));

        for name in self.library.keyword_names() {
            let mut entry = BTreeMap::new();
            entry.insert("args".to_string(), self.keyword_arguments(name));
            entry.insert("doc".to_string(), self.keyword_documentation(name));
            entry.insert("tags".to_string(), RemoteValue::Array(Vec::new()));
            entry.insert("types".to_string(), RemoteValue::Array(Vec::new()));
            info.insert(name.to_string(), RemoteValue::Struct(entry));
        }

        RemoteValue::Struct(info)
    }

    /// Acknowledge the stop request and shut the server down shortly after.
    pub fn stop(&self) -> RemoteValue {
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(STOP_DELAY).await;
            shutdown.notify_one();
        });
        RemoteValue::Bool(true)
    }

    async fn dispatch(&self, method: Method, params: &[Value]) -> HandlerResult {
        let result = match method {
            Method::GetKeywordNames => self.keyword_names(),
            Method::RunKeyword => {
                let name = param_string(params, 0, "name")?;
                let args = match params.get(1) {
                    Some(value) => Vec::<Value>::try_from_value(value)
                        .map_err(|e| invalid_params("args", e))?
                        .iter()
                        .map(decode_arg)
                        .collect::<Result<Vec<_>, _>>()?,
                    None => Vec::new(),
                };
                let kwargs = match params.get(2) {
                    Some(value) => HashMap::<String, Value>::try_from_value(value)
                        .map_err(|e| invalid_params("kwargs", e))?
                        .into_iter()
                        .map(|(key, value)| decode_arg(&value).map(|arg| (key, arg)))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => Vec::new(),
                };
                self.run_keyword(&name, args, kwargs).await
            }
            Method::GetKeywordArguments => {
                self.keyword_arguments(&param_string(params, 0, "name")?)
            }
            Method::GetKeywordDocumentation => {
                self.keyword_documentation(&param_string(params, 0, "name")?)
            }
            Method::GetKeywordTags | Method::GetKeywordTypes => RemoteValue::Array(Vec::new()),
            Method::GetLibraryInformation => self.library_information(),
            Method::StopRemoteServer => {
                tracing::info!("Remote stop requested");
                self.stop()
            }
        };

        to_xmlrpc(&result).map_err(|e| Fault::new(FAULT_INTERNAL, e.to_string()))
    }
}

fn string(text: &str) -> RemoteValue {
    RemoteValue::String(text.to_string())
}

fn doc_only(doc: &str) -> RemoteValue {
    RemoteValue::Struct(BTreeMap::from([("doc".to_string(), string(doc))]))
}

fn invalid_params(what: &str, e: DxrError) -> Fault {
    Fault::new(FAULT_INVALID_PARAMS, format!("invalid {}: {}", what, e))
}

fn param_string(params: &[Value], index: usize, what: &str) -> Result<String, Fault> {
    let value = params
        .get(index)
        .ok_or_else(|| Fault::new(FAULT_INVALID_PARAMS, format!("missing {}", what)))?;
    String::try_from_value(value).map_err(|e| invalid_params(what, e))
}

/// Decode a scalar keyword argument.
fn decode_arg(value: &Value) -> Result<ArgValue, Fault> {
    if let Ok(b) = bool::try_from_value(value) {
        return Ok(ArgValue::Bool(b));
    }
    if let Ok(i) = i32::try_from_value(value) {
        return Ok(ArgValue::Int(i.into()));
    }
    if let Ok(x) = f64::try_from_value(value) {
        return Ok(ArgValue::Float(x));
    }
    if let Ok(s) = String::try_from_value(value) {
        return Ok(ArgValue::Str(s));
    }
    Err(Fault::new(
        FAULT_INVALID_PARAMS,
        "keyword arguments must be strings, numbers or booleans".to_string(),
    ))
}

/// Encode a value for the wire. Nil has no XML-RPC form and becomes "".
fn to_xmlrpc(value: &RemoteValue) -> Result<Value, DxrError> {
    match value {
        RemoteValue::Nil => String::new().try_to_value(),
        RemoteValue::Bool(b) => b.try_to_value(),
        RemoteValue::Int(i) => i.try_to_value(),
        RemoteValue::Double(x) => x.try_to_value(),
        RemoteValue::String(s) => s.try_to_value(),
        RemoteValue::Array(items) => items
            .iter()
            .map(to_xmlrpc)
            .collect::<Result<Vec<Value>, _>>()?
            .try_to_value(),
        RemoteValue::Struct(members) => members
            .iter()
            .map(|(key, member)| Ok((key.clone(), to_xmlrpc(member)?)))
            .collect::<Result<HashMap<String, Value>, DxrError>>()?
            .try_to_value(),
    }
}

/// One protocol method bound to the shared library.
struct MethodHandler {
    method: Method,
    remote: Arc<RemoteLibrary>,
}

#[async_trait]
impl Handler for MethodHandler {
    async fn handle(&self, params: &[Value], _headers: HeaderMap) -> HandlerResult {
        self.remote.dispatch(self.method, params).await
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// The SIGTERM handler is installed before the future is first polled, so a
/// signal arriving during startup is not lost.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        #[cfg(unix)]
        let terminate = async {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    }
}

/// Serve the library until Ctrl+C, SIGTERM or `stop_remote_server`.
pub async fn serve(library: Arc<Iperf3Library>, addr: SocketAddr) -> Result<(), RemoteError> {
    serve_until(library, addr, shutdown_signal()).await
}

/// Serve the library until `signal` resolves or `stop_remote_server` is called.
pub async fn serve_until(
    library: Arc<Iperf3Library>,
    addr: SocketAddr,
    signal: impl Future<Output = ()>,
) -> Result<(), RemoteError> {
    // Fail with an error, not a panic inside the server, when the port is taken.
    std::net::TcpListener::bind(addr).map_err(|source| RemoteError::Bind { addr, source })?;

    let shutdown = Arc::new(Notify::new());
    let remote = Arc::new(RemoteLibrary::new(library, Arc::clone(&shutdown)));

    let route = METHODS
        .iter()
        .fold(RouteBuilder::new().set_path(RPC_PATH), |builder, &(name, method)| {
            builder.add_method(
                name,
                Box::new(MethodHandler {
                    method,
                    remote: Arc::clone(&remote),
                }),
            )
        })
        .build();
    let server = Server::from_route(route);

    tracing::info!(address = %addr, path = RPC_PATH, "Remote library server listening");

    tokio::select! {
        result = server.serve(addr) => {
            result.map_err(|e| RemoteError::Serve(e.to_string()))?;
        }
        _ = signal => {}
        _ = shutdown.notified() => {
            tracing::info!("Shutting down on remote request");
        }
    }

    Ok(())
}
