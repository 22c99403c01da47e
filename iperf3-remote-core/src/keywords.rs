// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Robot Framework keyword library backed by iperf3.
//!
//! Keywords are described by static [`KeywordSpec`]s so that a remote server
//! can advertise names, arguments and documentation. Calls are bound to those
//! specs the way Robot binds them: positional arguments first, then named.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::command::{ClientOptions, ServerOptions};
use crate::error::{KeywordError, KeywordResult};
use crate::report::RemoteValue;
use crate::runner::Runner;
use crate::server::ServerProcess;
use crate::types::{ArgValue, Port};

/// Library introduction, served as the `__intro__` documentation.
pub const LIBRARY_DOC: &str = "\
Measures bandwidth between two peers with iPerf3.

iPerf3 must be installed and reachable through `PATH` (or configured by path).

The library can run as a remote library so the machine running iPerf3 and \
connected to the device under test need not be the one running the tests:
| iperf3-remote [-a <address>] [-p <port>]

Boolean arguments take a native boolean or a boolean-like string: \
${TRUE}, ${FALSE}, true, True, false, False.

Integers outside the 32-bit range cannot cross XML-RPC, so large counters in \
returned reports are floats when the library is used remotely.";

/// Default value of a keyword argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDefault {
    /// Must be supplied.
    Required,
    /// Defaults to nothing; the matching flag is omitted.
    None,
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl ArgDefault {
    fn to_value(self) -> Option<ArgValue> {
        match self {
            ArgDefault::Required => Option::None,
            ArgDefault::None => Some(ArgValue::Nil),
            ArgDefault::Bool(b) => Some(ArgValue::Bool(b)),
            ArgDefault::Int(i) => Some(ArgValue::Int(i)),
            ArgDefault::Str(s) => Some(ArgValue::from(s)),
        }
    }
}

/// One keyword argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub default: ArgDefault,
}

impl ArgSpec {
    const fn required(name: &'static str) -> Self {
        Self {
            name,
            default: ArgDefault::Required,
        }
    }

    const fn optional(name: &'static str, default: ArgDefault) -> Self {
        Self { name, default }
    }

    /// Robot's argument signature form: `name` or `name=default`.
    pub fn signature(&self) -> String {
        match self.default {
            ArgDefault::Required => self.name.to_string(),
            ArgDefault::None => format!("{}=None", self.name),
            ArgDefault::Bool(true) => format!("{}=True", self.name),
            ArgDefault::Bool(false) => format!("{}=False", self.name),
            ArgDefault::Int(i) => format!("{}={}", self.name, i),
            ArgDefault::Str(s) => format!("{}={}", self.name, s),
        }
    }
}

/// Which operation a keyword performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    StartServer,
    StopServer,
    RunClient,
}

/// Static description of a keyword.
#[derive(Debug)]
pub struct KeywordSpec {
    /// Method name as exposed to Robot.
    pub name: &'static str,
    pub kind: KeywordKind,
    pub args: &'static [ArgSpec],
    pub doc: &'static str,
}

impl KeywordSpec {
    /// Argument signatures in declaration order.
    pub fn signatures(&self) -> Vec<String> {
        self.args.iter().map(ArgSpec::signature).collect()
    }

    /// Bind call arguments to this keyword's parameters.
    ///
    /// Positional values fill parameters in order, named values by name.
    /// Unset optional parameters take their defaults.
    pub fn bind(
        &self,
        positional: Vec<ArgValue>,
        named: Vec<(String, ArgValue)>,
    ) -> KeywordResult<BoundArgs> {
        if positional.len() > self.args.len() {
            return Err(KeywordError::invalid_argument(
                self.name,
                positional.len(),
                format!(
                    "expected at most {} arguments, got {}",
                    self.args.len(),
                    positional.len()
                ),
            ));
        }

        let mut values: HashMap<&'static str, ArgValue> = self
            .args
            .iter()
            .map(|spec| spec.name)
            .zip(positional)
            .collect();

        for (name, value) in named {
            let spec = self
                .args
                .iter()
                .find(|spec| spec.name == name)
                .ok_or_else(|| {
                    KeywordError::invalid_argument(&name, &value, "unexpected named argument")
                })?;
            if values.insert(spec.name, value).is_some() {
                return Err(KeywordError::invalid_argument(
                    spec.name,
                    "",
                    "got multiple values for argument",
                ));
            }
        }

        for spec in self.args {
            if values.contains_key(spec.name) {
                continue;
            }
            let default = spec.default.to_value().ok_or_else(|| {
                KeywordError::invalid_argument(spec.name, "", "missing required argument")
            })?;
            values.insert(spec.name, default);
        }

        Ok(BoundArgs { values })
    }
}

/// Arguments bound to a keyword's parameter list.
#[derive(Debug)]
pub struct BoundArgs {
    values: HashMap<&'static str, ArgValue>,
}

impl BoundArgs {
    /// Value of a parameter; nil when the keyword has no such parameter.
    pub fn get(&self, name: &str) -> &ArgValue {
        self.values.get(name).unwrap_or(&ArgValue::Nil)
    }

    fn opt(&self, name: &str) -> Option<&ArgValue> {
        self.get(name).non_nil()
    }

    fn port(&self, name: &str) -> KeywordResult<Option<Port>> {
        self.opt(name).map(|v| Port::from_arg(name, v)).transpose()
    }

    fn token(&self, name: &str) -> KeywordResult<Option<String>> {
        self.opt(name).map(|v| v.to_token(name)).transpose()
    }

    fn u32(&self, name: &str) -> KeywordResult<Option<u32>> {
        self.opt(name).map(|v| v.to_u32(name)).transpose()
    }

    fn flag(&self, name: &str) -> KeywordResult<bool> {
        self.get(name).to_bool(name)
    }

    /// Build server options from `server_port` and `bind_address`.
    pub fn server_options(&self) -> KeywordResult<ServerOptions> {
        Ok(ServerOptions {
            port: self.port("server_port")?,
            bind_address: self.token("bind_address")?,
        })
    }

    /// Build client options from the `Run Client` parameters.
    pub fn client_options(&self) -> KeywordResult<ClientOptions> {
        let server_address = self
            .token("server_address")?
            .ok_or_else(|| KeywordError::invalid_argument("server_address", "None", "required"))?;

        let protocol = match self.opt("protocol") {
            Some(ArgValue::Str(s)) => s.parse()?,
            Some(other) => {
                return Err(KeywordError::invalid_argument(
                    "protocol",
                    other,
                    format!("unsupported protocol: {}", other),
                ))
            }
            None => Default::default(),
        };

        let options = ClientOptions {
            server_address,
            server_port: self.port("server_port")?,
            bind_address: self.token("bind_address")?,
            protocol,
            duration: self.u32("duration")?,
            num_streams: self.u32("num_streams")?,
            reverse: self.flag("reverse")?,
            bitrate: self.token("bitrate")?,
            num_bytes: self.token("num_bytes")?,
            bidir: self.flag("bidir")?,
            tos: self.token("tos")?,
            dscp: self.token("dscp")?,
        };
        options.validate()?;
        Ok(options)
    }
}

const START_SERVER_ARGS: &[ArgSpec] = &[
    ArgSpec::optional("server_port", ArgDefault::None),
    ArgSpec::optional("bind_address", ArgDefault::None),
];

const RUN_CLIENT_ARGS: &[ArgSpec] = &[
    ArgSpec::required("server_address"),
    ArgSpec::optional("server_port", ArgDefault::None),
    ArgSpec::optional("bind_address", ArgDefault::None),
    ArgSpec::optional("protocol", ArgDefault::Str("tcp")),
    ArgSpec::optional("duration", ArgDefault::Int(10)),
    ArgSpec::optional("num_streams", ArgDefault::None),
    ArgSpec::optional("reverse", ArgDefault::Bool(false)),
    ArgSpec::optional("bitrate", ArgDefault::None),
    ArgSpec::optional("num_bytes", ArgDefault::None),
    ArgSpec::optional("bidir", ArgDefault::Bool(false)),
    ArgSpec::optional("tos", ArgDefault::None),
    ArgSpec::optional("dscp", ArgDefault::None),
];

/// All keywords of the library.
pub static KEYWORDS: &[KeywordSpec] = &[
    KeywordSpec {
        name: "start_server",
        kind: KeywordKind::StartServer,
        args: START_SERVER_ARGS,
        doc: "\
Starts an iPerf3 server listening on an optional port, optionally bound to an \
address. Nothing happens if a server started by this library is still running.

Arguments:
- server_port: (int), port to listen on, default: iPerf3's default port
- bind_address: (str), IPv4 or IPv6 address to bind to, default: all interfaces

Example:
| Start Server |       |             |
| Start Server | 11211 |             |
| Start Server | 11211 | 192.168.1.1 |",
    },
    KeywordSpec {
        name: "stop_server",
        kind: KeywordKind::StopServer,
        args: &[],
        doc: "\
Stops the iPerf3 server started by this library. Returns a list with one \
report per served client, in the same layout as the report of _Run Client_. \
Returns an empty list when no server is running.",
    },
    KeywordSpec {
        name: "run_client",
        kind: KeywordKind::RunClient,
        args: RUN_CLIENT_ARGS,
        doc: "\
Runs the iPerf3 client against _server_address_ (and optionally _server_port_) \
and returns iPerf3's JSON report as a dictionary.

Arguments:
- server_address: (str), IPv4 or IPv6 address to connect to
- server_port: (int), port to connect to, default: iPerf3's default port
- bind_address: (str), local IPv4 or IPv6 address to bind to
- protocol: (str), \"tcp\" or \"udp\", default: tcp
- duration: (int), seconds to transmit for, default: 10
- num_streams: (int), number of parallel client streams
- reverse: (bool), the server sends and the client receives, default: False
- bitrate: (str), n[KMG] bits/s, \"0\" for unlimited, default: 1 Mbit/s for UDP, unlimited for TCP
- num_bytes: (str), n[KMG] bytes to transmit instead of a duration
- bidir: (bool), send and receive at the same time, default: False
- tos: (int), IP type of service; 52, 064 and 0x34 are the same value
- dscp: (int), IP DSCP bits, numeric or symbolic

Example:
| Run Client | 192.168.1.1 |       |              |            |                 |
| Run Client | 192.168.1.1 | 11211 |              |            |                 |
| Run Client | 192.168.1.1 | 11211 | protocol=tcp | duration=5 | bidir=True      |
| Run Client | 192.168.1.1 | 11211 | protocol=udp | bitrate=5M | reverse=${TRUE} |

Over the remote interface integers above 2^31 - 1 are returned as floats, \
e.g. `\"bytes\": 11527782400.0`.",
    },
];

/// Normalize a keyword name the way Robot matches them.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Look up a keyword by any Robot spelling of its name.
pub fn find_keyword(name: &str) -> Option<&'static KeywordSpec> {
    let wanted = normalize_name(name);
    KEYWORDS
        .iter()
        .find(|spec| normalize_name(spec.name) == wanted)
}

/// The iperf3 keyword library.
///
/// Owns at most one iperf3 server process, killed when the library is dropped.
#[derive(Debug)]
pub struct Iperf3Library {
    runner: Runner,
    server: Mutex<Option<ServerProcess>>,
}

impl Default for Iperf3Library {
    fn default() -> Self {
        Self::new(Runner::default())
    }
}

impl Iperf3Library {
    /// Create a library using the given runner.
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            server: Mutex::new(None),
        }
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Names of all keywords.
    pub fn keyword_names(&self) -> Vec<&'static str> {
        KEYWORDS.iter().map(|spec| spec.name).collect()
    }

    /// Start an iperf3 server unless one started here is still running.
    pub async fn start_server(&self, options: &ServerOptions) -> KeywordResult<()> {
        let mut server = self.server.lock().await;

        if let Some(running) = server.as_mut() {
            if running.is_running() {
                tracing::info!(
                    pid = running.pid(),
                    running_port = ?running.options().port,
                    requested_port = ?options.port,
                    "iperf3 server already running, not starting another"
                );
                return Ok(());
            }
        }

        *server = Some(ServerProcess::spawn(self.runner.binary(), options)?);
        Ok(())
    }

    /// Stop the running server and return its per-client reports.
    ///
    /// Never fails: without a server, or when its output cannot be read, the
    /// result is an empty list and the problem is logged.
    pub async fn stop_server(&self) -> Vec<RemoteValue> {
        let Some(process) = self.server.lock().await.take() else {
            return Vec::new();
        };

        match process.stop().await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!(error = %e, "Error getting iperf3 server statistics");
                Vec::new()
            }
        }
    }

    /// Run a client measurement.
    pub async fn run_client(&self, options: &ClientOptions) -> KeywordResult<RemoteValue> {
        self.runner.run_client(options).await
    }

    /// Run a keyword by name with positional and named arguments.
    pub async fn run_keyword(
        &self,
        name: &str,
        positional: Vec<ArgValue>,
        named: Vec<(String, ArgValue)>,
    ) -> KeywordResult<RemoteValue> {
        let spec =
            find_keyword(name).ok_or_else(|| KeywordError::UnknownKeyword(name.to_string()))?;
        let args = spec.bind(positional, named)?;

        tracing::debug!(keyword = spec.name, "Running keyword");

        match spec.kind {
            KeywordKind::StartServer => {
                self.start_server(&args.server_options()?).await?;
                Ok(RemoteValue::Nil)
            }
            KeywordKind::StopServer => Ok(RemoteValue::Array(self.stop_server().await)),
            KeywordKind::RunClient => self.run_client(&args.client_options()?).await,
        }
    }
}
