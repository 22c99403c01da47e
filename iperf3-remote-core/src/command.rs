// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! iperf3 command-line construction.
//!
//! Typed client and server options are rendered into argv. Construction is
//! pure; nothing is spawned here. `-J` is always emitted so the result can be
//! parsed.

use std::fmt;

use crate::error::{KeywordError, KeywordResult};
use crate::types::{Port, Protocol};

/// Default measurement duration in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 10;

/// A program plus its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn flag(&mut self, flag: &str) -> &mut Self {
        self.args.push(flag.to_string());
        self
    }

    fn option(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(value.to_string());
        self
    }

    /// Program followed by its arguments.
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_argv().join(" "))
    }
}

/// Options for a client measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// IPv4 or IPv6 address to connect to.
    pub server_address: String,
    /// Port to connect to; iperf3's default when unset.
    pub server_port: Option<Port>,
    /// Local address to bind to.
    pub bind_address: Option<String>,
    pub protocol: Protocol,
    /// Seconds to transmit for; `--time` is omitted when unset.
    pub duration: Option<u32>,
    /// Number of parallel client streams.
    pub num_streams: Option<u32>,
    /// Server sends, client receives.
    pub reverse: bool,
    /// Target bitrate, `n[KMG]`. `"0"` disables the limit.
    pub bitrate: Option<String>,
    /// Bytes to transmit instead of a duration, `n[KMG]`.
    pub num_bytes: Option<String>,
    /// Send and receive at the same time.
    pub bidir: bool,
    /// IP type of service. Decimal, octal (`064`) or hex (`0x34`).
    pub tos: Option<String>,
    /// IP DSCP bits, numeric or symbolic.
    pub dscp: Option<String>,
}

impl ClientOptions {
    /// Options with the keyword defaults: TCP for 10 seconds.
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            server_port: None,
            bind_address: None,
            protocol: Protocol::Tcp,
            duration: Some(DEFAULT_DURATION_SECS),
            num_streams: None,
            reverse: false,
            bitrate: None,
            num_bytes: None,
            bidir: false,
            tos: None,
            dscp: None,
        }
    }

    /// Check option combinations iperf3 cannot run.
    pub fn validate(&self) -> KeywordResult<()> {
        if self.server_address.trim().is_empty() {
            return Err(KeywordError::invalid_argument(
                "server_address",
                &self.server_address,
                "server address must not be empty",
            ));
        }

        if self.reverse && self.bidir {
            return Err(KeywordError::invalid_argument(
                "bidir",
                true,
                "reverse and bidir are mutually exclusive",
            ));
        }

        if self.num_streams == Some(0) {
            return Err(KeywordError::invalid_argument(
                "num_streams",
                0,
                "at least one stream is required",
            ));
        }

        if self.duration == Some(0) && self.num_bytes.is_none() {
            return Err(KeywordError::invalid_argument(
                "duration",
                0,
                "duration must be positive unless num_bytes is given",
            ));
        }

        Ok(())
    }

    /// Render the client invocation.
    pub fn to_command(&self, binary: &str) -> KeywordResult<CommandLine> {
        self.validate()?;

        let mut cmd = CommandLine::new(binary);
        cmd.flag("-J").option("-c", self.server_address.trim());

        if let Some(port) = self.server_port {
            cmd.option("-p", port);
        }
        if let Some(bind) = &self.bind_address {
            cmd.option("-B", bind);
        }
        if self.protocol == Protocol::Udp {
            cmd.flag("-u");
        }
        if let Some(duration) = self.duration {
            cmd.option("--time", duration);
        }
        if let Some(streams) = self.num_streams {
            cmd.option("--parallel", streams);
        }
        if self.reverse {
            cmd.flag("--reverse");
        }
        if let Some(bitrate) = &self.bitrate {
            cmd.option("-b", bitrate);
        }
        if let Some(bytes) = &self.num_bytes {
            cmd.option("--bytes", bytes);
        }
        if self.bidir {
            cmd.flag("--bidir");
        }
        if let Some(tos) = &self.tos {
            cmd.option("--tos", tos);
        }
        if let Some(dscp) = &self.dscp {
            cmd.option("--dscp", dscp);
        }

        Ok(cmd)
    }
}

/// Options for an iperf3 server process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    /// Port to listen on; iperf3's default when unset.
    pub port: Option<Port>,
    /// Address to bind to; all interfaces when unset.
    pub bind_address: Option<String>,
}

impl ServerOptions {
    /// Render the server invocation.
    pub fn to_command(&self, binary: &str) -> CommandLine {
        let mut cmd = CommandLine::new(binary);
        cmd.flag("-s").flag("-J");

        if let Some(port) = self.port {
            cmd.option("-p", port);
        }
        if let Some(bind) = &self.bind_address {
            cmd.option("-B", bind);
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Read the options back out of a rendered argv.
    fn parse_back(cmd: &CommandLine) -> ClientOptions {
        let mut opts = ClientOptions::new("");
        opts.duration = None;
        let mut args = cmd.args.iter();
        while let Some(arg) = args.next() {
            let mut value = || args.next().cloned().expect("flag value");
            match arg.as_str() {
                "-J" => {}
                "-c" => opts.server_address = value(),
                "-p" => opts.server_port = Some(Port::new(value().parse().unwrap()).unwrap()),
                "-B" => opts.bind_address = Some(value()),
                "-u" => opts.protocol = Protocol::Udp,
                "--time" => opts.duration = Some(value().parse().unwrap()),
                "--parallel" => opts.num_streams = Some(value().parse().unwrap()),
                "--reverse" => opts.reverse = true,
                "-b" => opts.bitrate = Some(value()),
                "--bytes" => opts.num_bytes = Some(value()),
                "--bidir" => opts.bidir = true,
                "--tos" => opts.tos = Some(value()),
                "--dscp" => opts.dscp = Some(value()),
                other => panic!("unexpected token {other}"),
            }
        }
        opts
    }

    #[test]
    fn test_default_client_command() {
        let cmd = ClientOptions::new("192.168.1.1").to_command("iperf3").unwrap();
        assert_eq!(
            cmd.to_argv(),
            vec!["iperf3", "-J", "-c", "192.168.1.1", "--time", "10"]
        );
    }

    #[test]
    fn test_client_round_trip() {
        let mut opts = ClientOptions::new("fe80::1");
        opts.server_port = Some(Port::new(11211).unwrap());
        opts.bind_address = Some("10.0.0.2".to_string());
        opts.protocol = Protocol::Udp;
        opts.duration = Some(5);
        opts.num_streams = Some(4);
        opts.reverse = true;
        opts.bitrate = Some("5M".to_string());
        opts.num_bytes = Some("1G".to_string());
        opts.tos = Some("0x34".to_string());
        opts.dscp = Some("af11".to_string());

        let cmd = opts.to_command("iperf3").unwrap();
        assert_eq!(parse_back(&cmd), opts);

        opts.reverse = false;
        opts.bidir = true;
        opts.protocol = Protocol::Tcp;
        let cmd = opts.to_command("iperf3").unwrap();
        assert_eq!(parse_back(&cmd), opts);
    }

    #[test]
    fn test_json_flag_always_present() {
        let mut opts = ClientOptions::new("127.0.0.1");
        opts.duration = None;
        let cmd = opts.to_command("/usr/bin/iperf3").unwrap();
        assert_eq!(cmd.program, "/usr/bin/iperf3");
        assert_eq!(cmd.args, vec!["-J", "-c", "127.0.0.1"]);
    }

    #[test]
    fn test_reverse_and_bidir_rejected() {
        let mut opts = ClientOptions::new("127.0.0.1");
        opts.reverse = true;
        opts.bidir = true;
        let err = opts.to_command("iperf3").unwrap_err();
        assert!(matches!(err, KeywordError::InvalidArgument { .. }));
    }

    #[test]
    fn test_invalid_client_options() {
        assert!(ClientOptions::new("  ").to_command("iperf3").is_err());

        let mut opts = ClientOptions::new("127.0.0.1");
        opts.num_streams = Some(0);
        assert!(opts.validate().is_err());

        let mut opts = ClientOptions::new("127.0.0.1");
        opts.duration = Some(0);
        assert!(opts.validate().is_err());
        opts.num_bytes = Some("10M".to_string());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_server_command() {
        assert_eq!(
            ServerOptions::default().to_command("iperf3").to_argv(),
            vec!["iperf3", "-s", "-J"]
        );

        let opts = ServerOptions {
            port: Some(Port::new(11211).unwrap()),
            bind_address: Some("192.168.1.1".to_string()),
        };
        assert_eq!(
            opts.to_command("iperf3").to_argv(),
            vec!["iperf3", "-s", "-J", "-p", "11211", "-B", "192.168.1.1"]
        );
    }

    #[test]
    fn test_display_joins_tokens() {
        let cmd = ServerOptions::default().to_command("iperf3");
        assert_eq!(cmd.to_string(), "iperf3 -s -J");
    }
}
