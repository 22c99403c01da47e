//! iperf3-remote Core Library
//!
//! Bandwidth-measurement keywords for Robot Framework built on the `iperf3`
//! executable. Provides argument normalization, command construction,
//! subprocess execution, report widening for XML-RPC and the keyword
//! library itself.

pub mod command;
pub mod config;
pub mod error;
pub mod keywords;
pub mod report;
pub mod runner;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use command::{ClientOptions, CommandLine, ServerOptions};
pub use config::{Config, ConfigLoader, IperfConfig, RemoteConfig};
pub use error::{HardValidationError, KeywordError, KeywordResult};
pub use keywords::{find_keyword, Iperf3Library, KeywordSpec, KEYWORDS, LIBRARY_DOC};
pub use report::RemoteValue;
pub use runner::{Runner, ToolVersion};
pub use types::{ArgValue, Port, Protocol};
