//! Host clients
//!
//! One trait over both protocol bindings, so the sampler never knows whether
//! it is talking to a child process or a socket.

mod rpc;
mod stdio;

pub use rpc::RpcHost;
pub use stdio::StdioHost;

use rodbench_ipc::{BenchmarkEntry, ErrorKind, FrameError, LineError, RunOutcome, RunRequest};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Prefix selecting the RPC binding in a host handle
pub const TCP_SCHEME: &str = "tcp://";

/// Errors talking to a host
#[derive(Debug, Error)]
pub enum ClientError {
    /// The host binary could not be spawned
    #[error("failed to start host {path}: {source}")]
    Spawn {
        /// Host binary
        path: PathBuf,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// No `PASS` before the startup timeout
    #[error("host did not print PASS within {0:?}")]
    StartupTimeout(Duration),

    /// Host wrote to stderr after startup
    #[error("host wrote to stderr: {0}")]
    HostStderr(String),

    /// Stream ended mid-session
    #[error("host closed the connection")]
    Closed,

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame codec failure
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Response that does not fit the request
    #[error("malformed response: {0}")]
    Protocol(String),

    /// Host and client protocol versions differ
    #[error("protocol version mismatch: host speaks {host}, client speaks {client}")]
    Version {
        /// Version the host announced
        host: u32,
        /// Version this client speaks
        client: u32,
    },

    /// Command error reported by the host; the session continues
    #[error("{kind}: {message}")]
    Command {
        /// Error category
        kind: ErrorKind,
        /// Host's message
        message: String,
    },
}

impl From<LineError> for ClientError {
    fn from(e: LineError) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

impl ClientError {
    /// Whether the channel can no longer be trusted. Only errors the host
    /// reported for a single command leave the session usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ClientError::Command { .. })
    }
}

/// A connection to one benchmark host
pub trait HostClient: Send {
    /// Handle the host was opened with
    fn label(&self) -> &str;

    /// Every benchmark the host registers, with its index
    fn list(&mut self) -> Result<Vec<BenchmarkEntry>, ClientError>;

    /// Run one benchmark
    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, ClientError>;

    /// Change a host setting
    fn set(&mut self, key: &str, value: &str) -> Result<(), ClientError>;

    /// End the session cleanly
    fn close(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Options applied to every host right after connecting
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Default worker count for runs
    pub parallelism: u32,
    /// Always report allocation columns
    pub benchmem: bool,
    /// How long a spawned host may take to print `PASS`
    pub startup_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            benchmem: false,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Open a host handle: `tcp://<addr>` connects to an RPC host, anything else
/// is spawned as a stdio host binary.
pub fn connect(handle: &str, options: &ConnectOptions) -> Result<Box<dyn HostClient>, ClientError> {
    let mut client: Box<dyn HostClient> = match handle.strip_prefix(TCP_SCHEME) {
        Some(addr) => Box::new(RpcHost::connect(addr)?),
        None => Box::new(StdioHost::spawn(handle, options.startup_timeout)?),
    };

    if options.parallelism != 1 {
        client.set("parallelism", &options.parallelism.to_string())?;
    }
    if options.benchmem {
        client.set("benchmem", "true")?;
    }
    Ok(client)
}
