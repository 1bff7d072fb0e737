#![warn(missing_docs)]
//! # rodbench
//!
//! Statistical micro-benchmark harness. A host program registers benchmark
//! bodies and serves them over a small control protocol; the `rodbench`
//! orchestrator drives one or more hosts, samples each benchmark at chosen
//! iteration counts, and separates per-iteration cost from fixed per-run
//! overhead.
//!
//! - **Exact iteration counts**: every `run` executes exactly `N` iterations
//! - **Pausable timing**: setup inside a body can be excluded from the clock
//! - **Allocation counting**: `TrackingAllocator` reports B/op and allocs/op
//! - **Parallel fan-out**: one run spread across `P` workers, then joined
//! - **Two bindings**: line protocol over stdio, length-prefixed frames over TCP
//!
//! ## Quick Start
//!
//! ```ignore
//! use rodbench::{Bencher, TrackingAllocator, benchmark};
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator;
//!
//! fn encode(b: &mut Bencher) {
//!     let data = vec![0u8; 4096];
//!     b.set_bytes(data.len() as i64);
//!     b.iter(|| checksum(&data));
//! }
//!
//! benchmark!("BenchmarkEncode", encode);
//!
//! fn main() {
//!     rodbench::host_main();
//! }
//! ```
//!
//! Then `rodbench ./target/release/my-host` samples it.

pub use rodbench_core::{
    AllocationTotals, Bencher, BenchmarkDef, BenchmarkDescriptor, Host, HostError, HostSettings,
    Registry, RegistryBuilder, RegistryError, RpcServer, SessionEnd, TrackingAllocator,
    allocation_totals, dispatch, ready, serve_connection, serve_lines, serve_stdio,
};
pub use rodbench_ipc::{
    BenchTarget, BenchmarkEntry, ErrorKind, HostRequest, HostResponse, PROTOCOL_VERSION,
    RunOutcome, RunRequest,
};

use anyhow::Context;

/// Flag selecting the stdio line binding
pub const SERVE_FLAG: &str = "--rod-serve";

/// Flag selecting the TCP binding; takes the listen address
pub const LISTEN_FLAG: &str = "--rod-listen";

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use inventory;
}

/// Register a benchmark body under a name.
///
/// The body is a `fn(&mut Bencher)` or a non-capturing closure. Registrations
/// are collected at startup by [`Registry::discover`], ordered by source
/// location.
///
/// ```ignore
/// rodbench::benchmark!("BenchmarkNoop", |b| b.iter(|| ()));
/// ```
#[macro_export]
macro_rules! benchmark {
    ($name:expr, $body:expr $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::BenchmarkDef {
                name: $name,
                runner_fn: $body,
                file: file!(),
                line: line!(),
            }
        }
    };
}

/// How a host program was asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMode {
    /// Serve the line protocol on stdin/stdout
    Stdio,
    /// Serve framed requests on a TCP address
    Listen(String),
    /// Print the registered names and exit
    List,
}

impl HostMode {
    /// Parse the process arguments (without the program name).
    pub fn from_args<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let mode = match args.next().as_deref() {
            None => HostMode::List,
            Some(SERVE_FLAG) => HostMode::Stdio,
            Some(LISTEN_FLAG) => {
                let addr = args
                    .next()
                    .with_context(|| format!("{} needs an address", LISTEN_FLAG))?;
                HostMode::Listen(addr)
            }
            Some(other) => anyhow::bail!(
                "unknown argument {:?} (expected {} or {} <addr>)",
                other,
                SERVE_FLAG,
                LISTEN_FLAG
            ),
        };
        if let Some(extra) = args.next() {
            anyhow::bail!("unexpected argument {:?}", extra);
        }
        Ok(mode)
    }
}

/// Serve `host` in the given mode.
pub fn serve(mut host: Host, mode: HostMode) -> anyhow::Result<()> {
    match mode {
        HostMode::Stdio => serve_stdio(&mut host).context("stdio session failed"),
        HostMode::Listen(addr) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("rodbench=info"))
                .with_writer(std::io::stderr)
                .try_init();
            let server =
                RpcServer::bind(&addr).with_context(|| format!("failed to bind {}", addr))?;
            server.serve(&mut host).context("RPC server failed")
        }
        HostMode::List => {
            for (_, bench) in host.registry().iter() {
                println!("{}", bench.name());
            }
            Ok(())
        }
    }
}

/// Entry point for host programs: discover every [`benchmark!`]
/// registration and serve according to the command line.
pub fn host_main() {
    let result = HostMode::from_args(std::env::args().skip(1)).and_then(|mode| {
        let registry = Registry::discover().context("invalid benchmark registration")?;
        serve(Host::new(registry), mode)
    });
    if let Err(e) = result {
        eprintln!("rodbench host: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_mode_from_args() {
        assert_eq!(HostMode::from_args(Vec::<String>::new()).unwrap(), HostMode::List);
        assert_eq!(HostMode::from_args(["--rod-serve"]).unwrap(), HostMode::Stdio);
        assert_eq!(
            HostMode::from_args(["--rod-listen", "127.0.0.1:7878"]).unwrap(),
            HostMode::Listen("127.0.0.1:7878".to_string())
        );
        assert!(HostMode::from_args(["--rod-listen"]).is_err());
        assert!(HostMode::from_args(["--bench"]).is_err());
        assert!(HostMode::from_args(["--rod-serve", "extra"]).is_err());
    }
}
