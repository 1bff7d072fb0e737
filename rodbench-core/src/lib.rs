#![warn(missing_docs)]
//! rodbench Core - Execution Host
//!
//! Everything a benchmark host program needs:
//! - [`Registry`] of named benchmark bodies, built once before serving
//! - [`Bencher`], the iteration and timer handle given to each body
//! - [`Host`], which runs one benchmark for an exact iteration count with a
//!   quiesced heap, pausable timing, allocation counting and parallel fan-out
//! - Protocol servers: [`serve_lines`] / [`serve_stdio`] for the line binding
//!   and [`RpcServer`] for the framed TCP binding

mod allocator;
mod bencher;
mod host;
mod measure;
pub mod parallel;
mod registry;
mod rpc;
mod serve;

pub use allocator::{AllocationTotals, TrackingAllocator, allocation_totals};
pub use bencher::Bencher;
pub use host::{Host, HostError, HostSettings, dispatch, ready};
pub use measure::{Stopwatch, quiesce};
pub use registry::{
    BenchFn, BenchmarkDef, BenchmarkDescriptor, REGISTRY_ANCHOR, Registry, RegistryBuilder,
    RegistryError,
};
pub use rpc::{RpcServer, SessionEnd, serve_connection};
pub use serve::{serve_lines, serve_stdio};
