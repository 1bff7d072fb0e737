//! Execution Host
//!
//! Owns the registry and the host settings, and executes one benchmark at a
//! time for an exact iteration count. Every protocol binding drives a host
//! through [`dispatch`].

use crate::bencher::{Bencher, Measurement};
use crate::measure::quiesce;
use crate::registry::{BenchmarkDescriptor, Registry};
use regex::Regex;
use rodbench_ipc::line::HELP;
use rodbench_ipc::{
    BenchTarget, BenchmarkEntry, ErrorKind, HostRequest, HostResponse, PROTOCOL_VERSION,
    RunOutcome, RunRequest,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;
use tracing::{debug, warn};

/// Command-level failures. None of them end a session.
#[derive(Debug, Error)]
pub enum HostError {
    /// No benchmark with that name or index
    #[error("benchmark not found: {0}")]
    NotFound(String),

    /// Iteration count below 1
    #[error("invalid iteration count {0}: must be at least 1")]
    InvalidIterations(u64),

    /// Parallelism below 1
    #[error("invalid parallelism {0}: must be at least 1")]
    InvalidParallelism(u32),

    /// Filter is not a valid regex
    #[error("bad filter {pattern:?}: {source}")]
    BadFilter {
        /// The rejected pattern
        pattern: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// `set` key other than `benchmem` or `parallelism`
    #[error("unknown setting {0:?} (known: benchmem, parallelism)")]
    UnknownSetting(String),

    /// `set` value that does not parse for its key
    #[error("bad value {value:?} for {key}")]
    BadValue {
        /// Setting name
        key: String,
        /// Rejected value
        value: String,
    },
}

impl HostError {
    /// Wire category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::NotFound(_) => ErrorKind::NotFound,
            HostError::InvalidIterations(_) => ErrorKind::InvalidIterations,
            HostError::InvalidParallelism(_) => ErrorKind::InvalidParallelism,
            HostError::BadFilter { .. } => ErrorKind::BadFilter,
            HostError::UnknownSetting(_) => ErrorKind::UnknownSetting,
            HostError::BadValue { .. } => ErrorKind::BadValue,
        }
    }

    /// Protocol response for this error
    pub fn into_response(self) -> HostResponse {
        HostResponse::Error {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Settings changed with `set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    /// Always report `B/op` and `allocs/op`
    pub benchmem: bool,
    /// Worker count for runs that do not name one
    pub parallelism: u32,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            benchmem: false,
            parallelism: 1,
        }
    }
}

/// A registry plus the settings it runs under
#[derive(Debug)]
pub struct Host {
    registry: Registry,
    settings: HostSettings,
}

impl Host {
    /// Host with default settings
    pub fn new(registry: Registry) -> Self {
        Self::with_settings(registry, HostSettings::default())
    }

    /// Host with explicit settings
    pub fn with_settings(registry: Registry, settings: HostSettings) -> Self {
        Self { registry, settings }
    }

    /// The benchmark table
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current settings
    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Benchmarks whose name matches `filter`, in registration order.
    pub fn list(&self, filter: &str) -> Result<Vec<BenchmarkEntry>, HostError> {
        let re = Regex::new(filter).map_err(|source| HostError::BadFilter {
            pattern: filter.to_string(),
            source,
        })?;
        Ok(self
            .registry
            .entries()
            .into_iter()
            .filter(|entry| re.is_match(&entry.name))
            .collect())
    }

    /// Apply a setting; returns the value as applied.
    pub fn set(&mut self, key: &str, value: &str) -> Result<String, HostError> {
        let bad_value = || HostError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "benchmem" => {
                self.settings.benchmem = value.parse().map_err(|_| bad_value())?;
                Ok(self.settings.benchmem.to_string())
            }
            "parallelism" => {
                let parallelism: u32 = value.parse().map_err(|_| bad_value())?;
                if parallelism == 0 {
                    return Err(bad_value());
                }
                self.settings.parallelism = parallelism;
                Ok(parallelism.to_string())
            }
            other => Err(HostError::UnknownSetting(other.to_string())),
        }
    }

    fn resolve(&self, target: &BenchTarget) -> Result<(u32, &BenchmarkDescriptor), HostError> {
        match target {
            BenchTarget::Index(index) => self
                .registry
                .get(*index)
                .map(|bench| (*index, bench))
                .ok_or_else(|| HostError::NotFound(target.to_string())),
            BenchTarget::Name(name) => {
                let mut matches = self.registry.indices_of(name);
                let first = matches
                    .next()
                    .ok_or_else(|| HostError::NotFound(name.clone()))?;
                if matches.next().is_some() {
                    warn!(benchmark = %name, index = first, "ambiguous benchmark name, using first registration");
                }
                let bench = self
                    .registry
                    .get(first)
                    .ok_or_else(|| HostError::NotFound(name.clone()))?;
                Ok((first, bench))
            }
        }
    }

    /// Run one benchmark for exactly `request.iterations` iterations.
    ///
    /// Invalid requests are rejected before anything executes. A benchmark
    /// that panics or calls `fail` yields a failed outcome, not an error.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome, HostError> {
        if request.iterations == 0 {
            return Err(HostError::InvalidIterations(request.iterations));
        }
        let parallelism = request.parallelism.unwrap_or(self.settings.parallelism);
        if parallelism == 0 {
            return Err(HostError::InvalidParallelism(parallelism));
        }
        let (index, bench) = self.resolve(&request.target)?;

        debug!(
            benchmark = bench.name(),
            index,
            iterations = request.iterations,
            parallelism,
            "run"
        );
        Ok(execute(bench, request.iterations, parallelism))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

fn execute(bench: &BenchmarkDescriptor, iterations: u64, parallelism: u32) -> RunOutcome {
    quiesce();

    let mut bencher = Bencher::new(iterations, parallelism);
    if parallelism > 1 {
        if let Err(e) = bencher.ensure_pool() {
            return RunOutcome::failure(
                bench.name(),
                parallelism,
                format!("cannot start {} workers: {}", parallelism, e),
            );
        }
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        bencher.start_timer();
        bench.run(&mut bencher);
        bencher.stop_timer();
    }));

    let panicked = result.err().map(|payload| panic_message(payload.as_ref()));
    let Measurement {
        elapsed,
        allocations,
        bytes,
        show_allocs,
        parallelism: left_at,
        failure,
    } = bencher.finish();

    let warning = (left_at != parallelism)
        .then(|| format!("{} left parallelism set to {}", bench.name(), left_at));

    let mut outcome = match panicked.or(failure) {
        Some(reason) => {
            warn!(benchmark = bench.name(), %reason, "benchmark failed");
            RunOutcome::failure(bench.name(), parallelism, reason)
        }
        None => RunOutcome {
            name: bench.name().to_string(),
            iterations,
            parallelism,
            elapsed_ns: elapsed.as_nanos() as u64,
            bytes_processed: bytes,
            mem_allocs: allocations.count,
            mem_bytes: allocations.bytes,
            failed: false,
            failure: None,
            show_allocs,
            warning: None,
        },
    };
    outcome.warning = warning;
    outcome
}

/// Execute one protocol request. `Quit` yields no response.
pub fn dispatch(host: &mut Host, request: HostRequest) -> Option<HostResponse> {
    let response = match request {
        HostRequest::List { filter } => match host.list(&filter) {
            Ok(entries) => HostResponse::Benchmarks(entries),
            Err(e) => e.into_response(),
        },
        HostRequest::Run(run) => match host.run(&run) {
            Ok(outcome) => HostResponse::Outcome(outcome),
            Err(e) => e.into_response(),
        },
        HostRequest::Set { key, value } => match host.set(&key, &value) {
            Ok(value) => HostResponse::Ack { key, value },
            Err(e) => e.into_response(),
        },
        HostRequest::Help => HostResponse::Help(HELP.to_string()),
        HostRequest::Quit => return None,
    };
    Some(response)
}

/// Greeting sent when a session opens
pub fn ready(host: &Host) -> HostResponse {
    HostResponse::Ready {
        protocol_version: PROTOCOL_VERSION,
        benchmarks: host.registry().len() as u32,
    }
}
