//! Control Protocol Messages
//!
//! The logical request/response vocabulary shared by every transport.
//! All messages derive rkyv traits so the RPC binding can frame them directly;
//! the line binding renders the same values as text (see [`crate::line`]).

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// How a run request addresses a benchmark.
///
/// Names are not unique in general; an index is always unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum BenchTarget {
    /// Host-local registration index
    Index(u32),
    /// Benchmark name (first registered match wins)
    Name(String),
}

impl std::fmt::Display for BenchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchTarget::Index(i) => write!(f, "#{}", i),
            BenchTarget::Name(name) => f.write_str(name),
        }
    }
}

/// Run one benchmark for exactly `iterations` iterations.
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct RunRequest {
    /// Benchmark to run
    pub target: BenchTarget,
    /// Iteration count, must be >= 1
    pub iterations: u64,
    /// Worker count; `None` uses the host default
    pub parallelism: Option<u32>,
}

impl RunRequest {
    /// Request a single-target run with the host's default parallelism
    pub fn new(target: BenchTarget, iterations: u64) -> Self {
        Self {
            target,
            iterations,
            parallelism: None,
        }
    }

    /// Set an explicit worker count
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }
}

/// A benchmark as advertised by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct BenchmarkEntry {
    /// Host-local registration index
    pub index: u32,
    /// Benchmark name
    pub name: String,
}

/// Measurements of one run, covering only the timed region.
///
/// When `failed` is set, no numeric field is meaningful and callers must
/// discard the sample.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct RunOutcome {
    /// Benchmark name
    pub name: String,
    /// Iterations executed (equals the request unless failed)
    pub iterations: u64,
    /// Worker count the run used
    pub parallelism: u32,
    /// Timed wall-clock duration in nanoseconds
    pub elapsed_ns: u64,
    /// Bytes processed per iteration, as declared by the benchmark
    pub bytes_processed: i64,
    /// Allocations made while the timer was running
    pub mem_allocs: u64,
    /// Bytes allocated while the timer was running
    pub mem_bytes: u64,
    /// The benchmark panicked or called `fail`
    pub failed: bool,
    /// Failure reason
    pub failure: Option<String>,
    /// The benchmark asked for allocation columns
    pub show_allocs: bool,
    /// Non-fatal advisory raised by the host (e.g. parallelism not restored)
    pub warning: Option<String>,
}

impl RunOutcome {
    /// Build a failed outcome with every numeric field zeroed
    pub fn failure(name: impl Into<String>, parallelism: u32, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iterations: 0,
            parallelism,
            elapsed_ns: 0,
            bytes_processed: 0,
            mem_allocs: 0,
            mem_bytes: 0,
            failed: true,
            failure: Some(reason.into()),
            show_allocs: false,
            warning: None,
        }
    }

    /// Mean nanoseconds per iteration, `NaN` for empty or failed runs
    pub fn ns_per_op(&self) -> f64 {
        if self.failed || self.iterations == 0 {
            return f64::NAN;
        }
        self.elapsed_ns as f64 / self.iterations as f64
    }

    /// Allocated bytes per iteration (integer division, like the text format)
    pub fn bytes_per_op(&self) -> u64 {
        if self.iterations == 0 {
            0
        } else {
            self.mem_bytes / self.iterations
        }
    }

    /// Allocations per iteration (integer division, like the text format)
    pub fn allocs_per_op(&self) -> u64 {
        if self.iterations == 0 {
            0
        } else {
            self.mem_allocs / self.iterations
        }
    }

    /// Throughput in MB/s, `None` if the benchmark declared no byte count
    pub fn mb_per_sec(&self) -> Option<f64> {
        if self.bytes_processed <= 0 || self.elapsed_ns == 0 {
            return None;
        }
        let total_bytes = self.bytes_processed as f64 * self.iterations as f64;
        Some(total_bytes / 1e6 / (self.elapsed_ns as f64 / 1e9))
    }

    /// Display name with the parallelism suffix used by the text format
    pub fn display_name(&self) -> String {
        benchmark_name(&self.name, self.parallelism)
    }
}

/// Full benchmark name including the `-<procs>` suffix when parallel.
pub fn benchmark_name(name: &str, parallelism: u32) -> String {
    if parallelism > 1 {
        format!("{}-{}", name, parallelism)
    } else {
        name.to_string()
    }
}

/// Category of a command-level failure. The session continues after any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum ErrorKind {
    /// Unknown benchmark index or name
    NotFound,
    /// Iteration count was zero or unparsable
    InvalidIterations,
    /// Worker count was zero or unparsable
    InvalidParallelism,
    /// Filter pattern failed to compile
    BadFilter,
    /// `set` with a key the host does not know
    UnknownSetting,
    /// `set` with a value that does not parse
    BadValue,
    /// Input that is not a command
    Malformed,
}

impl ErrorKind {
    /// Stable text code used by the line protocol
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::InvalidIterations => "invalid-iterations",
            ErrorKind::InvalidParallelism => "invalid-parallelism",
            ErrorKind::BadFilter => "bad-filter",
            ErrorKind::UnknownSetting => "unknown-setting",
            ErrorKind::BadValue => "bad-value",
            ErrorKind::Malformed => "malformed",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-found" => Ok(ErrorKind::NotFound),
            "invalid-iterations" => Ok(ErrorKind::InvalidIterations),
            "invalid-parallelism" => Ok(ErrorKind::InvalidParallelism),
            "bad-filter" => Ok(ErrorKind::BadFilter),
            "unknown-setting" => Ok(ErrorKind::UnknownSetting),
            "bad-value" => Ok(ErrorKind::BadValue),
            "malformed" => Ok(ErrorKind::Malformed),
            other => Err(format!("Unknown error kind: {}", other)),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Requests accepted by a host
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum HostRequest {
    /// List benchmarks whose name matches a regex
    List {
        /// Regex pattern (`.` matches everything)
        filter: String,
    },
    /// Run a benchmark
    Run(RunRequest),
    /// Change a host setting
    Set {
        /// Setting name
        key: String,
        /// New value, parsed by the host
        value: String,
    },
    /// Command summary
    Help,
    /// End the serving loop; no response is sent
    Quit,
}

/// Responses sent by a host
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum HostResponse {
    /// Sent once when the host is ready to serve
    Ready {
        /// Protocol version for compatibility
        protocol_version: u32,
        /// Number of registered benchmarks
        benchmarks: u32,
    },
    /// Result of `List`, in registration order
    Benchmarks(Vec<BenchmarkEntry>),
    /// Result of `Run`
    Outcome(RunOutcome),
    /// A setting was applied
    Ack {
        /// Setting name
        key: String,
        /// Value as applied
        value: String,
    },
    /// Command summary
    Help(String),
    /// A command was rejected; the session continues
    Error {
        /// Error category
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
}
