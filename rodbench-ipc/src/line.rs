//! Line Protocol
//!
//! Text rendering of the control protocol for the stdio binding.
//! Every response is self-delimiting: one line, except `list`, which is
//! terminated by an empty line.
//!
//! ```text
//! > list
//! < BenchmarkParse
//! < BenchmarkEncode
//! <
//! > run #1-4 5000
//! < BenchmarkEncode-4	    5000	       812.0 ns/op	      64 B/op	       2 allocs/op
//! > run BenchmarkMissing 10
//! < error: not-found: benchmark not found: BenchmarkMissing
//! ```
//!
//! Run results use the standard benchmark-result line: name, iteration count,
//! then `value unit` pairs in fixed order (`ns/op`, `MB/s`, `B/op`, `allocs/op`).

use crate::messages::{
    BenchTarget, BenchmarkEntry, ErrorKind, HostRequest, HostResponse, RunOutcome, RunRequest,
    benchmark_name,
};
use thiserror::Error;

/// Sentinel printed by a host once it is ready to accept commands
pub const READY_SENTINEL: &str = "PASS";

/// Prefix of a failed-run line
pub const FAIL_PREFIX: &str = "--- FAIL: ";

/// Prefix of a command error line
pub const ERROR_PREFIX: &str = "error: ";

/// Prefix of an advisory line; clients log and skip these
pub const ADVISORY_PREFIX: &str = "# ";

/// Command summary
pub const HELP: &str =
    "commands: help, list [filter], run <id>[-procs] <iterations>, set <key> <value>, quit, exit";

/// Errors produced while parsing protocol text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    /// First word is not a command
    #[error("unknown command {0:?}; {HELP}")]
    UnknownCommand(String),

    /// Command with missing arguments
    #[error("usage: {0}")]
    Usage(&'static str),

    /// `#<index>` that is not a number
    #[error("bad benchmark index {0:?}")]
    BadIndex(String),

    /// Iteration count that is not a positive integer
    #[error("iterations must be a positive integer, got {0:?}")]
    InvalidIterations(String),

    /// `-<procs>` suffix that is not a positive integer
    #[error("parallelism must be a positive integer, got {0:?}")]
    InvalidParallelism(String),

    /// Result line with missing or unparsable columns
    #[error("malformed result line: {0:?}")]
    MalformedResult(String),

    /// Line that is no known response
    #[error("unexpected response line: {0:?}")]
    UnexpectedLine(String),
}

impl LineError {
    /// Wire error category for this parse failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            LineError::BadIndex(_) => ErrorKind::NotFound,
            LineError::InvalidIterations(_) => ErrorKind::InvalidIterations,
            LineError::InvalidParallelism(_) => ErrorKind::InvalidParallelism,
            _ => ErrorKind::Malformed,
        }
    }
}

/// Parse one command line.
///
/// An empty line is a request for help.
pub fn parse_command(line: &str) -> Result<HostRequest, LineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = fields.split_first() else {
        return Ok(HostRequest::Help);
    };

    match command {
        "help" => Ok(HostRequest::Help),
        "quit" | "exit" => Ok(HostRequest::Quit),
        "list" => Ok(HostRequest::List {
            filter: args.first().copied().unwrap_or(".").to_string(),
        }),
        "run" => {
            let [id, iterations, ..] = args else {
                return Err(LineError::Usage("run <id>[-procs] <iterations>"));
            };
            let (target, parallelism) = parse_target(id)?;
            let iterations = iterations
                .parse::<u64>()
                .map_err(|_| LineError::InvalidIterations(iterations.to_string()))?;
            Ok(HostRequest::Run(RunRequest {
                target,
                iterations,
                parallelism,
            }))
        }
        "set" => {
            let [key, value, ..] = args else {
                return Err(LineError::Usage("set <key> <value>"));
            };
            Ok(HostRequest::Set {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        other => Err(LineError::UnknownCommand(other.to_string())),
    }
}

/// Split a trailing `-<digits>` parallelism suffix off a benchmark id.
fn split_parallelism(id: &str) -> (&str, Option<&str>) {
    match id.rsplit_once('-') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (head, Some(tail))
        }
        _ => (id, None),
    }
}

/// Parse `<name>`, `#<index>`, optionally followed by `-<procs>`.
fn parse_target(id: &str) -> Result<(BenchTarget, Option<u32>), LineError> {
    let (head, suffix) = split_parallelism(id);

    let parallelism = match suffix {
        Some(digits) => match digits.parse::<u32>() {
            Ok(p) if p > 0 => Some(p),
            _ => return Err(LineError::InvalidParallelism(digits.to_string())),
        },
        None => None,
    };

    let target = match head.strip_prefix('#') {
        Some(index) => BenchTarget::Index(
            index
                .parse()
                .map_err(|_| LineError::BadIndex(index.to_string()))?,
        ),
        None => BenchTarget::Name(head.to_string()),
    };

    Ok((target, parallelism))
}

/// Render a request as a command line (no trailing newline).
///
/// Registries reject names ending in `-<digits>`, so the parallelism suffix
/// always parses back unambiguously.
pub fn render_command(request: &HostRequest) -> String {
    match request {
        HostRequest::List { filter } => format!("list {}", filter),
        HostRequest::Run(run) => {
            let id = match run.parallelism {
                Some(p) => format!("{}-{}", run.target, p),
                None => run.target.to_string(),
            };
            format!("run {} {}", id, run.iterations)
        }
        HostRequest::Set { key, value } => format!("set {} {}", key, value),
        HostRequest::Help => "help".to_string(),
        HostRequest::Quit => "quit".to_string(),
    }
}

/// Collapse whitespace so free text cannot break line framing.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render a response, including its terminating newline(s).
///
/// `benchmem` forces the allocation columns on run results.
pub fn render_response(response: &HostResponse, benchmem: bool) -> String {
    match response {
        HostResponse::Ready { .. } => format!("{}\n", READY_SENTINEL),
        HostResponse::Benchmarks(entries) => {
            let mut out = String::new();
            for entry in entries {
                out.push_str(&entry.name);
                out.push('\n');
            }
            out.push('\n');
            out
        }
        HostResponse::Outcome(outcome) => {
            let mut out = String::new();
            if let Some(warning) = &outcome.warning {
                out.push_str(ADVISORY_PREFIX);
                out.push_str("warning: ");
                out.push_str(&one_line(warning));
                out.push('\n');
            }
            if outcome.failed {
                out.push_str(&fail_line(
                    &outcome.name,
                    outcome.parallelism,
                    outcome.failure.as_deref().unwrap_or("failed"),
                ));
            } else {
                out.push_str(&format_result_line(outcome, benchmem));
            }
            out.push('\n');
            out
        }
        HostResponse::Ack { key, value } => format!("ok {}={}\n", key, value),
        HostResponse::Help(text) => format!("{}\n", one_line(text)),
        HostResponse::Error { kind, message } => {
            format!("{}{}: {}\n", ERROR_PREFIX, kind, one_line(message))
        }
    }
}

/// Format a float with the precision ladder of standard benchmark output.
fn format_ns(value: f64) -> String {
    let y = value.abs();
    if y == 0.0 || y >= 999.95 {
        format!("{:10.0}", value)
    } else if y >= 99.995 {
        format!("{:12.1}", value)
    } else if y >= 9.9995 {
        format!("{:13.2}", value)
    } else if y >= 0.99995 {
        format!("{:14.3}", value)
    } else if y >= 0.099995 {
        format!("{:15.4}", value)
    } else if y >= 0.0099995 {
        format!("{:16.5}", value)
    } else if y >= 0.00099995 {
        format!("{:17.6}", value)
    } else {
        format!("{:18.7}", value)
    }
}

/// Format a successful outcome as a standard benchmark-result line (no newline).
pub fn format_result_line(outcome: &RunOutcome, benchmem: bool) -> String {
    let mut line = format!(
        "{}\t{:8}\t{} ns/op",
        outcome.display_name(),
        outcome.iterations,
        format_ns(outcome.ns_per_op())
    );
    if let Some(mbps) = outcome.mb_per_sec() {
        line.push_str(&format!("\t{:7.2} MB/s", mbps));
    }
    if benchmem || outcome.show_allocs {
        line.push_str(&format!(
            "\t{:8} B/op\t{:8} allocs/op",
            outcome.bytes_per_op(),
            outcome.allocs_per_op()
        ));
    }
    line
}

/// A parsed standard benchmark-result line
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    /// Benchmark name without the parallelism suffix
    pub name: String,
    /// Parallelism from the name suffix (1 when absent)
    pub parallelism: u32,
    /// Iteration count
    pub iterations: u64,
    /// Nanoseconds per iteration
    pub ns_per_op: f64,
    /// Throughput, when reported
    pub mb_per_sec: Option<f64>,
    /// Allocated bytes per iteration, when reported
    pub bytes_per_op: Option<u64>,
    /// Allocations per iteration, when reported
    pub allocs_per_op: Option<u64>,
}

impl ResultLine {
    /// Reconstruct run totals from the per-op figures.
    pub fn into_outcome(self) -> RunOutcome {
        let n = self.iterations as f64;
        let elapsed_ns = (self.ns_per_op * n).round() as u64;
        let bytes_processed = match self.mb_per_sec {
            Some(mbps) if self.iterations > 0 => {
                (mbps * 1e6 * (elapsed_ns as f64 / 1e9) / n).round() as i64
            }
            _ => 0,
        };
        RunOutcome {
            name: self.name,
            iterations: self.iterations,
            parallelism: self.parallelism,
            elapsed_ns,
            bytes_processed,
            mem_allocs: self.allocs_per_op.unwrap_or(0) * self.iterations,
            mem_bytes: self.bytes_per_op.unwrap_or(0) * self.iterations,
            failed: false,
            failure: None,
            show_allocs: self.bytes_per_op.is_some(),
            warning: None,
        }
    }
}

/// Parse a standard benchmark-result line. Unknown units are ignored.
pub fn parse_result_line(line: &str) -> Result<ResultLine, LineError> {
    let malformed = || LineError::MalformedResult(line.to_string());
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 || fields.len() % 2 != 0 {
        return Err(malformed());
    }

    let (name, suffix) = split_parallelism(fields[0]);
    let parallelism = suffix.and_then(|s| s.parse().ok()).unwrap_or(1);
    let iterations: u64 = fields[1].parse().map_err(|_| malformed())?;

    let mut parsed = ResultLine {
        name: name.to_string(),
        parallelism,
        iterations,
        ns_per_op: f64::NAN,
        mb_per_sec: None,
        bytes_per_op: None,
        allocs_per_op: None,
    };

    for pair in fields[2..].chunks(2) {
        let (value, unit) = (pair[0], pair[1]);
        match unit {
            "ns/op" => parsed.ns_per_op = value.parse().map_err(|_| malformed())?,
            "MB/s" => parsed.mb_per_sec = Some(value.parse().map_err(|_| malformed())?),
            "B/op" => parsed.bytes_per_op = Some(value.parse().map_err(|_| malformed())?),
            "allocs/op" => parsed.allocs_per_op = Some(value.parse().map_err(|_| malformed())?),
            _ => {}
        }
    }

    if parsed.ns_per_op.is_nan() {
        return Err(malformed());
    }
    Ok(parsed)
}

/// One line received in reply to `run`
#[derive(Debug, Clone, PartialEq)]
pub enum RunReply {
    /// Advisory text; more lines follow
    Advisory(String),
    /// The run finished (possibly failed)
    Outcome(RunOutcome),
    /// The command was rejected
    Error {
        /// Error category
        kind: ErrorKind,
        /// Detail
        message: String,
    },
}

/// Classify a `run` response line.
pub fn parse_run_reply(line: &str) -> Result<RunReply, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(advisory) = line.strip_prefix(ADVISORY_PREFIX) {
        return Ok(RunReply::Advisory(advisory.to_string()));
    }
    if let Some(error) = parse_error_line(line) {
        return Ok(error);
    }
    if let Some(rest) = line.strip_prefix(FAIL_PREFIX) {
        let (display_name, reason) = rest.split_once(": ").unwrap_or((rest, "failed"));
        let (name, suffix) = split_parallelism(display_name);
        let parallelism = suffix.and_then(|s| s.parse().ok()).unwrap_or(1);
        return Ok(RunReply::Outcome(RunOutcome::failure(name, parallelism, reason)));
    }
    parse_result_line(line).map(|parsed| RunReply::Outcome(parsed.into_outcome()))
}

/// Parse an `error: <kind>: <message>` line.
pub fn parse_error_line(line: &str) -> Option<RunReply> {
    let rest = line.strip_prefix(ERROR_PREFIX)?;
    let (code, message) = rest.split_once(": ").unwrap_or((rest, ""));
    let kind = code.parse().unwrap_or(ErrorKind::Malformed);
    Some(RunReply::Error {
        kind,
        message: message.to_string(),
    })
}

/// Turn the lines of a `list` response (without the terminating blank line)
/// into entries. Positions are host indices when the listing was unfiltered.
pub fn entries_from_names<I, S>(names: I) -> Vec<BenchmarkEntry>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| BenchmarkEntry {
            index: index as u32,
            name: name.into(),
        })
        .collect()
}

/// `--- FAIL: <name>[-procs]: <reason>` without the newline.
pub fn fail_line(name: &str, parallelism: u32, reason: &str) -> String {
    format!(
        "{}{}: {}",
        FAIL_PREFIX,
        benchmark_name(name, parallelism),
        one_line(reason)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> RunOutcome {
        RunOutcome {
            name: "BenchmarkEncode".to_string(),
            iterations: 5000,
            parallelism: 1,
            elapsed_ns: 4_060_000,
            bytes_processed: 0,
            mem_allocs: 10_000,
            mem_bytes: 320_000,
            failed: false,
            failure: None,
            show_allocs: false,
            warning: None,
        }
    }

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command(""), Ok(HostRequest::Help));
        assert_eq!(parse_command("help"), Ok(HostRequest::Help));
        assert_eq!(parse_command("quit"), Ok(HostRequest::Quit));
        assert_eq!(parse_command("exit"), Ok(HostRequest::Quit));
        assert_eq!(
            parse_command("list"),
            Ok(HostRequest::List {
                filter: ".".to_string()
            })
        );
        assert_eq!(
            parse_command("list ^Encode"),
            Ok(HostRequest::List {
                filter: "^Encode".to_string()
            })
        );
        assert_eq!(
            parse_command("set benchmem true"),
            Ok(HostRequest::Set {
                key: "benchmem".to_string(),
                value: "true".to_string()
            })
        );
    }

    #[test]
    fn test_parse_run_targets() {
        assert_eq!(
            parse_command("run BenchmarkEncode 100"),
            Ok(HostRequest::Run(RunRequest::new(
                BenchTarget::Name("BenchmarkEncode".to_string()),
                100
            )))
        );
        assert_eq!(
            parse_command("run #2-4 100"),
            Ok(HostRequest::Run(
                RunRequest::new(BenchTarget::Index(2), 100).with_parallelism(4)
            ))
        );
        assert_eq!(
            parse_command("run Encode-json-8 7"),
            Ok(HostRequest::Run(
                RunRequest::new(BenchTarget::Name("Encode-json".to_string()), 7)
                    .with_parallelism(8)
            ))
        );
    }

    #[test]
    fn test_parse_run_errors() {
        assert_eq!(
            parse_command("run BenchmarkEncode"),
            Err(LineError::Usage("run <id>[-procs] <iterations>"))
        );
        assert!(matches!(
            parse_command("run BenchmarkEncode -5"),
            Err(LineError::InvalidIterations(_))
        ));
        assert!(matches!(
            parse_command("run BenchmarkEncode-0 5"),
            Err(LineError::InvalidParallelism(_))
        ));
        assert!(matches!(
            parse_command("run #x 5"),
            Err(LineError::BadIndex(_))
        ));
        let err = parse_command("frobnicate").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.to_string().contains("commands:"));
    }

    #[test]
    fn test_render_command_parses_back() {
        let requests = [
            HostRequest::List {
                filter: "Enc".to_string(),
            },
            HostRequest::Run(RunRequest::new(BenchTarget::Index(3), 42).with_parallelism(2)),
            HostRequest::Set {
                key: "parallelism".to_string(),
                value: "4".to_string(),
            },
            HostRequest::Quit,
        ];
        for request in requests {
            assert_eq!(parse_command(&render_command(&request)), Ok(request));
        }
    }

    #[test]
    fn test_result_line_format() {
        let line = format_result_line(&outcome(), false);
        assert_eq!(line, "BenchmarkEncode\t    5000\t       812.0 ns/op");

        let line = format_result_line(&outcome(), true);
        assert!(line.ends_with("      64 B/op\t       2 allocs/op"));
    }

    #[test]
    fn test_result_line_parses_to_totals() {
        let mut o = outcome();
        o.parallelism = 4;
        o.bytes_processed = 1024;
        let line = format_result_line(&o, true);
        let parsed = parse_result_line(&line).unwrap();

        assert_eq!(parsed.name, "BenchmarkEncode");
        assert_eq!(parsed.parallelism, 4);
        assert_eq!(parsed.iterations, 5000);
        assert!((parsed.ns_per_op - 812.0).abs() < 1e-9);
        assert_eq!(parsed.bytes_per_op, Some(64));
        assert_eq!(parsed.allocs_per_op, Some(2));
        assert!(parsed.mb_per_sec.is_some());

        let back = parsed.into_outcome();
        assert_eq!(back.elapsed_ns, 4_060_000);
        assert_eq!(back.mem_bytes, 320_000);
        assert_eq!(back.mem_allocs, 10_000);
        assert!((back.bytes_processed - 1024).abs() <= 1);
        assert!(back.show_allocs);
    }

    #[test]
    fn test_small_ns_keeps_precision() {
        let mut o = outcome();
        o.iterations = 3;
        o.elapsed_ns = 10;
        let parsed = parse_result_line(&format_result_line(&o, false)).unwrap();
        assert!((parsed.ns_per_op - 10.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_parse_result_line_rejects_garbage() {
        assert!(parse_result_line("PASS").is_err());
        assert!(parse_result_line("BenchmarkX\tmany\t5 ns/op").is_err());
        assert!(parse_result_line("BenchmarkX\t10\t64 B/op").is_err());
    }

    #[test]
    fn test_render_list_is_terminated() {
        let response = HostResponse::Benchmarks(entries_from_names(["A", "B"]));
        assert_eq!(render_response(&response, false), "A\nB\n\n");
        let empty = HostResponse::Benchmarks(Vec::new());
        assert_eq!(render_response(&empty, false), "\n");
    }

    #[test]
    fn test_render_failure_and_warning() {
        let mut failed = RunOutcome::failure("BenchmarkX", 2, "index out of bounds:\nlen 3");
        failed.warning = Some("BenchmarkX left parallelism set to 3".to_string());
        let text = render_response(&HostResponse::Outcome(failed), false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "# warning: BenchmarkX left parallelism set to 3");
        assert_eq!(lines[1], "--- FAIL: BenchmarkX-2: index out of bounds: len 3");

        assert!(matches!(parse_run_reply(lines[0]), Ok(RunReply::Advisory(_))));
        match parse_run_reply(lines[1]).unwrap() {
            RunReply::Outcome(o) => {
                assert!(o.failed);
                assert_eq!(o.name, "BenchmarkX");
                assert_eq!(o.parallelism, 2);
                assert_eq!(o.failure.as_deref(), Some("index out of bounds: len 3"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_error_line_roundtrip() {
        let response = HostResponse::Error {
            kind: ErrorKind::NotFound,
            message: "benchmark not found: Nope".to_string(),
        };
        let text = render_response(&response, false);
        assert_eq!(text, "error: not-found: benchmark not found: Nope\n");
        assert_eq!(
            parse_run_reply(&text),
            Ok(RunReply::Error {
                kind: ErrorKind::NotFound,
                message: "benchmark not found: Nope".to_string()
            })
        );
    }

    #[test]
    fn test_fail_line_helper() {
        assert_eq!(fail_line("B", 1, "boom\n"), "--- FAIL: B: boom");
    }
}
