//! Stdio line server
//!
//! Serves a [`Host`] over any line-oriented byte stream: prints the ready
//! sentinel, then answers one command per line until `quit`, `exit` or end
//! of input.

use crate::host::{Host, dispatch};
use rodbench_ipc::HostResponse;
use rodbench_ipc::line::{READY_SENTINEL, parse_command, render_response};
use std::io::{self, BufRead, Write};
use std::panic;

/// Serve `host` on `input`/`output`.
///
/// Only I/O errors end the loop early; malformed commands are answered and
/// the session continues.
pub fn serve_lines<R, W>(host: &mut Host, input: R, mut output: W) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{}", READY_SENTINEL)?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        let response = match parse_command(&line) {
            Ok(request) => match dispatch(host, request) {
                Some(response) => response,
                None => break,
            },
            Err(e) => HostResponse::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        };
        output.write_all(render_response(&response, host.settings().benchmem).as_bytes())?;
        output.flush()?;
    }
    Ok(())
}

/// Serve `host` on the process's stdin/stdout.
///
/// The panic hook is silenced for the duration: panic reasons travel in
/// FAIL lines, and any stderr output is fatal to the client.
pub fn serve_stdio(host: &mut Host) -> io::Result<()> {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = serve_lines(host, stdin.lock(), stdout.lock());

    panic::set_hook(previous);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bencher, Registry};
    use std::io::Cursor;

    fn session(script: &str) -> String {
        let registry = Registry::builder()
            .bench("BenchmarkNoop", |b: &mut Bencher| b.iter(|| ()))
            .bench("BenchmarkAlloc", |b: &mut Bencher| {
                b.report_allocs();
                b.iter(|| ());
            })
            .build()
            .unwrap();
        let mut host = Host::new(registry);
        let mut out = Vec::new();
        serve_lines(&mut host, Cursor::new(script.to_string()), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_ready_then_list() {
        let out = session("list\nlist Alloc\nlist ^Zzz\n");
        assert_eq!(out, "PASS\nBenchmarkNoop\nBenchmarkAlloc\n\nBenchmarkAlloc\n\n\n");
    }

    #[test]
    fn test_run_by_index_and_name() {
        let out = session("run #0 100\nrun BenchmarkAlloc-2 10\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("BenchmarkNoop\t     100\t"));
        assert!(lines[1].ends_with(" ns/op"));
        assert!(lines[2].starts_with("BenchmarkAlloc-2\t      10\t"));
        assert!(lines[2].ends_with(" allocs/op"));
    }

    #[test]
    fn test_errors_keep_session_alive() {
        let out = session("run Missing 1\nbogus\nrun #0 0\nset color on\nlist (\nrun #0 1\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "error: not-found: benchmark not found: Missing");
        assert!(lines[2].starts_with("error: malformed: unknown command \"bogus\""));
        assert!(lines[3].starts_with("error: invalid-iterations:"));
        assert!(lines[4].starts_with("error: unknown-setting:"));
        assert!(lines[5].starts_with("error: bad-filter:"));
        assert!(lines[6].starts_with("BenchmarkNoop\t"));
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_dashed_names_keep_their_body() {
        let registry = Registry::builder()
            .bench("BenchmarkSHA", |b: &mut Bencher| b.iter(|| ()))
            .bench("BenchmarkSHA-256x", |b: &mut Bencher| b.iter(|| ()))
            .build()
            .unwrap();
        let mut host = Host::new(registry);
        let mut out = Vec::new();
        let script = "run BenchmarkSHA-256x 4\nrun BenchmarkSHA-256x-2 4\nrun BenchmarkSHA-2 4\n";
        serve_lines(&mut host, Cursor::new(script.to_string()), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("BenchmarkSHA-256x\t       4\t"), "{}", lines[1]);
        assert!(lines[2].starts_with("BenchmarkSHA-256x-2\t       4\t"), "{}", lines[2]);
        assert!(lines[3].starts_with("BenchmarkSHA-2\t       4\t"), "{}", lines[3]);
    }

    #[test]
    fn test_quit_stops_reading() {
        let out = session("help\nquit\nrun #0 1\n");
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().nth(1).unwrap().starts_with("commands:"));
    }

    #[test]
    fn test_benchmem_setting_adds_columns() {
        let out = session("set benchmem true\nrun #0 5\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "ok benchmem=true");
        assert!(lines[2].contains("B/op"));
    }
}
