//! Stdio host client
//!
//! Spawns a host binary with `--rod-serve` and speaks the line protocol over
//! its stdin/stdout. Output before the `PASS` sentinel is skipped. Once the
//! host is ready, any stderr output is fatal: a watcher thread records it and
//! kills the child, which unblocks the pending read.

use super::{ClientError, HostClient};
use rodbench_ipc::line::{
    READY_SENTINEL, RunReply, entries_from_names, parse_error_line, parse_run_reply,
    render_command,
};
use rodbench_ipc::{BenchmarkEntry, HostRequest, RunOutcome, RunRequest};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Flag passed to host binaries to select the line binding
pub const SERVE_FLAG: &str = "--rod-serve";

/// Wait until `fd` is readable. `false` on timeout.
fn wait_readable(fd: i32, timeout: Duration) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    // SAFETY: pollfd is a valid, initialised struct for the duration of the call.
    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // HUP counts as readable: the next read reports end of stream.
    Ok(result > 0)
}

/// Send SIGKILL to a process; errors mean it is already gone.
fn kill_process(pid: u32) {
    // SAFETY: kill has no memory-safety preconditions.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// A spawned host speaking the line protocol
pub struct StdioHost {
    label: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    fatal: Arc<Mutex<Option<String>>>,
    ready: Arc<AtomicBool>,
    closed: bool,
}

impl StdioHost {
    /// Spawn `path --rod-serve` and wait for `PASS`.
    pub fn spawn(path: impl AsRef<Path>, startup_timeout: Duration) -> Result<Self, ClientError> {
        let path = path.as_ref();
        debug!(host = %path.display(), "spawning host");
        let child = Command::new(path)
            .arg(SERVE_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;
        Self::attach(child, path.display().to_string(), startup_timeout)
    }

    /// Take over a child spawned with piped stdio and wait for `PASS`.
    fn attach(
        mut child: Child,
        label: String,
        startup_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_process(child.id());
            let _ = child.wait();
            return Err(ClientError::Protocol("host pipes unavailable".to_string()));
        };

        let fatal = Arc::new(Mutex::new(None));
        let ready = Arc::new(AtomicBool::new(false));
        {
            let fatal = Arc::clone(&fatal);
            let ready = Arc::clone(&ready);
            let label = label.clone();
            let pid = child.id();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    if !ready.load(Ordering::SeqCst) {
                        warn!(host = %label, "host stderr before ready: {}", line);
                        continue;
                    }
                    if let Ok(mut slot) = fatal.lock() {
                        slot.get_or_insert(line);
                    }
                    kill_process(pid);
                    break;
                }
            });
        }

        let mut host = Self {
            label,
            child,
            stdin,
            stdout: BufReader::new(stdout),
            fatal,
            ready,
            closed: false,
        };
        if let Err(e) = host.wait_ready(startup_timeout) {
            host.kill();
            return Err(e);
        }
        Ok(host)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<(), ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stdout.buffer().is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero()
                    || !wait_readable(self.stdout.get_ref().as_raw_fd(), remaining)?
                {
                    return Err(ClientError::StartupTimeout(timeout));
                }
            }
            let line = self.read_line()?;
            if line == READY_SENTINEL {
                self.ready.store(true, Ordering::SeqCst);
                debug!(host = %self.label, "host ready");
                return Ok(());
            }
            debug!(host = %self.label, "skipping startup output: {}", line);
        }
    }

    fn fatal_message(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|slot| slot.clone())
    }

    fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line)?;
        if let Some(message) = self.fatal_message() {
            return Err(ClientError::HostStderr(message));
        }
        if n == 0 {
            return Err(ClientError::Closed);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(target: "rodbench::wire", host = %self.label, "< {}", line);
        Ok(line)
    }

    fn send(&mut self, command: &str) -> Result<(), ClientError> {
        trace!(target: "rodbench::wire", host = %self.label, "> {}", command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn kill(&mut self) {
        kill_process(self.child.id());
        let _ = self.child.wait();
        self.closed = true;
    }
}

impl HostClient for StdioHost {
    fn label(&self) -> &str {
        &self.label
    }

    fn list(&mut self) -> Result<Vec<BenchmarkEntry>, ClientError> {
        self.send("list")?;
        let mut names = Vec::new();
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            if let Some(RunReply::Error { kind, message }) = parse_error_line(&line) {
                return Err(ClientError::Command { kind, message });
            }
            names.push(line);
        }
        Ok(entries_from_names(names))
    }

    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, ClientError> {
        self.send(&render_command(&HostRequest::Run(request.clone())))?;
        loop {
            let line = self.read_line()?;
            match parse_run_reply(&line)? {
                RunReply::Advisory(text) => warn!(host = %self.label, "{}", text),
                RunReply::Outcome(outcome) => return Ok(outcome),
                RunReply::Error { kind, message } => {
                    return Err(ClientError::Command { kind, message });
                }
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ClientError> {
        self.send(&render_command(&HostRequest::Set {
            key: key.to_string(),
            value: value.to_string(),
        }))?;
        let line = self.read_line()?;
        if line.starts_with("ok ") {
            return Ok(());
        }
        match parse_error_line(&line) {
            Some(RunReply::Error { kind, message }) => Err(ClientError::Command { kind, message }),
            _ => Err(ClientError::Protocol(line)),
        }
    }

    fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.send("quit")?;
        self.closed = true;
        let status = self.child.wait()?;
        debug!(host = %self.label, %status, "host exited");
        Ok(())
    }
}

impl Drop for StdioHost {
    fn drop(&mut self) {
        if !self.closed {
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_host(script: &str, timeout: Duration) -> Result<StdioHost, ClientError> {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        StdioHost::attach(child, "sh".to_string(), timeout)
    }

    #[test]
    fn test_output_before_pass_is_skipped() {
        let mut host = shell_host(
            "echo 'warming up'; echo 'still going'; echo PASS; \
             read cmd; echo BenchmarkA; echo BenchmarkB; echo; read cmd",
            Duration::from_secs(10),
        )
        .unwrap();
        let entries = host.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "BenchmarkB");
        assert_eq!(entries[1].index, 1);
    }

    #[test]
    fn test_stderr_after_ready_is_fatal() {
        let mut host = shell_host(
            "echo junk; echo PASS; read cmd; echo boom >&2; read cmd",
            Duration::from_secs(10),
        )
        .unwrap();
        let err = host.list().unwrap_err();
        assert!(err.is_fatal());
        match err {
            ClientError::HostStderr(message) => assert_eq!(message, "boom"),
            other => panic!("expected stderr failure, got {:?}", other),
        }
    }

    #[test]
    fn test_startup_timeout() {
        let start = Instant::now();
        let err = shell_host("echo 'not ready'; read never", Duration::from_millis(200))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::StartupTimeout(_)), "{:?}", err);
        assert!(err.is_fatal());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_exit_before_pass_is_closed() {
        let err = shell_host("echo bye", Duration::from_secs(10)).err().unwrap();
        assert!(matches!(err, ClientError::Closed), "{:?}", err);
    }

    #[test]
    fn test_spawn_missing_binary() {
        let err = StdioHost::spawn("/nonexistent/rod-host", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Spawn { .. }), "{:?}", err);
    }
}
