//! External process invocation.
//!
//! Every tool the engine drives (ffmpeg, ffprobe, magick, decoders, GPU
//! probes) goes through a [`CommandRunner`]. The production implementation is
//! [`ProcessRunner`]; tests substitute scripted runners.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::core::{ResolvedCommand, display_command};
use super::error::EngineError;

/// Lines of stderr kept in a [`EngineError::ProcessFailure`] or
/// [`EngineError::Timeout`].
const STDERR_TAIL_LINES: usize = 12;

/// How long the output readers may keep draining once the child is gone.
/// Descendants that inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Classified result of one external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        elapsed: Duration,
        stderr: String,
    },
    SpawnFailed {
        reason: String,
    },
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::Completed {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Completed {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { exit_code: Some(0), .. })
    }

    /// Convert into the engine error taxonomy. Exit code 0 is the only success.
    pub fn into_output(self, program: &Path) -> Result<ProcessOutput, EngineError> {
        let name = program_name(program);
        match self {
            Self::Completed {
                exit_code: Some(0),
                stdout,
                stderr,
            } => Ok(ProcessOutput { stdout, stderr }),
            Self::Completed {
                exit_code, stderr, ..
            } => Err(EngineError::ProcessFailure {
                program: name,
                exit_code,
                stderr_tail: stderr_tail(&stderr, STDERR_TAIL_LINES),
            }),
            Self::TimedOut { elapsed, stderr } => Err(EngineError::Timeout {
                program: name,
                elapsed,
                stderr_tail: stderr_tail(&stderr, STDERR_TAIL_LINES),
            }),
            Self::SpawnFailed { reason } => Err(EngineError::dependency(name, reason)),
        }
    }
}

/// Seam between the engine and the operating system.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[OsString], timeout: Duration) -> Outcome;

    fn run_command(&self, cmd: &ResolvedCommand) -> Outcome {
        self.run(&cmd.program, &cmd.args, cmd.timeout)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &Path, args: &[OsString], timeout: Duration) -> Outcome {
        (**self).run(program, args, timeout)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, program: &Path, args: &[OsString], timeout: Duration) -> Outcome {
        (**self).run(program, args, timeout)
    }
}

/// Runs real child processes: no shell, stdin closed, no console window,
/// both output streams drained on reader threads, killed at the deadline.
///
/// A call returns at most `timeout` plus one poll interval plus
/// [`DRAIN_GRACE`] after spawning, even when descendants of the child keep
/// the output pipes open.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString], timeout: Duration) -> Outcome {
        if timeout.is_zero() {
            return Outcome::SpawnFailed {
                reason: "timeout must be greater than zero".to_string(),
            };
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        suppress_console_window(&mut cmd);

        debug!(command = %display_command(program, args), "spawning");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Outcome::SpawnFailed {
                    reason: e.to_string(),
                };
            }
        };

        let stdout_capture = child.stdout.take().map(StreamCapture::spawn);
        let stderr_capture = child.stderr.take().map(StreamCapture::spawn);

        let started = Instant::now();
        let waited = wait_with_deadline(&mut child, timeout, self.poll_interval);
        let elapsed = started.elapsed();

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        let stdout = StreamCapture::finish(stdout_capture, drain_deadline);
        let stderr = StreamCapture::finish(stderr_capture, drain_deadline);

        match waited {
            Ok(Some(status)) => Outcome::Completed {
                exit_code: status.code(),
                stdout,
                stderr,
            },
            Ok(None) => {
                warn!(
                    program = %program.display(),
                    elapsed_s = elapsed.as_secs_f64(),
                    "process killed after timeout"
                );
                Outcome::TimedOut { elapsed, stderr }
            }
            Err(e) => Outcome::SpawnFailed {
                reason: format!("failed to wait for process: {}", e),
            },
        }
    }
}

/// Poll until the child exits or the deadline passes. On timeout the child is
/// killed and reaped before returning `Ok(None)`.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(None);
                }
                thread::sleep(poll_interval.min(deadline - now));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    }
}

/// Output of one stream, collected chunk by chunk so a partial capture
/// survives when the reader has to be abandoned.
struct StreamCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl StreamCapture {
    fn spawn<S: Read + Send + 'static>(mut stream: S) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk) {
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for end of stream until `deadline`, then take whatever arrived.
    fn finish(capture: Option<Self>, deadline: Instant) -> String {
        let Some(capture) = capture else {
            return String::new();
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        if capture.done.recv_timeout(remaining).is_err() {
            debug!("output pipe still open after the process ended; keeping partial capture");
        }
        capture
            .buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

#[cfg(windows)]
fn suppress_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn suppress_console_window(_cmd: &mut Command) {}

fn program_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Last `max_lines` non-empty lines of a stderr capture.
pub fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
