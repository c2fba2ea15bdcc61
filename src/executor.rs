// COMMAND EXECUTOR
// RUNS ONE EXTERNAL COMMAND (BUILD / FLASH / TERM) UNDER THE SUPERVISOR.
//
// NON-ZERO EXIT IS DATA (RunOutcome::exit), NOT AN ERROR. ONLY ENVIRONMENT
// FAULTS (SPAWN, WORKING DIRECTORY) AND INTERRUPTS ARE RAISED.
//
// THE PROCESS GROUP IS TORN DOWN ON EVERY EXIT PATH: END MARKER, NATURAL
// EXIT, DEADLINE, EXIT-WAIT TIMEOUT, INTERRUPT, AND (VIA Drop) PANIC.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::marker::{MonitorState, Scan};
use crate::supervisor::{self, LineEvent, WaitStatus, GRACE_PERIOD};
use crate::telemetry::TelemetryRow;

pub const EXIT_WAIT: Duration = Duration::from_secs(30);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct RunRequest {
    pub command: Vec<String>,
    pub cwd: PathBuf,
    // OVERLAY ON TOP OF THE INHERITED ENVIRONMENT. LATER ENTRIES WIN.
    pub env: Vec<(String, String)>,
    pub monitor: bool,
    // WALL-CLOCK BOUND ON THE READ LOOP
    pub deadline: Option<Duration>,
}

impl RunRequest {
    pub fn new<I, S>(command: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
            env: Vec::new(),
            monitor: false,
            deadline: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend_from_slice(vars);
        self
    }

    pub fn monitored(mut self) -> Self {
        self.monitor = true;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitState {
    Code(i32),
    Signaled(i32),
    TimedOut,
}

impl ExitState {
    pub fn success(self) -> bool {
        self == ExitState::Code(0)
    }

    pub fn code(self) -> Option<i32> {
        match self {
            ExitState::Code(c) => Some(c),
            _ => None,
        }
    }
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitState::Code(code),
            None => ExitState::Signaled(status.signal().unwrap_or(0)),
        }
    }
}

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitState::Code(c) => write!(f, "{c}"),
            ExitState::Signaled(s) => write!(f, "signal {s}"),
            ExitState::TimedOut => write!(f, "timeout"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub exit: ExitState,
    pub transcript: Vec<String>,
    pub rows: Vec<TelemetryRow>,
}

impl RunOutcome {
    pub fn has_telemetry(&self) -> bool {
        !self.rows.is_empty()
    }
}

// LIVE VIEW OF RAW OUTPUT. NOT PART OF THE MONITORING CONTRACT.
pub trait LineObserver {
    fn on_line(&mut self, line: &str);
}

pub struct NullObserver;

impl LineObserver for NullObserver {
    fn on_line(&mut self, _line: &str) {}
}

pub struct EchoObserver;

impl LineObserver for EchoObserver {
    fn on_line(&mut self, line: &str) {
        println!("  | {}", line);
    }
}

pub struct Executor<'a> {
    shutdown: &'a AtomicBool,
    grace: Duration,
    exit_wait: Duration,
    poll: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(shutdown: &'a AtomicBool) -> Self {
        Self {
            shutdown,
            grace: GRACE_PERIOD,
            exit_wait: EXIT_WAIT,
            poll: POLL_INTERVAL,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_exit_wait(mut self, exit_wait: Duration) -> Self {
        self.exit_wait = exit_wait;
        self
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn execute(&self, req: &RunRequest) -> HarnessResult<RunOutcome> {
        self.execute_observed(req, &mut NullObserver)
    }

    pub fn execute_observed(
        &self,
        req: &RunRequest,
        observer: &mut dyn LineObserver,
    ) -> HarnessResult<RunOutcome> {
        info!(command = %req.display_command(), cwd = %req.cwd.display(), monitor = req.monitor, "running");
        let mut handle = supervisor::launch(&req.command, &req.cwd, &req.env)?.with_grace(self.grace);

        let mut monitor = MonitorState::new();
        let mut transcript = Vec::new();
        let started = Instant::now();
        let mut deadline_hit = false;

        // READ LOOP: UNTIL STREAM END, END MARKER, DEADLINE OR INTERRUPT
        loop {
            if self.interrupted() {
                warn!(pgid = handle.pgid(), "interrupted; tearing down process group");
                handle.terminate();
                return Err(HarnessError::Interrupted);
            }
            if req.deadline.is_some_and(|limit| started.elapsed() >= limit) {
                warn!(pgid = handle.pgid(), "run deadline exceeded; force terminating");
                deadline_hit = true;
                break;
            }
            match handle.read_line(self.poll) {
                LineEvent::Line(line) => {
                    observer.on_line(&line);
                    let scan = if req.monitor { monitor.feed(&line) } else { Scan::Outside };
                    transcript.push(line);
                    match scan {
                        Scan::Begin => info!("found benchmark start marker"),
                        Scan::End => {
                            info!("found benchmark end marker; terminating process");
                            handle.terminate();
                            break;
                        }
                        _ => {}
                    }
                }
                LineEvent::Idle => continue,
                LineEvent::Closed => break,
            }
        }

        let exit = if deadline_hit {
            handle.terminate();
            ExitState::TimedOut
        } else {
            let wait_deadline = Instant::now() + self.exit_wait;
            loop {
                if self.interrupted() {
                    warn!(pgid = handle.pgid(), "interrupted during exit wait");
                    handle.terminate();
                    return Err(HarnessError::Interrupted);
                }
                match handle.wait(self.poll) {
                    WaitStatus::Exited(status) => break ExitState::from(status),
                    WaitStatus::TimedOut if Instant::now() >= wait_deadline => {
                        warn!(pgid = handle.pgid(), "process cleanup timed out; force killing");
                        handle.terminate();
                        break ExitState::TimedOut;
                    }
                    WaitStatus::TimedOut => continue,
                }
            }
        };

        // DESCENDANTS MAY OUTLIVE THE LEADER
        handle.terminate();
        debug!(%exit, lines = transcript.len(), "command finished");

        let rows = if req.monitor && exit != ExitState::TimedOut {
            monitor.rows()
        } else {
            Vec::new()
        };

        Ok(RunOutcome {
            exit,
            transcript,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_state_success_only_for_zero() {
        assert!(ExitState::Code(0).success());
        assert!(!ExitState::Code(1).success());
        assert!(!ExitState::Signaled(15).success());
        assert!(!ExitState::TimedOut.success());
        assert_eq!(ExitState::Code(2).code(), Some(2));
        assert_eq!(ExitState::TimedOut.code(), None);
    }

    #[test]
    fn exit_state_from_raw_status() {
        // WAIT STATUS ENCODING: EXIT CODE IN BITS 8..16, SIGNAL IN LOW BITS
        assert_eq!(ExitState::from(ExitStatus::from_raw(3 << 8)), ExitState::Code(3));
        assert_eq!(ExitState::from(ExitStatus::from_raw(libc::SIGKILL)), ExitState::Signaled(libc::SIGKILL));
    }

    #[test]
    fn request_builder() {
        let req = RunRequest::new(["make", "term"], "/tmp")
            .env("BOARD", "native")
            .monitored()
            .with_deadline(Some(Duration::from_secs(5)));
        assert_eq!(req.display_command(), "make term");
        assert_eq!(req.env, vec![("BOARD".to_string(), "native".to_string())]);
        assert!(req.monitor);
        assert_eq!(req.deadline, Some(Duration::from_secs(5)));
    }
}
