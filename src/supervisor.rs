// PROCESS SUPERVISOR
// OWNS ONE EXTERNAL PROCESS FROM LAUNCH TO REAP.
//
// THE CHILD STARTS A NEW SESSION (setsid), SO pgid == pid AND THE WHOLE
// SUBTREE (make -> pyterm -> socat ...) CAN BE SIGNALED AS A UNIT. A NEW
// SESSION ALSO DROPS THE CONTROLLING TTY: A TERMINAL PROGRAM READING THE
// INHERITED STDIN NEVER GETS SIGTTIN.
//
// TERMINATION PROTOCOL:
//   1. SIGTERM TO THE GROUP (LETS PYTERM RESTORE TERMINAL SETTINGS)
//   2. WAIT UP TO THE GRACE WINDOW FOR THE GROUP TO DRAIN
//   3. SIGKILL TO THE GROUP, UNCONDITIONALLY IF ANYTHING IS LEFT
//   4. REAP THE LEADER
// ESRCH AT ANY STEP MEANS THE GROUP IS ALREADY GONE. NOT AN ERROR.

use std::io::BufReader;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::stream::LineReader;

pub const GRACE_PERIOD: Duration = Duration::from_secs(2);
const REAP_POLL: Duration = Duration::from_millis(50);

pub enum LineEvent {
    Line(String),
    // NOTHING WITHIN THE POLL WINDOW, STREAM STILL OPEN
    Idle,
    // EVERY WRITER CLOSED ITS END
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Exited(ExitStatus),
    TimedOut,
}

pub struct ProcessHandle {
    child: Child,
    pgid: i32,
    lines: Receiver<String>,
    status: Option<ExitStatus>,
    released: bool,
    grace: Duration,
}

pub fn launch(
    command: &[String],
    cwd: &Path,
    env: &[(String, String)],
) -> HarnessResult<ProcessHandle> {
    let (program, args) = command.split_first().ok_or(HarnessError::EmptyCommand)?;
    if !cwd.is_dir() {
        return Err(HarnessError::WorkDir(cwd.to_path_buf()));
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped());

    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // STDERR JOINS THE MONITORED STREAM
            if libc::dup2(1, 2) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // FIRES WHEN THE SPAWNING THREAD EXITS, NOT ONLY THE PROCESS
            #[cfg(target_os = "linux")]
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong);
            Ok(())
        });
    }

    trace!(%program, ?args, cwd = %cwd.display(), "spawn");
    let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pgid = child.id() as i32;
    let stdout = child.stdout.take();

    let (tx, rx) = mpsc::channel();
    let handle = ProcessHandle {
        child,
        pgid,
        lines: rx,
        status: None,
        released: false,
        grace: GRACE_PERIOD,
    };

    // ON ERROR BELOW, DROPPING `handle` TEARS THE GROUP DOWN
    let stdout = stdout.ok_or_else(|| {
        HarnessError::Io(std::io::Error::other("child stdout was not captured"))
    })?;
    std::thread::Builder::new()
        .name(format!("reader-{pgid}"))
        .spawn(move || {
            for line in LineReader::new(BufReader::new(stdout)) {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(pgid, error = %e, "output stream read failed");
                        break;
                    }
                }
            }
        })?;

    debug!(pgid, %program, "launched");
    Ok(handle)
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    // NEXT OUTPUT LINE, WAITING AT MOST `timeout`
    pub fn read_line(&mut self, timeout: Duration) -> LineEvent {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => LineEvent::Line(line),
            Err(RecvTimeoutError::Timeout) => LineEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => LineEvent::Closed,
        }
    }

    fn try_reap(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.status = Some(status),
                Ok(None) => {}
                Err(e) => debug!(pgid = self.pgid, error = %e, "try_wait failed"),
            }
        }
        self.status
    }

    // WAIT FOR THE LEADER TO EXIT. ON TimedOut THE CALLER MUST terminate().
    pub fn wait(&mut self, timeout: Duration) -> WaitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_reap() {
                return WaitStatus::Exited(status);
            }
            if Instant::now() >= deadline {
                return WaitStatus::TimedOut;
            }
            std::thread::sleep(REAP_POLL);
        }
    }

    // SEND `sig` TO THE GROUP. FALSE IF THE GROUP IS GONE OR SIGNALING FAILED.
    fn signal_group(&self, sig: libc::c_int) -> bool {
        let rc = unsafe { libc::killpg(self.pgid, sig) };
        if rc == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid = self.pgid, sig, error = %err, "killpg failed");
        }
        false
    }

    fn group_alive(&self) -> bool {
        self.signal_group(0)
    }

    // GRACEFUL STOP, BOUNDED GRACE, FORCED STOP, REAP. IDEMPOTENT.
    pub fn terminate(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.try_reap();
        if self.group_alive() {
            debug!(pgid = self.pgid, grace_ms = self.grace.as_millis() as u64, "SIGTERM to process group");
            self.signal_group(libc::SIGTERM);

            let deadline = Instant::now() + self.grace;
            loop {
                self.try_reap();
                if !self.group_alive() || Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(REAP_POLL);
            }

            if self.signal_group(libc::SIGKILL) {
                debug!(pgid = self.pgid, "SIGKILL to process group");
            }
        } else {
            trace!(pgid = self.pgid, "process group already gone");
        }

        if self.status.is_none() {
            match self.child.wait() {
                Ok(status) => self.status = Some(status),
                Err(e) => debug!(pgid = self.pgid, error = %e, "reap failed"),
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}
