// COMMAND EXECUTOR AGAINST REAL PROCESSES
// EVERY CASE SPAWNS `sh -c`. GRACE AND EXIT WAIT ARE SHORTENED SO THE
// SUITE STAYS FAST; THE PROTOCOL IS THE SAME.
//
// CLEANUP CHECKS READ /proc/<pid>/stat: GONE OR ZOMBIE COUNTS AS DEAD.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use riotbench::error::HarnessError;
use riotbench::executor::{ExitState, Executor, LineObserver, RunRequest};
use riotbench::marker::{BEGIN_MARKER, END_MARKER};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn cwd() -> PathBuf {
    std::env::temp_dir()
}

fn executor(flag: &AtomicBool) -> Executor<'_> {
    Executor::new(flag)
        .with_grace(Duration::from_millis(200))
        .with_exit_wait(Duration::from_secs(5))
}

fn proc_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        Ok(stat) => {
            // pid (comm) STATE ...
            let state = stat.rsplit(") ").next().and_then(|rest| rest.chars().next());
            matches!(state, Some('Z') | Some('X'))
        }
    }
}

// SIGKILL DELIVERY IS ASYNCHRONOUS: ALLOW THE KERNEL A MOMENT
fn is_dead(pid: i32) -> bool {
    for _ in 0..20 {
        if proc_gone(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn bg_pid(transcript: &[String]) -> i32 {
    transcript
        .iter()
        .find_map(|l| l.strip_prefix("bg "))
        .and_then(|p| p.trim().parse().ok())
        .expect("background pid line")
}

struct Recorder(Vec<String>);

impl LineObserver for Recorder {
    fn on_line(&mut self, line: &str) {
        self.0.push(line.to_string());
    }
}

// ---------------------------------------------------------------------------
// PLAIN COMMANDS
// ---------------------------------------------------------------------------

#[test]
fn transcript_and_exit_code() {
    let flag = AtomicBool::new(false);
    let out = executor(&flag)
        .execute(&RunRequest::new(sh("printf 'a\\nb\\n'; exit 3"), cwd()))
        .unwrap();
    assert_eq!(out.exit, ExitState::Code(3));
    assert_eq!(out.transcript, vec!["a", "b"]);
    assert!(!out.has_telemetry());
}

#[test]
fn stderr_is_merged() {
    let flag = AtomicBool::new(false);
    let out = executor(&flag)
        .execute(&RunRequest::new(sh("echo out; echo err 1>&2"), cwd()))
        .unwrap();
    assert!(out.exit.success());
    assert_eq!(out.transcript, vec!["out", "err"]);
}

#[test]
fn env_overlay_later_entries_win() {
    let flag = AtomicBool::new(false);
    let req = RunRequest::new(sh("echo \"$BOARD $BENCH_X\""), cwd())
        .env("BOARD", "native")
        .env("BENCH_X", "first")
        .env("BENCH_X", "second");
    let out = executor(&flag).execute(&req).unwrap();
    assert_eq!(out.transcript, vec!["native second"]);
}

#[test]
fn markers_ignored_when_not_monitored() {
    let flag = AtomicBool::new(false);
    let script = format!("echo '{BEGIN_MARKER}'; echo 'iteration;v'; echo '0;1'; echo '{END_MARKER}'");
    let out = executor(&flag).execute(&RunRequest::new(sh(&script), cwd())).unwrap();
    assert_eq!(out.transcript.len(), 4);
    assert!(out.rows.is_empty());
}

#[test]
fn observer_sees_every_line() {
    let flag = AtomicBool::new(false);
    let mut rec = Recorder(Vec::new());
    executor(&flag)
        .execute_observed(&RunRequest::new(sh("echo 1; echo 2; echo 3"), cwd()), &mut rec)
        .unwrap();
    assert_eq!(rec.0, vec!["1", "2", "3"]);
}

// ---------------------------------------------------------------------------
// ENVIRONMENT FAULTS
// ---------------------------------------------------------------------------

#[test]
fn missing_program_is_spawn_fault() {
    let flag = AtomicBool::new(false);
    let err = executor(&flag)
        .execute(&RunRequest::new(["/definitely/not/a/program"], cwd()))
        .unwrap_err();
    assert!(matches!(err, HarnessError::Spawn { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn missing_workdir_is_fault() {
    let flag = AtomicBool::new(false);
    let err = executor(&flag)
        .execute(&RunRequest::new(sh("true"), "/definitely/not/a/dir"))
        .unwrap_err();
    assert!(matches!(err, HarnessError::WorkDir(_)));
}

#[test]
fn empty_command_is_fault() {
    let flag = AtomicBool::new(false);
    let err = executor(&flag)
        .execute(&RunRequest::new(Vec::<String>::new(), cwd()))
        .unwrap_err();
    assert!(matches!(err, HarnessError::EmptyCommand));
}

// ---------------------------------------------------------------------------
// MONITORED RUNS
// ---------------------------------------------------------------------------

#[test]
fn end_marker_stops_long_running_terminal() {
    let flag = AtomicBool::new(false);
    let script = format!(
        "sleep 60 & echo \"bg $!\"; echo '# {BEGIN_MARKER}'; echo 'iteration;execution_time_us'; \
         echo '0;100'; echo '1;102'; echo '# {END_MARKER}'; sleep 60"
    );
    let started = Instant::now();
    let out = executor(&flag)
        .execute(&RunRequest::new(sh(&script), cwd()).monitored())
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[1].get("execution_time_us"), Some("102"));
    assert!(!out.exit.success());
    // CLEANUP GUARANTEE: THE BACKGROUND DESCENDANT DIED WITH THE GROUP
    assert!(is_dead(bg_pid(&out.transcript)));
}

#[test]
fn abrupt_stream_end_completes_without_rows() {
    let flag = AtomicBool::new(false);
    let script = format!("echo '{BEGIN_MARKER}'; echo 'iteration;v'; echo '0;1'; exit 0");
    let started = Instant::now();
    let out = executor(&flag)
        .execute(&RunRequest::new(sh(&script), cwd()).monitored())
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(out.exit, ExitState::Code(0));
    assert!(out.rows.is_empty());
}

#[test]
fn deadline_forces_termination() {
    let flag = AtomicBool::new(false);
    let script = format!("sleep 60 & echo \"bg $!\"; echo '{BEGIN_MARKER}'; sleep 60");
    let req = RunRequest::new(sh(&script), cwd())
        .monitored()
        .with_deadline(Some(Duration::from_millis(500)));
    let started = Instant::now();
    let out = executor(&flag).execute(&req).unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(out.exit, ExitState::TimedOut);
    assert!(out.rows.is_empty());
    assert!(is_dead(bg_pid(&out.transcript)));
}

#[test]
fn exit_wait_bounds_silent_process() {
    let flag = AtomicBool::new(false);
    // CLOSES ITS OUTPUT, THEN NEVER EXITS
    let out = Executor::new(&flag)
        .with_grace(Duration::from_millis(200))
        .with_exit_wait(Duration::from_millis(500))
        .execute(&RunRequest::new(sh("echo \"bg $$\"; exec >/dev/null 2>&1; sleep 60"), cwd()))
        .unwrap();
    assert_eq!(out.exit, ExitState::TimedOut);
    assert!(is_dead(bg_pid(&out.transcript)));
}

#[test]
fn interrupt_tears_down_and_raises() {
    let flag = AtomicBool::new(false);
    let started = Instant::now();
    let result = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(300));
            flag.store(true, Ordering::Relaxed);
        });
        executor(&flag).execute(&RunRequest::new(sh("echo \"bg $$\"; sleep 60"), cwd()).monitored())
    });
    assert!(matches!(result, Err(HarnessError::Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn interrupt_before_start_never_reads() {
    let flag = AtomicBool::new(true);
    let err = executor(&flag)
        .execute(&RunRequest::new(sh("sleep 60"), cwd()))
        .unwrap_err();
    assert!(err.is_fatal());
}
