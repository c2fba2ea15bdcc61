// RUN COORDINATOR
// SEQUENCES ONE (BENCHMARK, ENVIRONMENT) PAIR:
//
//   BUILD (MUST EXIT 0) -> FLASH (NOT FOR native, MUST EXIT 0) -> SETTLE
//     -> RUN WITH RETRY -> ENRICH ROWS -> APPEND TO THE RESULT SET
//
// PAIRS RUN STRICTLY ONE AFTER ANOTHER: BUILD AND FLASH SHARE ONE DEVICE.
// A PAIR'S FAILURE NEVER ENDS THE SWEEP. AN INTERRUPT DOES, AND THE ROWS
// COLLECTED SO FAR ARE STILL RETURNED.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BenchmarkBoard, Config, EnvironmentEntry, PhaseCommands};
use crate::error::{HarnessError, HarnessResult, PairFailure};
use crate::executor::{EchoObserver, Executor, NullObserver, RunOutcome, RunRequest};
use crate::results::ResultSet;
use crate::retry::{run_with_retry, AlwaysRetry, GiveUpReason, RetryDecision, RetryOutcome, RetryPolicy};
use crate::telemetry::TelemetryRow;

pub const NATIVE_BOARD: &str = "native";
// DEVICE BOOT AFTER FLASHING, BEFORE THE TERMINAL ATTACHES
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct Target {
    pub board: String,
    pub port: Option<String>,
    // PARENT OF THE ENVIRONMENT DIRECTORIES
    pub workdir: PathBuf,
}

impl Target {
    pub fn new(board: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            board: board.into(),
            port: None,
            workdir: workdir.into(),
        }
    }

    pub fn with_port(mut self, port: Option<String>) -> Self {
        self.port = port;
        self
    }

    pub fn is_native(&self) -> bool {
        self.board.eq_ignore_ascii_case(NATIVE_BOARD)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingDirectory(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairStatus {
    Collected { rows: usize, attempts: u32 },
    Skipped(SkipReason),
    Failed(PairFailure),
}

#[derive(Clone, Debug)]
pub struct PairReport {
    pub benchmark: String,
    pub environment: String,
    pub status: PairStatus,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub results: ResultSet,
    pub pairs: Vec<PairReport>,
    pub interrupted: bool,
}

impl SweepReport {
    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.status, PairStatus::Failed(_)))
    }
}

struct PairRun {
    status: PairStatus,
    rows: Vec<TelemetryRow>,
}

impl PairRun {
    fn failed(failure: PairFailure) -> Self {
        Self {
            status: PairStatus::Failed(failure),
            rows: Vec::new(),
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self {
            status: PairStatus::Skipped(reason),
            rows: Vec::new(),
        }
    }
}

// SPAWN / WORKDIR FAULTS END THE PAIR. INTERRUPTS END THE SWEEP.
fn pair_fault(err: HarnessError) -> HarnessResult<PairRun> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!(error = %err, "command could not be started");
    Ok(PairRun::failed(PairFailure::Spawn(err.to_string())))
}

fn run_phase(executor: &Executor<'_>, echo: bool, req: &RunRequest) -> HarnessResult<RunOutcome> {
    if echo {
        executor.execute_observed(req, &mut EchoObserver)
    } else {
        executor.execute_observed(req, &mut NullObserver)
    }
}

pub struct RunCoordinator<'a> {
    executor: Executor<'a>,
    commands: PhaseCommands,
    target: Target,
    policy: RetryPolicy,
    decider: Box<dyn RetryDecision + 'a>,
    settle: Duration,
    run_deadline: Option<Duration>,
    echo: bool,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(executor: Executor<'a>, commands: PhaseCommands, target: Target) -> Self {
        Self {
            executor,
            commands,
            target,
            policy: RetryPolicy::default(),
            decider: Box::new(AlwaysRetry),
            settle: SETTLE_DELAY,
            run_deadline: None,
            echo: false,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_decider(mut self, decider: Box<dyn RetryDecision + 'a>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    // OVERLAY FOR EVERY PHASE. ENVIRONMENT-SPECIFIC VARIABLES COME LAST AND WIN.
    pub fn command_env(&self, bench: &BenchmarkBoard, env: &EnvironmentEntry) -> Vec<(String, String)> {
        let mut vars = vec![
            ("BOARD".to_string(), self.target.board.clone()),
            ("BENCHMARK".to_string(), bench.filename.clone()),
            ("SCALE_FACTOR".to_string(), bench.scale_factor.to_string()),
            ("ITERATIONS".to_string(), bench.iterations.to_string()),
        ];
        if let Some(port) = &self.target.port {
            vars.push(("PORT".to_string(), port.clone()));
        }
        vars.extend(env.env.iter().cloned());
        vars
    }

    // EVERY DESCRIPTOR ENTRY FOR THE TARGET BOARD x EVERY SUPPORTED ENVIRONMENT
    pub fn sweep(&mut self, config: &Config) -> SweepReport {
        let mut report = SweepReport::default();
        let board = self.target.board.clone();

        for bench in config.for_board(&board) {
            if bench.supported_environments.is_empty() {
                warn!(benchmark = %bench.name, board = %board, "no supported environments; skipping");
                continue;
            }
            println!("\n=== PROCESSING BENCHMARK: {} (BOARD: {}) ===", bench.name, board);

            for env in &bench.supported_environments {
                let run = if env.disabled {
                    debug!(benchmark = %bench.name, environment = %env.label(), "environment disabled");
                    PairRun::skipped(SkipReason::Disabled)
                } else {
                    match self.run_pair(bench, env) {
                        Ok(run) => run,
                        Err(err) => {
                            warn!(benchmark = %bench.name, environment = %env.label(), error = %err, "sweep aborted");
                            report.interrupted = true;
                            return report;
                        }
                    }
                };

                if let PairStatus::Failed(failure) = &run.status {
                    println!("FAILED TO RUN BENCHMARK '{}' IN ENVIRONMENT '{}': {}",
                        bench.name, env.label(), failure);
                }
                report.results.extend(run.rows);
                report.pairs.push(PairReport {
                    benchmark: bench.name.clone(),
                    environment: env.label().to_string(),
                    status: run.status,
                });
            }
        }

        report
    }

    fn run_pair(&mut self, bench: &BenchmarkBoard, env: &EnvironmentEntry) -> HarnessResult<PairRun> {
        let dir = self.target.workdir.join(&env.name);
        if !dir.is_dir() {
            warn!(environment = %env.name, dir = %dir.display(), "environment directory does not exist; skipping");
            return Ok(PairRun::skipped(SkipReason::MissingDirectory(dir)));
        }

        println!("\n# RUNNING BENCHMARK '{}' IN ENVIRONMENT '{}'", bench.name, env.label());
        let vars = self.command_env(bench, env);
        let executor = &self.executor;
        let echo = self.echo;

        // BUILD
        info!(benchmark = %bench.name, environment = %env.label(), "building");
        let req = RunRequest::new(self.commands.build.clone(), &dir).envs(&vars);
        let build = match run_phase(executor, echo, &req) {
            Ok(outcome) => outcome,
            Err(err) => return pair_fault(err),
        };
        if !build.exit.success() {
            return Ok(PairRun::failed(PairFailure::Build { code: build.exit.code() }));
        }

        // FLASH
        if !self.target.is_native() {
            info!(benchmark = %bench.name, environment = %env.label(), "flashing");
            let req = RunRequest::new(self.commands.flash.clone(), &dir).envs(&vars);
            let flash = match run_phase(executor, echo, &req) {
                Ok(outcome) => outcome,
                Err(err) => return pair_fault(err),
            };
            if !flash.exit.success() {
                return Ok(PairRun::failed(PairFailure::Flash { code: flash.exit.code() }));
            }
        }

        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }

        // RUN + MONITOR
        let req = RunRequest::new(self.commands.run.clone(), &dir)
            .envs(&vars)
            .monitored()
            .with_deadline(self.run_deadline);
        let retry = run_with_retry(self.policy, &mut *self.decider, |_| run_phase(executor, echo, &req));
        let outcome = match retry {
            Ok(outcome) => outcome,
            Err(err) => return pair_fault(err),
        };

        match outcome {
            RetryOutcome::Success { mut rows, attempts } => {
                for row in &mut rows {
                    row.set("benchmark", bench.name.as_str());
                    row.set("environment", env.label());
                    row.set("board", bench.board_name.as_str());
                    row.set("scale_factor", bench.scale_factor.to_string());
                }
                println!("SUCCESSFULLY COLLECTED {} DATA POINTS FROM {}", rows.len(), env.label());
                Ok(PairRun {
                    status: PairStatus::Collected { rows: rows.len(), attempts },
                    rows,
                })
            }
            RetryOutcome::GaveUp { reason: GiveUpReason::Exhausted, attempts, .. } => {
                Ok(PairRun::failed(PairFailure::NoTelemetry { attempts }))
            }
            RetryOutcome::GaveUp { reason: GiveUpReason::Declined, attempts, .. } => {
                Ok(PairRun::failed(PairFailure::Declined { attempts }))
            }
        }
    }
}
