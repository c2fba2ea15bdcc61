// RETRY ORCHESTRATOR
// REPEATS THE RUN PHASE WHILE IT YIELDS NO TELEMETRY.
//
//   ATTEMPTING(k) -> SUCCESS          ROWS NON-EMPTY
//                 -> GAVE UP          k == max_attempts, OR DECISION SAYS STOP
//                 -> ATTEMPTING(k+1)  OTHERWISE
//
// NO DELAY BETWEEN ATTEMPTS. "NO BEGIN MARKER" AND "BEGIN WITHOUT END" ARE
// THE SAME CASE HERE. FAULTS RAISED BY AN ATTEMPT PROPAGATE UNCHANGED.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::HarnessResult;
use crate::executor::RunOutcome;
use crate::telemetry::TelemetryRow;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    // ZERO IS CLAMPED TO ONE: THE RUN PHASE ALWAYS EXECUTES ONCE
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

// ASKED AFTER A FAILED ATTEMPT THAT STILL HAS BUDGET LEFT
pub trait RetryDecision {
    fn should_retry(&mut self, attempt: u32, max_attempts: u32) -> bool;
}

impl<F: FnMut(u32, u32) -> bool> RetryDecision for F {
    fn should_retry(&mut self, attempt: u32, max_attempts: u32) -> bool {
        self(attempt, max_attempts)
    }
}

pub struct AlwaysRetry;

impl RetryDecision for AlwaysRetry {
    fn should_retry(&mut self, _attempt: u32, _max_attempts: u32) -> bool {
        true
    }
}

// INTERACTIVE y/n PROMPT. EMPTY ANSWER OR EOF MEANS YES.
// AN INTERRUPT RAISED WHILE THE PROMPT BLOCKS MEANS NO: THE READ ONLY
// RETURNS ON ENTER OR EOF, SO THE FLAG IS CHECKED AROUND IT.
pub struct PromptRetry<'a, R, W> {
    input: R,
    output: W,
    shutdown: Option<&'a AtomicBool>,
}

impl PromptRetry<'static, io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<'a, R: BufRead, W: Write> PromptRetry<'a, R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            shutdown: None,
        }
    }

    pub fn interruptible<'b>(self, shutdown: &'b AtomicBool) -> PromptRetry<'b, R, W> {
        PromptRetry {
            input: self.input,
            output: self.output,
            shutdown: Some(shutdown),
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

impl<R: BufRead, W: Write> RetryDecision for PromptRetry<'_, R, W> {
    fn should_retry(&mut self, attempt: u32, max_attempts: u32) -> bool {
        loop {
            if self.interrupted() {
                return false;
            }
            let _ = write!(
                self.output,
                "RETRY RUNNING THIS BENCHMARK? (attempt {}/{}) [Y/n] ",
                attempt + 1,
                max_attempts
            );
            let _ = self.output.flush();

            let mut answer = String::new();
            let read = self.input.read_line(&mut answer);
            if self.interrupted() {
                let _ = writeln!(self.output);
                return false;
            }
            match read {
                Ok(0) | Err(_) => return true,
                Ok(_) => {}
            }
            match answer.trim().to_ascii_lowercase().as_str() {
                "" | "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => {
                    let _ = writeln!(self.output, "PLEASE ANSWER y OR n");
                }
            }
        }
    }
}

// LIVES FOR ONE RETRY LOOP
#[derive(Debug)]
pub struct AttemptState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_outcome: Option<RunOutcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiveUpReason {
    Exhausted,
    Declined,
}

#[derive(Debug)]
pub enum RetryOutcome {
    Success {
        rows: Vec<TelemetryRow>,
        attempts: u32,
    },
    GaveUp {
        reason: GiveUpReason,
        attempts: u32,
        last: Option<RunOutcome>,
    },
}

pub fn run_with_retry<D, F>(
    policy: RetryPolicy,
    decider: &mut D,
    mut attempt: F,
) -> HarnessResult<RetryOutcome>
where
    D: RetryDecision + ?Sized,
    F: FnMut(u32) -> HarnessResult<RunOutcome>,
{
    let mut state = AttemptState {
        attempts_made: 0,
        max_attempts: policy.max_attempts(),
        last_outcome: None,
    };

    loop {
        let k = state.attempts_made + 1;
        info!(attempt = k, max = state.max_attempts, "running benchmark and monitoring output");
        let outcome = attempt(k)?;
        state.attempts_made = k;

        if outcome.has_telemetry() {
            return Ok(RetryOutcome::Success {
                rows: outcome.rows,
                attempts: k,
            });
        }
        warn!(attempt = k, exit = %outcome.exit, "no valid benchmark data extracted");
        state.last_outcome = Some(outcome);

        if k >= state.max_attempts {
            return Ok(RetryOutcome::GaveUp {
                reason: GiveUpReason::Exhausted,
                attempts: k,
                last: state.last_outcome,
            });
        }
        if !decider.should_retry(k, state.max_attempts) {
            return Ok(RetryOutcome::GaveUp {
                reason: GiveUpReason::Declined,
                attempts: k,
                last: state.last_outcome,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(input: &str) -> (bool, String) {
        let mut out = Vec::new();
        let answer = PromptRetry::new(input.as_bytes(), &mut out).should_retry(1, 3);
        (answer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn prompt_defaults_to_yes() {
        assert!(prompt("\n").0);
        assert!(prompt("").0);
        assert!(prompt("Y\n").0);
    }

    #[test]
    fn prompt_accepts_no() {
        assert!(!prompt("n\n").0);
        assert!(!prompt("NO\n").0);
    }

    #[test]
    fn prompt_asks_again_on_garbage() {
        let (answer, text) = prompt("maybe\nn\n");
        assert!(!answer);
        assert!(text.contains("PLEASE ANSWER"));
        assert!(text.contains("(attempt 2/3)"));
    }

    #[test]
    fn interrupt_during_prompt_declines() {
        // FLAG RAISED WHILE THE READ WAS BLOCKED: AN EMPTY ANSWER MUST NOT MEAN YES
        let flag = AtomicBool::new(true);
        let mut out = Vec::new();
        let answer = PromptRetry::new("\n".as_bytes(), &mut out)
            .interruptible(&flag)
            .should_retry(1, 3);
        assert!(!answer);
    }

    #[test]
    fn interruptible_prompt_still_answers_when_calm() {
        let flag = AtomicBool::new(false);
        let mut out = Vec::new();
        let mut prompt = PromptRetry::new("n\n".as_bytes(), &mut out).interruptible(&flag);
        assert!(!prompt.should_retry(1, 3));
        let mut out = Vec::new();
        let mut prompt = PromptRetry::new("\n".as_bytes(), &mut out).interruptible(&flag);
        assert!(prompt.should_retry(1, 3));
    }

    #[test]
    fn closures_are_decisions() {
        let mut seen = Vec::new();
        let mut decide = |attempt: u32, max: u32| {
            seen.push((attempt, max));
            false
        };
        assert!(!decide.should_retry(1, 3));
        assert_eq!(seen, vec![(1, 3)]);
    }
}
