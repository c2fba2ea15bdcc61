// ERROR TAXONOMY
// HarnessError: ENVIRONMENT-LEVEL FAULTS RAISED BY THE ENGINE.
// PairFailure: PER-PAIR OUTCOMES. RECORDED, NEVER RAISED.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("spawn failed for `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("working directory not accessible: {}", .0.display())]
    WorkDir(PathBuf),
    #[error("empty command")]
    EmptyCommand,
    #[error("interrupted")]
    Interrupted,
    #[error("config: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    // FAULTS THAT END THE WHOLE SWEEP INSTEAD OF ONE PAIR
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Interrupted | HarnessError::Config(_))
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

// WHY ONE (BENCHMARK, ENVIRONMENT) PAIR PRODUCED NO RESULTS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairFailure {
    Spawn(String),
    Build { code: Option<i32> },
    Flash { code: Option<i32> },
    NoTelemetry { attempts: u32 },
    Declined { attempts: u32 },
}

impl std::fmt::Display for PairFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairFailure::Spawn(reason) => write!(f, "could not start command: {reason}"),
            PairFailure::Build { code } => write!(f, "build failed (exit {})", fmt_code(*code)),
            PairFailure::Flash { code } => write!(f, "flash failed (exit {})", fmt_code(*code)),
            PairFailure::NoTelemetry { attempts } => {
                write!(f, "no benchmark data after {attempts} attempt(s)")
            }
            PairFailure::Declined { attempts } => {
                write!(f, "retry declined after {attempts} attempt(s)")
            }
        }
    }
}

fn fmt_code(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal/timeout".to_string(),
    }
}
