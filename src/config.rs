// BENCHMARK DESCRIPTOR
// YAML FILE LISTING BENCHMARKS, THE BOARDS THEY RUN ON, AND THE ENVIRONMENT
// DIRECTORIES (ONE PER VIRTUALIZATION RUNTIME) THAT BUILD THEM.
//
//   commands:                  # OPTIONAL, DEFAULTS SHOWN
//     build: make all
//     flash: make flash
//     run:   make term
//   benchmarks:
//     - name: sum
//       filename: sum.py       # DEFAULTS TO name
//       scale_factor: 1
//       iterations: 10
//       boards:
//         - board_name: native
//           supported_environments:
//             - micropython
//             - name: wamr
//               label: WAMR
//               disabled: false
//               env: { WAMR_HEAP: 8192 }
//
// ONE BenchmarkBoard PER (BENCHMARK x BOARD). UNNAMED ENTRIES ARE SKIPPED.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseCommands {
    pub build: Vec<String>,
    pub flash: Vec<String>,
    pub run: Vec<String>,
}

impl Default for PhaseCommands {
    fn default() -> Self {
        Self {
            build: words("make all"),
            flash: words("make flash"),
            run: words("make term"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentEntry {
    // DIRECTORY NAME, RELATIVE TO THE WORKDIR
    pub name: String,
    pub label: Option<String>,
    pub disabled: bool,
    pub env: Vec<(String, String)>,
}

impl EnvironmentEntry {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkBoard {
    pub name: String,
    pub filename: String,
    pub scale_factor: u64,
    pub iterations: u64,
    pub board_name: String,
    pub supported_environments: Vec<EnvironmentEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub benchmarks: Vec<BenchmarkBoard>,
    pub commands: PhaseCommands,
}

// ---------------------------------------------------------------------------
// RAW YAML SHAPE
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawConfig {
    benchmarks: Option<Vec<RawBenchmark>>,
    #[serde(default)]
    commands: RawCommands,
}

#[derive(Deserialize, Default)]
struct RawCommands {
    build: Option<RawCommand>,
    flash: Option<RawCommand>,
    run: Option<RawCommand>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Line(String),
    Argv(Vec<String>),
}

impl RawCommand {
    fn into_argv(self) -> Vec<String> {
        match self {
            RawCommand::Line(line) => words(&line),
            RawCommand::Argv(argv) => argv,
        }
    }
}

#[derive(Deserialize)]
struct RawBenchmark {
    name: Option<String>,
    filename: Option<String>,
    scale_factor: Option<RawCount>,
    iterations: Option<RawCount>,
    #[serde(default)]
    boards: Option<Vec<Option<RawBoard>>>,
}

#[derive(Deserialize)]
struct RawBoard {
    board_name: Option<String>,
    #[serde(default)]
    supported_environments: Option<Vec<RawEnvironment>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnvironment {
    Name(String),
    Entry {
        name: String,
        label: Option<String>,
        #[serde(default)]
        disabled: bool,
        #[serde(default)]
        env: BTreeMap<String, EnvValue>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl EnvValue {
    fn render(&self) -> String {
        match self {
            EnvValue::Bool(b) => b.to_string(),
            EnvValue::Int(i) => i.to_string(),
            EnvValue::Float(f) => f.to_string(),
            EnvValue::Text(s) => s.clone(),
        }
    }
}

// COUNTS MAY BE WRITTEN QUOTED ("2") BY HAND-EDITED DESCRIPTORS
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Int(u64),
    Text(String),
}

impl RawCount {
    fn resolve(self, field: &str, benchmark: &str) -> HarnessResult<u64> {
        match self {
            RawCount::Int(n) => Ok(n),
            RawCount::Text(text) => text.trim().parse().map_err(|_| {
                HarnessError::Config(format!(
                    "benchmark '{benchmark}': {field} must be a non-negative integer, got '{text}'"
                ))
            }),
        }
    }
}

fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl RawEnvironment {
    fn into_entry(self) -> EnvironmentEntry {
        match self {
            RawEnvironment::Name(name) => EnvironmentEntry {
                name: name.trim().to_string(),
                label: None,
                disabled: false,
                env: Vec::new(),
            },
            RawEnvironment::Entry { name, label, disabled, env } => EnvironmentEntry {
                name: name.trim().to_string(),
                label,
                disabled,
                env: env.iter().map(|(k, v)| (k.clone(), v.render())).collect(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// LOADING
// ---------------------------------------------------------------------------

impl Config {
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> HarnessResult<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| HarnessError::Config(format!("invalid YAML: {e}")))?;
        let Some(raw_benchmarks) = raw.benchmarks else {
            return Err(HarnessError::Config(
                "no 'benchmarks' section found in configuration file".into(),
            ));
        };

        let defaults = PhaseCommands::default();
        let commands = PhaseCommands {
            build: raw.commands.build.map(RawCommand::into_argv).unwrap_or(defaults.build),
            flash: raw.commands.flash.map(RawCommand::into_argv).unwrap_or(defaults.flash),
            run: raw.commands.run.map(RawCommand::into_argv).unwrap_or(defaults.run),
        };
        if commands.build.is_empty() || commands.flash.is_empty() || commands.run.is_empty() {
            return Err(HarnessError::Config("phase commands must not be empty".into()));
        }

        let mut benchmarks = Vec::new();
        for bench in raw_benchmarks {
            let Some(name) = non_empty(bench.name) else {
                debug!("skipping unnamed benchmark");
                continue;
            };
            let filename = non_empty(bench.filename).unwrap_or_else(|| name.clone());
            let scale_factor = match bench.scale_factor {
                Some(raw) => raw.resolve("scale_factor", &name)?,
                None => 1,
            };
            let iterations = match bench.iterations {
                Some(raw) => raw.resolve("iterations", &name)?,
                None => 1,
            };

            for board in bench.boards.unwrap_or_default().into_iter().flatten() {
                let Some(board_name) = non_empty(board.board_name) else {
                    debug!(benchmark = %name, "skipping board entry without a name");
                    continue;
                };
                let supported_environments = board
                    .supported_environments
                    .unwrap_or_default()
                    .into_iter()
                    .map(RawEnvironment::into_entry)
                    .collect();
                benchmarks.push(BenchmarkBoard {
                    name: name.clone(),
                    filename: filename.clone(),
                    scale_factor,
                    iterations,
                    board_name,
                    supported_environments,
                });
            }
        }

        Ok(Self { benchmarks, commands })
    }

    // DESCRIPTOR ENTRIES FOR ONE BOARD, CASE-INSENSITIVE
    pub fn for_board<'a>(&'a self, board: &'a str) -> impl Iterator<Item = &'a BenchmarkBoard> + 'a {
        self.benchmarks
            .iter()
            .filter(move |b| b.board_name.eq_ignore_ascii_case(board))
    }
}
