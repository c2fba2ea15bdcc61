// RIOTBENCH -- EMBEDDED VIRTUALIZATION BENCHMARK HARNESS
// BUILDS, FLASHES AND RUNS EACH (BENCHMARK, ENVIRONMENT) PAIR ON A BOARD,
// SCRAPES THE TELEMETRY TABLE FROM THE DEVICE CONSOLE, WRITES ONE CSV
//
// ENGINE LIVES IN THE LIBRARY. THIS BINARY HANDLES: ARGUMENTS, LOGGING,
// INTERRUPTS, REPORTING

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use riotbench::retry::DEFAULT_MAX_ATTEMPTS;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "riotbench")]
#[command(about = "RIOTBENCH -- BUILD, FLASH AND MEASURE BENCHMARKS ON EMBEDDED BOARDS")]
struct Cli {
    // DEBUG-LEVEL DIAGNOSTICS (RUST_LOG OVERRIDES)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // RUN EVERY CONFIGURED PAIR FOR ONE BOARD AND WRITE THE RESULTS
    Run(RunArgs),
    // VERIFY HOST TOOLS AND LIST THE PAIRS A RUN WOULD EXECUTE
    Check {
        // BENCHMARK DESCRIPTOR (YAML)
        #[arg(long)]
        config: PathBuf,

        // TARGET BOARD IDENTIFIER
        #[arg(long)]
        board: String,

        // DIRECTORY HOLDING THE ENVIRONMENT DIRECTORIES
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    // EXTRACT TELEMETRY FROM A CAPTURED CONSOLE LOG (STDIN WHEN OMITTED)
    Parse {
        input: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct RunArgs {
    // BENCHMARK DESCRIPTOR (YAML)
    #[arg(long)]
    pub config: PathBuf,

    // TARGET BOARD IDENTIFIER ("native" SKIPS FLASHING)
    #[arg(long)]
    pub board: String,

    // SERIAL PORT, EXPORTED TO COMMANDS AS PORT
    #[arg(long)]
    pub port: Option<String>,

    // OUTPUT CSV (PARENT DIRECTORIES ARE CREATED)
    #[arg(long)]
    pub write_csv: PathBuf,

    // RUN ATTEMPTS PER PAIR BEFORE GIVING UP
    #[arg(long, env = "BENCH_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    // RETRY WITHOUT ASKING
    #[arg(long)]
    pub no_prompt: bool,

    // DIRECTORY HOLDING THE ENVIRONMENT DIRECTORIES
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    // WALL-CLOCK BOUND ON ONE MONITORED RUN, IN SECONDS
    #[arg(long)]
    pub run_timeout: Option<u64>,

    // DO NOT ECHO COMMAND OUTPUT
    #[arg(long)]
    pub quiet: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => {
            // ONLY THE SWEEP POLLS SHUTDOWN. check AND parse KEEP THE DEFAULT SIGINT.
            ctrlc::set_handler(move || {
                SHUTDOWN.store(true, Ordering::Relaxed);
            })?;
            cli::run::run_sweep(&args, &SHUTDOWN)
        }
        Command::Check { config, board, workdir } => cli::check::run_check(&config, &board, &workdir),
        Command::Parse { input } => cli::parse::run_parse(input.as_deref()),
    }
}
