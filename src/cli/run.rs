use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

use riotbench::config::Config;
use riotbench::coordinator::{PairStatus, RunCoordinator, Target};
use riotbench::executor::Executor;
use riotbench::retry::{AlwaysRetry, PromptRetry, RetryPolicy};

use crate::RunArgs;

pub fn run_sweep(args: &RunArgs, shutdown: &AtomicBool) -> Result<()> {
    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => bail!("CANNOT LOAD {}: {}", args.config.display(), e),
    };
    if !args.workdir.is_dir() {
        bail!("WORKDIR {} IS NOT A DIRECTORY", args.workdir.display());
    }

    let policy = RetryPolicy::new(args.max_attempts);
    let target = Target::new(&args.board, &args.workdir).with_port(args.port.clone());

    println!("RIOTBENCH SWEEP");
    println!("BOARD:           {}", target.board);
    println!("PORT:            {}", target.port.as_deref().unwrap_or("-"));
    println!("CONFIG:          {}", args.config.display());
    println!("MAX ATTEMPTS:    {}", policy.max_attempts());
    println!("PAIRS:           {}", config
        .for_board(&args.board)
        .map(|b| b.supported_environments.len())
        .sum::<usize>());

    let mut coordinator = RunCoordinator::new(Executor::new(shutdown), config.commands.clone(), target)
        .with_policy(policy)
        .with_run_deadline(args.run_timeout.map(Duration::from_secs))
        .with_echo(!args.quiet);
    coordinator = if args.no_prompt {
        coordinator.with_decider(Box::new(AlwaysRetry))
    } else {
        coordinator.with_decider(Box::new(PromptRetry::stdio().interruptible(shutdown)))
    };

    let report = coordinator.sweep(&config);

    report.results.print_summary();
    report
        .results
        .write_csv(&args.write_csv)
        .with_context(|| format!("writing {}", args.write_csv.display()))?;
    println!("RESULTS WRITTEN TO {}", args.write_csv.display());

    let skipped = report
        .pairs
        .iter()
        .filter(|p| matches!(p.status, PairStatus::Skipped(_)))
        .count();
    let failures: Vec<_> = report.failures().collect();
    println!();
    println!("PAIRS: {} RUN, {} SKIPPED, {} FAILED", report.pairs.len() - skipped, skipped, failures.len());
    for pair in &failures {
        if let PairStatus::Failed(reason) = &pair.status {
            println!("  {:<16} {:<16} {}", pair.benchmark, pair.environment, reason);
        }
    }

    if report.interrupted {
        warn!("sweep interrupted; results are partial");
        std::process::exit(130);
    }
    Ok(())
}
