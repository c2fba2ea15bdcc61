use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use riotbench::config::Config;
use riotbench::coordinator::Target;

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

// WHERE A PHASE PROGRAM WOULD BE EXECUTED FROM. PATHS WITH A '/' RESOLVE
// AGAINST THE ENVIRONMENT DIRECTORY (THE PHASE CWD), BARE NAMES AGAINST PATH.
fn resolve_tool(program: &str, cwd: &Path, search: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = cwd.join(program);
        return is_executable(&candidate).then_some(candidate);
    }
    std::env::split_paths(search?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

pub fn run_check(config_path: &Path, board: &str, workdir: &Path) -> Result<()> {
    println!("RIOTBENCH PREFLIGHT CHECK");
    println!();

    let mut ok = true;
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => bail!("CANNOT LOAD {}: {}", config_path.display(), e),
    };

    // EVERY PHASE PROGRAM MUST RESOLVE, ON PATH OR FROM EACH ENVIRONMENT DIRECTORY
    println!("HOST TOOLS:");
    let phases = [&config.commands.build, &config.commands.flash, &config.commands.run];
    let mut programs: Vec<&str> = phases
        .iter()
        .filter_map(|argv| argv.first().map(String::as_str))
        .collect();
    programs.sort_unstable();
    programs.dedup();
    let search = std::env::var_os("PATH");
    let dirs: Vec<PathBuf> = config
        .for_board(board)
        .flat_map(|b| b.supported_environments.iter())
        .filter(|e| !e.disabled)
        .map(|e| workdir.join(&e.name))
        .filter(|d| d.is_dir())
        .collect();
    let base = workdir.to_path_buf();
    for program in programs {
        let resolved = if program.contains('/') {
            // FIRST ENVIRONMENT DIRECTORY WHERE IT EXISTS, OR workdir WHEN NONE DO
            dirs.iter()
                .chain(std::iter::once(&base))
                .find_map(|d| resolve_tool(program, d, None))
        } else {
            resolve_tool(program, workdir, search.as_deref())
        };
        match resolved {
            Some(path) => println!("  {:<24}OK ({})", program, path.display()),
            None => {
                println!("  {:<24}MISSING", program);
                ok = false;
            }
        }
    }
    println!();

    let target = Target::new(board, workdir);
    println!("PAIRS FOR BOARD {}{}:", board, if target.is_native() { " (NO FLASH)" } else { "" });
    let mut pairs = 0usize;
    for bench in config.for_board(board) {
        if bench.supported_environments.is_empty() {
            println!("  {:<16} (NO SUPPORTED ENVIRONMENTS)", bench.name);
            continue;
        }
        for env in &bench.supported_environments {
            pairs += 1;
            let dir = workdir.join(&env.name);
            let state = if env.disabled {
                "DISABLED"
            } else if dir.is_dir() {
                "OK"
            } else {
                ok = false;
                "DIRECTORY MISSING"
            };
            println!("  {:<16} {:<20} {}", bench.name, env.label(), state);
        }
    }
    if pairs == 0 {
        println!("  NO PAIRS CONFIGURED FOR THIS BOARD");
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}
