use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use riotbench::marker::MonitorState;
use riotbench::stream::LineReader;

pub fn run_parse(input: Option<&Path>) -> Result<()> {
    let mut monitor = MonitorState::new();

    match input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            feed_all(&mut monitor, LineReader::new(BufReader::new(file)))?;
        }
        None => feed_all(&mut monitor, LineReader::new(io::stdin().lock()))?,
    }

    if !monitor.is_finished() {
        let why = if monitor.in_window() { "BEGIN MARKER WITHOUT END MARKER" } else { "NO BEGIN MARKER" };
        println!("NO TELEMETRY: {} ({} LINES CAPTURED)", why, monitor.captured().len());
        std::process::exit(1);
    }

    let rows = monitor.rows();
    for row in &rows {
        let cells: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("{}", cells.join(" "));
    }
    println!("ROWS: {}", rows.len());
    Ok(())
}

fn feed_all<R: io::BufRead>(monitor: &mut MonitorState, reader: LineReader<R>) -> Result<()> {
    for line in reader {
        monitor.feed(&line?);
        if monitor.is_finished() {
            break;
        }
    }
    Ok(())
}
