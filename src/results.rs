// RESULT COLLECTION
// APPEND-ONLY SET OF ENRICHED ROWS, OWNED BY THE SWEEP AND RETURNED TO THE
// CALLER. ROWS OF ONE PAIR ARE APPENDED TOGETHER, AFTER THE PAIR COMPLETES.
//
// PERSISTENCE: CSV, HEADER = SORTED UNION OF ALL COLUMNS.
// SUMMARY: MEAN / SAMPLE STDDEV OF THE TIMING COLUMNS PER
// (BOARD, BENCHMARK, ENVIRONMENT).

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::Path;

use crate::telemetry::TelemetryRow;

pub const TIMING_COLUMNS: [&str; 3] = ["execution_time_us", "init_runtime_us", "load_program_us"];

#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    records: Vec<TelemetryRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnStats {
    pub samples: usize,
    pub mean: f64,
    // NONE WITH FEWER THAN TWO SAMPLES
    pub std: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupSummary {
    pub board: String,
    pub benchmark: String,
    pub environment: String,
    pub stats: BTreeMap<&'static str, ColumnStats>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, rows: Vec<TelemetryRow>) {
        self.records.extend(rows);
    }

    pub fn records(&self) -> &[TelemetryRow] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fieldnames(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.records.iter().flat_map(|r| r.columns()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    pub fn write_csv_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        let fields = self.fieldnames();
        let header: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", header.join(","))?;
        for record in &self.records {
            let cells: Vec<String> = fields
                .iter()
                .map(|f| csv_field(record.get(f).unwrap_or("")))
                .collect();
            writeln!(out, "{}", cells.join(","))?;
        }
        out.flush()
    }

    pub fn write_csv(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.write_csv_to(io::BufWriter::new(file))
    }

    pub fn summary(&self) -> Vec<GroupSummary> {
        let mut groups: BTreeMap<(String, String, String), Vec<&TelemetryRow>> = BTreeMap::new();
        for record in &self.records {
            let key = (
                record.get("board").unwrap_or("").to_string(),
                record.get("benchmark").unwrap_or("").to_string(),
                record.get("environment").unwrap_or("").to_string(),
            );
            groups.entry(key).or_default().push(record);
        }

        groups
            .into_iter()
            .map(|((board, benchmark, environment), rows)| {
                let mut stats = BTreeMap::new();
                for col in TIMING_COLUMNS {
                    let values: Vec<f64> = rows
                        .iter()
                        .filter_map(|r| r.get(col))
                        .filter_map(|v| v.trim().parse::<f64>().ok())
                        .collect();
                    if let Some(s) = column_stats(&values) {
                        stats.insert(col, s);
                    }
                }
                GroupSummary {
                    board,
                    benchmark,
                    environment,
                    stats,
                }
            })
            .collect()
    }

    pub fn print_summary(&self) {
        let groups = self.summary();
        if groups.is_empty() {
            println!("NO RESULTS COLLECTED");
            return;
        }

        println!("\n{}", "=".repeat(100));
        println!("AGGREGATED BENCHMARK RESULTS");
        println!("{}", "=".repeat(100));
        println!("{:<16} {:<14} {:<16} {:>12} {:>10} {:>12} {:>10} {:>12} {:>10}",
            "BOARD", "BENCHMARK", "ENVIRONMENT",
            "EXEC_MEAN", "EXEC_STD", "INIT_MEAN", "INIT_STD", "LOAD_MEAN", "LOAD_STD");
        println!("{}", "-".repeat(100));
        for g in &groups {
            let mut cells = Vec::new();
            for col in TIMING_COLUMNS {
                match g.stats.get(col) {
                    Some(s) => {
                        cells.push(format!("{:>12.2}", s.mean));
                        cells.push(match s.std {
                            Some(std) => format!("{:>10.2}", std),
                            None => format!("{:>10}", "-"),
                        });
                    }
                    None => {
                        cells.push(format!("{:>12}", "-"));
                        cells.push(format!("{:>10}", "-"));
                    }
                }
            }
            println!("{:<16} {:<14} {:<16} {}", g.board, g.benchmark, g.environment, cells.join(" "));
        }
        println!("TOTAL DATA POINTS: {}", self.len());
    }
}

fn column_stats(values: &[f64]) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };
    Some(ColumnStats { samples: n, mean, std })
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
