// TELEMETRY PARSER
// CONVERTS THE CAPTURED WINDOW INTO ROWS. PURE FUNCTION OF THE BUFFER.
//
// FORMAT (SEMICOLON-DELIMITED, EMITTED BY THE DEVICE):
//   iteration;load_program_us;init_runtime_us;execution_time_us
//   0;812;40;1532
//   1;806;39;1529
//
// HEADER: FIRST CAPTURED LINE CONTAINING "iteration" (ANY CASE).
// DATA: EVERY LATER LINE CONTAINING ';' WITH THE HEADER'S COLUMN COUNT.
// NO HEADER OR NO DATA IS THE NORMAL "NOTHING USABLE" RESULT, NOT AN ERROR.

use tracing::debug;

pub const DELIMITER: char = ';';
pub const HEADER_KEY: &str = "iteration";

// ONE MEASUREMENT. COLUMNS KEEP HEADER ORDER; ENRICHMENT COLUMNS APPEND.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetryRow {
    columns: Vec<(String, String)>,
}

impl TelemetryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    // INSERT OR OVERWRITE
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    // RESERVED ORDERING COLUMN
    pub fn iteration(&self) -> Option<u64> {
        self.columns
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(HEADER_KEY))
            .and_then(|(_, v)| v.trim().parse().ok())
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(DELIMITER).map(str::trim).collect()
}

pub fn is_header(line: &str) -> bool {
    line.to_ascii_lowercase().contains(HEADER_KEY)
}

pub fn parse_rows(lines: &[String]) -> Vec<TelemetryRow> {
    let Some(header_idx) = lines.iter().position(|l| is_header(l)) else {
        debug!(lines = lines.len(), "no telemetry header in capture");
        return Vec::new();
    };
    let header = split_fields(&lines[header_idx]);

    let mut rows = Vec::new();
    for line in &lines[header_idx + 1..] {
        if !line.contains(DELIMITER) {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() != header.len() {
            // GARBLED SERIAL LINE (DROPPED OR MERGED BYTES)
            debug!(%line, expected = header.len(), got = fields.len(), "skipping malformed row");
            continue;
        }
        let mut row = TelemetryRow::new();
        for (k, v) in header.iter().zip(fields) {
            row.set(*k, v);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        debug!("telemetry header found but no data rows");
    }
    rows
}
