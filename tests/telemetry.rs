// TELEMETRY EXTRACTION
// CONSOLE TRANSCRIPTS -> MARKER DETECTOR -> TELEMETRY PARSER
//
// NO PROCESSES, NO I/O. EVERY CASE FEEDS LINES THE WAY THE READ LOOP DOES.

use riotbench::marker::{MonitorState, Scan, BEGIN_MARKER, END_MARKER};
use riotbench::stream::LineReader;
use riotbench::telemetry::parse_rows;

fn scan(lines: &[&str]) -> MonitorState {
    let mut state = MonitorState::new();
    for line in lines {
        state.feed(line);
    }
    state
}

// ---------------------------------------------------------------------------
// CONCRETE SCENARIOS
// ---------------------------------------------------------------------------

#[test]
fn timestamped_console_single_row() {
    let state = scan(&[
        "2024-01-01 00:00:00,000 # === Benchmark Begins ===",
        "2024-01-01 00:00:00,100 # iteration;value",
        "2024-01-01 00:00:00,200 # 1;42",
        "2024-01-01 00:00:00,300 # === Benchmark End ===",
    ]);
    let rows = state.rows();
    assert_eq!(rows.len(), 1);
    let cols: Vec<(&str, &str)> = rows[0].iter().collect();
    assert_eq!(cols, vec![("iteration", "1"), ("value", "42")]);
}

#[test]
fn abrupt_end_mid_window_yields_nothing() {
    let state = scan(&[
        "2024-01-01 00:00:00,000 # === Benchmark Begins ===",
        "2024-01-01 00:00:00,100 # iteration;value",
        "2024-01-01 00:00:00,200 # 1;42",
    ]);
    assert!(state.in_window());
    assert!(!state.is_finished());
    assert_eq!(state.captured().len(), 2);
    assert!(state.rows().is_empty());
}

#[test]
fn no_begin_marker_yields_nothing() {
    let state = scan(&["main(): This is RIOT!", "iteration;value", "1;42", END_MARKER]);
    assert!(!state.is_finished());
    assert!(state.captured().is_empty());
    assert!(state.rows().is_empty());
}

#[test]
fn boot_noise_and_trailing_output_are_ignored() {
    let state = scan(&[
        "Help: Press s to start test, r to print it is ready",
        "main(): This is RIOT! (Version: 2024.01)",
        BEGIN_MARKER,
        "",
        "iteration;load_program_us;init_runtime_us;execution_time_us",
        "0;812;40;1532",
        "1;806;39;1529",
        "2;809;41;1530",
        END_MARKER,
        "3;999;99;9999",
    ]);
    let rows = state.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("execution_time_us"), Some("1530"));
    assert_eq!(rows[1].iteration(), Some(1));
}

#[test]
fn lines_after_end_report_done() {
    let mut state = MonitorState::new();
    assert_eq!(state.feed(BEGIN_MARKER), Scan::Begin);
    assert_eq!(state.feed("iteration;v"), Scan::Captured);
    assert_eq!(state.feed(""), Scan::Blank);
    assert_eq!(state.feed(END_MARKER), Scan::End);
    assert_eq!(state.feed(BEGIN_MARKER), Scan::Done);
    assert_eq!(state.feed("0;1"), Scan::Done);
}

#[test]
fn header_without_data_is_empty_not_error() {
    let state = scan(&[BEGIN_MARKER, "iteration;value", END_MARKER]);
    assert!(state.is_finished());
    assert!(state.rows().is_empty());
}

#[test]
fn garbled_rows_are_dropped() {
    let state = scan(&[
        BEGIN_MARKER,
        "iteration;a;b",
        "0;1;2",
        "1;1",
        "2;1;2;3",
        "3;4;5",
        END_MARKER,
    ]);
    let iterations: Vec<u64> = state.rows().iter().filter_map(|r| r.iteration()).collect();
    assert_eq!(iterations, vec![0, 3]);
}

#[test]
fn reads_crlf_and_invalid_utf8_from_serial() {
    let raw: &[u8] = b"=== Benchmark Begins ===\r\niteration;value\r\n7;\xff\r\n=== Benchmark End ===\r\n";
    let mut state = MonitorState::new();
    for line in LineReader::new(raw) {
        state.feed(&line.unwrap());
    }
    let rows = state.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("iteration"), Some("7"));
    assert_eq!(rows[0].get("value"), Some("\u{fffd}"));
}

// ---------------------------------------------------------------------------
// PROPERTIES
// ---------------------------------------------------------------------------

#[test]
fn row_count_matches_data_lines() {
    for n in [1usize, 2, 5, 20] {
        let mut lines = vec![BEGIN_MARKER.to_string(), "iteration;x;y".to_string()];
        for i in 0..n {
            lines.push(format!("{};{};{}", i, i * 2, i * 3));
        }
        lines.push(END_MARKER.to_string());

        let mut state = MonitorState::new();
        for l in &lines {
            state.feed(l);
        }
        let rows = state.rows();
        assert_eq!(rows.len(), n);
        for row in &rows {
            let cols: Vec<&str> = row.columns().collect();
            assert_eq!(cols, vec!["iteration", "x", "y"]);
        }
    }
}

#[test]
fn parser_is_pure_over_the_buffer() {
    let state = scan(&[BEGIN_MARKER, "iteration;value", "0;10", "1;11", END_MARKER]);
    let first = parse_rows(state.captured());
    let second = parse_rows(state.captured());
    assert_eq!(first, second);
    assert_eq!(first, state.rows());
}
