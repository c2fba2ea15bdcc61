// MARKER DETECTOR
// TWO-STATE SCANNER OVER THE NORMALIZED CONSOLE STREAM.
//
//   OUTSIDE --(BEGIN MARKER)--> INSIDE --(END MARKER)--> FINISHED
//
// INSIDE: EVERY NON-BLANK, NON-SENTINEL LINE IS CAPTURED.
// FINISHED IS TERMINAL. THE CALLER STOPS THE PROCESS AND PARSES THE CAPTURE.
// NO I/O HERE: THE READ LOOP FEEDS LINES, THIS ONLY DECIDES.

use crate::stream::normalize;
use crate::telemetry::{parse_rows, TelemetryRow};

pub const BEGIN_MARKER: &str = "=== Benchmark Begins ===";
pub const END_MARKER: &str = "=== Benchmark End ===";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Scan {
    // OUTSIDE THE WINDOW, LINE IGNORED
    Outside,
    // BEGIN MARKER SEEN (ALSO RETURNED FOR A REPEATED BEGIN WHILE INSIDE)
    Begin,
    Captured,
    // BLANK LINE INSIDE THE WINDOW
    Blank,
    // END MARKER SEEN: WINDOW CLOSED, TERMINATE THE PROCESS
    End,
    // ALREADY FINISHED, LINE IGNORED
    Done,
}

#[derive(Debug, Default)]
pub struct MonitorState {
    in_window: bool,
    finished: bool,
    captured: Vec<String>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    // FEED ONE RAW CONSOLE LINE
    pub fn feed(&mut self, raw: &str) -> Scan {
        self.feed_normalized(&normalize(raw))
    }

    // FEED ONE LINE THAT ALREADY WENT THROUGH stream::normalize
    pub fn feed_normalized(&mut self, line: &str) -> Scan {
        if self.finished {
            return Scan::Done;
        }
        if line.contains(BEGIN_MARKER) {
            self.in_window = true;
            return Scan::Begin;
        }
        if !self.in_window {
            return Scan::Outside;
        }
        if line.contains(END_MARKER) {
            self.in_window = false;
            self.finished = true;
            return Scan::End;
        }
        if line.is_empty() {
            return Scan::Blank;
        }
        self.captured.push(line.to_string());
        Scan::Captured
    }

    pub fn in_window(&self) -> bool {
        self.in_window
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn captured(&self) -> &[String] {
        &self.captured
    }

    // PARSE THE CAPTURE. A WINDOW THAT NEVER CLOSED YIELDS NOTHING:
    // TRUNCATED OUTPUT IS INDISTINGUISHABLE FROM A CRASHED BENCHMARK.
    pub fn rows(&self) -> Vec<TelemetryRow> {
        if !self.finished {
            return Vec::new();
        }
        parse_rows(&self.captured)
    }
}
