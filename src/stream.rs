// LINE STREAM READER
// DEVICE CONSOLES ARE NOT GUARANTEED UTF-8 (SERIAL NOISE, HALF-WRITTEN BYTES
// AFTER RESET). LINES ARE READ AS BYTES AND DECODED LOSSILY.
//
// NORMALIZATION STRIPS THE TERMINAL PROGRAM'S TIMESTAMP PREFIX
// ("2024-01-01 00:00:00,000 # ") AND ONE RESIDUAL LEADING '#'.

use std::io::{self, BufRead};
use std::sync::LazyLock;

use regex::Regex;

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} # ").expect("timestamp pattern")
});

// STRIP TIMESTAMP + COMMENT PREFIX, TRIM SURROUNDING WHITESPACE
pub fn normalize(raw: &str) -> String {
    let line = raw.trim_end_matches(['\n', '\r']);
    let cleaned = TIMESTAMP_PREFIX.replace(line, "");
    let cleaned = match cleaned.strip_prefix('#') {
        Some(rest) => rest,
        None => &*cleaned,
    };
    cleaned.trim().to_string()
}

pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(256),
        }
    }

    // NEXT RAW LINE WITHOUT ITS TERMINATOR. Ok(None) AT END OF STREAM.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
