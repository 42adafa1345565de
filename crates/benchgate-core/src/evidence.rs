//! RSS 計測結果（`rss_bytes=<n>` または `/usr/bin/time -v` 出力）からピークメモリを読む

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{GateError, Result};
use crate::io::read_text;

static RSS_BYTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rss_bytes=(.*)$").expect("invalid RSS_BYTES_RE pattern"));
static MAX_RSS_KB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Maximum resident set size \(kbytes\):(.*)$").expect("invalid MAX_RSS_KB_RE pattern")
});

const KIB: f64 = 1024.0;

/// ゲートごとのメモリ単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemoryUnit {
    Megabytes,
    Gigabytes,
}

impl MemoryUnit {
    fn from_bytes(self, bytes: f64) -> f64 {
        match self {
            MemoryUnit::Megabytes => bytes / (KIB * KIB),
            MemoryUnit::Gigabytes => bytes / (KIB * KIB * KIB),
        }
    }
}

/// `path` の計測結果からピークメモリを `unit` 単位で返す
pub fn load_peak_memory(path: &Path, unit: MemoryUnit) -> Result<f64> {
    let text = read_text(path)?;
    parse_peak_memory(&text, unit).map_err(|e| match e {
        GateError::Format(msg) => GateError::Format(format!("{msg} in {}", path.display())),
        other => other,
    })
}

/// 最初に見つかった `rss_bytes=` 行または `Maximum resident set size (kbytes):` 行を採用する
pub fn parse_peak_memory(text: &str, unit: MemoryUnit) -> Result<f64> {
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if let Some(caps) = RSS_BYTES_RE.captures(line) {
            let bytes = parse_number(&caps[1], "rss_bytes")?;
            log::debug!("peak memory from rss_bytes line: {bytes} bytes");
            return Ok(unit.from_bytes(bytes));
        }
        if let Some(caps) = MAX_RSS_KB_RE.captures(line) {
            let kb = parse_number(&caps[1], "Maximum resident set size")?;
            log::debug!("peak memory from time -v output: {kb} kB");
            return Ok(unit.from_bytes(kb * KIB));
        }
    }
    Err(GateError::Format(
        "expected rss_bytes=<value> or 'Maximum resident set size (kbytes):'".to_owned(),
    ))
}

fn parse_number(text: &str, what: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| GateError::Format(format!("invalid {what} value '{}'", text.trim())))
}
