//! criterion の `sample.json` を探索し、1呼び出しあたりのミリ秒値に縮約する

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{GateError, Result};
use crate::io::read_text;

const NS_PER_MS: f64 = 1_000_000.0;

/// 候補ファイルが複数見つかったときの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSelection {
    /// 更新時刻が最新の1ファイルのみ（同時刻ならパス文字列の大きい方）
    Latest,
    /// 全候補をパス順に連結
    All,
}

/// サンプル探索の設定
#[derive(Debug, Clone)]
pub struct SampleQuery {
    /// 探索ルート（criterion の出力ディレクトリ）
    pub root: PathBuf,
    /// ルートからの相対パスに対する glob パターン
    pub pattern: String,
    pub selection: SampleSelection,
}

/// 1回の計測（`iters` 回の合計が `total_ns`）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub iters: f64,
    pub total_ns: f64,
}

impl RawSample {
    /// 1呼び出しあたりのミリ秒。反復回数が正でなければ `None`
    pub fn per_call_ms(&self) -> Option<f64> {
        if self.iters <= 0.0 {
            return None;
        }
        Some(self.total_ns / self.iters / NS_PER_MS)
    }
}

/// `query` に一致するサンプルファイルを読み、1呼び出しあたりのミリ秒値を返す
pub fn load_sample_times_ms(query: &SampleQuery) -> Result<Vec<f64>> {
    let candidates = find_candidates(&query.root, &query.pattern)?;
    if candidates.is_empty() {
        return Err(GateError::NotFound(format!(
            "criterion samples matching '{}' not found under {}",
            query.pattern,
            query.root.display()
        )));
    }

    match query.selection {
        SampleSelection::Latest => {
            let path = select_latest(candidates);
            log::info!("using criterion sample {}", path.display());
            let values = reduce_samples(&read_samples(&path)?);
            if values.is_empty() {
                return Err(GateError::EmptyResult(format!(
                    "no benchmark values found in {}",
                    path.display()
                )));
            }
            Ok(values)
        }
        SampleSelection::All => {
            let mut paths: Vec<PathBuf> = candidates.into_iter().map(|(p, _)| p).collect();
            paths.sort();
            let mut values = Vec::new();
            for path in &paths {
                let before = values.len();
                values.extend(reduce_samples(&read_samples(path)?));
                log::debug!("{}: {} values", path.display(), values.len() - before);
            }
            log::info!("pooled {} values from {} sample files", values.len(), paths.len());
            if values.is_empty() {
                return Err(GateError::EmptyResult(format!(
                    "no benchmark values found in samples matching '{}'",
                    query.pattern
                )));
            }
            Ok(values)
        }
    }
}

/// ゼロ反復のサンプルを除外して1呼び出しあたりのミリ秒値へ変換する
pub fn reduce_samples(samples: &[RawSample]) -> Vec<f64> {
    samples.iter().filter_map(RawSample::per_call_ms).collect()
}

/// `sample.json` を `iters` / `times` の組に分解する
pub fn read_samples(path: &Path) -> Result<Vec<RawSample>> {
    let text = read_text(path)?;
    parse_samples(&text)
        .map_err(|reason| GateError::Format(format!("invalid sample format in {}: {reason}", path.display())))
}

fn parse_samples(text: &str) -> std::result::Result<Vec<RawSample>, String> {
    let payload: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let iters = numeric_array(&payload, "iters")?;
    let times = numeric_array(&payload, "times")?;
    if iters.len() != times.len() {
        return Err(format!(
            "'iters' has {} entries but 'times' has {}",
            iters.len(),
            times.len()
        ));
    }
    Ok(iters
        .into_iter()
        .zip(times)
        .map(|(iters, total_ns)| RawSample { iters, total_ns })
        .collect())
}

fn numeric_array(payload: &Value, key: &str) -> std::result::Result<Vec<f64>, String> {
    let Some(items) = payload.get(key).and_then(Value::as_array) else {
        return Err(format!("'{key}' must be an array"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, v)| v.as_f64().ok_or_else(|| format!("'{key}[{i}]' is not a number: {v}")))
        .collect()
}

fn find_candidates(root: &Path, pattern: &str) -> Result<Vec<(PathBuf, SystemTime)>> {
    let pattern = Pattern::new(pattern)
        .map_err(|e| GateError::Validation(format!("invalid sample pattern '{pattern}': {e}")))?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut found = Vec::new();
    // 存在しないルートや読めないサブディレクトリは「候補なし」として扱う
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !pattern.matches_path_with(rel, options) {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((entry.into_path(), modified));
    }
    Ok(found)
}

fn select_latest(candidates: Vec<(PathBuf, SystemTime)>) -> PathBuf {
    candidates
        .into_iter()
        .max_by(|(pa, ma), (pb, mb)| ma.cmp(mb).then_with(|| pa.cmp(pb)))
        .map(|(p, _)| p)
        .unwrap_or_default()
}
