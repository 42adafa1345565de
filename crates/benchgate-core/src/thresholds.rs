//! 閾値ポリシー（TOML）の読み込みと検証

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::{GateError, Result};
use crate::evidence::MemoryUnit;
use crate::io::read_text;
use crate::samples::SampleSelection;

/// ゲートの種類。必須キー集合・メモリ単位・判定方式がそれぞれ異なる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFlavor {
    /// ストレージエンジン向け（絶対閾値 + waiver）
    Storage,
    /// エージェントランタイム向け（ベースライン比の回帰率）
    Agent,
}

const STORAGE_KEYS: &[&str] = &[
    "query_p50",
    "query_p95",
    "query_p99",
    "index_throughput",
    "peak_memory",
    "error_rate",
];

const AGENT_KEYS: &[&str] = &[
    "p50_regression_review_pct",
    "p95_regression_block_pct",
    "peak_memory_regression_block_pct",
    "error_rate_regression_block_pct",
    "crash_rate_regression_block_pct",
    "baseline_p50_ms",
    "baseline_p95_ms",
    "baseline_peak_memory_mb",
    "baseline_error_rate",
    "baseline_crash_rate",
];

const AGENT_OVERRIDE_KEYS: &[&str] = &[
    "p50_ms_baseline",
    "p50_ms_current",
    "p95_ms_baseline",
    "p95_ms_current",
    "peak_memory_mb_baseline",
    "peak_memory_mb_current",
    "error_rate_baseline",
    "error_rate_current",
    "crash_rate_baseline",
    "crash_rate_current",
];

impl GateFlavor {
    /// 閾値ファイル中の既定セクション名
    pub fn default_section(self) -> &'static str {
        match self {
            GateFlavor::Storage => "qdrant",
            GateFlavor::Agent => "agent",
        }
    }

    pub fn required_threshold_keys(self) -> &'static [&'static str] {
        match self {
            GateFlavor::Storage => STORAGE_KEYS,
            GateFlavor::Agent => AGENT_KEYS,
        }
    }

    /// 事前計算済みメトリクス JSON に必須のキー
    pub fn override_keys(self) -> &'static [&'static str] {
        match self {
            GateFlavor::Storage => STORAGE_KEYS,
            GateFlavor::Agent => AGENT_OVERRIDE_KEYS,
        }
    }

    pub fn memory_unit(self) -> MemoryUnit {
        match self {
            GateFlavor::Storage => MemoryUnit::Gigabytes,
            GateFlavor::Agent => MemoryUnit::Megabytes,
        }
    }

    pub fn default_sample_pattern(self) -> &'static str {
        match self {
            GateFlavor::Storage => "**/wesichain_payload/new/sample.json",
            GateFlavor::Agent => "**/agent_runtime_profiles/*/new/sample.json",
        }
    }

    pub fn sample_selection(self) -> SampleSelection {
        match self {
            GateFlavor::Storage => SampleSelection::Latest,
            GateFlavor::Agent => SampleSelection::All,
        }
    }

    /// waiver による FAIL 抑制を受け付けるか
    pub fn supports_waivers(self) -> bool {
        matches!(self, GateFlavor::Storage)
    }
}

/// メトリクス名 → 数値閾値。必須キーはすべて揃っていることが保証される。
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    pub flavor: GateFlavor,
    values: BTreeMap<String, f64>,
}

impl ThresholdPolicy {
    /// `path` の TOML から `section` を読み込む（`None` なら flavor の既定セクション）
    pub fn load(path: &Path, flavor: GateFlavor, section: Option<&str>) -> Result<Self> {
        let text = read_text(path)?;
        Self::parse(&text, flavor, section)
            .map_err(|e| annotate(e, path))
    }

    pub fn parse(text: &str, flavor: GateFlavor, section: Option<&str>) -> Result<Self> {
        let doc: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| GateError::Format(format!("invalid TOML: {}", e.message())))?;
        let name = section.unwrap_or(flavor.default_section());

        // セクション自体が無い場合も「必須キーがすべて欠落」として報告する
        let empty = toml::Table::new();
        let table = match doc.get(name) {
            Some(toml::Value::Table(t)) => t,
            Some(_) => {
                return Err(GateError::Format(format!("[{name}] must be a table")));
            }
            None => &empty,
        };

        let mut coerced = BTreeMap::new();
        for (key, value) in table {
            coerced.insert(key.clone(), coerce_f64(key, value)?);
        }

        let required = flavor.required_threshold_keys();
        let missing: Vec<&str> =
            required.iter().copied().filter(|k| !coerced.contains_key(*k)).collect();
        if !missing.is_empty() {
            return Err(GateError::missing_keys("missing threshold keys", &sorted(missing)));
        }

        coerced.retain(|k, _| required.contains(&k.as_str()));
        log::debug!("loaded {} thresholds from [{name}]", coerced.len());
        Ok(Self { flavor, values: coerced })
    }

    /// 必須キーの値。ロード時に検証済みなので未知キーのみ `Validation` になる。
    pub fn get(&self, key: &str) -> Result<f64> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| GateError::Validation(format!("unknown threshold key '{key}'")))
    }

    /// waiver の `metric` として許されるキー（昇順）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// 有限値のみ受け付ける
fn coerce_f64(key: &str, value: &toml::Value) -> Result<f64> {
    let number = match value {
        toml::Value::Integer(i) => Ok(*i as f64),
        toml::Value::Float(f) => Ok(*f),
        toml::Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        toml::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| GateError::Format(format!("threshold '{key}' is not numeric: {s:?}"))),
        other => Err(GateError::Format(format!(
            "threshold '{key}' is not numeric: {}",
            other.type_str()
        ))),
    }?;
    if !number.is_finite() {
        return Err(GateError::Format(format!("threshold '{key}' is not finite: {number}")));
    }
    Ok(number)
}

fn sorted(mut keys: Vec<&str>) -> Vec<&str> {
    keys.sort_unstable();
    keys
}

fn annotate(err: GateError, path: &Path) -> GateError {
    match err {
        GateError::Format(msg) => GateError::Format(format!("{msg} in {}", path.display())),
        other => other,
    }
}
