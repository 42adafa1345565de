//! 判定対象メトリクスの組み立て
//!
//! 事前計算済み JSON があればそれを採用し、無ければ criterion サンプルと RSS 計測結果から算出する。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{GateError, Result};
use crate::evidence::load_peak_memory;
use crate::io::read_text;
use crate::percentile::percentile;
use crate::samples::{load_sample_times_ms, SampleQuery};
use crate::thresholds::{GateFlavor, ThresholdPolicy};

/// throughput 算出に使う既定のドキュメント数
pub const DEFAULT_DATASET_SIZE: f64 = 1000.0;

/// メトリクスの入力元
#[derive(Debug, Clone)]
pub enum MetricsSource {
    /// 事前計算済みメトリクス JSON（フラットな `名前: 数値`）
    Override(PathBuf),
    /// criterion サンプル + RSS 計測結果
    Measured {
        sample_root: PathBuf,
        /// `None` なら flavor の既定パターン
        sample_pattern: Option<String>,
        evidence: PathBuf,
        dataset_size: f64,
    },
}

/// メトリクス名 → 値。1回の実行で1度だけ作られ、以後変更されない。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSet {
    values: BTreeMap<String, f64>,
}

impl MetricSet {
    pub fn get(&self, key: &str) -> Result<f64> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| GateError::Validation(format!("missing metric '{key}'")))
    }

    /// 事前計算済み JSON を読み、flavor の必須キーがすべて揃っているか検証する
    pub fn parse_override(text: &str, flavor: GateFlavor) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| GateError::Format(format!("invalid metrics JSON: {e}")))?;
        let Some(object) = payload.as_object() else {
            return Err(GateError::Format("metrics JSON must be an object".to_owned()));
        };

        let required = flavor.override_keys();
        let mut missing: Vec<&str> =
            required.iter().copied().filter(|k| !object.contains_key(*k)).collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(GateError::missing_keys("metrics JSON missing keys", &missing));
        }

        let mut values = BTreeMap::new();
        for key in required {
            values.insert((*key).to_owned(), json_f64(key, &object[*key])?);
        }
        Ok(Self { values })
    }

    fn insert(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_owned(), value);
    }
}

impl<const N: usize> From<[(&str, f64); N]> for MetricSet {
    fn from(pairs: [(&str, f64); N]) -> Self {
        let mut set = MetricSet::default();
        for (k, v) in pairs {
            set.insert(k, v);
        }
        set
    }
}

/// `source` からメトリクスを組み立てる
pub fn build_metrics(source: &MetricsSource, policy: &ThresholdPolicy) -> Result<MetricSet> {
    match source {
        MetricsSource::Override(path) => {
            let text = read_text(path)?;
            let metrics = MetricSet::parse_override(&text, policy.flavor).map_err(|e| match e {
                GateError::Format(msg) => GateError::Format(format!("{msg} in {}", path.display())),
                other => other,
            })?;
            log::info!("using precomputed metrics from {}", path.display());
            Ok(metrics)
        }
        MetricsSource::Measured { sample_root, sample_pattern, evidence, dataset_size } => {
            let flavor = policy.flavor;
            let query = SampleQuery {
                root: sample_root.clone(),
                pattern: sample_pattern
                    .clone()
                    .unwrap_or_else(|| flavor.default_sample_pattern().to_owned()),
                selection: flavor.sample_selection(),
            };
            let values = load_sample_times_ms(&query)?;
            match flavor {
                GateFlavor::Storage => measured_storage(&values, evidence, *dataset_size),
                GateFlavor::Agent => measured_agent(&values, evidence, policy),
            }
        }
    }
}

/// 1回の実行あたり `dataset_size` 件を p50 の所要時間で処理したとみなした件数/秒
pub fn throughput(dataset_size: f64, p50_ms: f64) -> f64 {
    if p50_ms > 0.0 {
        dataset_size / (p50_ms / 1000.0)
    } else {
        0.0
    }
}

fn measured_storage(values_ms: &[f64], evidence: &Path, dataset_size: f64) -> Result<MetricSet> {
    let p50 = percentile(values_ms, 0.50)?;
    let p95 = percentile(values_ms, 0.95)?;
    let p99 = percentile(values_ms, 0.99)?;
    let peak_memory = load_peak_memory(evidence, GateFlavor::Storage.memory_unit())?;

    // エラー率の実測入力は無いので 0.0 固定
    Ok(MetricSet::from([
        ("query_p50", p50),
        ("query_p95", p95),
        ("query_p99", p99),
        ("index_throughput", throughput(dataset_size, p50)),
        ("peak_memory", peak_memory),
        ("error_rate", 0.0),
    ]))
}

fn measured_agent(values_ms: &[f64], evidence: &Path, policy: &ThresholdPolicy) -> Result<MetricSet> {
    let p50 = percentile(values_ms, 0.50)?;
    let p95 = percentile(values_ms, 0.95)?;
    let peak_memory_mb = load_peak_memory(evidence, GateFlavor::Agent.memory_unit())?;

    Ok(MetricSet::from([
        ("p50_ms_baseline", policy.get("baseline_p50_ms")?),
        ("p50_ms_current", p50),
        ("p95_ms_baseline", policy.get("baseline_p95_ms")?),
        ("p95_ms_current", p95),
        ("peak_memory_mb_baseline", policy.get("baseline_peak_memory_mb")?),
        ("peak_memory_mb_current", peak_memory_mb),
        ("error_rate_baseline", policy.get("baseline_error_rate")?),
        ("error_rate_current", 0.0),
        ("crash_rate_baseline", policy.get("baseline_crash_rate")?),
        ("crash_rate_current", 0.0),
    ]))
}

fn json_f64(key: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n),
        Some(_) => Err(GateError::Format(format!("metric '{key}' is not finite: {value}"))),
        None => Err(GateError::Format(format!("metric '{key}' is not numeric: {value}"))),
    }
}
