//! 回帰率ゲート（エージェントランタイム向け）
//!
//! ベースラインからの回帰率を閾値と比べる。p50 は advisory（REVIEW を出すだけ）、
//! p95・ピークメモリ・エラー率・クラッシュ率はそれぞれ独立に blocking。
//! このゲートに waiver は無い。

use std::fmt;

use serde::Serialize;

use super::{GateReport, MetricOutcome, MetricStatus, Verdict};
use crate::error::Result;
use crate::metrics::MetricSet;
use crate::thresholds::{GateFlavor, ThresholdPolicy};

/// 閾値超過時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Review,
    Block,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Review => "review",
            Tier::Block => "block",
        })
    }
}

/// 回帰率の算出元
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionDetail {
    pub baseline: f64,
    pub current: f64,
    pub tier: Tier,
}

struct RegressionCheck {
    label: &'static str,
    /// REVIEW 行での呼び名
    short: &'static str,
    /// メトリクス JSON のキー接頭辞（`<prefix>_baseline` / `<prefix>_current`）
    prefix: &'static str,
    threshold_key: &'static str,
    tier: Tier,
}

const CHECKS: &[RegressionCheck] = &[
    RegressionCheck {
        label: "p50 latency",
        short: "p50",
        prefix: "p50_ms",
        threshold_key: "p50_regression_review_pct",
        tier: Tier::Review,
    },
    RegressionCheck {
        label: "p95 latency",
        short: "p95",
        prefix: "p95_ms",
        threshold_key: "p95_regression_block_pct",
        tier: Tier::Block,
    },
    RegressionCheck {
        label: "peak memory",
        short: "peak memory",
        prefix: "peak_memory_mb",
        threshold_key: "peak_memory_regression_block_pct",
        tier: Tier::Block,
    },
    RegressionCheck {
        label: "error rate",
        short: "error rate",
        prefix: "error_rate",
        threshold_key: "error_rate_regression_block_pct",
        tier: Tier::Block,
    },
    RegressionCheck {
        label: "crash rate",
        short: "crash rate",
        prefix: "crash_rate",
        threshold_key: "crash_rate_regression_block_pct",
        tier: Tier::Block,
    },
];

/// ベースライン比の回帰率（%）。
///
/// ベースラインが 0 の場合は 0 除算を避け、現在値も 0 なら 0、そうでなければ 100 とする。
pub fn regression_pct(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        if current == 0.0 {
            return 0.0;
        }
        return 100.0;
    }
    (current - baseline) / baseline * 100.0
}

pub fn evaluate(metrics: &MetricSet, thresholds: &ThresholdPolicy) -> Result<GateReport> {
    let mut outcomes = Vec::with_capacity(CHECKS.len());
    let mut advisories = Vec::new();
    let mut blockers = Vec::new();

    for check in CHECKS {
        let baseline = metrics.get(&format!("{}_baseline", check.prefix))?;
        let current = metrics.get(&format!("{}_current", check.prefix))?;
        let threshold = thresholds.get(check.threshold_key)?;
        let regression = regression_pct(current, baseline);

        let status = match (regression > threshold, check.tier) {
            (false, _) => MetricStatus::Pass,
            (true, Tier::Review) => {
                advisories.push(check.short.to_owned());
                MetricStatus::Review
            }
            (true, Tier::Block) => {
                blockers.push(check.label.to_owned());
                MetricStatus::Fail
            }
        };

        outcomes.push(MetricOutcome {
            metric: check.label.to_owned(),
            value: regression,
            threshold,
            status,
            regression: Some(RegressionDetail { baseline, current, tier: check.tier }),
            waiver: None,
        });
    }

    let verdict = if blockers.is_empty() { Verdict::Pass } else { Verdict::Block };
    log::debug!("regression gate: {} blocking, {} advisory", blockers.len(), advisories.len());

    Ok(GateReport {
        flavor: GateFlavor::Agent,
        outcomes,
        verdict,
        advisories,
        blockers,
        waived: Vec::new(),
    })
}
