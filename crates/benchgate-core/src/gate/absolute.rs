//! 絶対閾値ゲート（ストレージエンジン向け）
//!
//! レイテンシ・メモリ・エラー率は `値 <= 閾値`、throughput は `値 >= 閾値` で PASS。
//! FAIL したメトリクスに有効な waiver があれば WAIVED として抑制する（重大度の区別なし）。

use super::{GateReport, MetricOutcome, MetricStatus, Verdict};
use crate::error::Result;
use crate::metrics::MetricSet;
use crate::thresholds::{GateFlavor, ThresholdPolicy};
use crate::waivers::ActiveWaivers;

#[derive(Debug, Clone, Copy)]
enum Comparison {
    AtMost,
    AtLeast,
}

impl Comparison {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::AtMost => value <= threshold,
            Comparison::AtLeast => value >= threshold,
        }
    }
}

/// 表示順
const CHECKS: &[(&str, Comparison)] = &[
    ("query_p50", Comparison::AtMost),
    ("query_p95", Comparison::AtMost),
    ("query_p99", Comparison::AtMost),
    ("index_throughput", Comparison::AtLeast),
    ("peak_memory", Comparison::AtMost),
    ("error_rate", Comparison::AtMost),
];

pub fn evaluate(
    metrics: &MetricSet,
    thresholds: &ThresholdPolicy,
    waivers: &ActiveWaivers,
) -> Result<GateReport> {
    let mut outcomes = Vec::with_capacity(CHECKS.len());
    let mut blockers = Vec::new();
    let mut waived = Vec::new();

    for &(metric, cmp) in CHECKS {
        let value = metrics.get(metric)?;
        let threshold = thresholds.get(metric)?;

        let (status, waiver) = if cmp.holds(value, threshold) {
            (MetricStatus::Pass, None)
        } else if let Some(w) = waivers.get(metric) {
            waived.push(metric.to_owned());
            (MetricStatus::Waived, Some(w.clone()))
        } else {
            blockers.push(metric.to_owned());
            (MetricStatus::Fail, None)
        };

        outcomes.push(MetricOutcome {
            metric: metric.to_owned(),
            value,
            threshold,
            status,
            regression: None,
            waiver,
        });
    }

    waived.sort();
    let verdict = if blockers.is_empty() { Verdict::Pass } else { Verdict::Fail };
    log::debug!("absolute gate: {} failed, {} waived", blockers.len(), waived.len());

    Ok(GateReport {
        flavor: GateFlavor::Storage,
        outcomes,
        verdict,
        advisories: Vec::new(),
        blockers,
        waived,
    })
}
