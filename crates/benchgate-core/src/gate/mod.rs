//! ゲート判定
//!
//! 2つの判定方式を [`EvaluationPolicy`] として切り替える。メトリクスの組み立てと
//! パーセンタイル推定は共通で、違うのは判定方針だけ。

pub mod absolute;
pub mod regression;

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{GateError, Result};
use crate::metrics::{build_metrics, MetricSet, MetricsSource};
use crate::thresholds::{GateFlavor, ThresholdPolicy};
use crate::waivers::{load_active_waivers, ActiveWaivers, Waiver};

pub use regression::{regression_pct, RegressionDetail, Tier};

/// 個々のメトリクスの判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    Pass,
    /// advisory 閾値の超過（ブロックしない）
    Review,
    Fail,
    /// FAIL だが有効な waiver で抑制された
    Waived,
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricStatus::Pass => "PASS",
            MetricStatus::Review => "REVIEW",
            MetricStatus::Fail => "FAIL",
            MetricStatus::Waived => "WAIVED",
        })
    }
}

/// ゲート全体の判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    /// 絶対閾値ゲートの失敗
    Fail,
    /// 回帰率ゲートの blocking 閾値超過
    Block,
}

impl Verdict {
    /// プロセス終了コード（0 = PASS, 1 = ゲート失敗）。判定前のエラーは 2 で、ここには来ない。
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail | Verdict::Block => 1,
        }
    }
}

/// 1メトリクス分の出力行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricOutcome {
    pub metric: String,
    /// 絶対閾値ゲートでは測定値、回帰率ゲートでは回帰率（%）
    pub value: f64,
    pub threshold: f64,
    pub status: MetricStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiver: Option<Waiver>,
}

impl fmt::Display for MetricOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(detail) = &self.regression {
            return write!(
                f,
                "- {} regression: {:.2}% (current={:.4} baseline={:.4}, {}>{:.2}%) status={}",
                self.metric,
                self.value,
                detail.current,
                detail.baseline,
                detail.tier,
                self.threshold,
                self.status
            );
        }
        write!(
            f,
            "- {}: value={:.4} threshold={:.4} status={}",
            self.metric, self.value, self.threshold, self.status
        )?;
        if let Some(w) = &self.waiver {
            write!(f, " owner={} issue={} expiry={}", w.owner, w.issue, w.expiry)?;
        }
        Ok(())
    }
}

/// 判定結果一式。表示用の [`fmt::Display`] と JSON 出力用の [`Serialize`] を持つ。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    pub flavor: GateFlavor,
    pub outcomes: Vec<MetricOutcome>,
    pub verdict: Verdict,
    /// advisory 閾値を超えたメトリクス
    pub advisories: Vec<String>,
    /// ゲートを落としたメトリクス（FAIL / BLOCK の原因）
    pub blockers: Vec<String>,
    /// waiver で抑制されたメトリクス（昇順）
    pub waived: Vec<String>,
}

impl GateReport {
    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }

    /// PASS / REVIEW / FAIL / BLOCK
    pub fn overall(&self) -> &'static str {
        match self.verdict {
            Verdict::Pass if !self.advisories.is_empty() => "REVIEW",
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Block => "BLOCK",
        }
    }
}

impl fmt::Display for GateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.flavor {
            GateFlavor::Storage => writeln!(f, "Benchmark threshold evaluation")?,
            GateFlavor::Agent => writeln!(f, "Agent benchmark threshold evaluation")?,
        }
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        for metric in &self.advisories {
            writeln!(f, "REVIEW: {metric} regression exceeded advisory threshold")?;
        }
        match (self.flavor, self.verdict) {
            (GateFlavor::Storage, Verdict::Pass) => {
                if !self.waived.is_empty() {
                    writeln!(f, "Threshold failures waived for metrics: {}", self.waived.join(", "))?;
                }
                writeln!(f, "All thresholds satisfied")
            }
            (GateFlavor::Agent, Verdict::Pass) => writeln!(f, "PASS: benchmark thresholds satisfied"),
            (_, Verdict::Block) => {
                writeln!(f, "BLOCK: threshold gate failed for {}", self.blockers.join(", "))
            }
            (_, Verdict::Fail) => {
                writeln!(f, "One or more thresholds failed: {}", self.blockers.join(", "))
            }
        }
    }
}

/// 判定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPolicy {
    /// 1メトリクス1閾値の比較 + waiver 抑制
    AbsoluteThreshold,
    /// ベースライン比の回帰率 + advisory / blocking の2段階（waiver なし）
    RegressionPercentage,
}

impl EvaluationPolicy {
    pub fn for_flavor(flavor: GateFlavor) -> Self {
        match flavor {
            GateFlavor::Storage => EvaluationPolicy::AbsoluteThreshold,
            GateFlavor::Agent => EvaluationPolicy::RegressionPercentage,
        }
    }

    pub fn evaluate(
        self,
        metrics: &MetricSet,
        thresholds: &ThresholdPolicy,
        waivers: &ActiveWaivers,
    ) -> Result<GateReport> {
        match self {
            EvaluationPolicy::AbsoluteThreshold => absolute::evaluate(metrics, thresholds, waivers),
            EvaluationPolicy::RegressionPercentage => {
                if !waivers.is_empty() {
                    return Err(GateError::Validation(
                        "waivers are not supported by the regression-percentage gate".to_owned(),
                    ));
                }
                regression::evaluate(metrics, thresholds)
            }
        }
    }
}

/// 1回のゲート実行に必要な入力一式
#[derive(Debug, Clone)]
pub struct GateInputs {
    pub flavor: GateFlavor,
    pub thresholds: PathBuf,
    /// 閾値ファイルのセクション名（`None` なら flavor の既定）
    pub section: Option<String>,
    pub metrics: MetricsSource,
    pub waivers: Option<PathBuf>,
    /// waiver の期限判定に使う日付
    pub today: NaiveDate,
}

/// 閾値読み込み → メトリクス組み立て → waiver 検証 → 判定
pub fn run_gate(inputs: &GateInputs) -> Result<GateReport> {
    let flavor = inputs.flavor;
    let policy = ThresholdPolicy::load(&inputs.thresholds, flavor, inputs.section.as_deref())?;
    let metrics = build_metrics(&inputs.metrics, &policy)?;

    let waivers = match &inputs.waivers {
        Some(path) if flavor.supports_waivers() => {
            load_active_waivers(path, policy.keys(), inputs.today)?
        }
        Some(path) => {
            return Err(GateError::Validation(format!(
                "waivers ({}) are not supported by the {flavor:?} gate",
                path.display()
            )));
        }
        None => ActiveWaivers::new(),
    };

    EvaluationPolicy::for_flavor(flavor).evaluate(&metrics, &policy, &waivers)
}
