//! ベンチマーク結果によるリリースゲート判定エンジン
//!
//! criterion のサンプル出力（または事前計算済みメトリクス JSON）と RSS 計測結果から
//! メトリクスを組み立て、TOML の閾値ポリシーと WAIVERS 文書に照らして
//! PASS / FAIL / BLOCK を判定する。
//!
//! 判定方式は2種類:
//! - [`GateFlavor::Storage`]: 絶対閾値 + waiver による抑制
//! - [`GateFlavor::Agent`]: ベースライン比の回帰率 + advisory / blocking の2段階

pub mod error;
pub mod evidence;
pub mod gate;
pub mod io;
pub mod metrics;
pub mod percentile;
pub mod samples;
pub mod thresholds;
pub mod waivers;

pub use error::{GateError, Result};
pub use gate::{
    run_gate, EvaluationPolicy, GateInputs, GateReport, MetricOutcome, MetricStatus, Verdict,
};
pub use metrics::{MetricSet, MetricsSource};
pub use percentile::percentile;
pub use thresholds::{GateFlavor, ThresholdPolicy};
pub use waivers::{ActiveWaivers, Waiver};
