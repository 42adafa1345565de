//! ベンチマーク回帰ゲート（エージェントランタイム向け、ベースライン比の回帰率）
//!
//! 使い方:
//!   evaluate_agent_thresholds --thresholds agent-thresholds.toml --metrics-json metrics.json
//!   evaluate_agent_thresholds --thresholds agent-thresholds.toml \
//!       --criterion-root target/criterion --rss-file rss.txt
//!
//! p50 の回帰は REVIEW 表示のみ。p95・メモリ・エラー率・クラッシュ率の超過は BLOCK（exit 1）。

use std::path::PathBuf;
use std::process::ExitCode;

use benchgate_core::metrics::DEFAULT_DATASET_SIZE;
use benchgate_core::{run_gate, GateError, GateFlavor, GateInputs, MetricsSource};
use benchgate_tools::common::output::{finish, init_logger};
use chrono::Local;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate agent benchmark regressions against threshold policy")]
struct Cli {
    /// 閾値ファイル（agent-thresholds.toml）
    #[arg(long)]
    thresholds: PathBuf,

    /// criterion の出力ルート（--metrics-json 省略時に必須）
    #[arg(long)]
    criterion_root: Option<PathBuf>,

    /// `rss_bytes=<value>` または `/usr/bin/time -v` の出力を含むファイル（--metrics-json 省略時に必須）
    #[arg(long)]
    rss_file: Option<PathBuf>,

    /// ベンチマークジョブとの互換用。このゲートでは使わない
    #[arg(long, default_value_t = DEFAULT_DATASET_SIZE)]
    dataset_size: f64,

    /// baseline / current の組を含むメトリクス JSON
    #[arg(long)]
    metrics_json: Option<PathBuf>,

    /// 閾値ファイルのセクション名
    #[arg(long, default_value = GateFlavor::Agent.default_section())]
    section: String,

    /// criterion ルートからの相対パスに対するサンプルファイルの glob（一致した全ファイルを合算）
    #[arg(long, default_value = GateFlavor::Agent.default_sample_pattern())]
    sample_pattern: String,

    /// 判定結果を JSON でも書き出す
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn metrics_source(cli: &Cli) -> Result<MetricsSource, GateError> {
    if let Some(path) = &cli.metrics_json {
        return Ok(MetricsSource::Override(path.clone()));
    }
    match (&cli.criterion_root, &cli.rss_file) {
        (Some(root), Some(rss)) => Ok(MetricsSource::Measured {
            sample_root: root.clone(),
            sample_pattern: Some(cli.sample_pattern.clone()),
            evidence: rss.clone(),
            dataset_size: cli.dataset_size,
        }),
        _ => Err(GateError::Validation(
            "--criterion-root and --rss-file are required without --metrics-json".to_owned(),
        )),
    }
}

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    let result = metrics_source(&cli).and_then(|metrics| {
        run_gate(&GateInputs {
            flavor: GateFlavor::Agent,
            thresholds: cli.thresholds.clone(),
            section: Some(cli.section.clone()),
            metrics,
            waivers: None,
            // 回帰率ゲートは waiver を読まないので期限判定にも使われない
            today: Local::now().date_naive(),
        })
    });

    finish(result, cli.report_json.as_deref())
}
