//! ベンチマーク閾値ゲート（ストレージエンジン向け、絶対閾値 + waiver）
//!
//! 使い方:
//!   evaluate_thresholds --thresholds thresholds.toml \
//!       --criterion-root target/criterion --rss-file rss.txt [--waivers WAIVERS.yml]
//!
//! 終了コード: 0 = PASS, 1 = 閾値超過, 2 = 判定前のエラー

use std::path::PathBuf;
use std::process::ExitCode;

use benchgate_core::metrics::DEFAULT_DATASET_SIZE;
use benchgate_core::{run_gate, GateFlavor, GateInputs, MetricsSource};
use benchgate_tools::common::output::{finish, init_logger};
use chrono::{Local, NaiveDate};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate nightly benchmark metrics against locked thresholds")]
struct Cli {
    /// 閾値ファイル（thresholds.toml）
    #[arg(long)]
    thresholds: PathBuf,

    /// criterion の出力ルート
    #[arg(long)]
    criterion_root: PathBuf,

    /// `rss_bytes=<value>` または `/usr/bin/time -v` の出力を含むファイル
    #[arg(long)]
    rss_file: PathBuf,

    /// FAIL を抑制する WAIVERS.yml（省略時は waiver なし）
    #[arg(long)]
    waivers: Option<PathBuf>,

    /// 1回の実行で処理するドキュメント数（throughput 推定用）
    #[arg(long, default_value_t = DEFAULT_DATASET_SIZE)]
    dataset_size: f64,

    /// 事前計算済みメトリクス JSON（指定時は criterion を読まない）
    #[arg(long)]
    metrics_json: Option<PathBuf>,

    /// 閾値ファイルのセクション名
    #[arg(long, default_value = GateFlavor::Storage.default_section())]
    section: String,

    /// criterion ルートからの相対パスに対するサンプルファイルの glob
    #[arg(long, default_value = GateFlavor::Storage.default_sample_pattern())]
    sample_pattern: String,

    /// waiver の期限判定に使う日付（YYYY-MM-DD、省略時はローカル日付）
    #[arg(long)]
    today: Option<NaiveDate>,

    /// 判定結果を JSON でも書き出す
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    let metrics = match cli.metrics_json {
        Some(path) => MetricsSource::Override(path),
        None => MetricsSource::Measured {
            sample_root: cli.criterion_root,
            sample_pattern: Some(cli.sample_pattern),
            evidence: cli.rss_file,
            dataset_size: cli.dataset_size,
        },
    };
    let inputs = GateInputs {
        flavor: GateFlavor::Storage,
        thresholds: cli.thresholds,
        section: Some(cli.section),
        metrics,
        waivers: cli.waivers,
        today: cli.today.unwrap_or_else(|| Local::now().date_naive()),
    };

    finish(run_gate(&inputs), cli.report_json.as_deref())
}
