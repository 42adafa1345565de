//! ゲート結果の出力と終了コードへの変換
//!
//! 標準出力にはレポート本文と `error: <message>` 行だけを書く。ログは env_logger 経由で stderr へ。

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use benchgate_core::{GateError, GateReport};
use serde_json::json;

/// 判定前のエラー（入力不備・検証失敗）の終了コード
pub const EXIT_ERROR: u8 = 2;

/// env_logger を初期化する。既定は warn 以上。
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

/// ゲート実行結果を表示し、終了コードを返す
pub fn finish(result: Result<GateReport, GateError>, report_json: Option<&Path>) -> ExitCode {
    let report = match result {
        Ok(report) => report,
        Err(err) => return fail(&err.into()),
    };

    print!("{report}");
    if let Some(path) = report_json {
        if let Err(err) = write_report_json(&report, path) {
            return fail(&err);
        }
    }
    log::info!("gate verdict: {}", report.overall());
    ExitCode::from(report.exit_code())
}

/// `error: <message>` を出力して終了コード 2 を返す
pub fn fail(err: &anyhow::Error) -> ExitCode {
    println!("error: {err:#}");
    ExitCode::from(EXIT_ERROR)
}

fn write_report_json(report: &GateReport, path: &Path) -> Result<()> {
    let payload = json!({
        "overall": report.overall(),
        "exit_code": report.exit_code(),
        "report": report,
    });
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, text + "\n")
        .with_context(|| format!("failed to write report JSON {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchgate_core::{GateFlavor, Verdict};

    fn report(verdict: Verdict) -> GateReport {
        GateReport {
            flavor: GateFlavor::Agent,
            outcomes: Vec::new(),
            verdict,
            advisories: Vec::new(),
            blockers: vec!["p95 latency".to_owned()],
            waived: Vec::new(),
        }
    }

    #[test]
    fn test_report_json_contains_verdict() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gate.json");
        write_report_json(&report(Verdict::Block), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["overall"], "BLOCK");
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["report"]["flavor"], "agent");
        assert_eq!(value["report"]["blockers"][0], "p95 latency");
    }

    #[test]
    fn test_report_json_unwritable_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing_dir/gate.json");
        let err = write_report_json(&report(Verdict::Pass), &path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to write report JSON"));
    }
}
