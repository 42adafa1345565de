use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const THRESHOLDS: &str = "\
[qdrant]
query_p50 = 100
query_p95 = 200
query_p99 = 300
index_throughput = 1500
peak_memory = 8.0
error_rate = 0.01
";

const PASSING_METRICS: &str = r#"{
  "query_p50": 50,
  "query_p95": 90,
  "query_p99": 99,
  "index_throughput": 2000,
  "peak_memory": 4.0,
  "error_rate": 0.0
}"#;

const SLOW_P50_METRICS: &str = r#"{
  "query_p50": 120,
  "query_p95": 90,
  "query_p99": 99,
  "index_throughput": 2000,
  "peak_memory": 4.0,
  "error_rate": 0.0
}"#;

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, body).unwrap();
    path
}

fn waiver_doc(metric: &str, expiry: &str) -> String {
    format!(
        "waivers:\n  - metric: {metric}\n    owner: storage-team\n    reason: \"known compaction regression\"\n    expiry: {expiry}\n    issue: '#321'\n"
    )
}

/// --metrics-json モードのコマンド（criterion / rss は存在しなくてよい）
fn override_cmd(dir: &Path, metrics: &str) -> Command {
    let thresholds = write(dir, "thresholds.toml", THRESHOLDS);
    let metrics = write(dir, "metrics.json", metrics);
    let mut cmd = Command::cargo_bin("evaluate_thresholds").unwrap();
    cmd.arg("--thresholds")
        .arg(&thresholds)
        .arg("--criterion-root")
        .arg(dir.join("criterion"))
        .arg("--rss-file")
        .arg(dir.join("rss.txt"))
        .arg("--metrics-json")
        .arg(&metrics)
        .args(["--today", "2026-10-16"]);
    cmd
}

#[test]
fn test_all_thresholds_satisfied() {
    let tmp = tempfile::tempdir().unwrap();
    override_cmd(tmp.path(), PASSING_METRICS)
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("Benchmark threshold evaluation\n"))
        .stdout(predicate::str::contains("- query_p50: value=50.0000 threshold=100.0000 status=PASS"))
        .stdout(predicate::str::contains("All thresholds satisfied"));
}

#[test]
fn test_failing_metric_exits_one() {
    let tmp = tempfile::tempdir().unwrap();
    override_cmd(tmp.path(), SLOW_P50_METRICS)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("- query_p50: value=120.0000 threshold=100.0000 status=FAIL"))
        .stdout(predicate::str::contains("One or more thresholds failed: query_p50"))
        .stdout(predicate::str::contains("All thresholds satisfied").not());
}

#[test]
fn test_active_waiver_suppresses_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let waivers = write(tmp.path(), "WAIVERS.yml", &waiver_doc("query_p50", "2026-10-16"));
    override_cmd(tmp.path(), SLOW_P50_METRICS)
        .arg("--waivers")
        .arg(&waivers)
        .assert()
        .code(0)
        .stdout(predicate::str::contains(
            "status=WAIVED owner=storage-team issue=#321 expiry=2026-10-16",
        ))
        .stdout(predicate::str::contains("Threshold failures waived for metrics: query_p50"))
        .stdout(predicate::str::contains("All thresholds satisfied"));
}

#[test]
fn test_empty_waiver_list_suppresses_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let waivers = write(tmp.path(), "WAIVERS.yml", "# no exceptions\nwaivers: []\n");
    override_cmd(tmp.path(), SLOW_P50_METRICS)
        .arg("--waivers")
        .arg(&waivers)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("status=FAIL"));
}

#[test]
fn test_expired_waiver_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let waivers = write(tmp.path(), "WAIVERS.yml", &waiver_doc("query_p95", "2026-10-15"));
    // query_p95 自体は PASS していても期限切れは判定前エラー
    override_cmd(tmp.path(), PASSING_METRICS)
        .arg("--waivers")
        .arg(&waivers)
        .assert()
        .code(2)
        .stdout(predicate::eq(
            "error: waiver #1 for metric 'query_p95' expired on 2026-10-15\n",
        ));
}

#[test]
fn test_unknown_waiver_metric_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let waivers = write(tmp.path(), "WAIVERS.yml", &waiver_doc("query_p90", "2027-01-01"));
    override_cmd(tmp.path(), PASSING_METRICS)
        .arg("--waivers")
        .arg(&waivers)
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "error: waiver #1 has unknown metric 'query_p90', expected one of: error_rate, \
             index_throughput, peak_memory, query_p50, query_p95, query_p99",
        ));
}

#[test]
fn test_malformed_waiver_document_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let waivers = write(tmp.path(), "WAIVERS.yml", "exceptions:\n  - metric: query_p50\n");
    override_cmd(tmp.path(), PASSING_METRICS)
        .arg("--waivers")
        .arg(&waivers)
        .assert()
        .code(2)
        .stdout(predicate::str::starts_with("error: invalid waivers document"));
}

#[test]
fn test_missing_threshold_keys_are_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cmd = override_cmd(tmp.path(), PASSING_METRICS);
    write(tmp.path(), "thresholds.toml", "[qdrant]\nquery_p50 = 100\n");
    cmd.assert().code(2).stdout(predicate::eq(
        "error: missing threshold keys: error_rate, index_throughput, peak_memory, query_p95, \
         query_p99\n",
    ));
}

#[test]
fn test_report_json_written() {
    let tmp = tempfile::tempdir().unwrap();
    let report = tmp.path().join("gate.json");
    override_cmd(tmp.path(), SLOW_P50_METRICS)
        .arg("--report-json")
        .arg(&report)
        .assert()
        .code(1);

    let value: serde_json::Value = serde_json::from_slice(&fs::read(&report).unwrap()).unwrap();
    assert_eq!(value["overall"], "FAIL");
    assert_eq!(value["exit_code"], 1);
    assert_eq!(value["report"]["outcomes"][0]["metric"], "query_p50");
    assert_eq!(value["report"]["outcomes"][0]["status"], "FAIL");
}

#[test]
fn test_measured_mode_from_criterion_samples() {
    let tmp = tempfile::tempdir().unwrap();
    let thresholds = write(tmp.path(), "thresholds.toml", THRESHOLDS);
    // 1呼び出しあたり 10, 20, 30, 40 ms → p50 = 25 ms, throughput = 40000/s
    write(
        tmp.path(),
        "criterion/wesichain_payload/new/sample.json",
        r#"{"iters":[1.0,2.0,3.0,4.0],"times":[10000000.0,40000000.0,90000000.0,160000000.0]}"#,
    );
    let rss = write(tmp.path(), "time.txt", "\tMaximum resident set size (kbytes): 2097152\n");

    Command::cargo_bin("evaluate_thresholds")
        .unwrap()
        .arg("--thresholds")
        .arg(&thresholds)
        .arg("--criterion-root")
        .arg(tmp.path().join("criterion"))
        .arg("--rss-file")
        .arg(&rss)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("- query_p50: value=25.0000"))
        .stdout(predicate::str::contains("- index_throughput: value=40000.0000"))
        .stdout(predicate::str::contains("- peak_memory: value=2.0000 threshold=8.0000 status=PASS"))
        .stdout(predicate::str::contains("- error_rate: value=0.0000"));
}

#[test]
fn test_missing_criterion_samples_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let thresholds = write(tmp.path(), "thresholds.toml", THRESHOLDS);
    let rss = write(tmp.path(), "rss.txt", "rss_bytes=1073741824\n");
    fs::create_dir_all(tmp.path().join("criterion")).unwrap();

    Command::cargo_bin("evaluate_thresholds")
        .unwrap()
        .arg("--thresholds")
        .arg(&thresholds)
        .arg("--criterion-root")
        .arg(tmp.path().join("criterion"))
        .arg("--rss-file")
        .arg(&rss)
        .assert()
        .code(2)
        .stdout(predicate::str::starts_with("error: criterion samples matching"));
}

#[test]
fn test_bad_rss_evidence_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let thresholds = write(tmp.path(), "thresholds.toml", THRESHOLDS);
    write(
        tmp.path(),
        "criterion/wesichain_payload/new/sample.json",
        r#"{"iters":[1],"times":[1000000]}"#,
    );
    let rss = write(tmp.path(), "rss.txt", "VmRSS: 1000 kB\n");

    Command::cargo_bin("evaluate_thresholds")
        .unwrap()
        .arg("--thresholds")
        .arg(&thresholds)
        .arg("--criterion-root")
        .arg(tmp.path().join("criterion"))
        .arg("--rss-file")
        .arg(&rss)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("expected rss_bytes=<value>"));
}
