//! WAIVERS 文書の読み込みと検証
//!
//! 汎用 YAML パーサは使わず、次の限定文法だけを受け付ける:
//!
//! ```text
//! waivers:
//!   - metric: query_p95
//!     owner: "storage-team"
//!     reason: known regression in compaction
//!     expiry: 2026-12-31
//!     issue: '#1234'
//! ```
//!
//! または1行の `waivers: []`。空行と行頭 `#` のコメント行は無視する。
//! 想定外の構造は黙って解釈せず、必ず [`GateError::Format`] で失敗させる。

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{GateError, Result};
use crate::io::read_text;

const ROOT_KEY: &str = "waivers:";
const EMPTY_ROOT: &str = "waivers: []";
const MIN_FIELD_INDENT: usize = 2;

/// 必須フィールド（昇順）
pub const REQUIRED_FIELDS: &[&str] = &["expiry", "issue", "metric", "owner", "reason"];

/// パース直後の1レコード（フィールド名 → 値、値は未検証）
pub type WaiverFields = BTreeMap<String, String>;

/// 検証済みの waiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Waiver {
    pub metric: String,
    pub owner: String,
    pub reason: String,
    pub issue: String,
    pub expiry: NaiveDate,
    /// 必須以外のフィールド（保持するが判定には使わない）
    pub extra: BTreeMap<String, String>,
}

/// メトリクス名 → 有効な waiver。同じメトリクスへの waiver は後勝ち。
pub type ActiveWaivers = BTreeMap<String, Waiver>;

#[derive(Debug)]
enum ParseState {
    /// `waivers:` を待っている
    BeforeRoot,
    /// `waivers:` の直後でまだレコードが無い
    InList,
    /// `- ` で始まったレコードを読んでいる
    InRecord(WaiverFields),
}

/// 限定文法の WAIVERS 文書をレコード列に分解する
pub fn parse_waivers(text: &str) -> Result<Vec<WaiverFields>> {
    let mut records = Vec::new();
    let mut state = ParseState::BeforeRoot;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        state = match (state, line.starts_with("- ")) {
            (ParseState::BeforeRoot, _) => match line {
                ROOT_KEY => ParseState::InList,
                EMPTY_ROOT => return Ok(Vec::new()),
                _ => {
                    return Err(GateError::Format(format!(
                        "line {line_no}: expected 'waivers:' root key, found '{raw_line}'"
                    )));
                }
            },
            (ParseState::InList, true) => {
                ParseState::InRecord(start_record(line, line_no, raw_line)?)
            }
            (ParseState::InRecord(prev), true) => {
                records.push(prev);
                ParseState::InRecord(start_record(line, line_no, raw_line)?)
            }
            (ParseState::InList, false) => {
                return Err(GateError::Format(format!(
                    "line {line_no}: field without list item '{raw_line}'"
                )));
            }
            (ParseState::InRecord(mut current), false) => {
                if leading_spaces(raw_line) < MIN_FIELD_INDENT {
                    return Err(GateError::Format(format!(
                        "line {line_no}: invalid indentation '{raw_line}'"
                    )));
                }
                let (key, value) = split_field(line).ok_or_else(|| {
                    GateError::Format(format!("line {line_no}: invalid waiver field '{raw_line}'"))
                })?;
                current.insert(key, value);
                ParseState::InRecord(current)
            }
        };
    }

    if let ParseState::InRecord(current) = state {
        records.push(current);
    }
    Ok(records)
}

/// レコードを検証し、メトリクスごとの有効 waiver を返す。
///
/// `today` より前に期限が切れた waiver が1つでもあれば全体を失敗させる（読み飛ばさない）。
pub fn validate_waivers<'a, I>(
    records: Vec<WaiverFields>,
    allowed_metrics: I,
    today: NaiveDate,
) -> Result<ActiveWaivers>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut allowed: Vec<&str> = allowed_metrics.into_iter().collect();
    allowed.sort_unstable();

    let mut active = ActiveWaivers::new();
    for (idx, mut fields) in records.into_iter().enumerate() {
        let n = idx + 1;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| fields.get(*f).is_none_or(|v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(GateError::missing_keys(
                &format!("waiver #{n} missing required fields"),
                &missing,
            ));
        }

        let mut take = |key: &str| fields.remove(key).unwrap_or_default();
        let metric = take("metric");
        let owner = take("owner");
        let reason = take("reason");
        let issue = take("issue");
        let expiry_text = take("expiry");

        if !allowed.iter().any(|m| *m == metric) {
            return Err(GateError::Validation(format!(
                "waiver #{n} has unknown metric '{metric}', expected one of: {}",
                allowed.join(", ")
            )));
        }

        let expiry = parse_iso_date(&expiry_text).ok_or_else(|| {
            GateError::Validation(format!(
                "waiver #{n} has invalid expiry '{expiry_text}', expected YYYY-MM-DD"
            ))
        })?;
        if expiry < today {
            return Err(GateError::Validation(format!(
                "waiver #{n} for metric '{metric}' expired on {expiry}"
            )));
        }

        if active.contains_key(&metric) {
            log::warn!("waiver #{n} replaces an earlier waiver for '{metric}'");
        }
        active.insert(
            metric.clone(),
            Waiver { metric, owner, reason, issue, expiry, extra: fields },
        );
    }

    log::debug!("{} active waivers", active.len());
    Ok(active)
}

/// WAIVERS 文書を読み込んで検証する
pub fn load_active_waivers<'a, I>(
    path: &Path,
    allowed_metrics: I,
    today: NaiveDate,
) -> Result<ActiveWaivers>
where
    I: IntoIterator<Item = &'a str>,
{
    let text = read_text(path)?;
    let records = parse_waivers(&text).map_err(|e| match e {
        GateError::Format(msg) => {
            GateError::Format(format!("invalid waivers document {}: {msg}", path.display()))
        }
        other => other,
    })?;
    validate_waivers(records, allowed_metrics, today)
}

/// `- ` で始まる行から新しいレコードを作る。
/// ダッシュの後ろに `key: value` があればそれが最初のフィールドになる。
fn start_record(line: &str, line_no: usize, raw_line: &str) -> Result<WaiverFields> {
    let mut record = WaiverFields::new();
    let rest = line[2..].trim();
    if !rest.is_empty() {
        let (key, value) = split_field(rest).ok_or_else(|| {
            GateError::Format(format!("line {line_no}: invalid waiver entry '{raw_line}'"))
        })?;
        record.insert(key, value);
    }
    Ok(record)
}

/// `key: value` を分解する。値は前後の空白を除き、対になった引用符を外す。
fn split_field(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once(':')?;
    Some((key.trim().to_owned(), unquote(value.trim()).to_owned()))
}

fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && matches!(bytes[0], b'"' | b'\'') {
        return &text[1..text.len() - 1];
    }
    text
}

fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ').count()
}

/// `YYYY-MM-DD` のみ受け付ける
fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let b = text.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}
