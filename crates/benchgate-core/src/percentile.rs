//! 線形補間によるパーセンタイル推定（NumPy 既定 / R type-7 と同値）

use crate::error::{GateError, Result};

/// `values` の `p` 分位点（`p` は `[0, 1]`）を返す。
///
/// 昇順に並べた上で順位 `(n-1) * p` の前後の順序統計量を線形補間する。
/// 入力順や NaN 以外の値に対して決定的で、同一入力なら常にビット単位で同じ結果になる。
pub fn percentile(values: &[f64], p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(GateError::Validation(format!(
            "percentile rank must be within [0, 1], got {p}"
        )));
    }
    if values.is_empty() {
        return Err(GateError::EmptyResult("percentile requires at least one value".to_owned()));
    }
    if values.len() == 1 {
        return Ok(values[0]);
    }

    let mut ordered = values.to_vec();
    ordered.sort_by(f64::total_cmp);

    let idx = (ordered.len() - 1) as f64 * p;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return Ok(ordered[lo]);
    }

    let weight = idx - lo as f64;
    Ok(ordered[lo] + (ordered[hi] - ordered[lo]) * weight)
}
