//! ゲート判定のエラー型
//!
//! どのエラーも「判定に到達できなかった」ことを表し、CLI では exit code 2 に写像される。
//! 閾値超過そのものはエラーではなく [`crate::Verdict`] として返す。

/// Gate engine errors
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    /// 必須の入力ファイル / サンプルが存在しない
    #[error("{0}")]
    NotFound(String),

    /// 構造的に不正な入力（型違い、配列長不一致、文法違反）
    #[error("{0}")]
    Format(String),

    /// 構造は正しいがポリシー上不正（必須キー欠落、未知メトリクス、日付不正、期限切れ）
    #[error("{0}")]
    Validation(String),

    /// 入力は正しいが有効なデータ点が1つも得られない
    #[error("{0}")]
    EmptyResult(String),
}

impl GateError {
    /// 欠落キーをまとめて1つの Validation エラーにする
    pub(crate) fn missing_keys(context: &str, missing: &[&str]) -> Self {
        GateError::Validation(format!("{context}: {}", missing.join(", ")))
    }
}

/// Result type for gate operations
pub type Result<T> = std::result::Result<T, GateError>;
