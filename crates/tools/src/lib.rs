//! ベンチマーク閾値ゲートの CLI 共通処理

pub mod common;
