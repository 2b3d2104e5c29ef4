//! # sarsim
//!
//! UAV による捜索と UGV による救助を組み合わせた、ティック駆動の協調捜索救助シミュレーション。
//!
//! - [`models`]: 世界モデル、エージェント（UAV / UGV / 要救助者）、ステアリング、指揮所
//! - [`simulation`]: ティック処理パイプラインと制御コマンドの適用
//! - [`driver`]: 固定周期でエンジンを駆動する非同期ドライバ
//! - [`snapshot`]: 外部公開状態と履歴
//! - [`scenario`]: YAML シナリオ設定

pub mod control;
pub mod driver;
pub mod events;
pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
pub mod snapshot;

#[cfg(test)]
mod tests;
