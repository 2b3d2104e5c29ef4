use std::collections::BTreeMap;

use crate::models::common::Position3D;
use crate::scenario::{DecisionTuning, ScenarioConfig, UavTuning, UgvTuning};

/// 世界モデル
///
/// 名前付き地点と各種定数をまとめた読み取り専用データです。
/// シミュレーション中に変更されることはなく、全サブシステムから参照されます。
#[derive(Debug, Clone)]
pub struct WorldModel {
    locations: BTreeMap<String, Position3D>,
    base: Position3D,
    patrol_route: Vec<String>,
    pub uav: UavTuning,
    pub ugv: UgvTuning,
    pub decision: DecisionTuning,
}

impl WorldModel {
    /// シナリオ設定から世界モデルを構築
    ///
    /// 基地が未定義の場合は `None` を返します（通常は `ScenarioConfig::validate` 済み）。
    pub fn from_scenario(config: &ScenarioConfig) -> Option<Self> {
        let base = *config.world.locations.get(&config.world.base)?;

        Some(Self {
            locations: config.world.locations.clone(),
            base,
            patrol_route: config.world.patrol_route.clone(),
            uav: config.uav.clone(),
            ugv: config.ugv.clone(),
            decision: config.decision.clone(),
        })
    }

    pub fn location(&self, id: &str) -> Option<Position3D> {
        self.locations.get(id).copied()
    }

    /// 基地（地上）の位置
    pub fn base(&self) -> Position3D {
        self.base
    }

    /// UAV の既定巡回ルート（地点IDの順序付きリスト）
    pub fn patrol_route(&self) -> &[String] {
        &self.patrol_route
    }
}
