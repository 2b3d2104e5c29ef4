//! # Scenario モジュール
//!
//! 捜索救助シミュレーションのシナリオ設定（YAML）を読み込みます。
//!
//! すべてのセクションに既定値があるため、シナリオファイルを省略した場合や
//! 一部だけ記述した場合でも、標準ミッション（基地A・捜索点B・C、要救助者3名、
//! UAV 3機、UGV 2台）がそのまま構成されます。

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Position3D;

/// 実時間ドライバで扱える周期（ティック/秒）
pub const TICK_RATE_RANGE: RangeInclusive<f64> = 0.01..=1_000.0;

/// 座標・パラメータとして受け付ける絶対値の上限
pub const MAX_MAGNITUDE: f64 = 1.0e6;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

impl Default for ScenarioMeta {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: "default-sar".to_string(),
            description: "UAV 3機・UGV 2台による標準捜索救助ミッション".to_string(),
        }
    }
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 実時間ドライバの周期（ティック/秒）
    pub tick_rate_hz: f64,
    /// パトロール揺らぎ用乱数のシード値
    pub seed: u64,
    /// ヘッドレス実行時の最大ティック数
    pub max_ticks: u64,
    /// 履歴の保持上限（None で無制限）
    pub history_limit: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 5.0,
            seed: 42,
            max_ticks: 20_000,
            history_limit: Some(18_000),
        }
    }
}

/// 世界設定（名前付き地点・基地・巡回ルート）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldConfig {
    pub locations: BTreeMap<String, Position3D>,
    pub base: String,
    pub patrol_route: Vec<String>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        let locations = [
            ("A", Position3D::new(-50.0, 0.0, 50.0)),
            ("B", Position3D::new(0.0, 0.0, 0.0)),
            ("C", Position3D::new(60.0, 0.0, -60.0)),
            ("T1", Position3D::new(-20.0, 0.0, 20.0)),
            ("T2", Position3D::new(0.0, 0.0, 0.0)),
            ("T3", Position3D::new(60.0, 0.0, -60.0)),
        ]
        .into_iter()
        .map(|(id, pos)| (id.to_string(), pos))
        .collect();

        Self {
            locations,
            base: "A".to_string(),
            patrol_route: vec!["B".to_string(), "C".to_string(), "A".to_string()],
        }
    }
}

/// UAV の運動・知覚パラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UavTuning {
    pub max_speed: f64,
    pub slow_radius: f64,
    pub separation_radius: f64,
    pub separation_weight: f64,
    /// 目的地までこの距離より遠い場合のみ分離項を加える
    pub separation_min_distance: f64,
    pub cruise_altitude: f64,
    pub climb_rate: f64,
    pub waypoint_radius: f64,
    /// 巡回点に加える水平方向の揺らぎ幅（±）
    pub jitter: f64,
    pub detection_radius: f64,
    pub corroboration_radius: f64,
    pub hover_ticks: u64,
    pub return_radius: f64,
    pub landed_altitude: f64,
}

impl Default for UavTuning {
    fn default() -> Self {
        Self {
            max_speed: 1.0,
            slow_radius: 10.0,
            separation_radius: 2.0,
            separation_weight: 2.0,
            separation_min_distance: 5.0,
            cruise_altitude: 10.0,
            climb_rate: 1.0,
            waypoint_radius: 5.0,
            jitter: 2.0,
            detection_radius: 10.0,
            corroboration_radius: 5.0,
            hover_ticks: 60,
            return_radius: 5.0,
            landed_altitude: 0.5,
        }
    }
}

/// UGV の運動・救助パラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UgvTuning {
    pub max_speed: f64,
    pub slow_radius: f64,
    pub arrival_radius: f64,
    pub rescue_ticks: u32,
    pub home_radius: f64,
}

impl Default for UgvTuning {
    fn default() -> Self {
        Self {
            max_speed: 0.5,
            slow_radius: 5.0,
            arrival_radius: 5.0,
            rescue_ticks: 40,
            home_radius: 5.0,
        }
    }
}

/// 意思決定層のパラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionTuning {
    /// 初回検知からこのティック数を超えたら確定
    pub confirm_timeout_ticks: u64,
    /// 確定に必要な検知UAV数
    pub confirm_min_detectors: usize,
    /// 帰還中UAVを強制的に IDLE にする基地からの距離
    pub recall_idle_radius: f64,
}

impl Default for DecisionTuning {
    fn default() -> Self {
        Self {
            confirm_timeout_ticks: 40,
            confirm_min_detectors: 2,
            recall_idle_radius: 2.0,
        }
    }
}

/// 配備するエージェント1機分の設定（基地からのオフセットで配置）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnitConfig {
    pub id: String,
    #[serde(default)]
    pub offset: Position3D,
}

impl UnitConfig {
    fn new(id: &str, x: f64, z: f64) -> Self {
        Self {
            id: id.to_string(),
            offset: Position3D::new(x, 0.0, z),
        }
    }
}

/// 部隊編成
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    pub uavs: Vec<UnitConfig>,
    pub ugvs: Vec<UnitConfig>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            uavs: vec![
                UnitConfig::new("UAV1", 0.0, 0.0),
                UnitConfig::new("UAV2", 2.0, 2.0),
                UnitConfig::new("UAV3", -2.0, -2.0),
            ],
            ugvs: vec![UnitConfig::new("UGV1", 5.0, 0.0), UnitConfig::new("UGV2", -5.0, 0.0)],
        }
    }
}

/// 要救助者の配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetSpawnConfig {
    pub id: String,
    pub location: String,
}

fn default_targets() -> Vec<TargetSpawnConfig> {
    ["T1", "T2", "T3"]
        .into_iter()
        .map(|id| TargetSpawnConfig {
            id: id.to_string(),
            location: id.to_string(),
        })
        .collect()
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub world: WorldConfig,
    pub uav: UavTuning,
    pub ugv: UgvTuning,
    pub decision: DecisionTuning,
    pub fleet: FleetConfig,
    pub targets: Vec<TargetSpawnConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            meta: ScenarioMeta::default(),
            sim: SimulationConfig::default(),
            world: WorldConfig::default(),
            uav: UavTuning::default(),
            ugv: UgvTuning::default(),
            decision: DecisionTuning::default(),
            fleet: FleetConfig::default(),
            targets: default_targets(),
        }
    }
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み（ファイルを介さないテスト・組み込み用）
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !TICK_RATE_RANGE.contains(&self.sim.tick_rate_hz) {
            return Err(ScenarioError::Validation(format!(
                "tick_rate_hz must be within {}..={}, got {}",
                TICK_RATE_RANGE.start(),
                TICK_RATE_RANGE.end(),
                self.sim.tick_rate_hz
            )));
        }

        for (id, position) in &self.world.locations {
            check_position(&format!("location '{}'", id), position)?;
        }
        for unit in self.fleet.uavs.iter().chain(&self.fleet.ugvs) {
            check_position(&format!("offset of '{}'", unit.id), &unit.offset)?;
        }

        if !self.world.locations.contains_key(&self.world.base) {
            return Err(ScenarioError::Validation(format!(
                "base location '{}' is not defined",
                self.world.base
            )));
        }

        if self.world.patrol_route.is_empty() {
            return Err(ScenarioError::Validation("patrol_route must not be empty".to_string()));
        }
        for waypoint in &self.world.patrol_route {
            if !self.world.locations.contains_key(waypoint) {
                return Err(ScenarioError::Validation(format!(
                    "patrol waypoint '{}' is not defined",
                    waypoint
                )));
            }
        }

        if self.fleet.uavs.is_empty() || self.fleet.ugvs.is_empty() {
            return Err(ScenarioError::Validation(
                "fleet needs at least one UAV and one UGV".to_string(),
            ));
        }

        let mut agent_ids = HashSet::new();
        for unit in self.fleet.uavs.iter().chain(&self.fleet.ugvs) {
            if !agent_ids.insert(unit.id.as_str()) {
                return Err(ScenarioError::Validation(format!("duplicate agent id '{}'", unit.id)));
            }
        }

        let mut target_ids = HashSet::new();
        for target in &self.targets {
            if !target_ids.insert(target.id.as_str()) {
                return Err(ScenarioError::Validation(format!(
                    "duplicate target id '{}'",
                    target.id
                )));
            }
            if !self.world.locations.contains_key(&target.location) {
                return Err(ScenarioError::Validation(format!(
                    "target {} references unknown location '{}'",
                    target.id, target.location
                )));
            }
        }

        let positive = [
            ("uav.max_speed", self.uav.max_speed),
            ("uav.slow_radius", self.uav.slow_radius),
            ("uav.separation_radius", self.uav.separation_radius),
            ("uav.cruise_altitude", self.uav.cruise_altitude),
            ("uav.climb_rate", self.uav.climb_rate),
            ("uav.waypoint_radius", self.uav.waypoint_radius),
            ("uav.detection_radius", self.uav.detection_radius),
            ("uav.corroboration_radius", self.uav.corroboration_radius),
            ("uav.return_radius", self.uav.return_radius),
            ("ugv.max_speed", self.ugv.max_speed),
            ("ugv.slow_radius", self.ugv.slow_radius),
            ("ugv.arrival_radius", self.ugv.arrival_radius),
            ("ugv.home_radius", self.ugv.home_radius),
            ("decision.recall_idle_radius", self.decision.recall_idle_radius),
        ];
        for (name, value) in positive {
            check_magnitude(name, value)?;
            if value <= 0.0 {
                return Err(ScenarioError::Validation(format!("{} must be positive", name)));
            }
        }

        let non_negative = [
            ("uav.separation_weight", self.uav.separation_weight),
            ("uav.separation_min_distance", self.uav.separation_min_distance),
            ("uav.jitter", self.uav.jitter),
            ("uav.landed_altitude", self.uav.landed_altitude),
        ];
        for (name, value) in non_negative {
            check_magnitude(name, value)?;
            if value < 0.0 {
                return Err(ScenarioError::Validation(format!("{} must not be negative", name)));
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("周期: {:.1} ティック/秒", self.sim.tick_rate_hz);
        println!("最大ティック数: {}", self.sim.max_ticks);
        println!("シード値: {}", self.sim.seed);
        match self.sim.history_limit {
            Some(limit) => println!("履歴保持上限: {} ティック", limit),
            None => println!("履歴保持上限: なし"),
        }
        println!();

        println!("=== 世界 ===");
        println!("基地: {}", self.world.base);
        println!("巡回ルート: {}", self.world.patrol_route.join(" -> "));
        println!();

        println!("=== 部隊 ===");
        let uav_ids: Vec<&str> = self.fleet.uavs.iter().map(|u| u.id.as_str()).collect();
        let ugv_ids: Vec<&str> = self.fleet.ugvs.iter().map(|u| u.id.as_str()).collect();
        println!("UAV: {}機 ({})", uav_ids.len(), uav_ids.join(", "));
        println!("UGV: {}台 ({})", ugv_ids.len(), ugv_ids.join(", "));
        println!();

        println!("=== 要救助者 ===");
        for target in &self.targets {
            println!("  {} @ {}", target.id, target.location);
        }
    }
}

/// 有限かつ `MAX_MAGNITUDE` 以内であることを確認
fn check_magnitude(name: &str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value.abs() <= MAX_MAGNITUDE {
        Ok(())
    } else {
        Err(ScenarioError::Validation(format!(
            "{} must be finite and within ±{}, got {}",
            name, MAX_MAGNITUDE, value
        )))
    }
}

fn check_position(name: &str, position: &Position3D) -> Result<(), ScenarioError> {
    check_magnitude(&format!("{}.x", name), position.x)?;
    check_magnitude(&format!("{}.y", name), position.y)?;
    check_magnitude(&format!("{}.z", name), position.z)
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {1}", .0.display())]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    Validation(String),
}
