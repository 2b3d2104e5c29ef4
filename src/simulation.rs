//! # Simulation モジュール
//!
//! 捜索救助シミュレーションの中核となるティック処理パイプラインを提供します。
//!
//! シミュレーション状態（エージェント、要救助者、フェーズ、実行モード、乱数）は
//! `MissionState` にまとめられ、`SimulationEngine` だけが所有します。
//! 1ティックの変更はすべて `SimulationEngine::step` の1回の呼び出しの中で完結し、
//! 内部で並列化はしません。
//!
//! ## ティック処理順序
//!
//! 1. **ティック開始**: ティック番号を進め、前ティックのイベントを破棄
//! 2. **ミッション開始**: READY なら PATROL へ移行し、全 UAV に離陸を指令
//! 3. **エージェント処理**: 登録順（UAV → UGV）に1機ずつ更新
//! 4. **指揮所処理**: 確定判定、UGV 出動、帰還指令、完了判定
//! 5. **スナップショット**: 公開状態を組み立てて履歴に追加
//!
//! 途中で `TickError` が発生した場合はティック開始前の状態に巻き戻し、
//! スナップショットは発行しません。
//!
//! ## 使用例
//!
//! ```no_run
//! use sarsim::scenario::ScenarioConfig;
//! use sarsim::simulation::SimulationEngine;
//!
//! let config = ScenarioConfig::from_file("scenarios/default.yaml")?;
//! let mut engine = SimulationEngine::new(config)?;
//! let summary = engine.run_headless(20_000);
//! println!("完了: {}", summary.completed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::control::{CommandError, ControlCommand};
use crate::events::SimEvent;
use crate::models::*;
use crate::scenario::{ScenarioConfig, ScenarioError};
use crate::snapshot::{History, HistoryExport, Snapshot};

/// ティック処理中の障害
///
/// 発生したティックは巻き戻され、次のティックは通常どおり実行されます。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("unknown target referenced: {0}")]
    UnknownTarget(String),

    #[error("unknown location referenced: {0}")]
    UnknownLocation(String),

    #[error("agent {0} has an empty patrol route")]
    EmptyRoute(String),

    #[error("agent {0} has no rescue assignment")]
    MissingAssignment(String),

    #[error("agent {0} produced a non-finite position")]
    NonFinitePosition(String),
}

/// 実行モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Running,
    #[default]
    Paused,
    Complete,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Running => "RUNNING",
            RunMode::Paused => "PAUSED",
            RunMode::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(RunMode::Running),
            "PAUSED" => Ok(RunMode::Paused),
            "COMPLETE" => Ok(RunMode::Complete),
            _ => Err(CommandError::UnknownMode(s.to_string())),
        }
    }
}

/// シミュレーションコンテキスト
///
/// ティック処理パイプラインが排他的に所有する可変状態の全体です。
/// ティック前に丸ごと複製しておき、障害時はその複製に戻します。
#[derive(Debug, Clone)]
pub struct MissionState {
    pub tick: u64,
    pub phase: MissionPhase,
    pub mode: RunMode,
    pub agents: Vec<Agent>,
    pub targets: Vec<Target>,
    pub rng: ChaCha8Rng,
    pub events: Vec<SimEvent>,
}

impl MissionState {
    /// シナリオから初期状態を構築
    ///
    /// エージェントは基地位置＋オフセットに配置され、先頭の UAV が編隊長になります。
    /// 乱数はシナリオのシード値で初期化されます。
    pub fn spawn(config: &ScenarioConfig, world: &WorldModel) -> Result<Self, ScenarioError> {
        let base = world.base();
        let at_base = |offset: &Position3D| Position3D::new(base.x + offset.x, base.y + offset.y, base.z + offset.z);

        let uavs = config.fleet.uavs.iter().enumerate().map(|(i, unit)| {
            let role = if i == 0 { UavRole::Leader } else { UavRole::Follower };
            Agent::Uav(Uav::new(
                unit.id.clone(),
                role,
                at_base(&unit.offset),
                world.patrol_route().to_vec(),
            ))
        });
        let ugvs = config
            .fleet
            .ugvs
            .iter()
            .map(|unit| Agent::Ugv(Ugv::new(unit.id.clone(), at_base(&unit.offset))));
        let agents = uavs.chain(ugvs).collect();

        let targets = config
            .targets
            .iter()
            .map(|spawn| {
                world
                    .location(&spawn.location)
                    .map(|position| Target::new(spawn.id.clone(), position))
                    .ok_or_else(|| {
                        ScenarioError::Validation(format!(
                            "target {} references unknown location {}",
                            spawn.id, spawn.location
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tick: 0,
            phase: MissionPhase::Ready,
            mode: RunMode::Paused,
            agents,
            targets,
            rng: ChaCha8Rng::seed_from_u64(config.sim.seed),
            events: Vec::new(),
        })
    }

    pub fn capture(&self) -> Snapshot {
        Snapshot::capture(self.tick, self.phase, self.mode, &self.agents, &self.targets, &self.events)
    }
}

/// ヘッドレス実行の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub phase: MissionPhase,
    pub mode: RunMode,
    pub rescued: usize,
    pub targets: usize,
    pub completed: bool,
    /// 実行を打ち切ったティック障害
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

pub struct SimulationEngine {
    world: WorldModel,
    command_post: CommandPost,
    initial: MissionState,
    state: MissionState,
    history: History,
}

impl SimulationEngine {
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        config.validate()?;

        let world = WorldModel::from_scenario(&config)
            .ok_or_else(|| ScenarioError::Validation(format!("base location {} is not defined", config.world.base)))?;
        let initial = MissionState::spawn(&config, &world)?;
        let command_post = CommandPost::new(&world);
        let history = History::new(config.sim.history_limit);

        info!(
            scenario = %config.meta.name,
            agents = initial.agents.len(),
            targets = initial.targets.len(),
            seed = config.sim.seed,
            "シミュレーションエンジンを初期化"
        );

        Ok(Self {
            world,
            command_post,
            state: initial.clone(),
            initial,
            history,
        })
    }

    /// 1ティック進める
    ///
    /// 実行モードが RUNNING 以外の場合は何もせず `Ok(None)` を返します。
    ///
    /// # 戻り値
    ///
    /// 発行したスナップショット。障害時は状態をティック前に戻して `TickError` を返します。
    pub fn step(&mut self) -> Result<Option<Snapshot>, TickError> {
        if self.state.mode != RunMode::Running {
            return Ok(None);
        }

        let checkpoint = self.state.clone();
        match self.advance() {
            Ok(snapshot) => {
                self.history.push(snapshot.clone());
                Ok(Some(snapshot))
            }
            Err(e) => {
                error!(tick = checkpoint.tick + 1, error = %e, "ティック処理に失敗、状態を巻き戻し");
                self.state = checkpoint;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Snapshot, TickError> {
        let state = &mut self.state;
        state.tick += 1;
        state.events.clear();

        if state.phase == MissionPhase::Ready {
            info!(tick = state.tick, "ミッション開始: 巡回フェーズへ移行");
            state.phase = MissionPhase::Patrol;
            for uav in state.agents.iter_mut().filter_map(Agent::as_uav_mut) {
                uav.command_takeoff();
            }
        }

        for i in 0..state.agents.len() {
            let neighbors: Vec<Position3D> = state
                .agents
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, agent)| agent.get_position())
                .collect();

            let mut ctx = TickContext {
                tick: state.tick,
                world: &self.world,
                targets: &mut state.targets,
                neighbors: &neighbors,
                rng: &mut state.rng,
                events: &mut state.events,
            };
            let agent = &mut state.agents[i];
            agent.update(&mut ctx)?;

            if !agent.get_position().is_finite() {
                return Err(TickError::NonFinitePosition(agent.get_id().to_string()));
            }
        }

        let completed = self.command_post.decide(
            state.tick,
            &mut state.phase,
            &mut state.targets,
            &mut state.agents,
            &mut state.events,
        );
        if completed {
            state.mode = RunMode::Complete;
        }

        Ok(state.capture())
    }

    /// 制御コマンドをティック境界で適用
    ///
    /// 受理した場合は適用後のスナップショットを返します（イベントはリセット時のみ）。
    /// 拒否した場合は状態を変更しません。
    ///
    /// ミッション完了後は、一時停止を挟んでもリセットするまで RUNNING を受け付けません。
    pub fn apply(&mut self, command: ControlCommand) -> Result<Snapshot, CommandError> {
        match command {
            ControlCommand::SetMode { mode } => {
                let finished = self.state.phase == MissionPhase::Complete || self.state.mode == RunMode::Complete;
                if mode == RunMode::Running && finished {
                    warn!(from = %self.state.mode, "ミッション完了後の RUNNING 指令を拒否");
                    return Err(CommandError::MissionComplete);
                }
                debug!(from = %self.state.mode, to = %mode, "実行モード変更");
                self.state.mode = mode;

                // 直近ティックのイベントは配信済み
                let mut snapshot = self.state.capture();
                snapshot.events.clear();
                Ok(snapshot)
            }
            ControlCommand::Reset => {
                info!("シミュレーションをリセット");
                self.state = self.initial.clone();
                self.state.events.push(SimEvent::reset());
                self.history.clear();
                Ok(self.state.capture())
            }
        }
    }

    /// RUNNING にして完了または上限ティックまで実行
    ///
    /// ティック障害が起きた場合はそのティックを巻き戻した状態で一時停止し、
    /// 障害内容を `RunSummary::fault` に記録して返します。
    pub fn run_headless(&mut self, max_ticks: u64) -> RunSummary {
        info!(max_ticks, "=== ヘッドレス実行開始 ===");
        if self.state.mode == RunMode::Paused {
            self.state.mode = RunMode::Running;
        }

        let mut fault = None;
        while self.state.mode == RunMode::Running && self.state.tick < max_ticks {
            if let Err(e) = self.step() {
                warn!(tick = self.state.tick, error = %e, "ティック障害によりヘッドレス実行を中断");
                self.state.mode = RunMode::Paused;
                fault = Some(format!("tick {} failed: {}", self.state.tick + 1, e));
                break;
            }
            if self.state.tick % 1_000 == 0 {
                info!(tick = self.state.tick, phase = ?self.state.phase, "進行状況");
            }
        }

        let summary = RunSummary { fault, ..self.summary() };
        info!(ticks = summary.ticks, completed = summary.completed, "=== ヘッドレス実行終了 ===");
        summary
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.state.tick,
            phase: self.state.phase,
            mode: self.state.mode,
            rescued: self
                .state
                .targets
                .iter()
                .filter(|t| t.state() == TargetState::Rescued)
                .count(),
            targets: self.state.targets.len(),
            completed: self.state.phase == MissionPhase::Complete,
            fault: None,
        }
    }

    /// 現在の状態（直近ティックのイベントを含む）
    pub fn current_snapshot(&self) -> Snapshot {
        self.state.capture()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_export(&self) -> HistoryExport {
        self.history.export()
    }

    pub fn tick(&self) -> u64 {
        self.state.tick
    }

    pub fn phase(&self) -> MissionPhase {
        self.state.phase
    }

    pub fn mode(&self) -> RunMode {
        self.state.mode
    }

    pub fn agents(&self) -> &[Agent] {
        &self.state.agents
    }

    pub fn targets(&self) -> &[Target] {
        &self.state.targets
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.state.agents.iter().find(|a| a.get_id() == id)
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.state.targets.iter().find(|t| t.id == id)
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    #[cfg(test)]
    pub(crate) fn mission_mut(&mut self) -> &mut MissionState {
        &mut self.state
    }
}
