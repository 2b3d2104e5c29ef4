//! スナップショットと履歴
//!
//! スナップショットは1ティック分の外部公開状態で、生成後は変更されません。
//! 観測側（配信・問い合わせ）はこれだけを読み、エージェントの実体には触れません。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::events::SimEvent;
use crate::models::{
    Agent, AgentBehavior, AgentType, IAgent, IMovable, MissionPhase, Position3D, Target,
    TargetState, UavRole,
};
use crate::simulation::RunMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub state: AgentBehavior,
    #[serde(flatten)]
    pub position: Position3D,
    /// UGV は `null`
    #[serde(default)]
    pub role: Option<UavRole>,
}

impl From<&Agent> for AgentView {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.get_id().to_string(),
            agent_type: agent.agent_type(),
            state: agent.behavior(),
            position: agent.get_position(),
            role: agent.role(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetView {
    pub id: String,
    pub state: TargetState,
    #[serde(flatten)]
    pub position: Position3D,
    pub detected_by: Vec<String>,
}

impl From<&Target> for TargetView {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id.clone(),
            state: target.state(),
            position: target.position,
            detected_by: target.detected_by().to_vec(),
        }
    }
}

/// 1ティック分の外部公開状態
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub mission_phase: MissionPhase,
    pub sim_mode: RunMode,
    pub agents: Vec<AgentView>,
    pub targets: Vec<TargetView>,
    pub events: Vec<SimEvent>,
}

impl Snapshot {
    pub fn capture(
        tick: u64,
        phase: MissionPhase,
        mode: RunMode,
        agents: &[Agent],
        targets: &[Target],
        events: &[SimEvent],
    ) -> Self {
        Self {
            tick,
            mission_phase: phase,
            sim_mode: mode,
            agents: agents.iter().map(AgentView::from).collect(),
            targets: targets.iter().map(TargetView::from).collect(),
            events: events.to_vec(),
        }
    }

    pub fn agent(&self, id: &str) -> Option<&AgentView> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn target(&self, id: &str) -> Option<&TargetView> {
        self.targets.iter().find(|t| t.id == id)
    }
}

/// 履歴の一括エクスポート形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryExport {
    /// 保持上限により破棄された古いティック数
    pub dropped_ticks: u64,
    pub snapshots: Vec<Snapshot>,
}

/// リセット以降のスナップショット履歴
///
/// 上限付きのリングバッファです。上限を超えると最古のものから破棄し、
/// 破棄数を記録します。`limit` が `None` の場合は無制限に保持します。
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    limit: Option<usize>,
    dropped: u64,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            snapshots: VecDeque::new(),
            limit,
            dropped: 0,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if let Some(limit) = self.limit {
            if limit == 0 {
                self.dropped += 1;
                return;
            }
            while self.snapshots.len() >= limit {
                self.snapshots.pop_front();
                self.dropped += 1;
            }
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn export(&self) -> HistoryExport {
        HistoryExport {
            dropped_ticks: self.dropped,
            snapshots: self.snapshots.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Uav, Ugv};

    fn empty(tick: u64) -> Snapshot {
        Snapshot::capture(tick, MissionPhase::Patrol, RunMode::Running, &[], &[], &[])
    }

    #[test]
    fn test_history_drops_oldest_beyond_limit() {
        let mut history = History::new(Some(3));
        for tick in 1..=5 {
            history.push(empty(tick));
        }

        let export = history.export();
        assert_eq!(export.dropped_ticks, 2);
        let ticks: Vec<u64> = export.snapshots.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
        assert_eq!(history.dropped(), 2);
    }

    #[test]
    fn test_unbounded_history_keeps_everything() {
        let mut history = History::new(None);
        for tick in 1..=100 {
            history.push(empty(tick));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.dropped(), 0);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_snapshot_json_layout() {
        let agents = vec![
            Agent::Uav(Uav::new(
                "UAV1".to_string(),
                UavRole::Leader,
                Position3D::new(-50.0, 0.0, 50.0),
                vec!["B".to_string()],
            )),
            Agent::Ugv(Ugv::new("UGV1".to_string(), Position3D::new(-45.0, 0.0, 50.0))),
        ];
        let targets = vec![Target::new("T1".to_string(), Position3D::new(-20.0, 0.0, 20.0))];
        let snapshot = Snapshot::capture(0, MissionPhase::Ready, RunMode::Paused, &agents, &targets, &[]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["mission_phase"], "READY");
        assert_eq!(json["sim_mode"], "PAUSED");
        assert_eq!(json["agents"][0]["type"], "UAV");
        assert_eq!(json["agents"][0]["state"], "IDLE");
        assert_eq!(json["agents"][0]["role"], "LEADER");
        assert_eq!(json["agents"][0]["x"], -50.0);
        assert!(json["agents"][1]["role"].is_null());
        let keys = |i: usize| {
            let mut keys: Vec<String> = json["agents"][i].as_object().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        };
        assert_eq!(keys(0), keys(1));
        assert_eq!(json["targets"][0]["state"], "UNSEEN");
        assert_eq!(json["targets"][0]["z"], 20.0);
        assert_eq!(json["targets"][0]["detected_by"], serde_json::json!([]));

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
