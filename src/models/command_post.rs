use serde::{Deserialize, Serialize};
use tracing::info;

use crate::events::{ConfirmReason, SimEvent};
use crate::models::{
    agent::Agent,
    common::Position3D,
    target::{Target, TargetState},
    uav::UavState,
    ugv::UgvState,
    world::WorldModel,
};
use crate::scenario::DecisionTuning;

/// ミッションフェーズ（宣言順にのみ進む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionPhase {
    #[default]
    Ready,
    Patrol,
    Rescue,
    Complete,
}

/// 出動候補（確定済みで未割り当ての要救助者）
///
/// 初回検知ティックの昇順（発見が早いものほど優先）に並べて扱います。
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchCandidate {
    pub target_id: String,
    pub first_detected_tick: Option<u64>,
    pub position: Position3D,
}

/// 指揮所（意思決定層）
///
/// 全エージェントの更新後に1ティック1回だけ実行され、個々のエージェントではなく
/// 部隊全体を見て判断します。要救助者の確定、UGV の出動割り当て、
/// 全員救助後の UAV 帰還指令、ミッション完了判定を担当します。
#[derive(Debug, Clone)]
pub struct CommandPost {
    tuning: DecisionTuning,
    base: Position3D,
    ugv_home_radius: f64,
}

impl CommandPost {
    pub fn new(world: &WorldModel) -> Self {
        Self {
            tuning: world.decision.clone(),
            base: world.base(),
            ugv_home_radius: world.ugv.home_radius,
        }
    }

    /// 1ティック分の意思決定を実行
    ///
    /// # 戻り値
    ///
    /// このティックでミッション完了に到達した場合は true（完了イベントは1回だけ発行）
    pub fn decide(
        &self,
        tick: u64,
        phase: &mut MissionPhase,
        targets: &mut [Target],
        agents: &mut [Agent],
        events: &mut Vec<SimEvent>,
    ) -> bool {
        let confirmed = self.confirm_targets(tick, targets, events);
        if confirmed > 0 && *phase == MissionPhase::Patrol {
            info!(tick, "最初の要救助者を確定: 救助フェーズへ移行");
            *phase = MissionPhase::Rescue;
        }

        self.dispatch_rescuers(targets, agents, events);

        let all_rescued = targets.iter().all(|t| t.state() == TargetState::Rescued);
        let all_ugvs_home = self.all_ugvs_home(agents);

        if all_rescued {
            self.recall_uavs(agents, events);
        }

        let all_uavs_home = agents
            .iter()
            .filter_map(Agent::as_uav)
            .all(|uav| uav.state() == UavState::Idle);

        if all_rescued {
            self.stand_down_returned_uavs(agents);
        }

        if all_rescued && all_ugvs_home && all_uavs_home && *phase != MissionPhase::Complete {
            info!(tick, "ミッション完了");
            *phase = MissionPhase::Complete;
            events.push(SimEvent::mission_complete());
            return true;
        }

        false
    }

    /// 要救助者の確定判定
    ///
    /// DETECTED の要救助者について、初回検知からの経過ティックが閾値を超えたか、
    /// 検知UAV数が必要数に達した場合に CONFIRMED にします。
    /// 両方成立した場合の理由はタイムアウトを優先します。
    ///
    /// # 戻り値
    ///
    /// このティックで確定した要救助者数
    pub fn confirm_targets(&self, tick: u64, targets: &mut [Target], events: &mut Vec<SimEvent>) -> usize {
        let mut confirmed = 0;

        for target in targets.iter_mut().filter(|t| t.state() == TargetState::Detected) {
            let Some(reason) = self.confirmation_reason(tick, target) else {
                continue;
            };

            target.confirm();
            confirmed += 1;
            info!(target = %target.id, tick, reason = reason.describe(), "要救助者を確定");
            events.push(SimEvent::target_confirmed(&target.id, reason));
        }

        confirmed
    }

    fn confirmation_reason(&self, tick: u64, target: &Target) -> Option<ConfirmReason> {
        let timed_out = target
            .first_detected_tick()
            .is_some_and(|first| tick.saturating_sub(first) > self.tuning.confirm_timeout_ticks);
        let corroborated = target.detected_by().len() >= self.tuning.confirm_min_detectors;

        if timed_out {
            Some(ConfirmReason::Timeout)
        } else if corroborated {
            Some(ConfirmReason::MultiSensor)
        } else {
            None
        }
    }

    /// 出動候補リストを作成
    ///
    /// CONFIRMED かつどの UGV にも割り当てられていない要救助者を、
    /// 初回検知ティックの昇順で返します（同着は配置順）。
    pub fn dispatch_candidates(&self, targets: &[Target], agents: &[Agent]) -> Vec<DispatchCandidate> {
        let mut candidates: Vec<DispatchCandidate> = targets
            .iter()
            .filter(|t| t.state() == TargetState::Confirmed)
            .filter(|t| !is_assigned(agents, &t.id))
            .map(|t| DispatchCandidate {
                target_id: t.id.clone(),
                first_detected_tick: t.first_detected_tick(),
                position: t.position,
            })
            .collect();

        candidates.sort_by_key(|c| c.first_detected_tick.unwrap_or(u64::MAX));
        candidates
    }

    /// 待機中の UGV を優先度順に割り当てる
    pub fn dispatch_rescuers(&self, targets: &[Target], agents: &mut [Agent], events: &mut Vec<SimEvent>) {
        for candidate in self.dispatch_candidates(targets, agents) {
            if is_assigned(agents, &candidate.target_id) {
                continue;
            }

            let Some(ugv) = agents
                .iter_mut()
                .filter_map(Agent::as_ugv_mut)
                .find(|ugv| ugv.is_available())
            else {
                break;
            };

            ugv.assign(&candidate.target_id, candidate.position);
            info!(ugv = %ugv.id, target = %candidate.target_id, "UGVを出動");
            events.push(SimEvent::ugv_dispatched(&ugv.id, &candidate.target_id));
        }
    }

    /// 全 UGV が待機中、または帰還中で基地近傍にいるか
    fn all_ugvs_home(&self, agents: &[Agent]) -> bool {
        agents.iter().filter_map(Agent::as_ugv).all(|ugv| match ugv.state() {
            UgvState::Standby => true,
            UgvState::Returning => ugv.is_near(&self.base, self.ugv_home_radius),
            _ => false,
        })
    }

    /// 帰還・着陸・待機以外の UAV に帰還を指令
    fn recall_uavs(&self, agents: &mut [Agent], events: &mut Vec<SimEvent>) {
        for uav in agents.iter_mut().filter_map(Agent::as_uav_mut) {
            if matches!(uav.state(), UavState::Return | UavState::Idle | UavState::Landing) {
                continue;
            }
            uav.recall();
            info!(uav = %uav.id, "UAVに帰還を指令");
            events.push(SimEvent::uav_returning(&uav.id));
        }
    }

    /// 帰還中で基地に十分近づいた UAV を待機状態にする
    fn stand_down_returned_uavs(&self, agents: &mut [Agent]) {
        for uav in agents.iter_mut().filter_map(Agent::as_uav_mut) {
            if uav.state() == UavState::Return
                && uav.position.distance_3d(&self.base) < self.tuning.recall_idle_radius
            {
                uav.stand_down();
            }
        }
    }
}

fn is_assigned(agents: &[Agent], target_id: &str) -> bool {
    agents
        .iter()
        .filter_map(Agent::as_ugv)
        .any(|ugv| ugv.assigned_target() == Some(target_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::models::{uav::{Uav, UavRole}, ugv::Ugv};
    use crate::scenario::ScenarioConfig;

    fn command_post() -> CommandPost {
        CommandPost::new(&WorldModel::from_scenario(&ScenarioConfig::default()).unwrap())
    }

    fn detected(id: &str, tick: u64, detectors: &[&str]) -> Target {
        let mut t = Target::new(id.to_string(), Position3D::new(0.0, 0.0, 0.0));
        t.mark_detected(tick, detectors[0]);
        for d in &detectors[1..] {
            t.record_detector(d);
        }
        t
    }

    fn confirmed(id: &str, tick: u64, position: Position3D) -> Target {
        let mut t = Target::new(id.to_string(), position);
        t.mark_detected(tick, "UAV1");
        t.confirm();
        t
    }

    fn ugv(id: &str) -> Agent {
        Agent::Ugv(Ugv::new(id.to_string(), Position3D::new(-50.0, 0.0, 50.0)))
    }

    fn uav(id: &str, state: UavState, position: Position3D) -> Agent {
        let mut uav = Uav::new(id.to_string(), UavRole::Follower, position, vec!["B".to_string()]);
        uav.force_state(state);
        Agent::Uav(uav)
    }

    #[test]
    fn test_timeout_confirmation_requires_strictly_more_than_threshold() {
        let cp = command_post();
        let mut targets = vec![detected("T1", 10, &["UAV1"])];
        let mut events = Vec::new();

        assert_eq!(cp.confirm_targets(50, &mut targets, &mut events), 0);
        assert_eq!(targets[0].state(), TargetState::Detected);

        assert_eq!(cp.confirm_targets(51, &mut targets, &mut events), 1);
        assert_eq!(targets[0].state(), TargetState::Confirmed);
        assert_eq!(events[0].reason, Some(ConfirmReason::Timeout));
    }

    #[test]
    fn test_multi_sensor_confirmation_before_timeout() {
        let cp = command_post();
        let mut targets = vec![detected("T1", 10, &["UAV1", "UAV2"])];
        let mut events = Vec::new();

        cp.confirm_targets(12, &mut targets, &mut events);
        assert_eq!(targets[0].state(), TargetState::Confirmed);
        assert_eq!(events[0].reason, Some(ConfirmReason::MultiSensor));
    }

    #[test]
    fn test_timeout_reason_wins_when_both_hold() {
        let cp = command_post();
        let mut targets = vec![detected("T1", 0, &["UAV1", "UAV2"])];
        let mut events = Vec::new();

        cp.confirm_targets(41, &mut targets, &mut events);
        assert_eq!(events[0].reason, Some(ConfirmReason::Timeout));
    }

    #[test]
    fn test_dispatch_prefers_earliest_discovery() {
        let cp = command_post();
        // T_LATE は先に並んでいるが発見は遅い
        let targets = vec![
            confirmed("T_LATE", 30, Position3D::new(10.0, 0.0, 0.0)),
            confirmed("T_EARLY", 5, Position3D::new(-10.0, 0.0, 0.0)),
        ];
        let mut agents = vec![ugv("UGV1")];
        let mut events = Vec::new();

        cp.dispatch_rescuers(&targets, &mut agents, &mut events);

        let assigned = agents[0].as_ugv().unwrap();
        assert_eq!(assigned.assigned_target(), Some("T_EARLY"));
        assert_eq!(assigned.state(), UgvState::Dispatch);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::UgvDispatched);
    }

    #[test]
    fn test_dispatch_never_double_assigns() {
        let cp = command_post();
        let targets = vec![confirmed("T1", 5, Position3D::default())];
        let mut agents = vec![ugv("UGV1"), ugv("UGV2")];
        let mut events = Vec::new();

        cp.dispatch_rescuers(&targets, &mut agents, &mut events);
        cp.dispatch_rescuers(&targets, &mut agents, &mut events);

        let assigned: Vec<_> = agents
            .iter()
            .filter_map(Agent::as_ugv)
            .filter(|u| u.assigned_target() == Some("T1"))
            .collect();
        assert_eq!(assigned.len(), 1);
        assert_eq!(agents[1].as_ugv().unwrap().state(), UgvState::Standby);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_phase_moves_to_rescue_on_first_confirmation() {
        let cp = command_post();
        let mut phase = MissionPhase::Patrol;
        let mut targets = vec![detected("T1", 1, &["UAV1", "UAV2"])];
        let mut agents = vec![ugv("UGV1")];
        let mut events = Vec::new();

        let complete = cp.decide(2, &mut phase, &mut targets, &mut agents, &mut events);

        assert!(!complete);
        assert_eq!(phase, MissionPhase::Rescue);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::TargetConfirmed, EventKind::UgvDispatched]);
    }

    #[test]
    fn test_recall_after_all_rescued() {
        let cp = command_post();
        let mut phase = MissionPhase::Rescue;
        let mut t = confirmed("T1", 1, Position3D::default());
        t.mark_rescued();
        let mut targets = vec![t];
        let mut agents = vec![
            uav("UAV1", UavState::Patrol, Position3D::new(0.0, 10.0, 0.0)),
            uav("UAV2", UavState::Landing, Position3D::new(-50.0, 3.0, 50.0)),
            ugv("UGV1"),
        ];
        let mut events = Vec::new();

        let complete = cp.decide(100, &mut phase, &mut targets, &mut agents, &mut events);

        assert!(!complete);
        assert_eq!(agents[0].as_uav().unwrap().state(), UavState::Return);
        assert_eq!(agents[1].as_uav().unwrap().state(), UavState::Landing);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::UavReturn);
    }

    #[test]
    fn test_returning_uav_near_base_stands_down() {
        let cp = command_post();
        let mut phase = MissionPhase::Rescue;
        let mut t = confirmed("T1", 1, Position3D::default());
        t.mark_rescued();
        let mut targets = vec![t];
        let mut agents = vec![
            uav("UAV1", UavState::Return, Position3D::new(-50.0, 1.0, 50.5)),
            ugv("UGV1"),
        ];
        let mut events = Vec::new();

        // 強制 IDLE は完了判定の後に効くため、完了は次ティック
        assert!(!cp.decide(200, &mut phase, &mut targets, &mut agents, &mut events));
        assert_eq!(agents[0].as_uav().unwrap().state(), UavState::Idle);

        assert!(cp.decide(201, &mut phase, &mut targets, &mut agents, &mut events));
        assert_eq!(phase, MissionPhase::Complete);
    }

    #[test]
    fn test_completion_emitted_once() {
        let cp = command_post();
        let mut phase = MissionPhase::Rescue;
        let mut t = confirmed("T1", 1, Position3D::default());
        t.mark_rescued();
        let mut targets = vec![t];
        let mut agents = vec![uav("UAV1", UavState::Idle, Position3D::new(-50.0, 0.0, 50.0)), ugv("UGV1")];
        let mut events = Vec::new();

        assert!(cp.decide(300, &mut phase, &mut targets, &mut agents, &mut events));
        assert!(!cp.decide(301, &mut phase, &mut targets, &mut agents, &mut events));

        let completions = events.iter().filter(|e| e.kind == EventKind::MissionComplete).count();
        assert_eq!(completions, 1);
    }
}
