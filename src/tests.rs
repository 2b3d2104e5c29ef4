//! ティック処理・指揮所・ミッション全体を通したシナリオテスト

use std::collections::{HashMap, HashSet};

use crate::control::{CommandError, ControlCommand};
use crate::events::{ConfirmReason, EventKind};
use crate::models::*;
use crate::scenario::{ScenarioConfig, TargetSpawnConfig};
use crate::simulation::{RunMode, SimulationEngine};
use crate::snapshot::Snapshot;

const MISSION_TICK_LIMIT: u64 = 20_000;

fn running(config: ScenarioConfig) -> SimulationEngine {
    let mut engine = SimulationEngine::new(config).unwrap();
    engine.apply(ControlCommand::SetMode { mode: RunMode::Running }).unwrap();
    engine
}

fn step(engine: &mut SimulationEngine) -> Snapshot {
    engine.step().unwrap().expect("engine should be running")
}

/// UAV 1機・UGV 1台に絞った設定
fn single_unit_config() -> ScenarioConfig {
    let mut config = ScenarioConfig::default();
    config.fleet.uavs.truncate(1);
    config.fleet.ugvs.truncate(1);
    config
}

fn events_of(snapshot: &Snapshot, kind: EventKind) -> usize {
    snapshot.events.iter().filter(|e| e.kind == kind).count()
}

// ---- Determinism ----

#[test]
fn test_determinism_same_seed() {
    let mut engine_a = running(ScenarioConfig::default());
    let mut engine_b = running(ScenarioConfig::default());

    for _ in 0..600 {
        let json_a = serde_json::to_string(&step(&mut engine_a)).unwrap();
        let json_b = serde_json::to_string(&step(&mut engine_b)).unwrap();
        assert_eq!(json_a, json_b, "Snapshots diverged with same seed");
    }
}

#[test]
fn test_determinism_different_seeds() {
    let mut config_b = ScenarioConfig::default();
    config_b.sim.seed = 4242;
    let mut engine_a = running(ScenarioConfig::default());
    let mut engine_b = running(config_b);

    let mut diverged = false;
    for _ in 0..200 {
        let json_a = serde_json::to_string(&step(&mut engine_a)).unwrap();
        let json_b = serde_json::to_string(&step(&mut engine_b)).unwrap();
        diverged |= json_a != json_b;
    }
    assert!(diverged, "Patrol jitter should depend on the seed");
}

#[test]
fn test_reset_replays_identical_history() {
    let mut engine = running(ScenarioConfig::default());
    for _ in 0..300 {
        step(&mut engine);
    }
    let first = serde_json::to_string(&engine.history_export()).unwrap();

    engine.apply(ControlCommand::Reset).unwrap();
    engine.apply(ControlCommand::SetMode { mode: RunMode::Running }).unwrap();
    for _ in 0..300 {
        step(&mut engine);
    }
    let second = serde_json::to_string(&engine.history_export()).unwrap();

    assert_eq!(first, second);
}

// ---- Full mission ----

#[test]
fn test_full_mission_invariants_and_completion() {
    let mut engine = running(ScenarioConfig::default());
    let timeout = engine.world().decision.confirm_timeout_ticks;
    let min_detectors = engine.world().decision.confirm_min_detectors;

    let mut last_state: HashMap<String, TargetState> = HashMap::new();
    let mut first_seen: HashMap<String, u64> = HashMap::new();
    let mut last_phase = engine.phase();

    while engine.mode() == RunMode::Running && engine.tick() < MISSION_TICK_LIMIT {
        let snapshot = step(&mut engine);
        let tick = snapshot.tick;

        assert!(snapshot.mission_phase >= last_phase, "phase regressed at tick {}", tick);
        last_phase = snapshot.mission_phase;

        for target in engine.targets() {
            let state = target.state();
            if let Some(prev) = last_state.insert(target.id.clone(), state) {
                assert!(state >= prev, "{} regressed {:?} -> {:?}", target.id, prev, state);
            }

            if let Some(first) = target.first_detected_tick() {
                let recorded = *first_seen.entry(target.id.clone()).or_insert(first);
                assert_eq!(recorded, first, "first detection of {} changed", target.id);
            }

            // 確定条件を満たした DETECTED はそのティックのうちに確定している
            if state == TargetState::Detected {
                let first = target.first_detected_tick().unwrap();
                assert!(tick - first <= timeout, "{} should have timed out", target.id);
                assert!(target.detected_by().len() < min_detectors);
            }
        }

        let mut assigned = HashSet::new();
        for ugv in engine.agents().iter().filter_map(Agent::as_ugv) {
            if let Some(target_id) = ugv.assigned_target() {
                assert!(assigned.insert(target_id.to_string()), "{} assigned twice", target_id);
            }
        }
    }

    assert_eq!(engine.phase(), MissionPhase::Complete, "mission did not finish");
    assert_eq!(engine.mode(), RunMode::Complete);
    assert!(engine.targets().iter().all(|t| t.state() == TargetState::Rescued));

    let history = engine.history_export();
    let completions: usize = history
        .snapshots
        .iter()
        .map(|s| events_of(s, EventKind::MissionComplete))
        .sum();
    assert_eq!(completions, 1);
    let rescues: usize = history
        .snapshots
        .iter()
        .map(|s| events_of(s, EventKind::TargetRescued))
        .sum();
    assert_eq!(rescues, 3);

    // 完了後は進まず、RUNNING も受け付けない
    assert_eq!(engine.step(), Ok(None));
    assert_eq!(
        engine.apply(ControlCommand::SetMode { mode: RunMode::Running }),
        Err(CommandError::MissionComplete)
    );
    let finished_at = engine.tick();
    engine.apply(ControlCommand::SetMode { mode: RunMode::Paused }).unwrap();
    assert_eq!(
        engine.apply(ControlCommand::SetMode { mode: RunMode::Running }),
        Err(CommandError::MissionComplete)
    );
    assert_eq!(engine.step(), Ok(None));
    assert_eq!(engine.tick(), finished_at);
}

#[test]
fn test_headless_run_completes_default_mission() {
    let mut config = ScenarioConfig::default();
    config.sim.history_limit = None;
    let mut engine = SimulationEngine::new(config).unwrap();
    let summary = engine.run_headless(MISSION_TICK_LIMIT);

    assert!(summary.completed);
    assert_eq!(summary.fault, None);
    assert_eq!(summary.mode, RunMode::Complete);
    assert_eq!(summary.rescued, summary.targets);
    assert_eq!(summary.ticks as usize, engine.history().len());
}

// ---- Perception & confirmation ----

#[test]
fn test_detection_on_patrol_approach() {
    // B から A 方向へ 8 離れた地点（A→B の進入経路上）
    let mut config = single_unit_config();
    let offset = 8.0 / 2f64.sqrt();
    config
        .world
        .locations
        .insert("H".to_string(), Position3D::new(-offset, 0.0, offset));
    config.targets = vec![TargetSpawnConfig {
        id: "H1".to_string(),
        location: "H".to_string(),
    }];
    let mut engine = running(config);

    let snapshot = loop {
        let snapshot = step(&mut engine);
        if events_of(&snapshot, EventKind::HumanDetected) > 0 {
            break snapshot;
        }
        assert!(snapshot.tick < 2_000, "target never detected");
    };

    let event = snapshot
        .events
        .iter()
        .find(|e| e.kind == EventKind::HumanDetected)
        .unwrap();
    assert_eq!(event.reason, None);

    let target = snapshot.target("H1").unwrap();
    assert_eq!(target.state, TargetState::Detected);
    assert_eq!(target.detected_by, vec!["UAV1".to_string()]);

    let uav = snapshot.agent("UAV1").unwrap();
    assert_eq!(uav.state, AgentBehavior::Uav(UavState::Reporting));
    assert!(uav.position.distance_horizontal(&target.position) < 10.0);
}

#[test]
fn test_single_detector_confirms_by_timeout_after_41_ticks() {
    let mut config = single_unit_config();
    config.targets.truncate(1);
    let mut engine = running(config);

    let detected_at = loop {
        step(&mut engine);
        if let Some(tick) = engine.target("T1").and_then(Target::first_detected_tick) {
            break tick;
        }
        assert!(engine.tick() < 2_000, "target never detected");
    };

    while engine.tick() < detected_at + 40 {
        step(&mut engine);
        assert_eq!(engine.target("T1").unwrap().state(), TargetState::Detected);
    }

    let snapshot = step(&mut engine);
    assert_eq!(snapshot.tick, detected_at + 41);
    assert_eq!(snapshot.target("T1").unwrap().state, TargetState::Confirmed);
    let confirmation = snapshot
        .events
        .iter()
        .find(|e| e.kind == EventKind::TargetConfirmed)
        .unwrap();
    assert_eq!(confirmation.reason, Some(ConfirmReason::Timeout));
    assert_eq!(snapshot.mission_phase, MissionPhase::Rescue);
}

#[test]
fn test_second_uav_confirms_by_multi_sensor() {
    let mut engine = running(ScenarioConfig::default());
    {
        let state = engine.mission_mut();
        let t2 = state.targets.iter_mut().find(|t| t.id == "T2").unwrap();
        t2.mark_detected(0, "UAV2");

        // UAV1 を T2 の真上で巡回中にする
        let uav = state.agents[0].as_uav_mut().unwrap();
        uav.position = Position3D::new(0.0, 10.0, 0.0);
        uav.force_state(UavState::Patrol);
    }

    let snapshot = step(&mut engine);

    assert_eq!(snapshot.tick, 1);
    let t2 = snapshot.target("T2").unwrap();
    assert_eq!(t2.state, TargetState::Confirmed);
    assert_eq!(t2.detected_by, vec!["UAV2".to_string(), "UAV1".to_string()]);
    let confirmation = snapshot
        .events
        .iter()
        .find(|e| e.kind == EventKind::TargetConfirmed)
        .unwrap();
    assert_eq!(confirmation.reason, Some(ConfirmReason::MultiSensor));
    assert_eq!(engine.target("T2").unwrap().first_detected_tick(), Some(0));
}

// ---- Dispatch ----

#[test]
fn test_dispatch_serves_earliest_discovery_first() {
    let mut config = ScenarioConfig::default();
    config.fleet.ugvs.truncate(1);
    let mut engine = running(config);
    {
        let state = engine.mission_mut();
        state.tick = 50;
        state.phase = MissionPhase::Patrol;
        // T1 は配置順で先だが発見は遅い（複数検知で確定）
        let t1 = state.targets.iter_mut().find(|t| t.id == "T1").unwrap();
        t1.mark_detected(45, "UAV1");
        t1.record_detector("UAV2");
        // T3 は発見が早い（タイムアウトで確定）
        let t3 = state.targets.iter_mut().find(|t| t.id == "T3").unwrap();
        t3.mark_detected(5, "UAV3");
    }

    let snapshot = step(&mut engine);

    assert_eq!(events_of(&snapshot, EventKind::TargetConfirmed), 2);
    assert_eq!(snapshot.target("T1").unwrap().state, TargetState::Confirmed);
    assert_eq!(snapshot.target("T3").unwrap().state, TargetState::Confirmed);

    let ugv = engine.agent("UGV1").and_then(Agent::as_ugv).unwrap();
    assert_eq!(ugv.assigned_target(), Some("T3"));
    let dispatches: Vec<_> = snapshot
        .events
        .iter()
        .filter(|e| e.kind == EventKind::UgvDispatched)
        .collect();
    assert_eq!(dispatches.len(), 1);
    assert!(dispatches[0].msg.contains("T3"));
}

// ---- Completion ----

#[test]
fn test_mission_completes_on_next_tick_when_everyone_is_home() {
    let mut engine = running(ScenarioConfig::default());
    {
        let state = engine.mission_mut();
        state.phase = MissionPhase::Rescue;
        for target in state.targets.iter_mut() {
            target.mark_detected(0, "UAV1");
            target.confirm();
            target.mark_rescued();
        }
    }

    let snapshot = step(&mut engine);

    assert_eq!(snapshot.mission_phase, MissionPhase::Complete);
    assert_eq!(snapshot.sim_mode, RunMode::Complete);
    assert_eq!(events_of(&snapshot, EventKind::MissionComplete), 1);
    assert_eq!(engine.step(), Ok(None));
}

#[test]
fn test_returning_ugv_reaching_base_allows_completion() {
    let mut engine = running(ScenarioConfig::default());
    {
        let state = engine.mission_mut();
        state.phase = MissionPhase::Rescue;
        for target in state.targets.iter_mut() {
            target.mark_detected(0, "UAV1");
            target.confirm();
            target.mark_rescued();
        }
        // 基地から水平 3 の位置で帰還中
        let ugv = state.agents[3].as_ugv_mut().unwrap();
        ugv.position = Position3D::new(-47.0, 0.0, 50.0);
        ugv.force_state(UgvState::Returning);
    }

    let snapshot = step(&mut engine);

    assert_eq!(snapshot.mission_phase, MissionPhase::Complete);
    assert_eq!(events_of(&snapshot, EventKind::MissionComplete), 1);
}

#[test]
fn test_recall_after_last_rescue_sends_every_airborne_uav_home() {
    let mut engine = running(ScenarioConfig::default());
    for _ in 0..30 {
        step(&mut engine);
    }
    {
        let state = engine.mission_mut();
        state.phase = MissionPhase::Rescue;
        for target in state.targets.iter_mut() {
            target.force_state(TargetState::Rescued, Some(1));
        }
    }

    let snapshot = step(&mut engine);

    assert_eq!(events_of(&snapshot, EventKind::UavReturn), 3);
    for uav in engine.agents().iter().filter_map(Agent::as_uav) {
        assert_eq!(uav.state(), UavState::Return);
    }
    assert_eq!(snapshot.mission_phase, MissionPhase::Rescue);
}
