use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::events::SimEvent;
use crate::models::{
    common::{AgentType, Position3D, Velocity3D},
    steering::{self, SteeringProfile},
    target::TargetState,
    traits::{IAgent, IMovable, TickContext},
};
use crate::simulation::TickError;

/// UAV の行動状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UavState {
    Idle,
    Takeoff,
    Patrol,
    Reporting,
    Return,
    Landing,
}

impl UavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UavState::Idle => "IDLE",
            UavState::Takeoff => "TAKEOFF",
            UavState::Patrol => "PATROL",
            UavState::Reporting => "REPORTING",
            UavState::Return => "RETURN",
            UavState::Landing => "LANDING",
        }
    }
}

/// 編隊内の役割（表示用で、行動には影響しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UavRole {
    Leader,
    Follower,
}

/// 偵察UAVエージェント
///
/// 巡回ルートを周回しながら要救助者を探索し、発見すると上空でホバリングして報告します。
/// 要救助者の確定は行わず、それは意思決定層（指揮所）の役割です。
#[derive(Debug, Clone, PartialEq)]
pub struct Uav {
    pub id: String,
    pub role: UavRole,
    pub position: Position3D,
    pub velocity: Velocity3D,
    state: UavState,
    patrol_route: Vec<String>,
    route_index: usize,
    hover_point: Option<Position3D>,
    hover_start_tick: Option<u64>,
}

impl Uav {
    pub fn new(id: String, role: UavRole, position: Position3D, patrol_route: Vec<String>) -> Self {
        Self {
            id,
            role,
            position,
            velocity: Velocity3D::ZERO,
            state: UavState::Idle,
            patrol_route,
            route_index: 0,
            hover_point: None,
            hover_start_tick: None,
        }
    }

    pub fn state(&self) -> UavState {
        self.state
    }

    /// 現在向かっている巡回点のID
    pub fn current_waypoint(&self) -> Option<&str> {
        self.patrol_route.get(self.route_index).map(String::as_str)
    }

    /// ミッション開始時の離陸指令（IDLE のときのみ有効）
    ///
    /// # 戻り値
    ///
    /// 離陸に移行した場合は true
    pub fn command_takeoff(&mut self) -> bool {
        if self.state != UavState::Idle {
            return false;
        }
        self.transition(UavState::Takeoff);
        true
    }

    /// 帰還指令
    pub fn recall(&mut self) {
        self.transition(UavState::Return);
    }

    /// 基地到着とみなして待機状態にする
    pub fn stand_down(&mut self) {
        self.transition(UavState::Idle);
    }

    fn transition(&mut self, next: UavState) {
        if self.state != next {
            debug!(uav = %self.id, from = self.state.as_str(), to = next.as_str(), "UAV状態遷移");
            self.state = next;
        }
    }

    fn steer_to(&mut self, destination: Position3D, ctx: &TickContext<'_>) {
        let profile = SteeringProfile::uav(&ctx.world.uav);
        steering::steer(&mut self.position, &mut self.velocity, destination, &profile, ctx.neighbors);
    }

    fn takeoff(&mut self, ctx: &TickContext<'_>) {
        let tuning = &ctx.world.uav;
        if self.position.y < tuning.cruise_altitude {
            self.position.y += tuning.climb_rate;
        } else {
            self.transition(UavState::Patrol);
        }
    }

    fn patrol(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        let tuning = &ctx.world.uav;
        let waypoint_id = self
            .current_waypoint()
            .ok_or_else(|| TickError::EmptyRoute(self.id.clone()))?;
        let waypoint = ctx
            .world
            .location(waypoint_id)
            .ok_or_else(|| TickError::UnknownLocation(waypoint_id.to_string()))?;

        // 巡回点に水平方向の揺らぎを加えて毎ティック目標を引き直す
        let (jitter_x, jitter_z) = if tuning.jitter > 0.0 {
            (
                ctx.rng.gen_range(-tuning.jitter..=tuning.jitter),
                ctx.rng.gen_range(-tuning.jitter..=tuning.jitter),
            )
        } else {
            (0.0, 0.0)
        };
        let goal = Position3D::new(waypoint.x + jitter_x, tuning.cruise_altitude, waypoint.z + jitter_z);

        let waypoint_radius = tuning.waypoint_radius;
        self.steer_to(goal, ctx);

        if self.position.distance_3d(&goal) < waypoint_radius {
            self.route_index = (self.route_index + 1) % self.patrol_route.len();
            trace!(uav = %self.id, next = ?self.current_waypoint(), "巡回点通過");
        }

        self.perceive(ctx);
        Ok(())
    }

    /// 知覚処理
    ///
    /// 未発見の要救助者が検知半径内にいれば DETECTED にして REPORTING に移行します
    /// （1ティックで新規検知できるのは1名まで）。既に DETECTED の要救助者が
    /// 協調半径内にいれば、状態を変えずに自分を検知者として追加します。
    pub fn perceive(&mut self, ctx: &mut TickContext<'_>) {
        let tuning = &ctx.world.uav;

        for target in ctx.targets.iter_mut() {
            let distance = self.position.distance_horizontal(&target.position);

            match target.state() {
                TargetState::Unseen if distance < tuning.detection_radius => {
                    target.mark_detected(ctx.tick, &self.id);

                    self.hover_point = Some(target.position.with_altitude(tuning.cruise_altitude));
                    self.hover_start_tick = Some(ctx.tick);
                    self.transition(UavState::Reporting);

                    debug!(uav = %self.id, target = %target.id, tick = ctx.tick, "要救助者を発見");
                    ctx.events.push(SimEvent::human_detected(&self.id, &target.id));
                    break;
                }
                TargetState::Detected if distance < tuning.corroboration_radius => {
                    if target.record_detector(&self.id) {
                        debug!(uav = %self.id, target = %target.id, "協調検知を記録");
                    }
                }
                _ => {}
            }
        }
    }

    fn report(&mut self, ctx: &TickContext<'_>) {
        let Some(hover_point) = self.hover_point else {
            return;
        };
        self.steer_to(hover_point, ctx);

        let hover_start = self.hover_start_tick.unwrap_or(ctx.tick);
        if ctx.tick.saturating_sub(hover_start) > ctx.world.uav.hover_ticks {
            self.transition(UavState::Patrol);
        }
    }

    fn return_to_base(&mut self, ctx: &TickContext<'_>) {
        let hover_point = ctx.world.base().with_altitude(ctx.world.uav.cruise_altitude);
        self.steer_to(hover_point, ctx);

        if self.position.distance_3d(&hover_point) < ctx.world.uav.return_radius {
            self.transition(UavState::Landing);
        }
    }

    fn land(&mut self, ctx: &TickContext<'_>) {
        let pad = ctx.world.base().with_altitude(0.0);
        self.steer_to(pad, ctx);

        if self.position.y < ctx.world.uav.landed_altitude {
            self.transition(UavState::Idle);
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: UavState) {
        self.state = state;
    }
}

impl IAgent for Uav {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Uav
    }

    fn state_label(&self) -> &'static str {
        self.state.as_str()
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        match self.state {
            UavState::Idle => {}
            UavState::Takeoff => self.takeoff(ctx),
            UavState::Patrol => self.patrol(ctx)?,
            UavState::Reporting => self.report(ctx),
            UavState::Return => self.return_to_base(ctx),
            UavState::Landing => self.land(ctx),
        }
        Ok(())
    }
}

impl IMovable for Uav {
    fn get_position(&self) -> Position3D {
        self.position
    }
}
