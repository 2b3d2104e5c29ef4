use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::SimEvent;
use crate::models::{
    common::{AgentType, Position3D, Velocity3D},
    steering::{self, SteeringProfile},
    traits::{IAgent, IMovable, TickContext},
};
use crate::simulation::TickError;

/// UGV の行動状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UgvState {
    Standby,
    Dispatch,
    Rescuing,
    Returning,
}

impl UgvState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UgvState::Standby => "STANDBY",
            UgvState::Dispatch => "DISPATCH",
            UgvState::Rescuing => "RESCUING",
            UgvState::Returning => "RETURNING",
        }
    }
}

/// 指揮所から与えられる救助任務
#[derive(Debug, Clone, PartialEq)]
pub struct RescueAssignment {
    pub target_id: String,
    pub target_position: Position3D,
}

/// 救助UGVエージェント
///
/// 自分で任務を選ぶことはなく、指揮所の割り当てを受けて出動します。
#[derive(Debug, Clone, PartialEq)]
pub struct Ugv {
    pub id: String,
    pub position: Position3D,
    pub velocity: Velocity3D,
    state: UgvState,
    assignment: Option<RescueAssignment>,
    rescue_timer: u32,
}

impl Ugv {
    pub fn new(id: String, position: Position3D) -> Self {
        Self {
            id,
            position,
            velocity: Velocity3D::ZERO,
            state: UgvState::Standby,
            assignment: None,
            rescue_timer: 0,
        }
    }

    pub fn state(&self) -> UgvState {
        self.state
    }

    /// 割り当て中の要救助者ID
    pub fn assigned_target(&self) -> Option<&str> {
        self.assignment.as_ref().map(|a| a.target_id.as_str())
    }

    pub fn is_available(&self) -> bool {
        self.state == UgvState::Standby
    }

    /// 救助任務の割り当て（STANDBY → DISPATCH）
    pub fn assign(&mut self, target_id: &str, target_position: Position3D) {
        debug_assert!(self.is_available(), "{} は待機中ではありません", self.id);
        self.assignment = Some(RescueAssignment {
            target_id: target_id.to_string(),
            target_position,
        });
        self.transition(UgvState::Dispatch);
    }

    fn transition(&mut self, next: UgvState) {
        if self.state != next {
            debug!(ugv = %self.id, from = self.state.as_str(), to = next.as_str(), "UGV状態遷移");
            self.state = next;
        }
    }

    fn steer_to(&mut self, destination: Position3D, ctx: &TickContext<'_>) {
        let profile = SteeringProfile::ugv(&ctx.world.ugv);
        steering::steer(&mut self.position, &mut self.velocity, destination, &profile, ctx.neighbors);
    }

    fn missing_assignment(&self) -> TickError {
        TickError::MissingAssignment(self.id.clone())
    }

    fn drive_to_target(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        let assignment = self.assignment.clone().ok_or_else(|| self.missing_assignment())?;
        self.steer_to(assignment.target_position, ctx);

        if self.position.distance_horizontal(&assignment.target_position) < ctx.world.ugv.arrival_radius {
            self.rescue_timer = 0;
            self.transition(UgvState::Rescuing);
            ctx.events.push(SimEvent::rescue_started(&self.id, &assignment.target_id));
        }
        Ok(())
    }

    fn rescue(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        self.rescue_timer += 1;
        if self.rescue_timer < ctx.world.ugv.rescue_ticks {
            return Ok(());
        }

        let target_id = self
            .assigned_target()
            .ok_or_else(|| self.missing_assignment())?
            .to_string();
        let target = ctx
            .targets
            .iter_mut()
            .find(|t| t.id == target_id)
            .ok_or_else(|| TickError::UnknownTarget(target_id.clone()))?;

        target.mark_rescued();
        info!(ugv = %self.id, target = %target_id, tick = ctx.tick, "救助完了");
        ctx.events.push(SimEvent::target_rescued(&self.id, &target_id));

        self.assignment = None;
        self.transition(UgvState::Returning);
        Ok(())
    }

    fn return_home(&mut self, ctx: &TickContext<'_>) {
        let base = ctx.world.base();
        self.steer_to(base, ctx);

        if self.position.distance_horizontal(&base) < ctx.world.ugv.home_radius {
            self.transition(UgvState::Standby);
        }
    }

    /// 指定地点からの水平距離が半径内か
    pub fn is_near(&self, point: &Position3D, radius: f64) -> bool {
        self.position.distance_horizontal(point) < radius
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: UgvState) {
        self.state = state;
    }
}

impl IAgent for Ugv {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Ugv
    }

    fn state_label(&self) -> &'static str {
        self.state.as_str()
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        match self.state {
            UgvState::Standby => Ok(()),
            UgvState::Dispatch => self.drive_to_target(ctx),
            UgvState::Rescuing => self.rescue(ctx),
            UgvState::Returning => {
                self.return_home(ctx);
                Ok(())
            }
        }
    }
}

impl IMovable for Ugv {
    fn get_position(&self) -> Position3D {
        self.position
    }
}
