use serde::{Deserialize, Serialize};

use crate::models::{
    common::{AgentType, Position3D},
    traits::{IAgent, IMovable, TickContext},
    uav::{Uav, UavRole, UavState},
    ugv::{Ugv, UgvState},
};
use crate::simulation::TickError;

/// UAV / UGV のどちらかを表すエージェント
///
/// 種別ごとの状態と振る舞いを持ち、共通の `update` で駆動されます。
/// 種別固有の操作は `as_uav_mut` / `as_ugv_mut` で取り出して行います。
#[derive(Debug, Clone, PartialEq)]
pub enum Agent {
    Uav(Uav),
    Ugv(Ugv),
}

/// スナップショットに載せる行動状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentBehavior {
    Uav(UavState),
    Ugv(UgvState),
}

impl Agent {
    pub fn as_uav(&self) -> Option<&Uav> {
        match self {
            Agent::Uav(uav) => Some(uav),
            Agent::Ugv(_) => None,
        }
    }

    pub fn as_uav_mut(&mut self) -> Option<&mut Uav> {
        match self {
            Agent::Uav(uav) => Some(uav),
            Agent::Ugv(_) => None,
        }
    }

    pub fn as_ugv(&self) -> Option<&Ugv> {
        match self {
            Agent::Ugv(ugv) => Some(ugv),
            Agent::Uav(_) => None,
        }
    }

    pub fn as_ugv_mut(&mut self) -> Option<&mut Ugv> {
        match self {
            Agent::Ugv(ugv) => Some(ugv),
            Agent::Uav(_) => None,
        }
    }

    /// UAV の編隊内役割（UGV は None）
    pub fn role(&self) -> Option<UavRole> {
        self.as_uav().map(|uav| uav.role)
    }

    pub fn behavior(&self) -> AgentBehavior {
        match self {
            Agent::Uav(uav) => AgentBehavior::Uav(uav.state()),
            Agent::Ugv(ugv) => AgentBehavior::Ugv(ugv.state()),
        }
    }
}

impl IAgent for Agent {
    fn get_id(&self) -> &str {
        match self {
            Agent::Uav(uav) => uav.get_id(),
            Agent::Ugv(ugv) => ugv.get_id(),
        }
    }

    fn agent_type(&self) -> AgentType {
        match self {
            Agent::Uav(_) => AgentType::Uav,
            Agent::Ugv(_) => AgentType::Ugv,
        }
    }

    fn state_label(&self) -> &'static str {
        match self {
            Agent::Uav(uav) => uav.state_label(),
            Agent::Ugv(ugv) => ugv.state_label(),
        }
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError> {
        match self {
            Agent::Uav(uav) => uav.update(ctx),
            Agent::Ugv(ugv) => ugv.update(ctx),
        }
    }
}

impl IMovable for Agent {
    fn get_position(&self) -> Position3D {
        match self {
            Agent::Uav(uav) => uav.get_position(),
            Agent::Ugv(ugv) => ugv.get_position(),
        }
    }
}
