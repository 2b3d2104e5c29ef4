use rand_chacha::ChaCha8Rng;

use crate::events::SimEvent;
use crate::models::common::{AgentType, Position3D};
use crate::models::target::Target;
use crate::models::world::WorldModel;
use crate::simulation::TickError;

/// 1ティック分のエージェント更新に渡される共有コンテキスト
///
/// ティック処理パイプラインが唯一の所有者であり、
/// エージェント更新中は要救助者・乱数・イベントバッファへの可変参照を貸し出します。
pub struct TickContext<'a> {
    pub tick: u64,
    pub world: &'a WorldModel,
    pub targets: &'a mut [Target],
    /// 更新中のエージェント以外の全エージェント位置
    pub neighbors: &'a [Position3D],
    pub rng: &'a mut ChaCha8Rng,
    pub events: &'a mut Vec<SimEvent>,
}

/// 全てのシミュレーションエージェントが実装する基本インターフェース
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> &str;

    fn agent_type(&self) -> AgentType;

    /// 行動状態の表示名
    fn state_label(&self) -> &'static str;

    /// 1ティックの処理実行
    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TickError>;
}

/// 移動可能なエージェントのインターフェース
pub trait IMovable {
    /// 現在位置の取得
    fn get_position(&self) -> Position3D;
}
