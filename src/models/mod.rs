// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エージェントの基本インターフェース（trait）定義
pub mod traits;

// 名前付き地点と定数
pub mod world;

// 移動制御（到着・分離ステアリング）
pub mod steering;

// 各エージェントモデルの実装
pub mod target;
pub mod uav;
pub mod ugv;
pub mod agent;

// 意思決定層
pub mod command_post;

// 便利な re-export
pub use agent::{Agent, AgentBehavior};
pub use command_post::{CommandPost, DispatchCandidate, MissionPhase};
pub use common::*;
pub use target::{Target, TargetState};
pub use traits::*;
pub use uav::{Uav, UavRole, UavState};
pub use ugv::{RescueAssignment, Ugv, UgvState};
pub use world::WorldModel;
