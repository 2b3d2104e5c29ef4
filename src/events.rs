//! ティック中に発生するイベント
//!
//! イベントはティック開始時にクリアされる一時的なものですが、
//! 各ティックのスナップショットに含まれて履歴に残ります。

use serde::{Deserialize, Serialize};

/// イベント種別（外部へは SCREAMING_SNAKE_CASE のタグで送出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    HumanDetected,
    TargetConfirmed,
    UgvDispatched,
    RescueStart,
    TargetRescued,
    UavReturn,
    MissionComplete,
    Reset,
    /// ティック処理失敗などの診断イベント
    Error,
}

/// 要救助者を確定した理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmReason {
    /// 初回検知から一定ティックが経過した
    Timeout,
    /// 複数のUAVが検知した
    MultiSensor,
}

impl ConfirmReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ConfirmReason::Timeout => "timeout confirmation",
            ConfirmReason::MultiSensor => "multi-sensor confirmation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConfirmReason>,
}

impl SimEvent {
    pub fn new(kind: EventKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            reason: None,
        }
    }

    pub fn human_detected(uav_id: &str, target_id: &str) -> Self {
        Self::new(
            EventKind::HumanDetected,
            format!("{} detected target {} (UNSEEN -> DETECTED)", uav_id, target_id),
        )
    }

    pub fn target_confirmed(target_id: &str, reason: ConfirmReason) -> Self {
        Self {
            kind: EventKind::TargetConfirmed,
            msg: format!("target {} confirmed ({})", target_id, reason.describe()),
            reason: Some(reason),
        }
    }

    pub fn ugv_dispatched(ugv_id: &str, target_id: &str) -> Self {
        Self::new(
            EventKind::UgvDispatched,
            format!("{} dispatched to rescue {} (earliest discovery first)", ugv_id, target_id),
        )
    }

    pub fn rescue_started(ugv_id: &str, target_id: &str) -> Self {
        Self::new(
            EventKind::RescueStart,
            format!("{} arrived on scene, rescuing {}", ugv_id, target_id),
        )
    }

    pub fn target_rescued(ugv_id: &str, target_id: &str) -> Self {
        Self::new(
            EventKind::TargetRescued,
            format!("{} rescued {} (CONFIRMED -> RESCUED)", ugv_id, target_id),
        )
    }

    pub fn uav_returning(uav_id: &str) -> Self {
        Self::new(
            EventKind::UavReturn,
            format!("{} mission over, returning to base", uav_id),
        )
    }

    pub fn mission_complete() -> Self {
        Self::new(
            EventKind::MissionComplete,
            "all targets rescued and all units home, mission complete",
        )
    }

    pub fn reset() -> Self {
        Self::new(EventKind::Reset, "simulation reset")
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(EventKind::Error, msg)
    }
}
