use serde::{Deserialize, Serialize};

use crate::models::common::Position3D;

/// 要救助者のライフサイクル状態
///
/// 状態は宣言順にのみ進み、後戻りすることはありません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Unseen,
    Detected,
    Confirmed,
    Rescued,
}

/// 要救助者（救助対象）
///
/// 位置は固定です。検知したUAVのIDは重複なしで追記のみされ、
/// 初回検知ティックは UNSEEN → DETECTED 遷移時に一度だけ記録されます。
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: String,
    pub position: Position3D,
    state: TargetState,
    detected_by: Vec<String>,
    first_detected_tick: Option<u64>,
}

impl Target {
    pub fn new(id: String, position: Position3D) -> Self {
        Self {
            id,
            position,
            state: TargetState::Unseen,
            detected_by: Vec::new(),
            first_detected_tick: None,
        }
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// 検知したUAVのID（検知順）
    pub fn detected_by(&self) -> &[String] {
        &self.detected_by
    }

    pub fn first_detected_tick(&self) -> Option<u64> {
        self.first_detected_tick
    }

    /// 初回検知: UNSEEN → DETECTED
    ///
    /// 初回検知ティックを記録し、検知したUAVを検知者リストに加えます。
    pub fn mark_detected(&mut self, tick: u64, uav_id: &str) {
        debug_assert_eq!(self.state, TargetState::Unseen, "{} は既に検知済み", self.id);
        debug_assert!(self.first_detected_tick.is_none());

        self.advance_to(TargetState::Detected);
        self.first_detected_tick = Some(tick);
        self.record_detector(uav_id);
    }

    /// 検知者を追加（既に含まれていれば何もしない）
    ///
    /// # 戻り値
    ///
    /// 新しく追加された場合は true
    pub fn record_detector(&mut self, uav_id: &str) -> bool {
        if self.detected_by.iter().any(|id| id == uav_id) {
            return false;
        }
        self.detected_by.push(uav_id.to_string());
        true
    }

    /// 意思決定層による確定: DETECTED → CONFIRMED
    pub fn confirm(&mut self) {
        debug_assert_eq!(self.state, TargetState::Detected);
        self.advance_to(TargetState::Confirmed);
    }

    /// 救助完了: CONFIRMED → RESCUED
    pub fn mark_rescued(&mut self) {
        debug_assert_eq!(self.state, TargetState::Confirmed);
        self.advance_to(TargetState::Rescued);
    }

    fn advance_to(&mut self, next: TargetState) {
        debug_assert!(
            next > self.state,
            "要救助者 {} の状態が後退しました: {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        if next > self.state {
            self.state = next;
        }
    }

    /// テストから状態を直接設定する
    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: TargetState, first_detected_tick: Option<u64>) {
        self.state = state;
        self.first_detected_tick = first_detected_tick;
    }
}
