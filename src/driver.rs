//! 固定周期ドライバ
//!
//! シミュレーションエンジンを1つの tokio タスクが所有し、一定周期でティックを進めます。
//! 制御コマンドや問い合わせは `mpsc` で受け取り、ティックとティックの間で処理するため、
//! コマンドがティックの途中に割り込むことはありません。
//! 発行したスナップショットと診断イベントは `broadcast` で購読者に配信します。

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::control::{CommandError, ControlCommand};
use crate::events::SimEvent;
use crate::scenario::TICK_RATE_RANGE;
use crate::simulation::SimulationEngine;
use crate::snapshot::{HistoryExport, Snapshot};

/// ハートビートログの間隔（ティック）
pub const HEARTBEAT_TICKS: u64 = 20;

const REQUEST_QUEUE: usize = 64;
const UPDATE_QUEUE: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("simulation driver has stopped")]
    Closed,

    #[error("tick rate out of range, got {0}")]
    InvalidTickRate(f64),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// ドライバへの要求
#[derive(Debug)]
pub enum DriverRequest {
    Control(ControlCommand, oneshot::Sender<Result<Snapshot, CommandError>>),
    Snapshot(oneshot::Sender<Snapshot>),
    History(oneshot::Sender<HistoryExport>),
    Shutdown,
}

/// 購読者へ配信される更新
#[derive(Debug, Clone)]
pub enum DriverUpdate {
    Snapshot(Snapshot),
    /// ティック障害などの診断イベント（スナップショットの代わりに送出）
    Diagnostic(SimEvent),
}

/// 稼働中ドライバへのハンドル
#[derive(Debug, Clone)]
pub struct DriverHandle {
    requests: mpsc::Sender<DriverRequest>,
    updates: broadcast::Sender<DriverUpdate>,
}

impl DriverHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<DriverUpdate> {
        self.updates.subscribe()
    }

    /// 制御コマンドを送り、適用結果を待つ
    pub async fn control(&self, command: ControlCommand) -> Result<Snapshot, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverRequest::Control(command, reply)).await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    /// 最新スナップショットの取得
    pub async fn snapshot(&self) -> Result<Snapshot, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverRequest::Snapshot(reply)).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// 履歴全体の取得
    pub async fn history(&self) -> Result<HistoryExport, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverRequest::History(reply)).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.send(DriverRequest::Shutdown).await
    }

    async fn send(&self, request: DriverRequest) -> Result<(), DriverError> {
        self.requests.send(request).await.map_err(|_| DriverError::Closed)
    }
}

pub struct SimulationDriver;

impl SimulationDriver {
    /// エンジンを所有するドライバタスクを起動
    ///
    /// tokio ランタイム内から呼び出してください。
    ///
    /// # 戻り値
    ///
    /// ハンドルと、停止時にエンジンを返す `JoinHandle`
    pub fn spawn(
        engine: SimulationEngine,
        tick_rate_hz: f64,
    ) -> Result<(DriverHandle, JoinHandle<SimulationEngine>), DriverError> {
        if !TICK_RATE_RANGE.contains(&tick_rate_hz) {
            return Err(DriverError::InvalidTickRate(tick_rate_hz));
        }
        let period = Duration::try_from_secs_f64(1.0 / tick_rate_hz)
            .map_err(|_| DriverError::InvalidTickRate(tick_rate_hz))?;

        let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let (updates, _) = broadcast::channel(UPDATE_QUEUE);

        let task = tokio::spawn(run_driver(engine, request_rx, updates.clone(), period));
        info!(tick_rate_hz, "シミュレーションドライバを起動");

        Ok((DriverHandle { requests, updates }, task))
    }
}

async fn run_driver(
    mut engine: SimulationEngine,
    mut requests: mpsc::Receiver<DriverRequest>,
    updates: broadcast::Sender<DriverUpdate>,
    period: Duration,
) -> SimulationEngine {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(DriverRequest::Control(command, reply)) => {
                    let result = engine.apply(command);
                    if let Ok(snapshot) = &result {
                        let _ = updates.send(DriverUpdate::Snapshot(snapshot.clone()));
                    }
                    let _ = reply.send(result);
                }
                Some(DriverRequest::Snapshot(reply)) => {
                    let _ = reply.send(engine.current_snapshot());
                }
                Some(DriverRequest::History(reply)) => {
                    let _ = reply.send(engine.history_export());
                }
                Some(DriverRequest::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                match engine.step() {
                    Ok(Some(snapshot)) => {
                        if snapshot.tick % HEARTBEAT_TICKS == 0 {
                            info!(
                                mode = %snapshot.sim_mode,
                                tick = snapshot.tick,
                                phase = ?snapshot.mission_phase,
                                "ハートビート"
                            );
                        }
                        let _ = updates.send(DriverUpdate::Snapshot(snapshot));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "ティックを破棄");
                        let event = SimEvent::error(format!("tick {} failed: {}", engine.tick() + 1, e));
                        let _ = updates.send(DriverUpdate::Diagnostic(event));
                    }
                }
            }
        }
    }

    debug!(tick = engine.tick(), "シミュレーションドライバを停止");
    engine
}
