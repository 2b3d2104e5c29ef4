//! 外部からの制御コマンド
//!
//! 実行モードの変更とリセットだけが外部から状態を変更できる操作です。
//! 不正なコマンドは状態を一切変更せずに `CommandError` として呼び出し元へ返します。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    #[serde(rename = "set_sim_mode")]
    SetMode { mode: RunMode },
    #[serde(rename = "reset_simulation")]
    Reset,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown run mode: {0}")]
    UnknownMode(String),

    #[error("malformed control payload: {0}")]
    Malformed(String),

    #[error("mission is complete; reset before running again")]
    MissionComplete,
}

/// JSON 形式の制御コマンドを解釈
///
/// `{"command":"set_sim_mode","mode":"RUNNING"}` または
/// `{"command":"reset_simulation"}` を受け付けます。モード文字列は大文字小文字を区別しません。
pub fn parse_command(payload: &str) -> Result<ControlCommand, CommandError> {
    #[derive(Deserialize)]
    struct RawCommand {
        command: String,
        #[serde(default)]
        mode: Option<String>,
    }

    let raw: RawCommand =
        serde_json::from_str(payload).map_err(|e| CommandError::Malformed(e.to_string()))?;

    match raw.command.as_str() {
        "set_sim_mode" => {
            let mode = raw
                .mode
                .ok_or_else(|| CommandError::Malformed("set_sim_mode requires a mode".to_string()))?;
            Ok(ControlCommand::SetMode { mode: mode.parse()? })
        }
        "reset_simulation" => Ok(ControlCommand::Reset),
        other => Err(CommandError::Malformed(format!("unknown command: {}", other))),
    }
}
