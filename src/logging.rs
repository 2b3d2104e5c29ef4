//! # Logging モジュール
//!
//! 捜索救助シミュレーションのログ管理機能を提供します。
//!
//! tracing-subscriber のレジストリに、コンソール用の compact レイヤーと
//! tracing-appender による日次ローテーションの JSON ファイルレイヤーを組み合わせます。
//! ファイル書き込みは non_blocking ライターで行うため、ティック処理を待たせません。
//!
//! コンソール出力は標準エラーへ送ります。リアルタイムモードでは標準出力を
//! スナップショットの JSON 配信に使うためです。
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ
//! - `File`: ファイルのみ（logs/sarsim.YYYY-MM-DD）
//! - `Both`: コンソールとファイルの両方

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    /// コンソールのみ
    Console,
    /// ファイルのみ
    File,
    /// コンソールとファイルの両方
    Both,
}

impl LogOutput {
    fn to_console(&self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn to_file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stderr" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効な出力先: {}. 利用可能: console, file, both", s)),
        }
    }
}

#[derive(Error, Debug)]
pub enum LogSetupError {
    #[error("ログディレクトリを作成できません: {0}")]
    Directory(#[from] std::io::Error),

    #[error("ログシステムは既に初期化されています: {0}")]
    Init(#[from] TryInitError),
}

/// ログ設定構造体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル（RUST_LOG が設定されていればそちらを優先）
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ（File または Both の場合）
    pub log_dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "sarsim".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// # 引数
///
/// * `config` - ログ設定
///
/// # 戻り値
///
/// ファイル出力時は非同期ライターのガード。呼び出し側が保持している間だけ
/// ファイルへの書き込みが継続し、破棄時に残りがフラッシュされます。
///
/// # 例
///
/// ```no_run
/// use sarsim::logging::{LogConfig, LogOutput, init_logging};
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     output: LogOutput::Both,
///     ..LogConfig::default()
/// };
/// let _guard = init_logging(&config)?;
/// # Ok::<(), sarsim::logging::LogSetupError>(())
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogSetupError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.output.to_console().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .compact()
            .boxed()
    });

    let (file_layer, guard) = if config.output.to_file() {
        ensure_log_directory(&config.log_dir)?;
        let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .json()
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// ログレベルを文字列から解析
///
/// # 引数
///
/// * `level_str` - ログレベル文字列 ("trace", "debug", "info", "warn", "error")
///
/// # 戻り値
///
/// 解析されたログレベル、無効な場合は INFO
pub fn parse_log_level(level_str: &str) -> Level {
    level_str.parse::<Level>().unwrap_or_else(|_| {
        eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
        Level::INFO
    })
}

/// `-v` の指定回数からログレベルを決定（指定なしは `base` のまま）
pub fn level_for_verbosity(base: Level, verbose: u8) -> Level {
    match verbose {
        0 => base,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// ログディレクトリを作成
pub fn ensure_log_directory(log_dir: &str) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)
}
