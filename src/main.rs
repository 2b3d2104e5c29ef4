use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use sarsim::control::parse_command;
use sarsim::driver::{DriverError, DriverHandle, DriverUpdate, SimulationDriver};
use sarsim::events::SimEvent;
use sarsim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use sarsim::scenario::ScenarioConfig;
use sarsim::simulation::SimulationEngine;
use sarsim::snapshot::{HistoryExport, Snapshot};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("sarsim")
        .version("0.1.0")
        .about("協調捜索救助シミュレーション (Search And Rescue Simulation)")
        .long_about("UAV が捜索し、指揮所が確定した要救助者へ UGV を出動させる\n\
                     ティック駆動の捜索救助シミュレーションです。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help("実行するシナリオファイル(.yaml)のパスを指定します。\n\
                           指定しない場合は組み込みの既定シナリオを使用します。")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with_all(["headless", "realtime"])
        )
        .arg(
            Arg::new("headless")
                .long("headless")
                .action(ArgAction::SetTrue)
                .help("待ち時間なしで完了（または最大ティック）まで実行")
                .conflicts_with("realtime")
        )
        .arg(
            Arg::new("realtime")
                .long("realtime")
                .action(ArgAction::SetTrue)
                .help("固定周期で実行し、標準入力の JSON コマンドを受け付ける")
                .long_help("シナリオの周期でティックを進めます。標準入力から1行1コマンドで\n\
                           {\"command\":\"set_sim_mode\",\"mode\":\"RUNNING\"} / {\"command\":\"reset_simulation\"}\n\
                           または snapshot / history / quit を受け付け、結果を標準出力へ JSON で出力します。")
        )
        .arg(
            Arg::new("export")
                .short('e')
                .long("export")
                .value_name("FILE")
                .help("実行終了後に履歴を JSON で書き出す")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: デバッグ, -vv: トレース)")
        )
        .get_matches();

    let log_output = match matches.get_one::<String>("log-output").map(|s| s.parse::<LogOutput>()) {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            eprintln!("エラー: {}", e);
            std::process::exit(2);
        }
        None => LogOutput::Console,
    };
    let base_level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or(tracing::Level::INFO);
    let log_config = LogConfig {
        level: level_for_verbosity(base_level, matches.get_count("verbose")),
        output: log_output,
        ..LogConfig::default()
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&matches) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> AppResult<()> {
    let scenario = match matches.get_one::<String>("scenario") {
        Some(path) => {
            let scenario = ScenarioConfig::from_file(path)?;
            info!(path = %path, "シナリオファイル読み込み完了");
            scenario
        }
        None => ScenarioConfig::default(),
    };

    let export = matches.get_one::<String>("export");

    if matches.get_flag("info") {
        scenario.validate()?;
        scenario.print_summary();
        Ok(())
    } else if matches.get_flag("headless") {
        run_headless(scenario, export.map(String::as_str))
    } else if matches.get_flag("realtime") {
        run_realtime(scenario, export.map(String::as_str))
    } else {
        show_default_help();
        Ok(())
    }
}

/// 待ち時間なしで最後まで実行
fn run_headless(scenario: ScenarioConfig, export: Option<&str>) -> AppResult<()> {
    scenario.print_summary();
    println!();

    let max_ticks = scenario.sim.max_ticks;
    let mut engine = SimulationEngine::new(scenario)?;
    let summary = engine.run_headless(max_ticks);

    println!("=== 実行結果 ===");
    println!("ティック数: {}", summary.ticks);
    println!("フェーズ: {:?}", summary.phase);
    println!("救助完了: {}/{}", summary.rescued, summary.targets);
    println!("ミッション完了: {}", if summary.completed { "はい" } else { "いいえ" });
    if engine.history().dropped() > 0 {
        println!("履歴から破棄したティック数: {}", engine.history().dropped());
    }

    if let Some(path) = export {
        write_history(path, &engine.history_export())?;
        println!("履歴を書き出しました: {}", path);
    }

    match summary.fault {
        Some(fault) => Err(format!("ヘッドレス実行を中断しました: {}", fault).into()),
        None => Ok(()),
    }
}

/// 標準出力へ送る1行分のメッセージ
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Outbound<'a> {
    Snapshot { snapshot: &'a Snapshot },
    Diagnostic { event: &'a SimEvent },
    Rejected { error: String },
    History { history: &'a HistoryExport },
}

fn emit(message: &Outbound<'_>) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "出力メッセージのシリアライズに失敗"),
    }
}

/// 固定周期で実行し、標準入力のコマンドで制御
fn run_realtime(scenario: ScenarioConfig, export: Option<&str>) -> AppResult<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let tick_rate_hz = scenario.sim.tick_rate_hz;
        let engine = SimulationEngine::new(scenario)?;
        let (handle, task) = SimulationDriver::spawn(engine, tick_rate_hz)?;

        let mut updates = handle.subscribe();
        let printer = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(DriverUpdate::Snapshot(snapshot)) => emit(&Outbound::Snapshot { snapshot: &snapshot }),
                    Ok(DriverUpdate::Diagnostic(event)) => emit(&Outbound::Diagnostic { event: &event }),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "出力が追いつかずスナップショットを破棄"),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        info!("標準入力からコマンドを受付中 (quit で終了)");
        read_commands(&handle).await?;

        handle.shutdown().await?;
        let engine = task.await?;
        printer.abort();

        if let Some(path) = export {
            write_history(path, &engine.history_export())?;
            info!(path, "履歴を書き出しました");
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn read_commands(handle: &DriverHandle) -> AppResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "snapshot" => {
                let snapshot = handle.snapshot().await?;
                emit(&Outbound::Snapshot { snapshot: &snapshot });
            }
            "history" => {
                let history = handle.history().await?;
                emit(&Outbound::History { history: &history });
            }
            payload => {
                let result = match parse_command(payload) {
                    Ok(command) => handle.control(command).await.map(|_| ()),
                    Err(e) => Err(DriverError::Command(e)),
                };
                match result {
                    // 受理時のスナップショットは購読側から出力される
                    Ok(()) => {}
                    Err(DriverError::Closed) => return Err(DriverError::Closed.into()),
                    Err(e) => {
                        warn!(error = %e, "コマンドを拒否");
                        emit(&Outbound::Rejected { error: e.to_string() });
                    }
                }
            }
        }
    }
    Ok(())
}

fn write_history(path: impl AsRef<Path>, history: &HistoryExport) -> AppResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, history)?;
    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("協調捜索救助シミュレーション - sarsim v0.1.0");
    println!();
    println!("使用方法:");
    println!("  sarsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定（省略時は既定シナリオ）");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("      --headless         完了まで一気に実行");
    println!("      --realtime         固定周期で実行（標準入力でコマンド受付）");
    println!("  -e, --export <FILE>    終了後に履歴を JSON で書き出す");
    println!("      --log-output <T>   ログ出力先 (console, file, both)");
    println!("      --log-level <L>    ログレベル");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/default.yaml      - 既定の3名救助シナリオ");
    println!("  scenarios/single_scout.yaml - UAV 1機・UGV 1台の小規模シナリオ");
    println!();
    println!("例:");
    println!("  sarsim --headless -e history.json");
    println!("  sarsim -s scenarios/single_scout.yaml --headless -v");
    println!("  sarsim --realtime --log-output file");
}
