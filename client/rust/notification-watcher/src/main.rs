use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cineplex_notification_channel::{
    ChannelState, ChannelStatus, NotificationChannel, NotificationId,
};
use cineplex_websocket::{TungsteniteConnector, WsConfig};
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod adapter;
mod infrastructure;

use adapter::terminal_view::TerminalView;
use infrastructure::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let env_path = std::env::var("CONFIG_ENV_PATH").ok().map(PathBuf::from);
    let cfg = Config::load(Path::new(&config_path), env_path.as_deref())
        .with_context(|| format!("設定ファイルを読み込めません: {config_path}"))?;
    cfg.validate()?;

    // Telemetry
    cineplex_telemetry::init_logger(
        &cfg.app.environment,
        &cfg.observability.log.format,
        cfg.observability.log.level.as_deref(),
    )?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting notification-watcher"
    );

    // 未ログインのページではチャネルを開かない
    let page = cfg.page_context()?;
    if !page.is_authenticated() {
        info!(page_url = %page.page_url(), "未ログインのため通知チャネルを開きません");
        return Ok(());
    }
    let url = page.channel_url(&cfg.channel.path)?;

    let mut ws_config = if cfg.channel.connect_timeout_ms == 0 {
        WsConfig::new().without_connect_timeout()
    } else {
        WsConfig::new().connect_timeout_ms(cfg.channel.connect_timeout_ms)
    };
    if let Some(cookie) = &cfg.page.session_cookie {
        ws_config = ws_config.cookie(cookie.expose_secret().clone());
    }

    let channel = NotificationChannel::new(
        url,
        cfg.channel_config(),
        Arc::new(TungsteniteConnector::new(ws_config)),
        Arc::new(TerminalView),
    );
    channel.connect();

    let outcome = run_until_shutdown(&channel).await;
    channel.dispose().await;
    info!("notification-watcher stopped");
    outcome
}

/// 標準入力から受け付ける操作。
#[derive(Debug, PartialEq, Eq)]
enum InputCommand {
    Dismiss(NotificationId),
    MarkRead(NotificationId),
    Quit,
}

fn parse_input(line: &str) -> Option<InputCommand> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let id = parts.next().and_then(|s| s.parse::<i64>().ok());
    match (command, id) {
        ("dismiss", Some(id)) => Some(InputCommand::Dismiss(NotificationId(id))),
        ("read", Some(id)) => Some(InputCommand::MarkRead(NotificationId(id))),
        ("quit" | "exit", None) => Some(InputCommand::Quit),
        _ => None,
    }
}

/// 終端状態なら監視を終える結果を返す。再接続を使い切った場合はエラー。
fn terminal_outcome(status: ChannelStatus) -> Option<anyhow::Result<()>> {
    if !status.state.is_terminal() {
        return None;
    }
    if status.state == ChannelState::Exhausted {
        tracing::error!(
            attempts = status.reconnect_attempts,
            "通知チャネルに再接続できませんでした"
        );
        return Some(Err(anyhow::anyhow!(
            "通知チャネルへの再接続を {} 回試みましたが失敗しました",
            status.reconnect_attempts
        )));
    }
    Some(Ok(()))
}

/// Ctrl-C・quit 入力・チャネルの終端状態のいずれかまで待機する。
/// 再接続を使い切った場合はエラーを返す。
async fn run_until_shutdown(channel: &NotificationChannel) -> anyhow::Result<()> {
    let mut status = channel.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("シャットダウンシグナルを受信しました");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                if let Some(outcome) = terminal_outcome(current) {
                    return outcome;
                }
                tracing::debug!(
                    state = ?current.state,
                    attempts = current.reconnect_attempts,
                    "通知チャネルの状態が変化しました"
                );
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_input(&line) {
                    Some(InputCommand::Dismiss(id)) => channel.dismiss(id),
                    Some(InputCommand::MarkRead(id)) => channel.mark_read(id),
                    Some(InputCommand::Quit) => return Ok(()),
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line, "不明な入力です (dismiss <id> | read <id> | quit)"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "標準入力を読み込めません");
                    stdin_open = false;
                }
            },
        }
    }
}
