//! 構造化ログユーティリティ。
//! tracing クレートを使用し、JSON またはテキスト形式の構造化ログを出力する。
//!
//! # 使用例
//!
//! ```ignore
//! use tracing::{info, warn};
//!
//! cineplex_telemetry::init_logger("dev", "text", None)?;
//! info!(url = %url, "通知チャネルに接続しました");
//! warn!(error = %e, "通知チャネルへの接続に失敗しました");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("ログフィルタが不正です: {0}")]
    InvalidFilter(String),

    #[error("ロガーは既に初期化されています: {0}")]
    AlreadyInitialized(String),
}

/// ログの出力形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// "text" ならテキスト、それ以外は JSON。
    pub fn parse(format: &str) -> Self {
        if format.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// 環境ごとの既定ログレベル。
///
/// - dev: debug
/// - staging: info
/// - prod: warn
pub fn default_level(environment: &str) -> &'static str {
    match environment {
        "dev" => "debug",
        "staging" => "info",
        _ => "warn",
    }
}

/// init_logger は tracing-subscriber を初期化する。
/// level が指定されていればそれを、なければ環境ごとの既定レベルを使う。
/// プロセスにつき 1 回だけ成功する。
pub fn init_logger(
    environment: &str,
    format: &str,
    level: Option<&str>,
) -> Result<(), LoggerError> {
    let directive = level
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| default_level(environment));
    let filter =
        EnvFilter::try_new(directive).map_err(|e| LoggerError::InvalidFilter(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::parse(format) {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init(),
    };
    result.map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))
}

/// parse_log_level はログレベル文字列を tracing の Level に変換する。
pub fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
