//! cineplex-telemetry: 構造化ログの初期化。

pub mod logger;

pub use logger::{init_logger, parse_log_level, LogFormat, LoggerError};
