use std::time::Duration;

use serde::Deserialize;

/// ChannelConfig は接続維持と再接続ポリシーの設定。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_ping_initial_delay_ms")]
    pub ping_initial_delay_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// 送信とクローズの待機上限。書き込みが詰まってもワーカーを止めない。
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// 設定ファイルでは別セクションで与えるため、ここでは読み込まない。
    #[serde(skip)]
    pub display: DisplayConfig,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_ping_initial_delay_ms() -> u64 {
    1_000
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            ping_initial_delay_ms: default_ping_initial_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            display: DisplayConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn ping_initial_delay_ms(mut self, ms: u64) -> Self {
        self.ping_initial_delay_ms = ms;
        self
    }

    pub fn ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    pub fn io_timeout_ms(mut self, ms: u64) -> Self {
        self.io_timeout_ms = ms;
        self
    }

    pub fn display(mut self, display: DisplayConfig) -> Self {
        self.display = display;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_initial_delay(&self) -> Duration {
        Duration::from_millis(self.ping_initial_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// DisplayConfig は通知トーストの表示時間の設定。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
    #[serde(default = "default_exit_transition_ms")]
    pub exit_transition_ms: u64,
}

fn default_display_ms() -> u64 {
    5_000
}

fn default_exit_transition_ms() -> u64 {
    300
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            display_ms: default_display_ms(),
            exit_transition_ms: default_exit_transition_ms(),
        }
    }
}

impl DisplayConfig {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }

    pub fn exit_transition(&self) -> Duration {
        Duration::from_millis(self.exit_transition_ms)
    }
}
