use std::path::Path;

use cineplex_notification_channel::{
    ChannelConfig, DisplayConfig, PageContext, DEFAULT_CHANNEL_PATH,
};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("設定ファイルを読み込めません: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("YAML の解析に失敗しました: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("設定値が不正です: {0}")]
    Validation(String),
}

/// Config はアプリケーション全体の設定。
#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub page: PageConfig,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub notifications: DisplayConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// PageConfig はチャネルを保持するページの情報。
#[derive(Debug, Deserialize)]
pub struct PageConfig {
    pub url: String,
    #[serde(default)]
    pub authenticated: bool,
    /// ハンドシェイク時に Cookie ヘッダーとして送る。
    #[serde(default)]
    pub session_cookie: Option<SecretString>,
}

/// ChannelSection は通知チャネルの接続設定。
/// 再接続・ping の設定はチャネルクレートの ChannelConfig をそのまま読み込む。
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSection {
    #[serde(default = "default_path")]
    pub path: String,
    /// 0 ならタイムアウトなし。
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(flatten)]
    pub policy: ChannelConfig,
}

fn default_path() -> String {
    DEFAULT_CHANNEL_PATH.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            path: default_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            policy: ChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 未指定なら環境ごとの既定レベル。
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: default_log_format(),
        }
    }
}

impl Config {
    /// YAML を読み込む。env_path があれば上書きとしてマージする。
    pub fn load(path: &Path, env_path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = std::fs::read_to_string(path)?;
        let mut value: serde_yaml::Value = serde_yaml::from_str(&base)?;

        if let Some(env_path) = env_path {
            let overlay = std::fs::read_to_string(env_path)?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&overlay)?;
            merge_yaml(&mut value, &overlay);
        }

        Ok(serde_yaml::from_value(value)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name は必須です".into()));
        }
        if !["dev", "staging", "prod"].contains(&self.app.environment.as_str()) {
            return Err(ConfigError::Validation(
                "app.environment は dev, staging, prod のいずれかです".into(),
            ));
        }
        let page = self.page_context()?;
        page.channel_url(&self.channel.path)
            .map_err(|e| ConfigError::Validation(format!("page.url: {e}")))?;
        if !self.channel.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "channel.path は / で始まる必要があります".into(),
            ));
        }
        if self.channel.policy.ping_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "channel.ping_interval_ms は 0 より大きい値が必要です".into(),
            ));
        }
        if self.notifications.display_ms == 0 {
            return Err(ConfigError::Validation(
                "notifications.display_ms は 0 より大きい値が必要です".into(),
            ));
        }
        if !["text", "json"].contains(&self.observability.log.format.as_str()) {
            return Err(ConfigError::Validation(
                "observability.log.format は text か json です".into(),
            ));
        }
        Ok(())
    }

    pub fn page_context(&self) -> Result<PageContext, ConfigError> {
        PageContext::parse(&self.page.url, self.page.authenticated)
            .map_err(|e| ConfigError::Validation(format!("page.url: {e}")))
    }

    pub fn channel_config(&self) -> ChannelConfig {
        self.channel
            .policy
            .clone()
            .display(self.notifications.clone())
    }
}

/// base YAML Value に overlay YAML Value を再帰的にマージする。
pub fn merge_yaml(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_yaml(base_value, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    const MINIMAL: &str = r#"
app:
  name: "notification-watcher"
page:
  url: "https://cinema.example.com/movies/"
  authenticated: true
"#;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.app.version, "0.1.0");
        assert_eq!(config.app.environment, "dev");
        assert_eq!(config.channel.path, "/ws/notifications/");
        assert_eq!(config.channel.policy, ChannelConfig::default());
        assert_eq!(config.channel.connect_timeout_ms, 10_000);
        assert_eq!(config.notifications.display_ms, 5_000);
        assert_eq!(config.notifications.exit_transition_ms, 300);
        assert!(config.observability.log.level.is_none());
        assert_eq!(config.observability.log.format, "json");
        assert!(config.page.session_cookie.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_session_cookie_is_redacted() {
        let yaml = format!("{MINIMAL}  session_cookie: \"sessionid=abc123\"\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();

        let cookie = config.page.session_cookie.as_ref().unwrap();
        assert_eq!(cookie.expose_secret(), "sessionid=abc123");
        assert!(!format!("{config:?}").contains("abc123"));
    }

    #[test]
    fn test_channel_config_mapping() {
        let yaml = format!(
            "{MINIMAL}channel:\n  path: \"/ws/alerts/\"\n  connect_timeout_ms: 0\n  max_reconnect_attempts: 2\n  reconnect_delay_ms: 500\n  io_timeout_ms: 2000\nnotifications:\n  display_ms: 8000\n"
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.channel.path, "/ws/alerts/");
        assert_eq!(config.channel.connect_timeout_ms, 0);
        let channel = config.channel_config();

        assert_eq!(channel.max_reconnect_attempts, 2);
        assert_eq!(channel.io_timeout_ms, 2_000);
        assert_eq!(channel.reconnect_delay_ms, 500);
        assert_eq!(channel.ping_interval_ms, 30_000);
        assert_eq!(channel.display.display_ms, 8_000);
        assert_eq!(channel.display.exit_transition_ms, 300);
    }

    #[test]
    fn test_page_context_derives_secure_endpoint() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        let page = config.page_context().unwrap();

        assert!(page.is_authenticated());
        assert_eq!(
            page.channel_url(&config.channel.path).unwrap().as_str(),
            "wss://cinema.example.com/ws/notifications/"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.app.environment = "qa".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.page.url = "ftp://cinema.example.com/".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.channel.path = "ws/notifications/".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.channel.policy.ping_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.observability.log.format = "xml".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_with_env_overlay() {
        let base = write_yaml(MINIMAL);
        let overlay = write_yaml(
            "app:\n  environment: \"prod\"\nchannel:\n  reconnect_delay_ms: 1000\n",
        );

        let config = Config::load(base.path(), Some(overlay.path())).unwrap();
        assert_eq!(config.app.name, "notification-watcher");
        assert_eq!(config.app.environment, "prod");
        assert_eq!(config.channel.policy.reconnect_delay_ms, 1_000);
        assert_eq!(config.channel.policy.max_reconnect_attempts, 5);
        assert!(config.page.authenticated);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.yaml"), None).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let file = write_yaml("app: [unclosed");
        let err = Config::load(file.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseYaml(_)));
    }

    #[test]
    fn test_merge_yaml_nested() {
        let mut base: serde_yaml::Value =
            serde_yaml::from_str("a:\n  b: 1\n  c: 2\nd: 3\n").unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str("a:\n  c: 20\ne: 5\n").unwrap();
        merge_yaml(&mut base, &overlay);

        assert_eq!(base["a"]["b"], serde_yaml::Value::from(1));
        assert_eq!(base["a"]["c"], serde_yaml::Value::from(20));
        assert_eq!(base["d"], serde_yaml::Value::from(3));
        assert_eq!(base["e"], serde_yaml::Value::from(5));
    }
}
