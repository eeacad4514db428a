use std::time::Duration;

/// WsConfig はハンドシェイク時の設定を保持する。
/// 再接続ポリシーは上位のチャネル側が持つため、ここでは扱わない。
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub connect_timeout_ms: Option<u64>,
    pub headers: Vec<(String, String)>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Some(10_000),
            headers: Vec::new(),
        }
    }
}

impl WsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    pub fn without_connect_timeout(mut self) -> Self {
        self.connect_timeout_ms = None;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// セッション Cookie をハンドシェイクリクエストに載せる。
    pub fn cookie(self, cookie: impl Into<String>) -> Self {
        self.header("Cookie", cookie)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
