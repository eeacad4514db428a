use url::Url;

use crate::error::EndpointError;

/// 通知エンドポイントの既定パス。
pub const DEFAULT_CHANNEL_PATH: &str = "/ws/notifications/";

/// PageContext はチャネルを保持するホストページの状態。
/// 認証済みフラグはホスト側が与え、このクレートは認証を行わない。
#[derive(Debug, Clone)]
pub struct PageContext {
    page_url: Url,
    authenticated: bool,
}

impl PageContext {
    pub fn new(page_url: Url, authenticated: bool) -> Self {
        Self {
            page_url,
            authenticated,
        }
    }

    pub fn parse(page_url: &str, authenticated: bool) -> Result<Self, EndpointError> {
        Ok(Self::new(Url::parse(page_url)?, authenticated))
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    /// ページと同じホスト・ポートのエンドポイント URL を返す。
    /// https のページからは wss、http のページからは ws を使う。
    pub fn channel_url(&self, path: &str) -> Result<Url, EndpointError> {
        let scheme = match self.page_url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let host = self
            .page_url
            .host_str()
            .ok_or_else(|| EndpointError::MissingHost(self.page_url.to_string()))?;

        let authority = match self.page_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Url::parse(&format!("{scheme}://{authority}{path}"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_page_uses_wss() {
        let page = PageContext::parse("https://cineplex.example.com/movies/12", true).unwrap();
        let url = page.channel_url(DEFAULT_CHANNEL_PATH).unwrap();
        assert_eq!(url.as_str(), "wss://cineplex.example.com/ws/notifications/");
    }

    #[test]
    fn test_plain_page_uses_ws_and_keeps_port() {
        let page = PageContext::parse("http://localhost:3000/booking?show=4", true).unwrap();
        let url = page.channel_url("ws/notifications/").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/ws/notifications/");
    }

    #[test]
    fn test_ipv6_host() {
        let page = PageContext::parse("http://[::1]:8000/", false).unwrap();
        let url = page.channel_url(DEFAULT_CHANNEL_PATH).unwrap();
        assert_eq!(url.as_str(), "ws://[::1]:8000/ws/notifications/");
        assert!(!page.is_authenticated());
    }

    #[test]
    fn test_unsupported_scheme() {
        let page = PageContext::parse("file:///tmp/index.html", true).unwrap();
        assert!(matches!(
            page.channel_url(DEFAULT_CHANNEL_PATH),
            Err(EndpointError::UnsupportedScheme(s)) if s == "file"
        ));
    }

    #[test]
    fn test_invalid_page_url() {
        assert!(matches!(
            PageContext::parse("not a url", true),
            Err(EndpointError::InvalidUrl(_))
        ));
    }
}
