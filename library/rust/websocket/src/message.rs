use serde::{Deserialize, Serialize};

/// WebSocket フレーム。アプリケーションプロトコルは Text フレームに JSON で載せる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    /// 1000 (Normal Closure)
    pub const NORMAL: u16 = 1000;

    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::NORMAL,
            reason: reason.into(),
        }
    }
}

impl WsMessage {
    pub fn text(body: impl Into<String>) -> Self {
        WsMessage::Text(body.into())
    }

    /// Text フレームの本文を返す。Binary は UTF-8 として解釈できる場合のみ返す。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, WsMessage::Close(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let msg = WsMessage::text("hello");
        assert_eq!(msg.as_text(), Some("hello"));
    }

    #[test]
    fn test_binary_utf8_is_readable_as_text() {
        let msg = WsMessage::Binary(b"{\"type\":\"pong\"}".to_vec());
        assert_eq!(msg.as_text(), Some("{\"type\":\"pong\"}"));
    }

    #[test]
    fn test_binary_non_utf8() {
        let msg = WsMessage::Binary(vec![0xff, 0xfe]);
        assert!(msg.as_text().is_none());
    }

    #[test]
    fn test_control_frames_have_no_text() {
        assert!(WsMessage::Ping(vec![0]).as_text().is_none());
        assert!(WsMessage::Pong(vec![0]).as_text().is_none());
    }

    #[test]
    fn test_close_frame() {
        let msg = WsMessage::Close(Some(CloseFrame::normal("logout")));
        assert!(msg.is_close());
        if let WsMessage::Close(Some(frame)) = msg {
            assert_eq!(frame.code, 1000);
            assert_eq!(frame.reason, "logout");
        } else {
            panic!("expected close frame");
        }
    }
}
