//! 通知チャネルのワイヤプロトコル。
//!
//! すべてのメッセージは `type` フィールドを判別子に持つ JSON オブジェクトで、
//! 受信時は境界で一度だけ [`ServerMessage`] にデコードする。

use std::fmt;

use cineplex_websocket::WsMessage;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// サーバーが採番する通知 ID。既読通知と重複排除のキーになる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub i64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// 通知の種別。表示（アクセント色）にのみ影響する。
/// 未知の種別文字列は Other として保持し、デコードを失敗させない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    BookingConfirmation,
    BookingCancellation,
    ShowReminder,
    SystemAnnouncement,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::BookingConfirmation => "BOOKING_CONFIRMATION",
            NotificationType::BookingCancellation => "BOOKING_CANCELLATION",
            NotificationType::ShowReminder => "SHOW_REMINDER",
            NotificationType::SystemAnnouncement => "SYSTEM_ANNOUNCEMENT",
            NotificationType::Other(raw) => raw,
        }
    }
}

impl From<String> for NotificationType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "BOOKING_CONFIRMATION" => NotificationType::BookingConfirmation,
            "BOOKING_CANCELLATION" => NotificationType::BookingCancellation,
            "SHOW_REMINDER" => NotificationType::ShowReminder,
            "SYSTEM_ANNOUNCEMENT" => NotificationType::SystemAnnouncement,
            _ => NotificationType::Other(raw),
        }
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> Self {
        match kind {
            NotificationType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub notification_type_name: String,
    pub subject: String,
    pub content: String,
}

impl Notification {
    /// 表示用の種別ラベル。サーバーがラベルを送らなかった場合は種別コードを使う。
    pub fn type_label(&self) -> &str {
        if self.notification_type_name.is_empty() {
            self.notification_type.as_str()
        } else {
            &self.notification_type_name
        }
    }
}

/// サーバー → クライアント
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Notification(Notification),
    MarkReadResponse {
        notification_id: NotificationId,
        success: bool,
    },
    Pong,
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    /// Text フレーム（または UTF-8 の Binary フレーム）をデコードする。
    pub fn from_frame(frame: &WsMessage) -> Result<Self, ProtocolError> {
        let text = frame.as_text().ok_or(ProtocolError::NotText)?;
        Self::decode(text)
    }
}

/// クライアント → サーバー
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    MarkRead { notification_id: NotificationId },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn to_frame(&self) -> Result<WsMessage, ProtocolError> {
        self.encode().map(WsMessage::Text)
    }
}
