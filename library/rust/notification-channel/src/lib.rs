//! cineplex-notification-channel: リアルタイム通知チャネルクライアント。
//!
//! サーバーのプッシュエンドポイントへの常時接続を維持し、
//! 受信した通知をトーストとして表示して既読状態をサーバーへ返す。
//! 再接続は固定間隔・回数上限付きで行う。

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod tray;

pub use channel::NotificationChannel;
pub use config::{ChannelConfig, DisplayConfig};
pub use endpoint::{PageContext, DEFAULT_CHANNEL_PATH};
pub use error::{EndpointError, ProtocolError};
pub use protocol::{ClientMessage, Notification, NotificationId, NotificationType, ServerMessage};
pub use scheduler::{ScheduledTask, Scheduler};
pub use state::{ChannelState, ChannelStatus};
pub use tray::{
    Accent, InMemoryNotificationView, NotificationTray, NotificationView, Toast, TrayEvent,
    ViewEvent,
};

#[cfg(feature = "mock")]
pub use tray::MockNotificationView;
