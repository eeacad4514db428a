//! cineplex-websocket: WebSocket トランスポート層。
//!
//! コネクタ/コネクションのトレイトと、テスト用のインメモリ実装、
//! `native` フィーチャーで有効になる tokio-tungstenite 実装を提供する。

pub mod client;
pub mod config;
pub mod error;
pub mod message;
#[cfg(feature = "native")]
pub mod native;

pub use client::{InMemoryWsConnection, InMemoryWsConnector, WsConnection, WsConnector};
pub use config::WsConfig;
pub use error::WsError;
pub use message::{CloseFrame, WsMessage};
#[cfg(feature = "native")]
pub use native::{TungsteniteConnection, TungsteniteConnector};

#[cfg(feature = "mock")]
pub use client::{MockWsConnection, MockWsConnector};
